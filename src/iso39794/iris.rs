//! The iris image data block of ISO/IEC 39794-6.


use crate::der_util;
use crate::iso39794::{
    choice_code, encode_choice_code, list_or_single, parse_application_record, tagged_octets,
    Error, VersionBlock,
};
use crate::tlv::Tlv;


pub const IMAGE_DATA_FORMAT_MONO_RAW: i64 = 0;
pub const IMAGE_DATA_FORMAT_MONO_JPEG2000: i64 = 1;
pub const IMAGE_DATA_FORMAT_MONO_PNG: i64 = 2;

pub const EYE_LABEL_UNDEFINED: i64 = 0;
pub const EYE_LABEL_RIGHT: i64 = 1;
pub const EYE_LABEL_LEFT: i64 = 2;


/// The image-specific attributes of one iris representation.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisImageInformation {
    /// Image data format code.
    pub image_data_format: i64,
    /// Which eye the image shows, if stated.
    pub eye_label: Option<i64>,
    /// Image kind code (cropped, cropped-and-masked, ...), if stated.
    pub image_kind: Option<i64>,
}

/// One iris representation: the image blob plus its attributes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisRepresentation {
    pub representation_data: Vec<u8>,
    pub information: IrisImageInformation,
    /// Raw capture date/time content octets, if present.
    pub capture_date_time: Option<Vec<u8>>,
}
impl IrisRepresentation {
    fn decode(block: &Tlv) -> Result<Self, Error> {
        let tagged = der_util::decode_tagged_objects(block)
            .map_err(|_| Error::Malformed { reason: "representation block is not constructed" })?;

        let representation_data = tagged.get(&0)
            .ok_or(Error::MissingField { field: "representation data" })
            .and_then(|field| tagged_octets(field))?
            .to_vec();

        let information = match tagged.get(&1) {
            Some(field) => {
                let sequence = crate::iso39794::tagged_sequence(field)?;
                let inner = der_util::decode_tagged_objects(sequence)
                    .map_err(|_| Error::Malformed { reason: "image information is not constructed" })?;
                let image_data_format = inner.get(&0)
                    .ok_or(Error::MissingField { field: "image data format" })
                    .and_then(|f| choice_code(f))?;
                let eye_label = inner.get(&1).map(|f| choice_code(f)).transpose()?;
                let image_kind = inner.get(&2).map(|f| choice_code(f)).transpose()?;
                IrisImageInformation {
                    image_data_format,
                    eye_label,
                    image_kind,
                }
            },
            None => return Err(Error::MissingField { field: "image information" }),
        };

        let capture_date_time = tagged.get(&2)
            .map(|field| tagged_octets(field).map(<[u8]>::to_vec))
            .transpose()?;

        Ok(Self {
            representation_data,
            information,
            capture_date_time,
        })
    }

    fn encode(&self) -> Tlv {
        let mut information_fields = vec![
            encode_choice_code(0, self.information.image_data_format),
        ];
        if let Some(eye_label) = self.information.eye_label {
            information_fields.push(encode_choice_code(1, eye_label));
        }
        if let Some(image_kind) = self.information.image_kind {
            information_fields.push(encode_choice_code(2, image_kind));
        }

        let mut fields = vec![
            Tlv::constructed(der_util::context_tag(0, true), vec![
                Tlv::primitive(0x04u32, self.representation_data.clone()),
            ]),
            Tlv::constructed(der_util::context_tag(1, true), vec![
                Tlv::constructed(0x30u32, information_fields),
            ]),
        ];
        if let Some(capture_date_time) = &self.capture_date_time {
            fields.push(Tlv::constructed(der_util::context_tag(2, true), vec![
                Tlv::primitive(0x04u32, capture_date_time.clone()),
            ]));
        }
        Tlv::constructed(0x30u32, fields)
    }
}


/// A 39794-6 iris record: `[APPLICATION 6] SEQUENCE { versionBlock [0],
/// representationBlocks [1] }`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisRecord {
    pub version: VersionBlock,
    pub representations: Vec<IrisRepresentation>,
}
impl IrisRecord {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let record = parse_application_record(data, 6)?;
        let tagged = der_util::decode_tagged_objects(&record)
            .map_err(|_| Error::Malformed { reason: "iris record is not constructed" })?;

        let version = tagged.get(&0)
            .ok_or(Error::MissingField { field: "version block" })
            .and_then(|field| VersionBlock::decode(field))?;

        let representation_blocks = tagged.get(&1)
            .ok_or(Error::MissingField { field: "representation blocks" })
            .and_then(|field| list_or_single(field))?;
        let mut representations = Vec::with_capacity(representation_blocks.len());
        for block in representation_blocks {
            representations.push(IrisRepresentation::decode(block)?);
        }

        Ok(Self {
            version,
            representations,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let blocks: Vec<Tlv> = self.representations.iter().map(IrisRepresentation::encode).collect();
        let record = Tlv::constructed(der_util::application_tag(6, true), vec![
            self.version.encode(0),
            Tlv::constructed(der_util::context_tag(1, true), vec![
                Tlv::constructed(0x30u32, blocks),
            ]),
        ]);
        record.to_bytes()
    }
}


#[cfg(test)]
mod tests {
    use super::{IrisImageInformation, IrisRecord, IrisRepresentation, EYE_LABEL_LEFT, IMAGE_DATA_FORMAT_MONO_JPEG2000};
    use crate::iso39794::VersionBlock;

    #[test]
    fn test_round_trip() {
        let record = IrisRecord {
            version: VersionBlock { generation: 1, year: 2019 },
            representations: vec![IrisRepresentation {
                representation_data: vec![0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50],
                information: IrisImageInformation {
                    image_data_format: IMAGE_DATA_FORMAT_MONO_JPEG2000,
                    eye_label: Some(EYE_LABEL_LEFT),
                    image_kind: None,
                },
                capture_date_time: None,
            }],
        };

        let encoded = record.encode();
        assert_eq!(encoded[0], 0x66); // [APPLICATION 6], constructed

        let decoded = IrisRecord::decode(&encoded).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }
}
