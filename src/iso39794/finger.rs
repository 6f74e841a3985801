//! The finger image data block of ISO/IEC 39794-4.


use crate::der_util;
use crate::iso39794::{
    choice_code, encode_choice_code, list_or_single, parse_application_record, tagged_octets,
    Error, VersionBlock,
};
use crate::tlv::Tlv;


pub const IMAGE_DATA_FORMAT_WSQ: i64 = 0;
pub const IMAGE_DATA_FORMAT_JPEG2000_LOSSY: i64 = 1;
pub const IMAGE_DATA_FORMAT_JPEG2000_LOSSLESS: i64 = 2;
pub const IMAGE_DATA_FORMAT_PNG: i64 = 3;


/// The image-specific attributes of one finger representation.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerImageInformation {
    /// Image data format code (WSQ, JPEG 2000, ...).
    pub image_data_format: i64,
    /// Finger/palm position code, if present.
    pub finger_position: Option<i64>,
    /// Quality score; `-1` marks a failure to assess.
    pub quality: Option<i64>,
}

/// One finger representation: the image blob plus its attributes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerRepresentation {
    pub representation_data: Vec<u8>,
    pub information: FingerImageInformation,
    /// Raw capture date/time content octets, if present.
    pub capture_date_time: Option<Vec<u8>>,
}
impl FingerRepresentation {
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
                let finger_position = inner.get(&1).map(|f| choice_code(f)).transpose()?;
                // ScoreOrError: an error arm decodes to the failure marker
                let quality = match inner.get(&2) {
                    Some(f) => Some(choice_code(f).unwrap_or(-1)),
                    None => None,
                };
                FingerImageInformation {
                    image_data_format,
                    finger_position,
                    quality,
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
        if let Some(position) = self.information.finger_position {
            information_fields.push(encode_choice_code(1, position));
        }
        if let Some(quality) = self.information.quality {
            if quality >= 0 {
                information_fields.push(encode_choice_code(2, quality));
            }
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


/// A 39794-4 finger record: `[APPLICATION 4] SEQUENCE { versionBlock [0],
/// representationBlocks [1] }`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerRecord {
    pub version: VersionBlock,
    pub representations: Vec<FingerRepresentation>,
}
impl FingerRecord {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let record = parse_application_record(data, 4)?;
        let tagged = der_util::decode_tagged_objects(&record)
            .map_err(|_| Error::Malformed { reason: "finger record is not constructed" })?;

        let version = tagged.get(&0)
            .ok_or(Error::MissingField { field: "version block" })
            .and_then(|field| VersionBlock::decode(field))?;

        let representation_blocks = tagged.get(&1)
            .ok_or(Error::MissingField { field: "representation blocks" })
            .and_then(|field| list_or_single(field))?;
        let mut representations = Vec::with_capacity(representation_blocks.len());
        for block in representation_blocks {
            representations.push(FingerRepresentation::decode(block)?);
        }

        Ok(Self {
            version,
            representations,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let blocks: Vec<Tlv> = self.representations.iter().map(FingerRepresentation::encode).collect();
        let record = Tlv::constructed(der_util::application_tag(4, true), vec![
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
    use super::{FingerImageInformation, FingerRecord, FingerRepresentation, IMAGE_DATA_FORMAT_WSQ};
    use crate::iso39794::VersionBlock;

    #[test]
    fn test_round_trip() {
        let record = FingerRecord {
            version: VersionBlock { generation: 1, year: 2019 },
            representations: vec![
                FingerRepresentation {
                    representation_data: vec![0xFF, 0xA0, 0xFF, 0xA8],
                    information: FingerImageInformation {
                        image_data_format: IMAGE_DATA_FORMAT_WSQ,
                        finger_position: Some(2),
                        quality: Some(86),
                    },
                    capture_date_time: None,
                },
                FingerRepresentation {
                    representation_data: vec![0xFF, 0xA0, 0xFF, 0xA9],
                    information: FingerImageInformation {
                        image_data_format: IMAGE_DATA_FORMAT_WSQ,
                        finger_position: Some(7),
                        quality: None,
                    },
                    capture_date_time: Some(b"20190702120000Z".to_vec()),
                },
            ],
        };

        let encoded = record.encode();
        assert_eq!(encoded[0], 0x64); // [APPLICATION 4], constructed

        let decoded = FingerRecord::decode(&encoded).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }
}
