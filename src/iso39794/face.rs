//! The face image data block of ISO/IEC 39794-5.


use crate::der_util;
use crate::iso39794::{
    choice_code, encode_choice_code, list_or_single, parse_application_record, tagged_octets,
    Error, LandmarkBlock, PoseAngleBlock, VersionBlock,
};
use crate::tlv::Tlv;


pub const IMAGE_DATA_FORMAT_JPEG: i64 = 0;
pub const IMAGE_DATA_FORMAT_JPEG2000_LOSSY: i64 = 1;
pub const IMAGE_DATA_FORMAT_JPEG2000_LOSSLESS: i64 = 2;


/// The image-specific attributes of one face representation.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FaceImageInformation {
    /// Image data format code (JPEG, JPEG 2000, ...).
    pub image_data_format: i64,
    /// Face image kind code, if present.
    pub face_image_kind: Option<i64>,
    pub pose_angle: Option<PoseAngleBlock>,
    pub landmarks: Option<Vec<LandmarkBlock>>,
}

/// One face representation: the image blob plus its attributes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FaceRepresentation {
    pub representation_data: Vec<u8>,
    pub information: FaceImageInformation,
    /// Raw capture date/time content octets, if present.
    pub capture_date_time: Option<Vec<u8>>,
}
impl FaceRepresentation {
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
                let face_image_kind = inner.get(&1).map(|f| choice_code(f)).transpose()?;
                let pose_angle = inner.get(&2).map(|f| PoseAngleBlock::decode(f)).transpose()?;
                let landmarks = match inner.get(&3) {
                    Some(field) => {
                        let blocks = list_or_single(field)?;
                        let mut landmarks = Vec::with_capacity(blocks.len());
                        for block in blocks {
                            landmarks.push(LandmarkBlock::decode(block)?);
                        }
                        Some(landmarks)
                    },
                    None => None,
                };
                FaceImageInformation {
                    image_data_format,
                    face_image_kind,
                    pose_angle,
                    landmarks,
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
        if let Some(kind) = self.information.face_image_kind {
            information_fields.push(encode_choice_code(1, kind));
        }
        if let Some(pose_angle) = &self.information.pose_angle {
            information_fields.push(pose_angle.encode(2));
        }
        if let Some(landmarks) = &self.information.landmarks {
            let encoded: Vec<Tlv> = landmarks.iter().map(LandmarkBlock::encode).collect();
            information_fields.push(Tlv::constructed(der_util::context_tag(3, true), vec![
                Tlv::constructed(0x30u32, encoded),
            ]));
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


/// A 39794-5 face record: `[APPLICATION 5] SEQUENCE { versionBlock [0],
/// representationBlocks [1] }`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FaceRecord {
    pub version: VersionBlock,
    pub representations: Vec<FaceRepresentation>,
}
impl FaceRecord {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let record = parse_application_record(data, 5)?;
        let tagged = der_util::decode_tagged_objects(&record)
            .map_err(|_| Error::Malformed { reason: "face record is not constructed" })?;

        let version = tagged.get(&0)
            .ok_or(Error::MissingField { field: "version block" })
            .and_then(|field| VersionBlock::decode(field))?;

        let representation_blocks = tagged.get(&1)
            .ok_or(Error::MissingField { field: "representation blocks" })
            .and_then(|field| list_or_single(field))?;
        let mut representations = Vec::with_capacity(representation_blocks.len());
        for block in representation_blocks {
            representations.push(FaceRepresentation::decode(block)?);
        }

        Ok(Self {
            version,
            representations,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let blocks: Vec<Tlv> = self.representations.iter().map(FaceRepresentation::encode).collect();
        let record = Tlv::constructed(der_util::application_tag(5, true), vec![
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
    use super::{FaceImageInformation, FaceRecord, FaceRepresentation, IMAGE_DATA_FORMAT_JPEG2000_LOSSY};
    use crate::iso39794::{AngleData, LandmarkBlock, LandmarkCoordinates, PoseAngleBlock, VersionBlock};

    fn sample_record() -> FaceRecord {
        FaceRecord {
            version: VersionBlock { generation: 1, year: 2019 },
            representations: vec![FaceRepresentation {
                representation_data: vec![0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20],
                information: FaceImageInformation {
                    image_data_format: IMAGE_DATA_FORMAT_JPEG2000_LOSSY,
                    face_image_kind: Some(1),
                    pose_angle: Some(PoseAngleBlock {
                        yaw: Some(AngleData { value: 2, uncertainty: -1 }),
                        pitch: Some(AngleData { value: -1, uncertainty: 3 }),
                        roll: None,
                    }),
                    landmarks: Some(vec![
                        LandmarkBlock {
                            kind: Some(0),
                            coordinates: LandmarkCoordinates::Cartesian2dUnsignedShort { x: 144, y: 207 },
                        },
                    ]),
                },
                capture_date_time: None,
            }],
        }
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let encoded = record.encode();
        assert_eq!(encoded[0], 0x65); // [APPLICATION 5], constructed

        let decoded = FaceRecord::decode(&encoded).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn test_single_block_without_list_wrapper() {
        // representationBlocks as one bare block instead of a list
        use crate::der_util;
        use crate::tlv::Tlv;

        let record = sample_record();
        let block = super::FaceRepresentation::encode(&record.representations[0]);
        let bare = Tlv::constructed(der_util::application_tag(5, true), vec![
            record.version.encode(0),
            Tlv::constructed(der_util::context_tag(1, true), vec![block]),
        ]);

        let decoded = FaceRecord::decode(&bare.to_bytes()).expect("decoding");
        assert_eq!(decoded.representations, record.representations);
    }
}
