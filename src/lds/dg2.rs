//! DG2: the encoded face.


use crate::cbeff::{self, BiometricDataBlock, BiometricKind, CbeffInfo};
use crate::iso19794::DecodeConfig;
use crate::lds::{Error, LdsFile, EF_DG2_TAG};


/// The DG2 file: a biometric information group of face records.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg2File {
    infos: Vec<CbeffInfo>,
}
impl Dg2File {
    pub fn new(infos: Vec<CbeffInfo>) -> Self {
        Self { infos }
    }

    /// Decodes the file with explicit configuration for the record parsers.
    pub fn from_bytes_with_config(data: &[u8], config: DecodeConfig) -> Result<Self, Error> {
        let mut reader = crate::tlv::TlvReader::new(data);
        reader.expect_tag(Self::TAG)?;
        let length = reader.read_length()?;
        let content = reader.read_value(length)?;
        let infos = cbeff::decode_bit_group(content, BiometricKind::Face, config)?;
        Ok(Self { infos })
    }

    pub fn cbeff_infos(&self) -> &[CbeffInfo] {
        &self.infos
    }

    /// All ISO 19794-5 face records in the group, in file order.
    pub fn face_records_19794(&self) -> Vec<&crate::iso19794::face::FaceRecord> {
        fn collect<'i>(infos: &'i [CbeffInfo], records: &mut Vec<&'i crate::iso19794::face::FaceRecord>) {
            for info in infos {
                match info {
                    CbeffInfo::Simple(simple) => {
                        if let BiometricDataBlock::Face19794(record) = &simple.block {
                            records.push(record);
                        }
                    },
                    CbeffInfo::Complex(nested) => collect(nested, records),
                }
            }
        }
        let mut records = Vec::new();
        collect(&self.infos, &mut records);
        records
    }

    /// All ISO 39794-5 face records in the group, in file order.
    pub fn face_records_39794(&self) -> Vec<&crate::iso39794::face::FaceRecord> {
        fn collect<'i>(infos: &'i [CbeffInfo], records: &mut Vec<&'i crate::iso39794::face::FaceRecord>) {
            for info in infos {
                match info {
                    CbeffInfo::Simple(simple) => {
                        if let BiometricDataBlock::Face39794(record) = &simple.block {
                            records.push(record);
                        }
                    },
                    CbeffInfo::Complex(nested) => collect(nested, records),
                }
            }
        }
        let mut records = Vec::new();
        collect(&self.infos, &mut records);
        records
    }
}
impl LdsFile for Dg2File {
    const TAG: u32 = EF_DG2_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        let infos = cbeff::decode_bit_group(content, BiometricKind::Face, DecodeConfig::default())?;
        Ok(Self { infos })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        output.extend(cbeff::encode_bit_group(&self.infos));
    }
}


#[cfg(test)]
mod tests {
    use super::Dg2File;
    use crate::cbeff::{BiometricDataBlock, CbeffInfo, SimpleCbeffInfo, StandardBiometricHeader};
    use crate::iso19794::face::{FaceImage, FaceRecord, IMAGE_DATA_TYPE_JPEG};
    use crate::lds::LdsFile;

    fn sample_dg2() -> Dg2File {
        Dg2File::new(vec![CbeffInfo::Simple(SimpleCbeffInfo::new(
            StandardBiometricHeader::default_face(),
            BiometricDataBlock::Face19794(FaceRecord::new(vec![FaceImage {
                gender: 1,
                eye_color: 2,
                hair_color: 1,
                feature_mask: 0,
                expression: 1,
                pose_angle: [0, 0, 0],
                pose_angle_uncertainty: [0, 0, 0],
                feature_points: Vec::new(),
                face_image_type: 1,
                image_data_type: IMAGE_DATA_TYPE_JPEG,
                width: 240,
                height: 320,
                image_color_space: 1,
                source_type: 2,
                device_type: 0,
                quality: 0,
                image_data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            }])),
        ))])
    }

    #[test]
    fn test_round_trip() {
        let dg2 = sample_dg2();
        let encoded = dg2.to_bytes();
        assert_eq!(encoded[0], 0x75);

        let decoded = Dg2File::from_bytes(&encoded).expect("decoding");
        assert_eq!(decoded, dg2);
        assert_eq!(decoded.to_bytes(), encoded);
        assert_eq!(decoded.face_records_19794().len(), 1);
    }
}
