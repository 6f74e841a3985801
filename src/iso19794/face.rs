//! The facial record of ISO/IEC 19794-5.
//!
//! A record is a 14-byte header (`FAC\0`, `010\0`, record length, image
//! count) followed by one facial record data block per image: facial
//! information, feature points, image information and the image blob.


use tracing::warn;

use crate::iso19794::{BeReader, DecodeConfig, DecodeMode, Error};


/// Facial Record Header `'F' 'A' 'C' 0x00`.
const FORMAT_IDENTIFIER: u32 = 0x46414300;

/// Version number `'0' '1' '0' 0x00`.
const VERSION_NUMBER: u32 = 0x30313000;

/// Magic initial bytes of a JPEG 2000 signature box.
const JPEG2000_SIGNATURE_LENGTH: u32 = 0x0000000C;

const HEADER_LENGTH: usize = 14;
const FACIAL_INFORMATION_LENGTH: usize = 20;
const FEATURE_POINT_LENGTH: usize = 8;
const IMAGE_INFORMATION_LENGTH: usize = 12;

pub const IMAGE_DATA_TYPE_JPEG: u8 = 0;
pub const IMAGE_DATA_TYPE_JPEG2000: u8 = 1;

pub const GENDER_UNSPECIFIED: u8 = 0x00;
pub const EYE_COLOR_UNSPECIFIED: u8 = 0x00;
pub const HAIR_COLOR_UNSPECIFIED: u8 = 0x00;
pub const EXPRESSION_UNSPECIFIED: u16 = 0x0000;
pub const COLOR_SPACE_UNSPECIFIED: u8 = 0x00;
pub const SOURCE_TYPE_UNSPECIFIED: u8 = 0x00;


/// An anthropometric landmark in the image (ISO/IEC 19794-5 ยง 5.6).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FeaturePoint {
    pub feature_type: u8,
    /// Major and minor point code packed into one octet.
    pub feature_point: u8,
    pub x: u16,
    pub y: u16,
    pub reserved: u16,
}

/// One facial record data block: header attributes plus the image blob.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FaceImage {
    pub gender: u8,
    pub eye_color: u8,
    pub hair_color: u8,
    /// 24-bit feature mask.
    pub feature_mask: u32,
    pub expression: u16,
    /// Yaw, pitch and roll encoded per ยง 5.5.5.
    pub pose_angle: [u8; 3],
    pub pose_angle_uncertainty: [u8; 3],
    pub feature_points: Vec<FeaturePoint>,
    pub face_image_type: u8,
    /// JPEG or JPEG 2000.
    pub image_data_type: u8,
    pub width: u16,
    pub height: u16,
    pub image_color_space: u8,
    pub source_type: u8,
    pub device_type: u16,
    pub quality: u16,
    pub image_data: Vec<u8>,
}
impl FaceImage {
    /// The length of this facial record data block in bytes.
    pub fn record_length(&self) -> usize {
        FACIAL_INFORMATION_LENGTH
            + FEATURE_POINT_LENGTH * self.feature_points.len()
            + IMAGE_INFORMATION_LENGTH
            + self.image_data.len()
    }

    fn read(reader: &mut BeReader) -> Result<Self, Error> {
        // Facial Information (20)
        let block_length = reader.read_u32()? as usize;
        let feature_point_count = reader.read_u16()? as usize;
        let gender = reader.read_u8()?;
        let eye_color = reader.read_u8()?;
        let hair_color = reader.read_u8()?;
        let feature_mask_bytes = reader.read_bytes(3)?;
        let feature_mask = (u32::from(feature_mask_bytes[0]) << 16)
            | (u32::from(feature_mask_bytes[1]) << 8)
            | u32::from(feature_mask_bytes[2]);
        let expression = reader.read_u16()?;
        let pose_angle_slice = reader.read_bytes(3)?;
        let pose_angle = [pose_angle_slice[0], pose_angle_slice[1], pose_angle_slice[2]];
        let uncertainty_slice = reader.read_bytes(3)?;
        let pose_angle_uncertainty = [uncertainty_slice[0], uncertainty_slice[1], uncertainty_slice[2]];

        // Feature Points (8 each)
        let mut feature_points = Vec::with_capacity(feature_point_count);
        for _ in 0..feature_point_count {
            feature_points.push(FeaturePoint {
                feature_type: reader.read_u8()?,
                feature_point: reader.read_u8()?,
                x: reader.read_u16()?,
                y: reader.read_u16()?,
                reserved: reader.read_u16()?,
            });
        }

        // Image Information (12)
        let face_image_type = reader.read_u8()?;
        let image_data_type = reader.read_u8()?;
        let width = reader.read_u16()?;
        let height = reader.read_u16()?;
        let image_color_space = reader.read_u8()?;
        let source_type = reader.read_u8()?;
        let device_type = reader.read_u16()?;
        let quality = reader.read_u16()?;

        let fixed_length = FACIAL_INFORMATION_LENGTH
            + FEATURE_POINT_LENGTH * feature_point_count
            + IMAGE_INFORMATION_LENGTH;
        let image_length = (block_length as usize).checked_sub(fixed_length)
            .ok_or(Error::Malformed { reason: "facial record data block length too small" })?;
        let image_data = reader.read_bytes(image_length)?.to_vec();

        Ok(Self {
            gender,
            eye_color,
            hair_color,
            feature_mask,
            expression,
            pose_angle,
            pose_angle_uncertainty,
            feature_points,
            face_image_type,
            image_data_type,
            width,
            height,
            image_color_space,
            source_type,
            device_type,
            quality,
            image_data,
        })
    }

    fn write(&self, output: &mut Vec<u8>) {
        output.extend((self.record_length() as u32).to_be_bytes());
        output.extend((self.feature_points.len() as u16).to_be_bytes());
        output.push(self.gender);
        output.push(self.eye_color);
        output.push(self.hair_color);
        output.extend(&self.feature_mask.to_be_bytes()[1..4]);
        output.extend(self.expression.to_be_bytes());
        output.extend(self.pose_angle);
        output.extend(self.pose_angle_uncertainty);
        for feature_point in &self.feature_points {
            output.push(feature_point.feature_type);
            output.push(feature_point.feature_point);
            output.extend(feature_point.x.to_be_bytes());
            output.extend(feature_point.y.to_be_bytes());
            output.extend(feature_point.reserved.to_be_bytes());
        }
        output.push(self.face_image_type);
        output.push(self.image_data_type);
        output.extend(self.width.to_be_bytes());
        output.extend(self.height.to_be_bytes());
        output.push(self.image_color_space);
        output.push(self.source_type);
        output.extend(self.device_type.to_be_bytes());
        output.extend(self.quality.to_be_bytes());
        output.extend(&self.image_data);
    }
}


/// A facial record: header plus one or more face images.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FaceRecord {
    pub images: Vec<FaceImage>,
}
impl FaceRecord {
    pub fn new(images: Vec<FaceImage>) -> Self {
        Self { images }
    }

    pub fn decode(data: &[u8], config: DecodeConfig) -> Result<Self, Error> {
        let mut reader = BeReader::new(data);

        let marker = reader.peek_u32()?;
        if marker != FORMAT_IDENTIFIER {
            if marker == JPEG2000_SIGNATURE_LENGTH && config.mode == DecodeMode::Permissive {
                // a bare JPEG 2000 stream where the record header should be;
                // salvage it as a single image with default attributes
                warn!("'FAC' marker expected, found a JPEG 2000 signature; assuming a single image");
                return Ok(Self::from_bare_jpeg2000(reader.rest()));
            }
            return Err(Error::MarkerMismatch { expected: "FAC", found: marker });
        }
        reader.read_u32()?;

        let version = reader.read_u32()?;
        if version != VERSION_NUMBER {
            return Err(Error::VersionMismatch { expected: "010", found: version });
        }

        let record_length = reader.read_u32()? as usize;
        let count = reader.read_u16()? as usize;

        let mut images = Vec::with_capacity(count);
        let mut constructed_length = HEADER_LENGTH;
        for _ in 0..count {
            let image = FaceImage::read(&mut reader)?;
            constructed_length += image.record_length();
            images.push(image);
        }
        if record_length != constructed_length {
            warn!(
                "facial record length {} differs from sum of blocks {}",
                record_length, constructed_length,
            );
        }

        Ok(Self { images })
    }

    /// Builds the single-image record for the bare-JPEG2000 fallback.
    fn from_bare_jpeg2000(data: &[u8]) -> Self {
        Self {
            images: vec![FaceImage {
                gender: GENDER_UNSPECIFIED,
                eye_color: EYE_COLOR_UNSPECIFIED,
                hair_color: HAIR_COLOR_UNSPECIFIED,
                feature_mask: 0,
                expression: EXPRESSION_UNSPECIFIED,
                pose_angle: [0, 0, 0],
                pose_angle_uncertainty: [0, 0, 0],
                feature_points: Vec::new(),
                face_image_type: 0,
                image_data_type: IMAGE_DATA_TYPE_JPEG2000,
                width: 0,
                height: 0,
                image_color_space: COLOR_SPACE_UNSPECIFIED,
                source_type: SOURCE_TYPE_UNSPECIFIED,
                device_type: 0,
                quality: 0,
                image_data: data.to_vec(),
            }],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let data_length: usize = self.images.iter().map(FaceImage::record_length).sum();
        let record_length = HEADER_LENGTH + data_length;

        let mut output = Vec::with_capacity(record_length);
        output.extend(FORMAT_IDENTIFIER.to_be_bytes());
        output.extend(VERSION_NUMBER.to_be_bytes());
        output.extend((record_length as u32).to_be_bytes());
        output.extend((self.images.len() as u16).to_be_bytes());
        for image in &self.images {
            image.write(&mut output);
        }
        output
    }
}


#[cfg(test)]
mod tests {
    use super::{FaceImage, FaceRecord, IMAGE_DATA_TYPE_JPEG};
    use crate::iso19794::{DecodeConfig, DecodeMode};

    fn sample_image() -> FaceImage {
        FaceImage {
            gender: 0x01,
            eye_color: 0x02,
            hair_color: 0x03,
            feature_mask: 0x000001,
            expression: 0x0001,
            pose_angle: [0x01, 0x02, 0x03],
            pose_angle_uncertainty: [0x04, 0x05, 0x06],
            feature_points: vec![
                super::FeaturePoint {
                    feature_type: 0x01,
                    feature_point: 0x21,
                    x: 120,
                    y: 260,
                    reserved: 0,
                },
            ],
            face_image_type: 0x01,
            image_data_type: IMAGE_DATA_TYPE_JPEG,
            width: 240,
            height: 320,
            image_color_space: 0x01,
            source_type: 0x02,
            device_type: 0x0000,
            quality: 0x0000,
            image_data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x13, 0x37],
        }
    }

    #[test]
    fn test_round_trip() {
        let record = FaceRecord::new(vec![sample_image()]);
        let encoded = record.encode();

        let decoded = FaceRecord::decode(&encoded, DecodeConfig::default()).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn test_bare_jpeg2000_fallback() {
        // a JPEG 2000 signature box instead of a facial record header
        let data = [
            0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20,
            0x0D, 0x0A, 0x87, 0x0A, 0x55, 0x66,
        ];

        let record = FaceRecord::decode(&data, DecodeConfig::default()).expect("permissive decoding");
        assert_eq!(record.images.len(), 1);
        assert_eq!(record.images[0].image_data, data);
        assert_eq!(record.images[0].image_data_type, super::IMAGE_DATA_TYPE_JPEG2000);

        let strict = DecodeConfig { mode: DecodeMode::Strict, ..DecodeConfig::default() };
        assert!(FaceRecord::decode(&data, strict).is_err());
    }
}
