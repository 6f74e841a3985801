//! The finger image record of ISO/IEC 19794-4.
//!
//! A record is a 32-byte general header (`FIR\0`, `010\0`, six-byte record
//! length, capture attributes) followed by one finger image block per view.


use tracing::warn;

use crate::iso19794::{BeReader, DecodeConfig, Error};


/// Finger Image Record Header `'F' 'I' 'R' 0x00`.
const FORMAT_IDENTIFIER: u32 = 0x46495200;

/// Version number `'0' '1' '0' 0x00`.
const VERSION_NUMBER: u32 = 0x30313000;

const GENERAL_HEADER_LENGTH: usize = 32;
const IMAGE_HEADER_LENGTH: usize = 14;

pub const COMPRESSION_UNCOMPRESSED_NO_BIT_PACKING: u8 = 0;
pub const COMPRESSION_WSQ: u8 = 2;
pub const COMPRESSION_JPEG: u8 = 3;
pub const COMPRESSION_JPEG2000: u8 = 4;
pub const COMPRESSION_PNG: u8 = 5;


/// One finger image block.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerImage {
    pub position: u8,
    pub view_count: u8,
    pub view_number: u8,
    pub quality: u8,
    pub impression_type: u8,
    pub horizontal_line_length: u16,
    pub vertical_line_length: u16,
    pub reserved: u8,
    pub image_data: Vec<u8>,
}
impl FingerImage {
    /// The length of this finger image block in bytes.
    pub fn record_length(&self) -> usize {
        IMAGE_HEADER_LENGTH + self.image_data.len()
    }

    fn read(reader: &mut BeReader) -> Result<Self, Error> {
        let block_length = reader.read_u32()? as usize;
        let position = reader.read_u8()?;
        let view_count = reader.read_u8()?;
        let view_number = reader.read_u8()?;
        let quality = reader.read_u8()?;
        let impression_type = reader.read_u8()?;
        let horizontal_line_length = reader.read_u16()?;
        let vertical_line_length = reader.read_u16()?;
        let reserved = reader.read_u8()?;

        let image_length = block_length.checked_sub(IMAGE_HEADER_LENGTH)
            .ok_or(Error::Malformed { reason: "finger image block length too small" })?;
        let image_data = reader.read_bytes(image_length)?.to_vec();

        Ok(Self {
            position,
            view_count,
            view_number,
            quality,
            impression_type,
            horizontal_line_length,
            vertical_line_length,
            reserved,
            image_data,
        })
    }

    fn write(&self, output: &mut Vec<u8>) {
        output.extend((self.record_length() as u32).to_be_bytes());
        output.push(self.position);
        output.push(self.view_count);
        output.push(self.view_number);
        output.push(self.quality);
        output.push(self.impression_type);
        output.extend(self.horizontal_line_length.to_be_bytes());
        output.extend(self.vertical_line_length.to_be_bytes());
        output.push(self.reserved);
        output.extend(&self.image_data);
    }
}


/// A finger image record: general header plus one block per finger view.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FingerRecord {
    pub capture_device_id: u16,
    pub acquisition_level: u16,
    pub scale_units: u8,
    pub horizontal_scan_resolution: u16,
    pub vertical_scan_resolution: u16,
    pub horizontal_image_resolution: u16,
    pub vertical_image_resolution: u16,
    pub pixel_depth: u8,
    pub compression_algorithm: u8,
    pub reserved: u16,
    pub images: Vec<FingerImage>,
}
impl FingerRecord {
    pub fn decode(data: &[u8], _config: DecodeConfig) -> Result<Self, Error> {
        let mut reader = BeReader::new(data);

        let marker = reader.read_u32()?;
        if marker != FORMAT_IDENTIFIER {
            return Err(Error::MarkerMismatch { expected: "FIR", found: marker });
        }
        let version = reader.read_u32()?;
        if version != VERSION_NUMBER {
            return Err(Error::VersionMismatch { expected: "010", found: version });
        }

        // six-byte record length
        let record_length_high = reader.read_u32()? as u64;
        let record_length_low = reader.read_u16()? as u64;
        let record_length = ((record_length_high << 16) | record_length_low) as usize;

        let capture_device_id = reader.read_u16()?;
        let acquisition_level = reader.read_u16()?;
        let count = reader.read_u8()? as usize;
        let scale_units = reader.read_u8()?;
        let horizontal_scan_resolution = reader.read_u16()?;
        let vertical_scan_resolution = reader.read_u16()?;
        let horizontal_image_resolution = reader.read_u16()?;
        let vertical_image_resolution = reader.read_u16()?;
        let pixel_depth = reader.read_u8()?;
        let compression_algorithm = reader.read_u8()?;
        let reserved = reader.read_u16()?;

        let mut images = Vec::with_capacity(count);
        let mut constructed_length = GENERAL_HEADER_LENGTH;
        for _ in 0..count {
            let image = FingerImage::read(&mut reader)?;
            constructed_length += image.record_length();
            images.push(image);
        }
        if record_length != constructed_length {
            warn!(
                "finger record length {} differs from sum of blocks {}",
                record_length, constructed_length,
            );
        }

        Ok(Self {
            capture_device_id,
            acquisition_level,
            scale_units,
            horizontal_scan_resolution,
            vertical_scan_resolution,
            horizontal_image_resolution,
            vertical_image_resolution,
            pixel_depth,
            compression_algorithm,
            reserved,
            images,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let data_length: usize = self.images.iter().map(FingerImage::record_length).sum();
        let record_length = (GENERAL_HEADER_LENGTH + data_length) as u64;

        let mut output = Vec::with_capacity(record_length as usize);
        output.extend(FORMAT_IDENTIFIER.to_be_bytes());
        output.extend(VERSION_NUMBER.to_be_bytes());
        output.extend(((record_length >> 16) as u32).to_be_bytes());
        output.extend(((record_length & 0xFFFF) as u16).to_be_bytes());
        output.extend(self.capture_device_id.to_be_bytes());
        output.extend(self.acquisition_level.to_be_bytes());
        output.push(self.images.len() as u8);
        output.push(self.scale_units);
        output.extend(self.horizontal_scan_resolution.to_be_bytes());
        output.extend(self.vertical_scan_resolution.to_be_bytes());
        output.extend(self.horizontal_image_resolution.to_be_bytes());
        output.extend(self.vertical_image_resolution.to_be_bytes());
        output.push(self.pixel_depth);
        output.push(self.compression_algorithm);
        output.extend(self.reserved.to_be_bytes());
        for image in &self.images {
            image.write(&mut output);
        }
        output
    }
}


#[cfg(test)]
mod tests {
    use super::{FingerImage, FingerRecord, COMPRESSION_WSQ};
    use crate::iso19794::DecodeConfig;

    #[test]
    fn test_round_trip() {
        let record = FingerRecord {
            capture_device_id: 0x0001,
            acquisition_level: 31,
            scale_units: 1,
            horizontal_scan_resolution: 197,
            vertical_scan_resolution: 197,
            horizontal_image_resolution: 197,
            vertical_image_resolution: 197,
            pixel_depth: 8,
            compression_algorithm: COMPRESSION_WSQ,
            reserved: 0,
            images: vec![
                FingerImage {
                    position: 1, // right thumb
                    view_count: 1,
                    view_number: 1,
                    quality: 80,
                    impression_type: 0,
                    horizontal_line_length: 256,
                    vertical_line_length: 360,
                    reserved: 0,
                    image_data: vec![0xAA; 48],
                },
                FingerImage {
                    position: 6, // left index finger
                    view_count: 1,
                    view_number: 1,
                    quality: 75,
                    impression_type: 0,
                    horizontal_line_length: 256,
                    vertical_line_length: 360,
                    reserved: 0,
                    image_data: vec![0xBB; 32],
                },
            ],
        };

        let encoded = record.encode();
        let decoded = FingerRecord::decode(&encoded, DecodeConfig::default()).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }
}
