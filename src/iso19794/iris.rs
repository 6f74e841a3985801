//! The iris image record of ISO/IEC 19794-6.
//!
//! A record is a 45-byte header (`IIR\0`, `010\0`, record length, capture
//! attributes, a packed image-properties bitfield and the device unique
//! identifier) followed by one biometric subtype block per eye, each holding
//! its image blocks.


use tracing::warn;

use crate::iso19794::{BeReader, DecodeConfig, Error, IrisAggregation};


/// Iris Record Header `'I' 'I' 'R' 0x00`.
const FORMAT_IDENTIFIER: u32 = 0x49495200;

/// Version number `'0' '1' '0' 0x00`.
const VERSION_NUMBER: u32 = 0x30313000;

const HEADER_LENGTH: usize = 45;
const SUBTYPE_HEADER_LENGTH: usize = 3;
const IMAGE_HEADER_LENGTH: usize = 11;

pub const IMAGEFORMAT_MONO_RAW: u16 = 0x0002;
pub const IMAGEFORMAT_MONO_JPEG: u16 = 0x0006;
pub const IMAGEFORMAT_MONO_JPEG_LS: u16 = 0x000A;
pub const IMAGEFORMAT_MONO_JPEG2000: u16 = 0x000E;

pub const EYE_UNDEFINED: u8 = 0x00;
pub const EYE_RIGHT: u8 = 0x01;
pub const EYE_LEFT: u8 = 0x02;


/// One iris image inside a biometric subtype block.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisImage {
    pub image_number: u16,
    pub quality: u8,
    pub rotation_angle: u16,
    pub rotation_angle_uncertainty: u16,
    pub image_data: Vec<u8>,
}
impl IrisImage {
    pub fn record_length(&self) -> usize {
        IMAGE_HEADER_LENGTH + self.image_data.len()
    }

    fn read(reader: &mut BeReader) -> Result<Self, Error> {
        let image_number = reader.read_u16()?;
        let quality = reader.read_u8()?;
        let rotation_angle = reader.read_u16()?;
        let rotation_angle_uncertainty = reader.read_u16()?;
        let image_length = reader.read_u32()? as usize;
        let image_data = reader.read_bytes(image_length)?.to_vec();
        Ok(Self {
            image_number,
            quality,
            rotation_angle,
            rotation_angle_uncertainty,
            image_data,
        })
    }

    fn write(&self, output: &mut Vec<u8>) {
        output.extend(self.image_number.to_be_bytes());
        output.push(self.quality);
        output.extend(self.rotation_angle.to_be_bytes());
        output.extend(self.rotation_angle_uncertainty.to_be_bytes());
        output.extend((self.image_data.len() as u32).to_be_bytes());
        output.extend(&self.image_data);
    }
}


/// A biometric subtype (eye) block wrapping its iris images.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisBiometricSubtype {
    /// [`EYE_UNDEFINED`], [`EYE_RIGHT`] or [`EYE_LEFT`].
    pub biometric_subtype: u8,
    pub images: Vec<IrisImage>,
}
impl IrisBiometricSubtype {
    pub fn record_length(&self) -> usize {
        SUBTYPE_HEADER_LENGTH + self.images.iter().map(IrisImage::record_length).sum::<usize>()
    }

    fn read(reader: &mut BeReader) -> Result<Self, Error> {
        let biometric_subtype = reader.read_u8()?;
        let count = reader.read_u16()? as usize;
        let mut images = Vec::with_capacity(count);
        for _ in 0..count {
            images.push(IrisImage::read(reader)?);
        }
        Ok(Self {
            biometric_subtype,
            images,
        })
    }

    fn write(&self, output: &mut Vec<u8>) {
        output.push(self.biometric_subtype);
        output.extend((self.images.len() as u16).to_be_bytes());
        for image in &self.images {
            image.write(output);
        }
    }
}


/// An iris record: 45-byte header plus one subtype block per eye.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IrisRecord {
    pub capture_device_id: u16,
    pub horizontal_orientation: u8,
    pub vertical_orientation: u8,
    pub scan_type: u8,
    pub iris_occlusion: u8,
    pub occlusion_filling: u8,
    pub boundary_extraction: u8,
    pub iris_diameter: u16,
    pub image_format: u16,
    pub raw_image_width: u16,
    pub raw_image_height: u16,
    pub intensity_depth: u8,
    pub image_transformation: u8,
    /// Sixteen bytes starting with `D` (serial number), `M` (MAC address) or
    /// `P` (processor id), or all zeroes when absent.
    pub device_unique_id: [u8; 16],
    pub subtypes: Vec<IrisBiometricSubtype>,
}
impl IrisRecord {
    pub fn decode(data: &[u8], _config: DecodeConfig) -> Result<Self, Error> {
        let mut reader = BeReader::new(data);

        let marker = reader.read_u32()?;
        if marker != FORMAT_IDENTIFIER {
            return Err(Error::MarkerMismatch { expected: "IIR", found: marker });
        }
        let version = reader.read_u32()?;
        if version != VERSION_NUMBER {
            return Err(Error::VersionMismatch { expected: "010", found: version });
        }

        let record_length = reader.read_u32()? as usize;
        let capture_device_id = reader.read_u16()?;
        let count = reader.read_u8()? as usize;

        let record_header_length = reader.read_u16()?;
        if usize::from(record_header_length) != HEADER_LENGTH {
            return Err(Error::HeaderLength { expected: HEADER_LENGTH as u16, found: record_header_length });
        }

        /*
         *  16 15 14 13 12 11 10  9  8  7  6  5  4  3  2  1
         * [  |  |  |  |  |  |  |  |  |  |  |  |  |  |  |  ]
         *                                             1  1  = 0x0003 horizontalOrientation (>> 0)
         *                                       1  1  0  0  = 0x000C verticalOrientation (>> 2)
         *                              1  1  1  0  0  0  0  = 0x0070 scanType (>> 4)
         *                           1  0  0  0  0  0  0  0  = 0x0080 irisOcclusion (>> 7)
         *                        1  0  0  0  0  0  0  0  0  = 0x0100 occlusionFilling (>> 8)
         *                     1  0  0  0  0  0  0  0  0  0  = 0x0200 boundaryExtraction (>> 9)
         */
        let image_properties = reader.read_u16()?;
        let horizontal_orientation = (image_properties & 0x0003) as u8;
        let vertical_orientation = ((image_properties & 0x000C) >> 2) as u8;
        let scan_type = ((image_properties & 0x0070) >> 4) as u8;
        let iris_occlusion = ((image_properties & 0x0080) >> 7) as u8;
        let occlusion_filling = ((image_properties & 0x0100) >> 8) as u8;
        let boundary_extraction = ((image_properties & 0x0200) >> 9) as u8;

        let iris_diameter = reader.read_u16()?;
        let image_format = reader.read_u16()?;
        let raw_image_width = reader.read_u16()?;
        let raw_image_height = reader.read_u16()?;
        let intensity_depth = reader.read_u8()?;
        let image_transformation = reader.read_u8()?;
        let mut device_unique_id = [0u8; 16];
        device_unique_id.copy_from_slice(reader.read_bytes(16)?);

        let mut subtypes = Vec::with_capacity(count);
        let mut constructed_length = HEADER_LENGTH;
        for _ in 0..count {
            let subtype = IrisBiometricSubtype::read(&mut reader)?;
            constructed_length += subtype.record_length();
            subtypes.push(subtype);
        }
        if record_length != constructed_length {
            warn!(
                "iris record length {} differs from sum of blocks {}",
                record_length, constructed_length,
            );
        }

        Ok(Self {
            capture_device_id,
            horizontal_orientation,
            vertical_orientation,
            scan_type,
            iris_occlusion,
            occlusion_filling,
            boundary_extraction,
            iris_diameter,
            image_format,
            raw_image_width,
            raw_image_height,
            intensity_depth,
            image_transformation,
            device_unique_id,
            subtypes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let data_length: usize = self.subtypes.iter().map(IrisBiometricSubtype::record_length).sum();
        let record_length = HEADER_LENGTH + data_length;

        let mut output = Vec::with_capacity(record_length);
        output.extend(FORMAT_IDENTIFIER.to_be_bytes());
        output.extend(VERSION_NUMBER.to_be_bytes());
        output.extend((record_length as u32).to_be_bytes());
        output.extend(self.capture_device_id.to_be_bytes());
        output.push(self.subtypes.len() as u8);
        output.extend((HEADER_LENGTH as u16).to_be_bytes());

        let mut image_properties: u16 = 0;
        image_properties |= u16::from(self.horizontal_orientation) & 0x0003;
        image_properties |= (u16::from(self.vertical_orientation) << 2) & 0x000C;
        image_properties |= (u16::from(self.scan_type) << 4) & 0x0070;
        image_properties |= (u16::from(self.iris_occlusion) << 7) & 0x0080;
        image_properties |= (u16::from(self.occlusion_filling) << 8) & 0x0100;
        image_properties |= (u16::from(self.boundary_extraction) << 9) & 0x0200;
        output.extend(image_properties.to_be_bytes());

        output.extend(self.iris_diameter.to_be_bytes());
        output.extend(self.image_format.to_be_bytes());
        output.extend(self.raw_image_width.to_be_bytes());
        output.extend(self.raw_image_height.to_be_bytes());
        output.push(self.intensity_depth);
        output.push(self.image_transformation);
        output.extend(self.device_unique_id);
        for subtype in &self.subtypes {
            subtype.write(&mut output);
        }
        output
    }

    /// Aggregates the biometric subtype over all subtype blocks.
    ///
    /// The historical reader behaviour is a bitwise AND across the codes
    /// ([`IrisAggregation::Intersection`]): one block reporting
    /// [`EYE_UNDEFINED`] zeroes the whole result. The union is available as
    /// an alternative.
    pub fn biometric_subtype(&self, aggregation: IrisAggregation) -> u8 {
        match aggregation {
            IrisAggregation::Intersection => {
                self.subtypes.iter()
                    .map(|subtype| subtype.biometric_subtype)
                    .fold(0xFF, |accumulated, code| accumulated & code)
            },
            IrisAggregation::Union => {
                self.subtypes.iter()
                    .map(|subtype| subtype.biometric_subtype)
                    .fold(0x00, |accumulated, code| accumulated | code)
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{IrisBiometricSubtype, IrisImage, IrisRecord, EYE_LEFT, EYE_RIGHT, EYE_UNDEFINED, IMAGEFORMAT_MONO_JPEG};
    use crate::iso19794::{DecodeConfig, IrisAggregation};

    fn sample_record() -> IrisRecord {
        IrisRecord {
            capture_device_id: 0x0102,
            horizontal_orientation: 1,
            vertical_orientation: 1,
            scan_type: 2,
            iris_occlusion: 0,
            occlusion_filling: 0,
            boundary_extraction: 0,
            iris_diameter: 170,
            image_format: IMAGEFORMAT_MONO_JPEG,
            raw_image_width: 640,
            raw_image_height: 480,
            intensity_depth: 8,
            image_transformation: 0,
            device_unique_id: *b"D004571A29384756",
            subtypes: vec![
                IrisBiometricSubtype {
                    biometric_subtype: EYE_RIGHT,
                    images: vec![IrisImage {
                        image_number: 1,
                        quality: 90,
                        rotation_angle: 0,
                        rotation_angle_uncertainty: 0,
                        image_data: vec![0xC5; 40],
                    }],
                },
                IrisBiometricSubtype {
                    biometric_subtype: EYE_LEFT,
                    images: vec![IrisImage {
                        image_number: 2,
                        quality: 85,
                        rotation_angle: 0,
                        rotation_angle_uncertainty: 0,
                        image_data: vec![0xC6; 36],
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let encoded = record.encode();
        let decoded = IrisRecord::decode(&encoded, DecodeConfig::default()).expect("decoding");
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn test_subtype_aggregation() {
        let record = sample_record();
        // right (0x01) AND left (0x02) collapse to none
        assert_eq!(record.biometric_subtype(IrisAggregation::Intersection), EYE_UNDEFINED);
        assert_eq!(record.biometric_subtype(IrisAggregation::Union), EYE_RIGHT | EYE_LEFT);
    }
}
