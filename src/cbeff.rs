//! Biometric information templates per ISO/IEC 7816-11.
//!
//! DG2 through DG4 wrap their biometric records in a CBEFF structure: a
//! `7F61` biometric information group holding a count and one `7F60`
//! biometric information template per record. Each template pairs a
//! standard biometric header (`A1`, `A2`, ...) with a biometric data block:
//! primitive `5F2E` for the fixed-layout 19794 records, constructed `7F2E`
//! (with an inner `A1` wrapper) for the BER-encoded 39794 records.
//!
//! Statically protected templates (`7D`) can carry their header and data
//! block as secure-messaging data objects; only the plain form (`81`) is
//! readable, an encrypted payload (`85`) is reported as access denied.


use std::fmt;

use tracing::warn;

use crate::iso19794::{self, DecodeConfig};
use crate::iso39794;
use crate::tlv::{self, Tag, Tlv, TlvWriter, Value};


pub const BIOMETRIC_INFORMATION_GROUP_TEMPLATE_TAG: u32 = 0x7F61;
pub const BIOMETRIC_INFORMATION_TEMPLATE_TAG: u32 = 0x7F60;
pub const BIOMETRIC_INFO_COUNT_TAG: u32 = 0x02;
pub const BIOMETRIC_HEADER_TEMPLATE_BASE_TAG: u32 = 0xA1;
pub const STATICALLY_PROTECTED_TEMPLATE_TAG: u32 = 0x7D;
pub const BIOMETRIC_DATA_BLOCK_TAG: u32 = 0x5F2E;
pub const BIOMETRIC_DATA_BLOCK_CONSTRUCTED_TAG: u32 = 0x7F2E;

pub const SMT_DO_PLAIN_VALUE_TAG: u32 = 0x81;
pub const SMT_DO_CRYPTOGRAM_TAG: u32 = 0x85;
pub const SMT_DO_CHECKSUM_TAG: u32 = 0x8E;
pub const SMT_DO_SIGNATURE_TAG: u32 = 0x9E;

// standard biometric header element tags (ISO/IEC 7816-11 Annex C)
pub const PATRON_HEADER_VERSION_TAG: u32 = 0x80;
pub const BIOMETRIC_TYPE_TAG: u32 = 0x81;
pub const BIOMETRIC_SUBTYPE_TAG: u32 = 0x82;
pub const CREATION_DATE_AND_TIME_TAG: u32 = 0x83;
pub const VALIDITY_PERIOD_TAG: u32 = 0x85;
pub const CREATOR_TAG: u32 = 0x86;
pub const FORMAT_OWNER_TAG: u32 = 0x87;
pub const FORMAT_TYPE_TAG: u32 = 0x88;

pub const BIOMETRIC_TYPE_FACIAL_FEATURES: u8 = 0x02;
pub const BIOMETRIC_TYPE_FINGERPRINT: u8 = 0x08;
pub const BIOMETRIC_TYPE_IRIS: u8 = 0x10;
pub const BIOMETRIC_SUBTYPE_NONE: u8 = 0x00;

/// Format owner value of JTC 1 SC 37.
pub const JTC1_SC37_FORMAT_OWNER: u16 = 0x0101;

pub const ISO_19794_FACE_FORMAT_TYPE: u16 = 0x0008;
pub const ISO_19794_FINGER_FORMAT_TYPE: u16 = 0x0007;
pub const ISO_19794_IRIS_FORMAT_TYPE: u16 = 0x0009;


#[derive(Debug)]
pub enum Error {
    Tlv(tlv::Error),
    UnexpectedTag { expected: u32, found: u32 },
    AccessDenied,
    UnsupportedTemplate { tag: u32 },
    UnsupportedDataBlock { tag: u32 },
    Iso19794(iso19794::Error),
    Iso39794(iso39794::Error),
    Malformed { reason: &'static str },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Tlv(e)
                => write!(f, "TLV error: {}", e),
            Self::UnexpectedTag { expected, found }
                => write!(f, "expected tag 0x{:02X}, found 0x{:02X}", expected, found),
            Self::AccessDenied
                => write!(f, "access denied: the biometric information template is statically protected"),
            Self::UnsupportedTemplate { tag }
                => write!(f, "unsupported template tag 0x{:02X}", tag),
            Self::UnsupportedDataBlock { tag }
                => write!(f, "no decoder for biometric data block tag 0x{:02X}", tag),
            Self::Iso19794(e)
                => write!(f, "biometric record error: {}", e),
            Self::Iso39794(e)
                => write!(f, "biometric record error: {}", e),
            Self::Malformed { reason }
                => write!(f, "malformed biometric template: {}", reason),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tlv(e) => Some(e),
            Self::Iso19794(e) => Some(e),
            Self::Iso39794(e) => Some(e),
            _ => None,
        }
    }
}
impl From<tlv::Error> for Error {
    fn from(value: tlv::Error) -> Self { Self::Tlv(value) }
}
impl From<iso19794::Error> for Error {
    fn from(value: iso19794::Error) -> Self { Self::Iso19794(value) }
}
impl From<iso39794::Error> for Error {
    fn from(value: iso39794::Error) -> Self { Self::Iso39794(value) }
}


/// The standard biometric header: an ordered mapping from header element
/// tags to their values.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StandardBiometricHeader {
    elements: Vec<(u32, Vec<u8>)>,
}
impl StandardBiometricHeader {
    pub fn new(elements: Vec<(u32, Vec<u8>)>) -> Self {
        Self { elements }
    }

    pub fn get(&self, tag: u32) -> Option<&[u8]> {
        self.elements.iter()
            .find(|(element_tag, _)| *element_tag == tag)
            .map(|(_, value)| value.as_slice())
    }

    pub fn elements(&self) -> &[(u32, Vec<u8>)] {
        &self.elements
    }

    fn default_19794(biometric_type: u8, format_type: u16) -> Self {
        Self {
            elements: vec![
                (BIOMETRIC_TYPE_TAG, vec![biometric_type]),
                (BIOMETRIC_SUBTYPE_TAG, vec![BIOMETRIC_SUBTYPE_NONE]),
                (FORMAT_OWNER_TAG, JTC1_SC37_FORMAT_OWNER.to_be_bytes().to_vec()),
                (FORMAT_TYPE_TAG, format_type.to_be_bytes().to_vec()),
            ],
        }
    }

    /// The default header for an ISO 19794-5 facial record.
    pub fn default_face() -> Self {
        Self::default_19794(BIOMETRIC_TYPE_FACIAL_FEATURES, ISO_19794_FACE_FORMAT_TYPE)
    }

    /// The default header for an ISO 19794-4 finger record.
    pub fn default_finger() -> Self {
        Self::default_19794(BIOMETRIC_TYPE_FINGERPRINT, ISO_19794_FINGER_FORMAT_TYPE)
    }

    /// The default header for an ISO 19794-6 iris record.
    pub fn default_iris() -> Self {
        Self::default_19794(BIOMETRIC_TYPE_IRIS, ISO_19794_IRIS_FORMAT_TYPE)
    }
}


/// Which biometric a data group carries; selects the record decoder.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BiometricKind {
    Face,
    Finger,
    Iris,
}


/// A decoded biometric data block.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BiometricDataBlock {
    Face19794(iso19794::face::FaceRecord),
    Finger19794(iso19794::finger::FingerRecord),
    Iris19794(iso19794::iris::IrisRecord),
    Face39794(iso39794::face::FaceRecord),
    Finger39794(iso39794::finger::FingerRecord),
    Iris39794(iso39794::iris::IrisRecord),
}
impl BiometricDataBlock {
    fn decode(tag: Tag, data_block: &Tlv, kind: BiometricKind, config: DecodeConfig) -> Result<Self, Error> {
        match tag.value() {
            BIOMETRIC_DATA_BLOCK_TAG => {
                let record_bytes = data_block.primitive_value()
                    .ok_or(Error::Malformed { reason: "primitive data block is constructed" })?;
                match kind {
                    BiometricKind::Face
                        => Ok(Self::Face19794(iso19794::face::FaceRecord::decode(record_bytes, config)?)),
                    BiometricKind::Finger
                        => Ok(Self::Finger19794(iso19794::finger::FingerRecord::decode(record_bytes, config)?)),
                    BiometricKind::Iris
                        => Ok(Self::Iris19794(iso19794::iris::IrisRecord::decode(record_bytes, config)?)),
                }
            },
            BIOMETRIC_DATA_BLOCK_CONSTRUCTED_TAG => {
                // the constructed block nests the BER record under an A1 wrapper
                let children = data_block.children()
                    .ok_or(Error::Malformed { reason: "constructed data block is primitive" })?;
                let record_bytes = match children {
                    [wrapper] if wrapper.tag == BIOMETRIC_HEADER_TEMPLATE_BASE_TAG => {
                        match &wrapper.value {
                            Value::Constructed(inner) => match inner.as_slice() {
                                [record] => record.to_bytes(),
                                _ => return Err(Error::Malformed { reason: "A1 wrapper holds no single record" }),
                            },
                            Value::Primitive(bytes) => bytes.clone(),
                        }
                    },
                    [record] => {
                        warn!("expected tag A1 under constructed data block, found {}", record.tag);
                        record.to_bytes()
                    },
                    _ => return Err(Error::Malformed { reason: "constructed data block holds no single record" }),
                };
                match kind {
                    BiometricKind::Face
                        => Ok(Self::Face39794(iso39794::face::FaceRecord::decode(&record_bytes)?)),
                    BiometricKind::Finger
                        => Ok(Self::Finger39794(iso39794::finger::FingerRecord::decode(&record_bytes)?)),
                    BiometricKind::Iris
                        => Ok(Self::Iris39794(iso39794::iris::IrisRecord::decode(&record_bytes)?)),
                }
            },
            other => Err(Error::UnsupportedDataBlock { tag: other }),
        }
    }

    /// Encodes the record and names the data block tag carrying it.
    fn encode(&self) -> (u32, Vec<u8>) {
        match self {
            Self::Face19794(record) => (BIOMETRIC_DATA_BLOCK_TAG, record.encode()),
            Self::Finger19794(record) => (BIOMETRIC_DATA_BLOCK_TAG, record.encode()),
            Self::Iris19794(record) => (BIOMETRIC_DATA_BLOCK_TAG, record.encode()),
            Self::Face39794(record) => (BIOMETRIC_DATA_BLOCK_CONSTRUCTED_TAG, record.encode()),
            Self::Finger39794(record) => (BIOMETRIC_DATA_BLOCK_CONSTRUCTED_TAG, record.encode()),
            Self::Iris39794(record) => (BIOMETRIC_DATA_BLOCK_CONSTRUCTED_TAG, record.encode()),
        }
    }

    fn is_constructed_encoding(&self) -> bool {
        matches!(self, Self::Face39794(_) | Self::Finger39794(_) | Self::Iris39794(_))
    }
}


/// A single biometric information template: header plus data block.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SimpleCbeffInfo {
    pub sbh: StandardBiometricHeader,
    pub block: BiometricDataBlock,
    /// The header template tag as found in the file, normally `A1`.
    pub header_tag: u32,
}
impl SimpleCbeffInfo {
    pub fn new(sbh: StandardBiometricHeader, block: BiometricDataBlock) -> Self {
        Self {
            sbh,
            block,
            header_tag: BIOMETRIC_HEADER_TEMPLATE_BASE_TAG,
        }
    }
}

/// A CBEFF structure: either one template or a nested group of them.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CbeffInfo {
    Simple(SimpleCbeffInfo),
    Complex(Vec<CbeffInfo>),
}


fn read_biometric_header(template: &Tlv) -> Result<StandardBiometricHeader, Error> {
    let children = template.children()
        .ok_or(Error::Malformed { reason: "header template is primitive" })?;
    let mut elements = Vec::with_capacity(children.len());
    for child in children {
        let value = child.primitive_value()
            .ok_or(Error::Malformed { reason: "header element is constructed" })?;
        elements.push((child.tag.value(), value.to_vec()));
    }
    Ok(StandardBiometricHeader::new(elements))
}

/// Reads one `7F60` biometric information template.
fn read_bit(template: &Tlv, kind: BiometricKind, config: DecodeConfig) -> Result<CbeffInfo, Error> {
    let children = template.children()
        .ok_or(Error::Malformed { reason: "information template is primitive" })?;

    // a statically protected template nests both data objects under 7D
    if let Some(protected) = children.first().filter(|child| child.tag == STATICALLY_PROTECTED_TEMPLATE_TAG) {
        return read_statically_protected_bit(protected, kind, config);
    }

    let [header, data_block] = children else {
        return Err(Error::Malformed { reason: "information template must hold header and data block" });
    };
    if header.tag.value() & 0xA0 != 0xA0 {
        return Err(Error::UnsupportedTemplate { tag: header.tag.value() });
    }

    let sbh = read_biometric_header(header)?;
    let block = BiometricDataBlock::decode(data_block.tag, data_block, kind, config)?;
    Ok(CbeffInfo::Simple(SimpleCbeffInfo {
        sbh,
        block,
        header_tag: header.tag.value(),
    }))
}

/// Decodes a secure-messaging data object of a statically protected
/// template. Only plain values are readable.
fn smt_value(data_object: &Tlv) -> Result<Option<&[u8]>, Error> {
    match data_object.tag.value() {
        SMT_DO_PLAIN_VALUE_TAG => {
            let value = data_object.primitive_value()
                .ok_or(Error::Malformed { reason: "plain secure-messaging object is constructed" })?;
            Ok(Some(value))
        },
        SMT_DO_CRYPTOGRAM_TAG => Err(Error::AccessDenied),
        SMT_DO_CHECKSUM_TAG|SMT_DO_SIGNATURE_TAG => Ok(None),
        other => {
            warn!("skipping unsupported secure-messaging data object 0x{:02X}", other);
            Ok(None)
        },
    }
}

/// A statically protected template (`7D`) carries the header template and
/// the data block as consecutive secure-messaging data objects; checksum and
/// signature objects in between are skipped.
fn read_statically_protected_bit(
    protected: &Tlv,
    kind: BiometricKind,
    config: DecodeConfig,
) -> Result<CbeffInfo, Error> {
    let data_objects = protected.children()
        .ok_or(Error::Malformed { reason: "protected template is primitive" })?;

    let mut plain_values = Vec::new();
    for data_object in data_objects {
        if let Some(value) = smt_value(data_object)? {
            plain_values.push(value);
        }
    }
    let [header_bytes, block_bytes, ..] = plain_values.as_slice() else {
        return Err(Error::Malformed { reason: "protected template lacks header or data block" });
    };

    let (header_template, _) = Tlv::parse(header_bytes)?;
    let sbh = read_biometric_header(&header_template)?;

    let (data_block, _) = Tlv::parse(block_bytes)?;
    let block = BiometricDataBlock::decode(data_block.tag, &data_block, kind, config)?;

    Ok(CbeffInfo::Simple(SimpleCbeffInfo {
        sbh,
        block,
        header_tag: BIOMETRIC_HEADER_TEMPLATE_BASE_TAG,
    }))
}

/// Reads a `7F61` biometric information group.
pub fn decode_bit_group(data: &[u8], kind: BiometricKind, config: DecodeConfig) -> Result<Vec<CbeffInfo>, Error> {
    let (group, _rest) = Tlv::parse(data)?;
    decode_bit_group_tlv(&group, kind, config)
}

fn decode_bit_group_tlv(group: &Tlv, kind: BiometricKind, config: DecodeConfig) -> Result<Vec<CbeffInfo>, Error> {
    if group.tag != BIOMETRIC_INFORMATION_GROUP_TEMPLATE_TAG {
        return Err(Error::UnexpectedTag {
            expected: BIOMETRIC_INFORMATION_GROUP_TEMPLATE_TAG,
            found: group.tag.value(),
        });
    }
    let children = group.children()
        .ok_or(Error::Malformed { reason: "information group is primitive" })?;

    let count_field = children.first()
        .filter(|child| child.tag == BIOMETRIC_INFO_COUNT_TAG)
        .ok_or(Error::Malformed { reason: "information group lacks its count" })?;
    let count_value = count_field.primitive_value()
        .ok_or(Error::Malformed { reason: "count is constructed" })?;
    if count_value.len() != 1 {
        return Err(Error::Malformed { reason: "count is not a single byte" });
    }
    let count = usize::from(count_value[0]);

    let mut infos = Vec::with_capacity(count);
    for child in children.iter().skip(1) {
        match child.tag.value() {
            BIOMETRIC_INFORMATION_TEMPLATE_TAG => infos.push(read_bit(child, kind, config)?),
            // nested groups are rare but legal
            BIOMETRIC_INFORMATION_GROUP_TEMPLATE_TAG
                => infos.push(CbeffInfo::Complex(decode_bit_group_tlv(child, kind, config)?)),
            other => {
                warn!("skipping unexpected template 0x{:02X} in information group", other);
            },
        }
    }
    if infos.len() != count {
        warn!("information group advertises {} templates, found {}", count, infos.len());
    }
    Ok(infos)
}


fn encode_bit(writer: &mut TlvWriter, info: &SimpleCbeffInfo) {
    writer.begin_constructed(BIOMETRIC_INFORMATION_TEMPLATE_TAG);

    writer.begin_constructed(info.header_tag);
    for (tag, value) in info.sbh.elements() {
        writer.write_primitive(*tag, value);
    }
    writer.end_constructed();

    let (block_tag, record_bytes) = info.block.encode();
    if info.block.is_constructed_encoding() {
        writer.begin_constructed(block_tag);
        writer.write_tag(BIOMETRIC_HEADER_TEMPLATE_BASE_TAG);
        writer.write_value(&record_bytes);
        writer.end_constructed();
    } else {
        writer.write_primitive(block_tag, &record_bytes);
    }

    writer.end_constructed();
}

fn encode_group(writer: &mut TlvWriter, infos: &[CbeffInfo]) {
    writer.begin_constructed(BIOMETRIC_INFORMATION_GROUP_TEMPLATE_TAG);
    writer.write_primitive(BIOMETRIC_INFO_COUNT_TAG, &[infos.len() as u8]);
    for info in infos {
        match info {
            CbeffInfo::Simple(simple) => encode_bit(writer, simple),
            CbeffInfo::Complex(nested) => encode_group(writer, nested),
        }
    }
    writer.end_constructed();
}

/// Writes a `7F61` biometric information group.
pub fn encode_bit_group(infos: &[CbeffInfo]) -> Vec<u8> {
    let mut writer = TlvWriter::new();
    encode_group(&mut writer, infos);
    writer.into_bytes()
}


#[cfg(test)]
mod tests {
    use super::{
        decode_bit_group, encode_bit_group, BiometricDataBlock, BiometricKind, CbeffInfo,
        Error, SimpleCbeffInfo, StandardBiometricHeader,
    };
    use crate::iso19794::face::{FaceImage, FaceRecord, IMAGE_DATA_TYPE_JPEG};
    use crate::iso19794::DecodeConfig;
    use hex_literal::hex;

    fn sample_face_block() -> BiometricDataBlock {
        BiometricDataBlock::Face19794(FaceRecord::new(vec![FaceImage {
            gender: 0,
            eye_color: 0,
            hair_color: 0,
            feature_mask: 0,
            expression: 0,
            pose_angle: [0, 0, 0],
            pose_angle_uncertainty: [0, 0, 0],
            feature_points: Vec::new(),
            face_image_type: 1,
            image_data_type: IMAGE_DATA_TYPE_JPEG,
            width: 6,
            height: 8,
            image_color_space: 1,
            source_type: 2,
            device_type: 0,
            quality: 0,
            image_data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        }]))
    }

    #[test]
    fn test_round_trip() {
        let infos = vec![CbeffInfo::Simple(SimpleCbeffInfo::new(
            StandardBiometricHeader::default_face(),
            sample_face_block(),
        ))];

        let encoded = encode_bit_group(&infos);
        assert_eq!(&encoded[0..2], &hex!("7F 61"));

        let decoded = decode_bit_group(&encoded, BiometricKind::Face, DecodeConfig::default())
            .expect("decoding");
        assert_eq!(decoded, infos);
        assert_eq!(encode_bit_group(&decoded), encoded);
    }

    #[test]
    fn test_nested_group_round_trip() {
        let simple = CbeffInfo::Simple(SimpleCbeffInfo::new(
            StandardBiometricHeader::default_face(),
            sample_face_block(),
        ));
        let infos = vec![CbeffInfo::Complex(vec![simple])];

        let encoded = encode_bit_group(&infos);
        let decoded = decode_bit_group(&encoded, BiometricKind::Face, DecodeConfig::default())
            .expect("decoding");
        assert_eq!(decoded, infos);
    }

    #[test]
    fn test_encrypted_static_protection_is_denied() {
        // 7F61 { 02 01, 7F60 { 7D { 85 (cryptogram) }, 5F2E } }
        let data = hex!("
            7F 61 0F
               02 01 01
               7F 60 09
                  7D 04 85 02 AB CD
                  5F 2E 00
        ");
        let result = decode_bit_group(&data, BiometricKind::Face, DecodeConfig::default());
        assert!(matches!(result, Err(Error::AccessDenied)));
    }
}
