//! BER-encoded biometric records from the ISO/IEC 39794 family.
//!
//! Second-generation biometric data blocks: face (39794-5, `[APPLICATION 5]`),
//! finger (39794-4, `[APPLICATION 4]`) and iris (39794-6, `[APPLICATION 6]`),
//! carried in the constructed `7F2E` data block of DG2 through DG4.
//!
//! Two schema conventions recur throughout and are implemented here once:
//!
//! * "list or single": a field declared as a list may be encoded as a
//!   sequence of sequences or as one bare sequence;
//! * enumerated codes are a `CHOICE` between an explicit code `[0]` and an
//!   extension block `[1]`; when only the extension arm is present, its
//!   first integer is taken as the code.


pub mod face;
pub mod finger;
pub mod iris;


use std::fmt;

use crate::der_util;
use crate::tlv::{self, Tlv, TlvReader, Value};


#[derive(Debug)]
pub enum Error {
    Tlv(tlv::Error),
    UnexpectedTag { expected: u32, found: u32 },
    MissingField { field: &'static str },
    Malformed { reason: &'static str },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Tlv(e)
                => write!(f, "TLV error: {}", e),
            Self::UnexpectedTag { expected, found }
                => write!(f, "expected tag 0x{:02X}, found 0x{:02X}", expected, found),
            Self::MissingField { field }
                => write!(f, "required field {} missing", field),
            Self::Malformed { reason }
                => write!(f, "malformed record: {}", reason),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tlv(e) => Some(e),
            _ => None,
        }
    }
}
impl From<tlv::Error> for Error {
    fn from(value: tlv::Error) -> Self { Self::Tlv(value) }
}


/// Parses a record's outer `[APPLICATION n] IMPLICIT SEQUENCE`.
pub(crate) fn parse_application_record(data: &[u8], application_number: u32) -> Result<Tlv, Error> {
    let mut reader = TlvReader::new(data);
    let record = reader.read_tlv()?;
    let expected = der_util::application_tag(application_number, true);
    if record.tag != expected {
        return Err(Error::UnexpectedTag { expected: expected.value(), found: record.tag.value() });
    }
    Ok(record)
}

/// The value of an explicitly tagged object.
pub(crate) fn explicit_value(wrapper: &Tlv) -> Result<&Tlv, Error> {
    match wrapper.children() {
        Some([child]) => Ok(child),
        _ => Err(Error::Malformed { reason: "explicitly tagged object does not hold exactly one value" }),
    }
}

/// The sequence under a tagged object, accepting both explicit tagging and
/// an implicitly tagged sequence body.
pub(crate) fn tagged_sequence(wrapper: &Tlv) -> Result<&Tlv, Error> {
    if let Some([child]) = wrapper.children() {
        if child.tag == 0x30u32 {
            return Ok(child);
        }
    }
    if wrapper.children().is_some() {
        return Ok(wrapper);
    }
    Err(Error::Malformed { reason: "tagged object holds no sequence" })
}

/// The octet string under a tagged object.
pub(crate) fn tagged_octets(wrapper: &Tlv) -> Result<&[u8], Error> {
    match &wrapper.value {
        Value::Primitive(bytes) => Ok(bytes),
        Value::Constructed(children) => match children.as_slice() {
            [child] => child.primitive_value()
                .ok_or(Error::Malformed { reason: "tagged octet string is constructed" }),
            _ => Err(Error::Malformed { reason: "tagged octet string holds several values" }),
        },
    }
}

/// Reads an integer from a tagged object.
pub(crate) fn tagged_integer(wrapper: &Tlv) -> Result<i64, Error> {
    der_util::tagged_int(wrapper)
        .map_err(|_| Error::Malformed { reason: "tagged INTEGER does not decode" })
}

/// Decodes a code from a `CHOICE { code [0], extension [1] }` with the
/// extension fallback.
pub(crate) fn choice_code(wrapper: &Tlv) -> Result<i64, Error> {
    let choice = tagged_sequence(wrapper).unwrap_or(wrapper);
    der_util::code_from_choice_with_extension_fallback(choice)
        .map_err(|_| Error::Malformed { reason: "choice does not decode" })?
        .ok_or(Error::Malformed { reason: "choice carries neither code nor extension" })
}

/// Encodes a code as the explicit arm of its `CHOICE`.
pub(crate) fn encode_choice_code(tag_number: u32, code: i64) -> Tlv {
    Tlv::constructed(der_util::context_tag(tag_number, true), vec![
        Tlv::constructed(0x30u32, vec![der_util::code_as_choice(code)]),
    ])
}

/// Decodes the "list or single" representation-block convention: either a
/// sequence of sequences, or one bare block.
pub(crate) fn list_or_single(value: &Tlv) -> Result<Vec<&Tlv>, Error> {
    let sequence = tagged_sequence(value)?;
    let children = sequence.children()
        .ok_or(Error::Malformed { reason: "representation blocks are primitive" })?;
    let is_sequence_of_sequences = !children.is_empty()
        && children.iter().all(|child| child.tag == 0x30u32);
    if is_sequence_of_sequences {
        Ok(children.iter().collect())
    } else {
        Ok(vec![sequence])
    }
}


/// The format version block every 39794 record starts with.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VersionBlock {
    pub generation: i64,
    pub year: i64,
}
impl VersionBlock {
    pub(crate) fn decode(wrapper: &Tlv) -> Result<Self, Error> {
        let sequence = tagged_sequence(wrapper)?;
        let tagged = der_util::decode_tagged_objects(sequence)
            .map_err(|_| Error::Malformed { reason: "version block is not constructed" })?;
        let generation = tagged.get(&0)
            .ok_or(Error::MissingField { field: "version generation" })
            .and_then(|field| tagged_integer(field))?;
        let year = tagged.get(&1)
            .ok_or(Error::MissingField { field: "version year" })
            .and_then(|field| tagged_integer(field))?;
        Ok(Self { generation, year })
    }

    pub(crate) fn encode(&self, tag_number: u32) -> Tlv {
        Tlv::constructed(der_util::context_tag(tag_number, true), vec![
            Tlv::constructed(0x30u32, vec![
                Tlv::primitive(der_util::context_tag(0, false), der_util::int_to_der_bytes(self.generation)),
                Tlv::primitive(der_util::context_tag(1, false), der_util::int_to_der_bytes(self.year)),
            ]),
        ])
    }
}


/// An angle with an optional uncertainty.
///
/// A missing uncertainty decodes to `-1` and is omitted again on encode.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AngleData {
    /// INTEGER (-180..180).
    pub value: i64,
    /// INTEGER (0..180), `-1` when absent.
    pub uncertainty: i64,
}
impl AngleData {
    pub(crate) fn decode(wrapper: &Tlv) -> Result<Self, Error> {
        let sequence = tagged_sequence(wrapper)?;
        let tagged = der_util::decode_tagged_objects(sequence)
            .map_err(|_| Error::Malformed { reason: "angle block is not constructed" })?;
        let value = tagged.get(&0)
            .ok_or(Error::MissingField { field: "angle value" })
            .and_then(|field| tagged_integer(field))?;
        let uncertainty = match tagged.get(&1) {
            Some(field) => tagged_integer(field)?,
            None => -1,
        };
        Ok(Self { value, uncertainty })
    }

    pub(crate) fn encode(&self, tag_number: u32) -> Tlv {
        let mut fields = vec![
            Tlv::primitive(der_util::context_tag(0, false), der_util::int_to_der_bytes(self.value)),
        ];
        if self.uncertainty >= 0 {
            fields.push(Tlv::primitive(der_util::context_tag(1, false), der_util::int_to_der_bytes(self.uncertainty)));
        }
        Tlv::constructed(der_util::context_tag(tag_number, true), vec![
            Tlv::constructed(0x30u32, fields),
        ])
    }
}


/// The yaw/pitch/roll pose of a face, each angle optional.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PoseAngleBlock {
    pub yaw: Option<AngleData>,
    pub pitch: Option<AngleData>,
    pub roll: Option<AngleData>,
}
impl PoseAngleBlock {
    pub(crate) fn decode(wrapper: &Tlv) -> Result<Self, Error> {
        let sequence = tagged_sequence(wrapper)?;
        let tagged = der_util::decode_tagged_objects(sequence)
            .map_err(|_| Error::Malformed { reason: "pose angle block is not constructed" })?;
        let yaw = tagged.get(&0).map(|field| AngleData::decode(field)).transpose()?;
        let pitch = tagged.get(&1).map(|field| AngleData::decode(field)).transpose()?;
        let roll = tagged.get(&2).map(|field| AngleData::decode(field)).transpose()?;
        Ok(Self { yaw, pitch, roll })
    }

    pub(crate) fn encode(&self, tag_number: u32) -> Tlv {
        let mut fields = Vec::new();
        if let Some(yaw) = &self.yaw {
            fields.push(yaw.encode(0));
        }
        if let Some(pitch) = &self.pitch {
            fields.push(pitch.encode(1));
        }
        if let Some(roll) = &self.roll {
            fields.push(roll.encode(2));
        }
        Tlv::constructed(der_util::context_tag(tag_number, true), vec![
            Tlv::constructed(0x30u32, fields),
        ])
    }
}


/// The coordinate variants a landmark may use; the choice tag selects the
/// shape.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LandmarkCoordinates {
    /// `[0]`: two signed integers.
    Cartesian2dSignedInt { x: i64, y: i64 },
    /// `[1]`: two unsigned shorts.
    Cartesian2dUnsignedShort { x: u16, y: u16 },
    /// `[2]`: three unsigned shorts.
    Cartesian3dUnsignedShort { x: u16, y: u16, z: u16 },
    /// `[3]`: texture image coordinates.
    TextureImage { u: i64, v: i64 },
}
impl LandmarkCoordinates {
    pub(crate) fn decode(wrapper: &Tlv) -> Result<Self, Error> {
        let choice = explicit_value(wrapper).unwrap_or(wrapper);
        let arm_number = choice.tag.value() & 0x1F;
        let sequence = tagged_sequence(choice)?;
        let tagged = der_util::decode_tagged_objects(sequence)
            .map_err(|_| Error::Malformed { reason: "coordinates are not constructed" })?;
        let coordinate = |index: u32| -> Result<i64, Error> {
            tagged.get(&index)
                .ok_or(Error::MissingField { field: "coordinate" })
                .and_then(|field| tagged_integer(field))
        };
        let unsigned_coordinate = |index: u32| -> Result<u16, Error> {
            u16::try_from(coordinate(index)?)
                .map_err(|_| Error::Malformed { reason: "coordinate exceeds unsigned short range" })
        };

        match arm_number {
            0 => Ok(Self::Cartesian2dSignedInt { x: coordinate(0)?, y: coordinate(1)? }),
            1 => Ok(Self::Cartesian2dUnsignedShort { x: unsigned_coordinate(0)?, y: unsigned_coordinate(1)? }),
            2 => Ok(Self::Cartesian3dUnsignedShort {
                x: unsigned_coordinate(0)?,
                y: unsigned_coordinate(1)?,
                z: unsigned_coordinate(2)?,
            }),
            3 => Ok(Self::TextureImage { u: coordinate(0)?, v: coordinate(1)? }),
            _ => Err(Error::Malformed { reason: "unknown coordinate choice" }),
        }
    }

    pub(crate) fn encode(&self, tag_number: u32) -> Tlv {
        let int_field = |index: u32, value: i64| {
            Tlv::primitive(der_util::context_tag(index, false), der_util::int_to_der_bytes(value))
        };
        let (arm_number, fields) = match self {
            Self::Cartesian2dSignedInt { x, y } => (0, vec![int_field(0, *x), int_field(1, *y)]),
            Self::Cartesian2dUnsignedShort { x, y } => (1, vec![int_field(0, i64::from(*x)), int_field(1, i64::from(*y))]),
            Self::Cartesian3dUnsignedShort { x, y, z } => (2, vec![
                int_field(0, i64::from(*x)),
                int_field(1, i64::from(*y)),
                int_field(2, i64::from(*z)),
            ]),
            Self::TextureImage { u, v } => (3, vec![int_field(0, *u), int_field(1, *v)]),
        };
        Tlv::constructed(der_util::context_tag(tag_number, true), vec![
            Tlv::constructed(der_util::context_tag(arm_number, true), vec![
                Tlv::constructed(0x30u32, fields),
            ]),
        ])
    }
}


/// One face landmark: its kind code plus coordinates.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LandmarkBlock {
    pub kind: Option<i64>,
    pub coordinates: LandmarkCoordinates,
}
impl LandmarkBlock {
    pub(crate) fn decode(block: &Tlv) -> Result<Self, Error> {
        let tagged = der_util::decode_tagged_objects(block)
            .map_err(|_| Error::Malformed { reason: "landmark block is not constructed" })?;
        let kind = tagged.get(&0).map(|field| choice_code(field)).transpose()?;
        let coordinates = tagged.get(&1)
            .ok_or(Error::MissingField { field: "landmark coordinates" })
            .and_then(|field| LandmarkCoordinates::decode(field))?;
        Ok(Self { kind, coordinates })
    }

    pub(crate) fn encode(&self) -> Tlv {
        let mut fields = Vec::new();
        if let Some(kind) = self.kind {
            fields.push(encode_choice_code(0, kind));
        }
        fields.push(self.coordinates.encode(1));
        Tlv::constructed(0x30u32, fields)
    }
}


#[cfg(test)]
mod tests {
    use super::{AngleData, LandmarkBlock, LandmarkCoordinates, PoseAngleBlock};
    use crate::der_util;
    use crate::tlv::Tlv;

    #[test]
    fn test_angle_uncertainty_sentinel() {
        // uncertainty absent: decodes to -1, stays absent when re-encoded
        let without_uncertainty = AngleData { value: -45, uncertainty: -1 };
        let encoded = without_uncertainty.encode(0);
        let decoded = AngleData::decode(&encoded).expect("decoding");
        assert_eq!(decoded, without_uncertainty);
        assert_eq!(decoded.encode(0), encoded);

        let with_uncertainty = AngleData { value: 30, uncertainty: 5 };
        let round = AngleData::decode(&with_uncertainty.encode(2)).expect("decoding");
        assert_eq!(round, with_uncertainty);
    }

    #[test]
    fn test_pose_angle_round_trip() {
        let pose = PoseAngleBlock {
            yaw: Some(AngleData { value: 10, uncertainty: 2 }),
            pitch: None,
            roll: Some(AngleData { value: -3, uncertainty: -1 }),
        };
        let encoded = pose.encode(2);
        let decoded = PoseAngleBlock::decode(&encoded).expect("decoding");
        assert_eq!(decoded, pose);
    }

    #[test]
    fn test_landmark_coordinate_variants() {
        let variants = [
            LandmarkCoordinates::Cartesian2dSignedInt { x: -12, y: 900 },
            LandmarkCoordinates::Cartesian2dUnsignedShort { x: 320, y: 240 },
            LandmarkCoordinates::Cartesian3dUnsignedShort { x: 1, y: 2, z: 3 },
            LandmarkCoordinates::TextureImage { u: 55, v: 77 },
        ];
        for coordinates in variants {
            let landmark = LandmarkBlock { kind: Some(3), coordinates };
            let encoded = landmark.encode();
            let decoded = LandmarkBlock::decode(&encoded).expect("decoding");
            assert_eq!(decoded, landmark);
        }
    }

    #[test]
    fn test_choice_extension_fallback_in_landmark_kind() {
        // landmark kind via the extension arm [1] instead of the code arm [0]
        let landmark_block = Tlv::constructed(0x30u32, vec![
            Tlv::constructed(der_util::context_tag(0, true), vec![
                Tlv::constructed(0x30u32, vec![
                    Tlv::constructed(der_util::context_tag(1, true), vec![
                        Tlv::primitive(der_util::context_tag(0, false), der_util::int_to_der_bytes(77)),
                    ]),
                ]),
            ]),
            LandmarkCoordinates::Cartesian2dUnsignedShort { x: 4, y: 9 }.encode(1),
        ]);
        let decoded = LandmarkBlock::decode(&landmark_block).expect("decoding");
        assert_eq!(decoded.kind, Some(77));
    }
}
