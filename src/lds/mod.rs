//! The logical data structure: the elementary files stored on the chip.
//!
//! Every data group is a single BER data object whose outer tag identifies
//! the file. [`LdsFile`] provides the shared frame; the content encoding is
//! file-specific.


pub mod additional_details;
pub mod com;
pub mod dg1;
pub mod dg2;
pub mod dg3;
pub mod dg4;
pub mod dg11;
pub mod dg12;
pub mod dg14;
pub mod dg15;
pub mod mrz;
pub mod security_info;
pub mod sod;


use std::fmt;

use crate::cbeff;
use crate::tlv::{self, Tag, TlvReader, TlvWriter};


pub const EF_COM_TAG: u32 = 0x60;
pub const EF_DG1_TAG: u32 = 0x61;
pub const EF_DG2_TAG: u32 = 0x75;
pub const EF_DG3_TAG: u32 = 0x63;
pub const EF_DG4_TAG: u32 = 0x76;
pub const EF_DG5_TAG: u32 = 0x65;
pub const EF_DG7_TAG: u32 = 0x67;
pub const EF_DG11_TAG: u32 = 0x6B;
pub const EF_DG12_TAG: u32 = 0x6C;
pub const EF_DG14_TAG: u32 = 0x6E;
pub const EF_DG15_TAG: u32 = 0x6F;
pub const EF_SOD_TAG: u32 = 0x77;


#[derive(Debug)]
pub enum Error {
    Tlv(tlv::Error),
    Asn1(rasn::error::DecodeError),
    Cbeff(cbeff::Error),
    Mrz(mrz::Error),
    UnexpectedTag { expected: Tag, found: Tag },
    MissingField { tag: u32 },
    Malformed { reason: &'static str },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Tlv(e)
                => write!(f, "TLV error: {}", e),
            Self::Asn1(e)
                => write!(f, "ASN.1 decoding error: {}", e),
            Self::Cbeff(e)
                => write!(f, "biometric template error: {}", e),
            Self::Mrz(e)
                => write!(f, "machine-readable zone error: {}", e),
            Self::UnexpectedTag { expected, found }
                => write!(f, "expected tag {}, found {}", expected, found),
            Self::MissingField { tag }
                => write!(f, "required field 0x{:02X} missing", tag),
            Self::Malformed { reason }
                => write!(f, "malformed file: {}", reason),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tlv(e) => Some(e),
            Self::Asn1(e) => Some(e),
            Self::Cbeff(e) => Some(e),
            Self::Mrz(e) => Some(e),
            _ => None,
        }
    }
}
impl From<tlv::Error> for Error {
    fn from(value: tlv::Error) -> Self { Self::Tlv(value) }
}
impl From<rasn::error::DecodeError> for Error {
    fn from(value: rasn::error::DecodeError) -> Self { Self::Asn1(value) }
}
impl From<cbeff::Error> for Error {
    fn from(value: cbeff::Error) -> Self { Self::Cbeff(value) }
}
impl From<mrz::Error> for Error {
    fn from(value: mrz::Error) -> Self { Self::Mrz(value) }
}


/// The shared frame of every elementary file: a single outer data object
/// whose tag identifies the data group.
pub trait LdsFile: Sized {
    /// The outer tag of this file in the logical data structure.
    const TAG: u32;

    /// Decodes the content octets of the outer data object.
    fn read_content(content: &[u8]) -> Result<Self, Error>;

    /// Produces the content octets of the outer data object.
    fn write_content(&self, output: &mut Vec<u8>);

    /// Decodes a file from its full binary representation, outer tag
    /// included.
    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let mut reader = TlvReader::new(data);
        let tag = reader.read_tag()?;
        if tag != Tag::new(Self::TAG) {
            return Err(Error::UnexpectedTag { expected: Tag::new(Self::TAG), found: tag });
        }
        let length = reader.read_length()?;
        let content = reader.read_value(length)?;
        Self::read_content(content)
    }

    /// Encodes the file to its full binary representation, outer tag
    /// included.
    fn to_bytes(&self) -> Vec<u8> {
        let mut content = Vec::new();
        self.write_content(&mut content);

        let mut writer = TlvWriter::new();
        writer.write_tag(Self::TAG);
        writer.write_value(&content);
        writer.into_bytes()
    }
}
