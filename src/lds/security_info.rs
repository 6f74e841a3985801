//! The SecurityInfo structures advertised in DG14 and EF.CardAccess.
//!
//! Each entry is a SEQUENCE starting with a protocol identifier; the
//! identifier decides the shape of the rest. Unknown identifiers are kept as
//! raw bytes so that a file survives a round trip even when it advertises
//! protocols this crate does not know.


use rasn::{AsnType, Decode, Encode};
use rasn::types::{Any, Integer, ObjectIdentifier, Oid};
use tracing::warn;

use crate::active_authentication::ID_AA;
use crate::chip_authentication::{CA_PROTOCOL_OIDS, ID_PK_DH, ID_PK_ECDH};
use crate::lds::Error;
use crate::pace::asn1::{PaceDomainParameterInfo, PaceInfo};
use crate::pace::oids::{PACE_DH_GM, PACE_DH_IM, PACE_ECDH_CAM, PACE_ECDH_GM, PACE_ECDH_IM, PACE_PROTOCOL_OIDS};


/// Identifies Terminal Authentication in DG14 SecurityInfos.
pub const ID_TA: &'static Oid = Oid::const_new(&[0, 4, 0, 127, 0, 7, 2, 2, 2]);


/// Advertises Active Authentication, optionally naming the signature
/// algorithm of the chip's key.
#[derive(AsnType, Clone, Debug, Decode, Encode, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ActiveAuthenticationInfo {
    pub protocol: ObjectIdentifier,
    pub version: Integer,
    pub signature_algorithm: Option<ObjectIdentifier>,
}

/// Advertises Chip Authentication with a given cipher suite.
#[derive(AsnType, Clone, Debug, Decode, Encode, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChipAuthenticationInfo {
    pub protocol: ObjectIdentifier,
    pub version: Integer,
    pub key_id: Option<Integer>,
}

/// Carries the chip's static Chip Authentication public key.
#[derive(AsnType, Clone, Debug, Decode, Encode, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChipAuthenticationPublicKeyInfo {
    pub protocol: ObjectIdentifier,
    pub chip_authentication_public_key: Any,
    pub key_id: Option<Integer>,
}

/// Advertises Terminal Authentication; the optional body points at
/// `EF.CVCA`.
#[derive(AsnType, Clone, Debug, Decode, Encode, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TerminalAuthenticationInfo {
    pub protocol: ObjectIdentifier,
    pub version: Integer,
    pub ef_cvca: Option<Any>,
}


/// One entry of the SecurityInfos set.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SecurityInfo {
    ActiveAuthentication(ActiveAuthenticationInfo),
    ChipAuthentication(ChipAuthenticationInfo),
    ChipAuthenticationPublicKey(ChipAuthenticationPublicKeyInfo),
    TerminalAuthentication(TerminalAuthenticationInfo),
    Pace(PaceInfo),
    PaceDomainParameter(PaceDomainParameterInfo),
    /// An entry whose protocol identifier this crate does not understand,
    /// preserved verbatim.
    Unknown(Vec<u8>),
}
impl SecurityInfo {
    /// Decodes one entry. Unknown protocol identifiers produce
    /// [`SecurityInfo::Unknown`] after a warning; a recognised identifier
    /// with a malformed body is an error.
    pub fn from_der(entry: &[u8]) -> Result<Self, Error> {
        let entry_seq: Vec<Any> = rasn::der::decode(entry)?;
        let Some(first) = entry_seq.first() else {
            return Err(Error::Malformed { reason: "empty SecurityInfo sequence" });
        };
        let Ok(oid): Result<ObjectIdentifier, _> = rasn::der::decode(first.as_bytes()) else {
            return Err(Error::Malformed { reason: "SecurityInfo does not start with an OID" });
        };

        if &*oid == ID_AA {
            let info: ActiveAuthenticationInfo = rasn::der::decode(entry)?;
            return Ok(Self::ActiveAuthentication(info));
        }
        if CA_PROTOCOL_OIDS.contains(&&*oid) {
            let info: ChipAuthenticationInfo = rasn::der::decode(entry)?;
            return Ok(Self::ChipAuthentication(info));
        }
        if &*oid == ID_PK_DH || &*oid == ID_PK_ECDH {
            let info: ChipAuthenticationPublicKeyInfo = rasn::der::decode(entry)?;
            return Ok(Self::ChipAuthenticationPublicKey(info));
        }
        if &*oid == ID_TA {
            let info: TerminalAuthenticationInfo = rasn::der::decode(entry)?;
            return Ok(Self::TerminalAuthentication(info));
        }
        if PACE_PROTOCOL_OIDS.contains(&&*oid) {
            let info: PaceInfo = rasn::der::decode(entry)?;
            return Ok(Self::Pace(info));
        }
        let domain_parameter_families = [PACE_DH_GM, PACE_ECDH_GM, PACE_DH_IM, PACE_ECDH_IM, PACE_ECDH_CAM];
        if domain_parameter_families.contains(&&*oid) {
            let info: PaceDomainParameterInfo = rasn::der::decode(entry)?;
            return Ok(Self::PaceDomainParameter(info));
        }

        warn!("skipping SecurityInfo with unknown protocol {:?}", oid);
        Ok(Self::Unknown(entry.to_vec()))
    }

    /// Encodes this entry to DER.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        let encoded = match self {
            Self::ActiveAuthentication(info) => rasn::der::encode(info),
            Self::ChipAuthentication(info) => rasn::der::encode(info),
            Self::ChipAuthenticationPublicKey(info) => rasn::der::encode(info),
            Self::TerminalAuthentication(info) => rasn::der::encode(info),
            Self::Pace(info) => rasn::der::encode(info),
            Self::PaceDomainParameter(info) => rasn::der::encode(info),
            Self::Unknown(raw) => return Ok(raw.clone()),
        };
        encoded.map_err(|_| Error::Malformed { reason: "SecurityInfo does not encode" })
    }

    /// The protocol identifier of this entry, if it is understood.
    pub fn protocol(&self) -> Option<&ObjectIdentifier> {
        match self {
            Self::ActiveAuthentication(info) => Some(&info.protocol),
            Self::ChipAuthentication(info) => Some(&info.protocol),
            Self::ChipAuthenticationPublicKey(info) => Some(&info.protocol),
            Self::TerminalAuthentication(info) => Some(&info.protocol),
            Self::Pace(info) => Some(&info.protocol),
            Self::PaceDomainParameter(info) => Some(&info.protocol),
            Self::Unknown(_) => None,
        }
    }
}
