//! Chip Authentication.
//!
//! The chip holds a static key pair whose public half is published in DG14.
//! The terminal performs an ephemeral-static key agreement against it and
//! both sides switch Secure Messaging to keys derived from the shared
//! secret. A chip that can complete this exchange proves that it holds the
//! static private key, which rules out a cloned data copy.
//!
//! The legacy 3DES variant installs the key material with `MSE:Set KAT`; the
//! AES variants first select the protocol with `MSE:Set AT` and then send the
//! ephemeral key via `GENERAL AUTHENTICATE` (ICAO Doc 9303 Part 11 ยง 6.2).


use std::fmt;

use digest::Digest;
use rasn::types::Oid;
use sha1::Sha1;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::crypt::cipher_mac::{Cam3Des, CamAes128, CamAes192, CamAes256, CipherAndMac as CipherAndMacOps};
use crate::crypt::signature::{DhPublicKey, EcPublicKey, PublicKey};
use crate::crypt::KeyExchange;
use crate::der_util;
use crate::iso7816::apdu::{Apdu, CommandHeader, Data, Response};
use crate::iso7816::card::{CommunicationError, SmartCard};
use crate::secure_messaging::SecureMessaging;
use crate::tlv::Tlv;


macro_rules! ca_oid {
    ($name:ident $(, $number:expr)* $(,)?) => {
        pub const $name: &'static Oid = Oid::const_new(&[0, 4, 0, 127, 0, 7, 2, 2 $(, $number)*]);
    };
}

ca_oid!(ID_PK_DH,   1, 1);
ca_oid!(ID_PK_ECDH, 1, 2);

ca_oid!(CA_DH,                      3, 1);
ca_oid!(CA_DH_3DES_CBC_CBC,         3, 1, 1);
ca_oid!(CA_DH_AES_CBC_CMAC_128,     3, 1, 2);
ca_oid!(CA_DH_AES_CBC_CMAC_192,     3, 1, 3);
ca_oid!(CA_DH_AES_CBC_CMAC_256,     3, 1, 4);

ca_oid!(CA_ECDH,                    3, 2);
ca_oid!(CA_ECDH_3DES_CBC_CBC,       3, 2, 1);
ca_oid!(CA_ECDH_AES_CBC_CMAC_128,   3, 2, 2);
ca_oid!(CA_ECDH_AES_CBC_CMAC_192,   3, 2, 3);
ca_oid!(CA_ECDH_AES_CBC_CMAC_256,   3, 2, 4);

/// All Chip Authentication protocol identifiers this crate understands.
pub const CA_PROTOCOL_OIDS: [&'static Oid; 8] = [
    CA_DH_3DES_CBC_CBC, CA_DH_AES_CBC_CMAC_128,
    CA_DH_AES_CBC_CMAC_192, CA_DH_AES_CBC_CMAC_256,
    CA_ECDH_3DES_CBC_CBC, CA_ECDH_AES_CBC_CMAC_128,
    CA_ECDH_AES_CBC_CMAC_192, CA_ECDH_AES_CBC_CMAC_256,
];


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    SetKeyAgreementTemplate,
    SetAuthenticationTemplate,
    GeneralAuthenticate,
}
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetKeyAgreementTemplate => write!(f, "MSE:Set KAT"),
            Self::SetAuthenticationTemplate => write!(f, "MSE:Set AT"),
            Self::GeneralAuthenticate => write!(f, "GENERAL AUTHENTICATE"),
        }
    }
}


#[derive(Debug)]
pub enum Error {
    UnsupportedProtocol { oid: String },
    KeyMismatch,
    OperationFailed {
        operation: Operation,
        response: Response,
    },
    KeyAgreementFailed,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::UnsupportedProtocol { oid }
                => write!(f, "unsupported Chip Authentication protocol {}", oid),
            Self::KeyMismatch
                => write!(f, "the chip's public key does not match the protocol's key agreement"),
            Self::OperationFailed { operation, response }
                => write!(f, "operation {:?} failed with response code 0x{:04X}", operation, response.trailer.to_word()),
            Self::KeyAgreementFailed
                => write!(f, "key agreement with the chip's static key failed"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


/// The cipher suite selected by a Chip Authentication protocol identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum Suite {
    ThreeDes,
    Aes128,
    Aes192,
    Aes256,
}
impl Suite {
    fn for_oid(oid: &Oid) -> Option<Self> {
        if !CA_PROTOCOL_OIDS.contains(&oid) {
            return None;
        }
        match oid[10] {
            1 => Some(Self::ThreeDes),
            2 => Some(Self::Aes128),
            3 => Some(Self::Aes192),
            4 => Some(Self::Aes256),
            _ => None,
        }
    }

    fn ops(&self) -> &'static dyn CipherAndMacOps {
        match self {
            Self::ThreeDes => &Cam3Des,
            Self::Aes128 => &CamAes128,
            Self::Aes192 => &CamAes192,
            Self::Aes256 => &CamAes256,
        }
    }
}


/// The outcome of a successful Chip Authentication run.
///
/// Holds everything a caller needs for later inspection: the chip's static
/// public key, the terminal's ephemeral key pair and its hash, and the
/// replacement Secure Messaging card whose send sequence counter starts at
/// zero.
pub struct CaResult {
    pub key_id: Option<i64>,
    pub chip_public_key: Vec<u8>,
    pub terminal_key_hash: Vec<u8>,
    pub terminal_public_key: Vec<u8>,
    pub terminal_private_key: Zeroizing<Vec<u8>>,
    pub secured_card: Box<dyn SmartCard>,
}


/// Runs Chip Authentication over an established Secure Messaging session.
///
/// `chip_key` is the static key from the matching
/// `ChipAuthenticationPublicKeyInfo` in DG14. On success the old session is
/// dismantled and replaced by one keyed from the agreed secret.
#[instrument(skip_all)]
pub fn perform<SM: SecureMessaging>(
    mut secure_card: SM,
    protocol: &Oid,
    key_id: Option<i64>,
    chip_key: &PublicKey,
) -> Result<CaResult, CommunicationError> {
    let suite = Suite::for_oid(protocol)
        .ok_or_else(|| Error::UnsupportedProtocol { oid: format!("{:?}", protocol) })?;

    // assemble the key exchange from the chip's domain parameters
    let (key_exchange, chip_public_key) = match chip_key {
        PublicKey::Ec(EcPublicKey { curve, point, .. }) => {
            let encoded = point.to_be_bytes(curve.private_key_len_bytes());
            (KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curve.clone()), encoded.to_vec())
        },
        PublicKey::Dh(DhPublicKey { params, value }) => {
            (KeyExchange::DiffieHellman(params.clone()), value.to_be_bytes().into_vec())
        },
        PublicKey::Rsa(_) => return Err(Error::KeyMismatch.into()),
    };

    let terminal_private_key = key_exchange.generate_private_key();
    let terminal_public_key = key_exchange.calculate_public_key(&terminal_private_key);

    match suite {
        Suite::ThreeDes => {
            // legacy variant: MSE:Set KAT carries the ephemeral key directly
            let mut request_data = Vec::new();
            request_data.push(0x91);
            der_util::encode_primitive_length(&mut request_data, terminal_public_key.len());
            request_data.extend(terminal_public_key.iter());
            if let Some(id) = key_id {
                request_data.push(0x84);
                let id_bytes = der_util::int_to_der_bytes(id);
                der_util::encode_primitive_length(&mut request_data, id_bytes.len());
                request_data.extend(&id_bytes);
            }

            let request = Apdu {
                header: CommandHeader {
                    cla: 0x00,
                    ins: 0x22, // MANAGE SECURITY ENVIRONMENT
                    p1: 0b0100_0001, // computation/decipherment/internal authentication, set
                    p2: 0xA6, // control reference template for key agreement
                },
                data: Data::RequestDataShort { request_data },
            };
            let response = SecureMessaging::communicate(&mut secure_card, &request)?;
            if response.trailer.to_word() != 0x9000 {
                return Err(Error::OperationFailed {
                    operation: Operation::SetKeyAgreementTemplate,
                    response,
                }.into());
            }
        },
        Suite::Aes128|Suite::Aes192|Suite::Aes256 => {
            // select the protocol
            let mut request_data = Vec::new();
            let oid_bytes = der_util::oid_to_der_bytes(protocol);
            request_data.push(0x80);
            der_util::encode_primitive_length(&mut request_data, oid_bytes.len());
            request_data.extend(&oid_bytes);
            if let Some(id) = key_id {
                request_data.push(0x84);
                let id_bytes = der_util::int_to_der_bytes(id);
                der_util::encode_primitive_length(&mut request_data, id_bytes.len());
                request_data.extend(&id_bytes);
            }

            let request = Apdu {
                header: CommandHeader {
                    cla: 0x00,
                    ins: 0x22, // MANAGE SECURITY ENVIRONMENT
                    p1: 0b0100_0001, // computation/decipherment/internal authentication, set
                    p2: 0xA4, // control reference template for authentication
                },
                data: Data::RequestDataShort { request_data },
            };
            let response = SecureMessaging::communicate(&mut secure_card, &request)?;
            if response.trailer.to_word() != 0x9000 {
                return Err(Error::OperationFailed {
                    operation: Operation::SetAuthenticationTemplate,
                    response,
                }.into());
            }

            // hand over the ephemeral key
            let request_data = Tlv::constructed(0x7Cu32, vec![
                Tlv::primitive(0x80u32, terminal_public_key.to_vec()),
            ]).to_bytes();
            let request = Apdu {
                header: CommandHeader {
                    cla: 0x00,
                    ins: 0x86, // GENERAL AUTHENTICATE
                    p1: 0x00,
                    p2: 0x00,
                },
                data: Data::BothDataShort {
                    request_data,
                    response_data_length: 0,
                },
            };
            let response = SecureMessaging::communicate(&mut secure_card, &request)?;
            if response.trailer.to_word() != 0x9000 {
                return Err(Error::OperationFailed {
                    operation: Operation::GeneralAuthenticate,
                    response,
                }.into());
            }
        },
    }

    let shared_secret = key_exchange.exchange_keys(&terminal_private_key, &chip_public_key)
        .ok_or(Error::KeyAgreementFailed)?;

    let ops = suite.ops();
    let k_session_enc = ops.derive_encryption_key(&shared_secret);
    let k_session_mac = ops.derive_mac_key(&shared_secret);

    // the new session keys take over atomically with a zeroed counter
    let terminal_key_hash = match chip_key {
        PublicKey::Ec(_) => {
            // for ECDH the key hash convention is the x coordinate
            let coordinate_len = (terminal_public_key.len() - 1) / 2;
            terminal_public_key[1..1+coordinate_len].to_vec()
        },
        _ => Sha1::digest(&terminal_public_key).to_vec(),
    };

    let card = secure_card.into_smart_card();
    let ssc = vec![0u8; ops.cipher_block_size().max(8)];
    let secured_card = ops.create_secure_messaging(card, &k_session_enc, &k_session_mac, &ssc);

    let terminal_private_key_bytes = Zeroizing::new(terminal_private_key.to_be_bytes().into_vec());
    Ok(CaResult {
        key_id,
        chip_public_key,
        terminal_key_hash,
        terminal_public_key: terminal_public_key.to_vec(),
        terminal_private_key: terminal_private_key_bytes,
        secured_card,
    })
}
