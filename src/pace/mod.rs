//! Implementation of Password Authenticated Connection Establishment.
//!
//! PACE replaces Basic Access Control: instead of deriving the session keys
//! from the machine-readable zone alone, the terminal and the chip run an
//! anonymous Diffie-Hellman key agreement over domain parameters that were
//! remapped under a password-encrypted nonce (ICAO Doc 9303 Part 11 ยง 4.4).
//!
//! The ceremony has four card exchanges after `MSE:Set AT`:
//! 1. obtain the encrypted nonce,
//! 2. map the domain parameters (generic, integrated or chip-authentication
//!    mapping),
//! 3. agree on a shared secret over the mapped parameters,
//! 4. exchange and check authentication tokens.


pub mod asn1;
pub mod oids;


use std::fmt;

use crypto_bigint::BoxedUint;
use digest::Digest;
use rasn::types::{Any, ObjectIdentifier, Oid, SetOf};
use sha1::Sha1;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::crypt::boxed_uint_from_be_slice;
use crate::crypt::cipher_mac::{Cam3Des, CamAes128, CamAes192, CamAes256, CipherAndMac as CipherAndMacOps};
use crate::crypt::dh;
use crate::crypt::elliptic::curves;
use crate::crypt::KeyExchange;
use crate::der_util;
use crate::iso7816::apdu::{Apdu, CommandHeader, Data, Response};
use crate::iso7816::card::{CommunicationError, SmartCard};
use crate::pace::asn1::PaceInfo;
use crate::tlv::Tlv;

pub use crate::pace::oids::*;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    SetAuthenticationTemplate,
    ObtainNonce,
    MapNonce,
    KeyAgreement,
    MutualAuthentication,
}
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetAuthenticationTemplate => write!(f, "MSE:Set AT"),
            Self::ObtainNonce => write!(f, "GENERAL AUTHENTICATE (encrypted nonce)"),
            Self::MapNonce => write!(f, "GENERAL AUTHENTICATE (map nonce)"),
            Self::KeyAgreement => write!(f, "GENERAL AUTHENTICATE (key agreement)"),
            Self::MutualAuthentication => write!(f, "GENERAL AUTHENTICATE (mutual authentication)"),
        }
    }
}


#[derive(Debug)]
pub enum Error {
    CardAccessDecoding(rasn::error::DecodeError),
    CardAccessEntryDecoding {
        entry_index: usize,
        error: rasn::error::DecodeError,
    },
    CardAccessEntryDecodingPace {
        entry_index: usize,
        error: rasn::error::DecodeError,
    },
    NoSupportedProtocol,
    UnsupportedParameterId { parameter_id: i64 },
    OperationFailed {
        operation: Operation,
        response: Response,
    },
    DynamicDataFormat { operation: Operation },
    InvalidPeerKey { operation: Operation },
    MutualAuthenticationFailed,
    MissingChipAuthenticationData,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::CardAccessDecoding(e)
                => write!(f, "failed to decode EF.CardAccess: {}", e),
            Self::CardAccessEntryDecoding { entry_index, error }
                => write!(f, "failed to decode EF.CardAccess entry {}: {}", entry_index, error),
            Self::CardAccessEntryDecodingPace { entry_index, error }
                => write!(f, "failed to decode EF.CardAccess entry {} as PaceInfo: {}", entry_index, error),
            Self::NoSupportedProtocol
                => write!(f, "EF.CardAccess advertises no supported PACE protocol"),
            Self::UnsupportedParameterId { parameter_id }
                => write!(f, "no standardized domain parameters with identifier {}", parameter_id),
            Self::OperationFailed { operation, response }
                => write!(f, "operation {:?} failed with response code 0x{:04X}", operation, response.trailer.to_word()),
            Self::DynamicDataFormat { operation }
                => write!(f, "{} returned malformed dynamic authentication data", operation),
            Self::InvalidPeerKey { operation }
                => write!(f, "{} returned an invalid public key", operation),
            Self::MutualAuthenticationFailed
                => write!(f, "the chip's authentication token does not verify"),
            Self::MissingChipAuthenticationData
                => write!(f, "chip-authentication mapping response carries no encrypted chip data"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PasswordSource {
    Mrz,
    Can,
}


/// The password fed into PACE.
///
/// The MRZ form carries the same "document number, date of birth, date of
/// expiry with check digits" string as Basic Access Control; its key seed is
/// the SHA-1 hash of that string. The card access number is used as its raw
/// bytes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Password {
    MrzInformation(String),
    Can(String),
}
impl Password {
    pub fn source(&self) -> PasswordSource {
        match self {
            Self::MrzInformation(_) => PasswordSource::Mrz,
            Self::Can(_) => PasswordSource::Can,
        }
    }

    /// The value passed to the password-to-key derivation function.
    pub fn key_seed(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::MrzInformation(mrz_information) => {
                Zeroizing::new(Sha1::digest(mrz_information.as_bytes()).to_vec())
            },
            Self::Can(can) => Zeroizing::new(can.as_bytes().to_vec()),
        }
    }
}


/// The cipher and MAC suite negotiated by the protocol identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CipherAndMac {
    ThreeDesCipherCbcMac,
    Aes128CipherCmacMac,
    Aes192CipherCmacMac,
    Aes256CipherCmacMac,
}
impl CipherAndMac {
    pub fn ops(&self) -> &'static dyn CipherAndMacOps {
        match self {
            Self::ThreeDesCipherCbcMac => &Cam3Des,
            Self::Aes128CipherCmacMac => &CamAes128,
            Self::Aes192CipherCmacMac => &CamAes192,
            Self::Aes256CipherCmacMac => &CamAes256,
        }
    }
}

/// The nonce mapping variant of a PACE protocol.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Mapping {
    Generic,
    Integrated,
    ChipAuthentication,
}

/// The key agreement family of a PACE protocol.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeyAgreement {
    DiffieHellman,
    EllipticDiffieHellman,
}

/// The decomposition of a PACE protocol identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Protocol {
    pub key_agreement: KeyAgreement,
    pub mapping: Mapping,
    pub cipher_and_mac: CipherAndMac,
}

/// Decomposes a PACE protocol identifier into key agreement, mapping and
/// cipher suite.
pub fn protocol_for_oid(oid: &Oid) -> Option<Protocol> {
    if !PACE_PROTOCOL_OIDS.contains(&oid) {
        return None;
    }
    let family = oid[9];
    let suite = oid[10];

    let (key_agreement, mapping) = match family {
        1 => (KeyAgreement::DiffieHellman, Mapping::Generic),
        2 => (KeyAgreement::EllipticDiffieHellman, Mapping::Generic),
        3 => (KeyAgreement::DiffieHellman, Mapping::Integrated),
        4 => (KeyAgreement::EllipticDiffieHellman, Mapping::Integrated),
        6 => (KeyAgreement::EllipticDiffieHellman, Mapping::ChipAuthentication),
        _ => return None,
    };
    let cipher_and_mac = match suite {
        1 => CipherAndMac::ThreeDesCipherCbcMac,
        2 => CipherAndMac::Aes128CipherCmacMac,
        3 => CipherAndMac::Aes192CipherCmacMac,
        4 => CipherAndMac::Aes256CipherCmacMac,
        _ => return None,
    };
    Some(Protocol { key_agreement, mapping, cipher_and_mac })
}

/// Resolves a standardized domain parameter identifier (ICAO Doc 9303
/// Part 11 ยง 9.5.1) into a key exchange method.
pub fn standardized_domain_parameters(parameter_id: i64) -> Option<KeyExchange> {
    match parameter_id {
        0 => Some(KeyExchange::DiffieHellman(dh::get_1024_modp_160_po())),
        1 => Some(KeyExchange::DiffieHellman(dh::get_2048_modp_224_po())),
        2 => Some(KeyExchange::DiffieHellman(dh::get_2048_modp_256_po())),
        8 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_nist_p192())),
        9 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p192r1())),
        10 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_nist_p224())),
        11 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p224r1())),
        12 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_nist_p256())),
        13 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p256r1())),
        14 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p320r1())),
        15 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_nist_p384())),
        16 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p384r1())),
        17 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_brainpool_p512r1())),
        18 => Some(KeyExchange::PrimeWeierstrassEllipticDiffieHellman(curves::get_nist_p521())),
        _ => None,
    }
}


/// The outcome of a successful PACE ceremony: the session keys, waiting to be
/// installed into a Secure Messaging wrapper.
pub struct SessionKeys {
    cipher_and_mac: CipherAndMac,
    k_session_enc: Zeroizing<Vec<u8>>,
    k_session_mac: Zeroizing<Vec<u8>>,
    chip_authentication_data: Option<Vec<u8>>,
}
impl SessionKeys {
    /// The decrypted chip authentication data if the ceremony used
    /// chip-authentication mapping.
    pub fn chip_authentication_data(&self) -> Option<&[u8]> {
        self.chip_authentication_data.as_deref()
    }

    /// Consumes the keys and installs them into a Secure Messaging wrapper
    /// around the given card. The send sequence counter starts at zero.
    pub fn into_secure_messaging(self, card: Box<dyn SmartCard>) -> Box<dyn SmartCard> {
        let ops = self.cipher_and_mac.ops();
        let ssc = vec![0u8; ops.cipher_block_size().max(8)];
        ops.create_secure_messaging(
            card,
            &self.k_session_enc,
            &self.k_session_mac,
            &ssc,
        )
    }
}


pub fn set_authentication_template<SC: SmartCard + ?Sized>(card: &mut SC, mechanism: &Oid, password_source: PasswordSource) -> Result<(), CommunicationError> {
    let mut request_data = Vec::new();

    // encode mechanism (0x80)
    let mechanism_bytes = der_util::oid_to_der_bytes(mechanism);
    request_data.push(0x80);
    der_util::encode_primitive_length(&mut request_data, mechanism_bytes.len());
    request_data.extend(&mechanism_bytes);

    // encode password source (0x83)
    request_data.push(0x83);
    request_data.push(0x01);
    match password_source {
        PasswordSource::Mrz => request_data.push(0x01),
        PasswordSource::Can => request_data.push(0x02),
    }

    // do it
    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x22, // MANAGE SECURITY ENVIRONMENT
            p1: 0b1100_0001, // verify/encrypt/extauth, compute/decrypt/intauth, set
            p2: 0xA4, // control reference template for authentication
        },
        data: Data::RequestDataShort { request_data },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: Operation::SetAuthenticationTemplate,
            response,
        }.into())
    }
}


/// Issues a GENERAL AUTHENTICATE step carrying dynamic authentication data.
///
/// All steps except the final one are marked as chained commands.
fn general_authenticate<SC: SmartCard + ?Sized>(
    card: &mut SC,
    operation: Operation,
    last_in_chain: bool,
    request_data: Vec<u8>,
) -> Result<Response, CommunicationError> {
    let request = Apdu {
        header: CommandHeader {
            cla: if last_in_chain { 0b000_0_00_00 } else { 0b000_1_00_00 },
            ins: 0x86, // GENERAL AUTHENTICATE
            p1: 0x00, // algorithm is known (from "set authentication template")
            p2: 0x00, // key index is known (from "set authentication template")
        },
        data: Data::BothDataShort {
            request_data,
            response_data_length: 0,
        },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() == 0x9000 {
        Ok(response)
    } else {
        Err(Error::OperationFailed {
            operation,
            response,
        }.into())
    }
}

/// Extracts one tagged value from a `7C` dynamic authentication data
/// response.
fn dynamic_authentication_value(operation: Operation, response_data: &[u8], inner_tag: u32) -> Result<Vec<u8>, Error> {
    let (dynamic_data, _rest) = Tlv::parse(response_data)
        .map_err(|_| Error::DynamicDataFormat { operation })?;
    if dynamic_data.tag != 0x7Cu32 {
        return Err(Error::DynamicDataFormat { operation });
    }
    let value = dynamic_data.find_child(inner_tag)
        .and_then(|child| child.primitive_value())
        .ok_or(Error::DynamicDataFormat { operation })?;
    Ok(value.to_vec())
}

/// Wraps dynamic authentication data into the `7C` request structure.
fn dynamic_authentication_request(children: Vec<Tlv>) -> Vec<u8> {
    Tlv::constructed(0x7Cu32, children).to_bytes()
}


#[instrument(skip(card))]
pub fn obtain_encrypted_nonce<SC: SmartCard + ?Sized>(card: &mut SC) -> Result<Vec<u8>, CommunicationError> {
    let request_data = dynamic_authentication_request(Vec::new());
    let response = general_authenticate(card, Operation::ObtainNonce, false, request_data)?;
    Ok(dynamic_authentication_value(Operation::ObtainNonce, &response.data, 0x80)?)
}


/// The authentication token input: the ephemeral public key of the recipient
/// packed into a `7F49` public key data object together with the protocol
/// identifier.
fn authentication_token_data(protocol: &Oid, key_exchange: &KeyExchange, public_key: &[u8]) -> Vec<u8> {
    let oid_bytes = der_util::oid_to_der_bytes(protocol);

    let mut inner = Vec::new();
    inner.push(0x06);
    der_util::encode_primitive_length(&mut inner, oid_bytes.len());
    inner.extend(&oid_bytes);
    inner.push(key_exchange.public_key_tag());
    der_util::encode_primitive_length(&mut inner, public_key.len());
    inner.extend(public_key);

    let mut token_data = vec![0x7F, 0x49];
    der_util::encode_primitive_length(&mut token_data, inner.len());
    token_data.extend(&inner);
    token_data
}

/// Computes an authentication token over the peer's public key. Block
/// ciphers with a Retail MAC need the input padded to the cipher block size;
/// CMAC pads internally.
fn authentication_token(
    cipher_and_mac: CipherAndMac,
    k_session_mac: &[u8],
    protocol: &Oid,
    key_exchange: &KeyExchange,
    public_key: &[u8],
) -> Zeroizing<Vec<u8>> {
    let ops = cipher_and_mac.ops();
    let mut token_data = authentication_token_data(protocol, key_exchange, public_key);
    if matches!(cipher_and_mac, CipherAndMac::ThreeDesCipherCbcMac) {
        token_data.push(0x80);
        while token_data.len() % ops.cipher_block_size() != 0 {
            token_data.push(0x00);
        }
    }
    ops.mac_padded_data(&token_data, k_session_mac)
}


/// Decrypts the nonce obtained from the chip using the password-derived key.
fn decrypt_nonce(
    cipher_and_mac: CipherAndMac,
    password_key_seed: &[u8],
    encrypted_nonce: &[u8],
) -> Zeroizing<Vec<u8>> {
    let ops = cipher_and_mac.ops();
    let k_pi = ops.derive_key_from_password(password_key_seed);
    let mut nonce = Zeroizing::new(encrypted_nonce.to_vec());
    let iv = vec![0u8; ops.cipher_block_size()];
    ops.decrypt_padded_data(&mut nonce, &k_pi, &iv);
    nonce
}


/// The common second half of every mapping variant: ephemeral key agreement
/// over the mapped parameters followed by the exchange of authentication
/// tokens.
fn agree_and_authenticate<SC: SmartCard + ?Sized>(
    card: &mut SC,
    protocol: &Oid,
    mapped_exchange: &KeyExchange,
    cipher_and_mac: CipherAndMac,
    agreement_private_key: &BoxedUint,
    expect_chip_authentication_data: bool,
) -> Result<SessionKeys, CommunicationError> {
    let ops = cipher_and_mac.ops();

    // exchange ephemeral public keys over the mapped parameters
    let own_public_key = mapped_exchange.calculate_public_key(agreement_private_key);
    let request_data = dynamic_authentication_request(vec![
        Tlv::primitive(0x83u32, own_public_key.to_vec()),
    ]);
    let response = general_authenticate(card, Operation::KeyAgreement, false, request_data)?;
    let chip_public_key = dynamic_authentication_value(Operation::KeyAgreement, &response.data, 0x84)?;

    let shared_secret = mapped_exchange.exchange_keys(agreement_private_key, &chip_public_key)
        .ok_or(Error::InvalidPeerKey { operation: Operation::KeyAgreement })?;

    // derive the session keys from the shared secret
    let k_session_enc = ops.derive_encryption_key(&shared_secret);
    let k_session_mac = ops.derive_mac_key(&shared_secret);

    // our token covers the chip's ephemeral key and vice versa
    let own_token = authentication_token(cipher_and_mac, &k_session_mac, protocol, mapped_exchange, &chip_public_key);
    let expected_chip_token = authentication_token(cipher_and_mac, &k_session_mac, protocol, mapped_exchange, &own_public_key);

    let request_data = dynamic_authentication_request(vec![
        Tlv::primitive(0x85u32, own_token.to_vec()),
    ]);
    let response = general_authenticate(card, Operation::MutualAuthentication, true, request_data)?;
    let chip_token = dynamic_authentication_value(Operation::MutualAuthentication, &response.data, 0x86)?;

    if chip_token.as_slice() != expected_chip_token.as_slice() {
        return Err(Error::MutualAuthenticationFailed.into());
    }

    let chip_authentication_data = if expect_chip_authentication_data {
        let encrypted = dynamic_authentication_value(Operation::MutualAuthentication, &response.data, 0x8A)
            .map_err(|_| Error::MissingChipAuthenticationData)?;
        let mut decrypted = Zeroizing::new(encrypted);
        let iv = vec![0u8; ops.cipher_block_size()];
        ops.decrypt_padded_data(&mut decrypted, &k_session_enc, &iv);
        // strip padding method 2
        let mut data = decrypted.to_vec();
        while data.last() == Some(&0x00) {
            data.pop();
        }
        if data.last() != Some(&0x80) {
            return Err(Error::DynamicDataFormat { operation: Operation::MutualAuthentication }.into());
        }
        data.pop();
        Some(data)
    } else {
        None
    };

    Ok(SessionKeys {
        cipher_and_mac,
        k_session_enc,
        k_session_mac,
        chip_authentication_data,
    })
}


/// Performs the generic-mapping key exchange with caller-supplied private
/// keys. The MRZ data is the document number, date of birth and date of
/// expiry, each followed by its check digit.
#[instrument(skip_all)]
pub fn perform_gm_kex_with_values<SC: SmartCard + ?Sized>(
    card: &mut SC,
    protocol: &Oid,
    key_exchange: KeyExchange,
    cipher_and_mac: CipherAndMac,
    mrz_data: &[u8],
    encrypted_nonce: &[u8],
    derivation_private_key: &BoxedUint,
    agreement_private_key: &BoxedUint,
) -> Result<SessionKeys, CommunicationError> {
    let password_key_seed = Zeroizing::new(Sha1::digest(mrz_data).to_vec());
    perform_gm_kex_from_password_seed(
        card,
        protocol,
        key_exchange,
        cipher_and_mac,
        &password_key_seed,
        encrypted_nonce,
        derivation_private_key,
        agreement_private_key,
        false,
    )
}

/// Generic (and chip-authentication) mapping: the mapped generator is
/// `s*G + H` where `H` is the shared secret of a first key agreement.
fn perform_gm_kex_from_password_seed<SC: SmartCard + ?Sized>(
    card: &mut SC,
    protocol: &Oid,
    key_exchange: KeyExchange,
    cipher_and_mac: CipherAndMac,
    password_key_seed: &[u8],
    encrypted_nonce: &[u8],
    derivation_private_key: &BoxedUint,
    agreement_private_key: &BoxedUint,
    expect_chip_authentication_data: bool,
) -> Result<SessionKeys, CommunicationError> {
    let nonce = decrypt_nonce(cipher_and_mac, password_key_seed, encrypted_nonce);
    let nonce_int = Zeroizing::new(boxed_uint_from_be_slice(&nonce));

    // first key agreement, deriving the mapped generator
    let mapping_public_key = key_exchange.calculate_public_key(derivation_private_key);
    let request_data = dynamic_authentication_request(vec![
        Tlv::primitive(0x81u32, mapping_public_key.to_vec()),
    ]);
    let response = general_authenticate(card, Operation::MapNonce, false, request_data)?;
    let chip_mapping_public_key = dynamic_authentication_value(Operation::MapNonce, &response.data, 0x82)?;

    let mapped_exchange = key_exchange
        .derive_generic_mapping(&nonce_int, derivation_private_key, &chip_mapping_public_key)
        .ok_or(Error::InvalidPeerKey { operation: Operation::MapNonce })?;

    agree_and_authenticate(
        card,
        protocol,
        &mapped_exchange,
        cipher_and_mac,
        agreement_private_key,
        expect_chip_authentication_data,
    )
}

/// Performs the integrated-mapping key exchange with caller-supplied values.
/// The mapped generator is derived from the pseudorandom function over the
/// decrypted nonce and a terminal-chosen plaintext nonce.
#[instrument(skip_all)]
pub fn perform_im_kex_with_values<SC: SmartCard + ?Sized>(
    card: &mut SC,
    protocol: &Oid,
    key_exchange: KeyExchange,
    cipher_and_mac: CipherAndMac,
    mrz_data: &[u8],
    encrypted_nonce: &[u8],
    terminal_nonce: &[u8],
    agreement_private_key: &BoxedUint,
) -> Result<SessionKeys, CommunicationError> {
    let password_key_seed = Zeroizing::new(Sha1::digest(mrz_data).to_vec());
    perform_im_kex_from_password_seed(
        card,
        protocol,
        key_exchange,
        cipher_and_mac,
        &password_key_seed,
        encrypted_nonce,
        terminal_nonce,
        agreement_private_key,
    )
}

/// Integrated mapping: the mapped generator comes out of the pseudorandom
/// function over both nonces.
fn perform_im_kex_from_password_seed<SC: SmartCard + ?Sized>(
    card: &mut SC,
    protocol: &Oid,
    key_exchange: KeyExchange,
    cipher_and_mac: CipherAndMac,
    password_key_seed: &[u8],
    encrypted_nonce: &[u8],
    terminal_nonce: &[u8],
    agreement_private_key: &BoxedUint,
) -> Result<SessionKeys, CommunicationError> {
    let nonce = decrypt_nonce(cipher_and_mac, password_key_seed, encrypted_nonce);

    // send our plaintext nonce; the response carries no data
    let request_data = dynamic_authentication_request(vec![
        Tlv::primitive(0x81u32, terminal_nonce.to_vec()),
    ]);
    general_authenticate(card, Operation::MapNonce, false, request_data)?;

    let ops = cipher_and_mac.ops();
    let pseudorandom = ops.integrated_mapping_pseudorandom_function(
        &nonce,
        terminal_nonce,
        key_exchange.mapping_modulus(),
    );
    let mapped_exchange = key_exchange.derive_integrated_mapping(&pseudorandom);

    agree_and_authenticate(
        card,
        protocol,
        &mapped_exchange,
        cipher_and_mac,
        agreement_private_key,
        false,
    )
}


/// Authenticates against the chip using PACE, reading the protocol choice
/// from the content of `EF.CardAccess`.
///
/// The first advertised protocol with standardized domain parameters that
/// this crate understands is used. On success the card is wrapped into a
/// Secure Messaging session keyed by the negotiated session keys; for
/// chip-authentication mapping the decrypted chip authentication data is
/// returned as well, to be checked against DG14.
#[instrument(skip_all)]
pub fn establish(
    mut card: Box<dyn SmartCard>,
    card_access: &[u8],
    password: &Password,
) -> Result<(Box<dyn SmartCard>, Option<Vec<u8>>), CommunicationError> {
    // card_access is the data in EF.CardAccess, which is DER-encoded
    let pace_info = find_pace_info(card_access)?;
    let protocol_oid: &Oid = &pace_info.protocol;
    let protocol = protocol_for_oid(protocol_oid)
        .ok_or(Error::NoSupportedProtocol)?;

    // standardized domain parameters are numbered 0 through 18
    let parameter_id = pace_info.parameter_id
        .as_ref()
        .and_then(|id| (0i64..=18).find(|candidate| &rasn::types::Integer::from(*candidate) == id))
        .ok_or(Error::UnsupportedParameterId { parameter_id: -1 })?;
    let key_exchange = standardized_domain_parameters(parameter_id)
        .ok_or(Error::UnsupportedParameterId { parameter_id })?;

    set_authentication_template(&mut *card, protocol_oid, password.source())?;
    let encrypted_nonce = obtain_encrypted_nonce(&mut *card)?;

    let password_key_seed = password.key_seed();
    let derivation_private_key = key_exchange.generate_private_key();
    let agreement_private_key = key_exchange.generate_private_key();

    let session_keys = match protocol.mapping {
        Mapping::Generic|Mapping::ChipAuthentication => {
            perform_gm_kex_from_password_seed(
                &mut *card,
                protocol_oid,
                key_exchange,
                protocol.cipher_and_mac,
                &password_key_seed,
                &encrypted_nonce,
                &derivation_private_key,
                &agreement_private_key,
                matches!(protocol.mapping, Mapping::ChipAuthentication),
            )?
        },
        Mapping::Integrated => {
            let ops = protocol.cipher_and_mac.ops();
            let mut terminal_nonce = Zeroizing::new(vec![0u8; ops.cipher_key_size()]);
            {
                use rand::RngCore;
                rand::rngs::OsRng.fill_bytes(terminal_nonce.as_mut_slice());
            }
            perform_im_kex_from_password_seed(
                &mut *card,
                protocol_oid,
                key_exchange,
                protocol.cipher_and_mac,
                &password_key_seed,
                &encrypted_nonce,
                &terminal_nonce,
                &agreement_private_key,
            )?
        },
    };

    let chip_authentication_data = session_keys.chip_authentication_data.clone();
    let secured = session_keys.into_secure_messaging(card);
    Ok((secured, chip_authentication_data))
}

/// Picks the first supported `PaceInfo` out of the `EF.CardAccess` security
/// infos.
fn find_pace_info(card_access: &[u8]) -> Result<PaceInfo, Error> {
    // try to decode its base structure as a SET OF Any (SetOf<Any>)
    let security_infos: SetOf<Any> = rasn::der::decode(card_access)
        .map_err(|e| Error::CardAccessDecoding(e))?;

    // now try to decode each of its entries as a SEQUENCE OF Any (Vec<Any>)
    for (entry_index, security_info) in security_infos.to_vec().into_iter().enumerate() {
        let security_info_seq: Vec<Any> = rasn::der::decode(security_info.as_bytes())
            .map_err(|error| Error::CardAccessEntryDecoding { entry_index, error })?;
        if security_info_seq.len() < 1 {
            // assume an irrelevant structure and skip
            continue;
        }
        let Ok(security_info_oid): Result<ObjectIdentifier, _> = rasn::der::decode(security_info_seq[0].as_bytes()) else {
            // assume an irrelevant structure and skip
            continue;
        };
        if !PACE_PROTOCOL_OIDS.contains(&&*security_info_oid) {
            // not relevant
            continue;
        }

        // try to decode the whole thing as a PaceInfo now
        let pace_info: PaceInfo = rasn::der::decode(security_info.as_bytes())
            .map_err(|error| Error::CardAccessEntryDecodingPace { entry_index, error })?;
        return Ok(pace_info);
    }
    Err(Error::NoSupportedProtocol)
}
