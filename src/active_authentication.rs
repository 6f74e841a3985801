//! Active Authentication.
//!
//! The chip signs a terminal-chosen challenge with a private key that never
//! leaves the chip, proving that the document is not a copy. RSA responses
//! use the ISO/IEC 9796-2 digital signature scheme 1 with message recovery;
//! elliptic-curve responses are plain ECDSA over the challenge
//! (ICAO Doc 9303 Part 11 ยง 6.1).


use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use rasn::types::Oid;
use rsa::BigUint;
use subtle::ConstantTimeEq;
use tracing::instrument;

use crate::crypt::signature::{DigestAlgorithm, PublicKey, RsaPublicKeyData};
use crate::iso7816::apdu::{Apdu, CommandHeader, Data, Response};
use crate::iso7816::card::{CommunicationError, SmartCard};


/// Identifies Active Authentication in DG14 SecurityInfos.
pub const ID_AA: &'static Oid = Oid::const_new(&[2, 23, 136, 1, 1, 5]);


#[derive(Debug)]
pub enum Error {
    OperationFailed { response: Response },
    SignatureInvalid,
    UnsupportedAlgorithm { oid: String },
    UnsupportedKey,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::OperationFailed { response }
                => write!(f, "INTERNAL AUTHENTICATE failed with response code 0x{:04X}", response.trailer.to_word()),
            Self::SignatureInvalid
                => write!(f, "the chip's signature over the challenge does not verify"),
            Self::UnsupportedAlgorithm { oid }
                => write!(f, "unsupported Active Authentication signature algorithm {}", oid),
            Self::UnsupportedKey
                => write!(f, "DG15 holds a key type unsuitable for Active Authentication"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


/// Maps an `ecdsa-with-SHA*` signature algorithm identifier to its digest.
fn ecdsa_digest_for_oid(oid: &Oid) -> Option<DigestAlgorithm> {
    const ECDSA_WITH_SHA1: &[u32] = &[1, 2, 840, 10045, 4, 1];
    const ECDSA_WITH_SHA224: &[u32] = &[1, 2, 840, 10045, 4, 3, 1];
    const ECDSA_WITH_SHA256: &[u32] = &[1, 2, 840, 10045, 4, 3, 2];
    const ECDSA_WITH_SHA384: &[u32] = &[1, 2, 840, 10045, 4, 3, 3];
    const ECDSA_WITH_SHA512: &[u32] = &[1, 2, 840, 10045, 4, 3, 4];

    let arcs: Vec<u32> = oid.iter().copied().collect();
    if arcs == ECDSA_WITH_SHA1 {
        Some(DigestAlgorithm::Sha1)
    } else if arcs == ECDSA_WITH_SHA224 {
        Some(DigestAlgorithm::Sha224)
    } else if arcs == ECDSA_WITH_SHA256 {
        Some(DigestAlgorithm::Sha256)
    } else if arcs == ECDSA_WITH_SHA384 {
        Some(DigestAlgorithm::Sha384)
    } else if arcs == ECDSA_WITH_SHA512 {
        Some(DigestAlgorithm::Sha512)
    } else {
        None
    }
}


/// Runs Active Authentication: sends a random 8-byte challenge and verifies
/// the chip's signature against the DG15 public key.
///
/// `signature_algorithm` is the OID from an `ActiveAuthenticationInfo` in
/// DG14; it is required for elliptic-curve keys and ignored for RSA keys.
#[instrument(skip_all)]
pub fn perform<SC: SmartCard + ?Sized>(
    card: &mut SC,
    public_key: &PublicKey,
    signature_algorithm: Option<&Oid>,
) -> Result<(), CommunicationError> {
    let mut challenge = [0u8; 8];
    OsRng.fill_bytes(&mut challenge);

    let request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x88, // INTERNAL AUTHENTICATE
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::BothDataShort {
            request_data: challenge.to_vec(),
            response_data_length: 0,
        },
    };
    let response = card.communicate(&request)?;
    if response.trailer.to_word() != 0x9000 {
        return Err(Error::OperationFailed { response }.into());
    }

    verify_signature(public_key, signature_algorithm, &challenge, &response.data)
        .map_err(CommunicationError::from)
}

/// Verifies an Active Authentication response signature over a challenge.
pub fn verify_signature(
    public_key: &PublicKey,
    signature_algorithm: Option<&Oid>,
    challenge: &[u8],
    chip_signature: &[u8],
) -> Result<(), Error> {
    match public_key {
        PublicKey::Rsa(rsa_key) => {
            verify_iso9796_2_signature(rsa_key, challenge, chip_signature)
        },
        PublicKey::Ec(ec_key) => {
            let digest_algorithm = match signature_algorithm {
                Some(oid) => ecdsa_digest_for_oid(oid)
                    .ok_or_else(|| Error::UnsupportedAlgorithm { oid: format!("{:?}", oid) })?,
                None => DigestAlgorithm::Sha1,
            };
            let digest = digest_algorithm.hash(challenge);
            ec_key.verify_ecdsa(&digest, chip_signature)
                .map_err(|_| Error::SignatureInvalid)
        },
        PublicKey::Dh(_) => Err(Error::UnsupportedKey),
    }
}

/// ISO/IEC 9796-2 digital signature scheme 1 verification with partial
/// message recovery.
///
/// The recovered message is `header ‖ M1 ‖ H(M1 ‖ challenge) ‖ trailer`;
/// a trailer of `BC` implies SHA-1, `CC` carries an explicit hash
/// identifier in the preceding octet.
fn verify_iso9796_2_signature(
    rsa_key: &RsaPublicKeyData,
    challenge: &[u8],
    chip_signature: &[u8],
) -> Result<(), Error> {
    let n = BigUint::from_bytes_be(&rsa_key.modulus);
    let e = BigUint::from_bytes_be(&rsa_key.exponent);
    let s = BigUint::from_bytes_be(chip_signature);
    if s >= n {
        return Err(Error::SignatureInvalid);
    }

    // the signer may have sent min(s, n - s); try both pre-images
    let em_candidates = {
        let direct = s.modpow(&e, &n);
        let flipped = &n - &direct;
        [direct, flipped]
    };

    let k = rsa_key.modulus_size();
    for em_int in em_candidates {
        let mut em = em_int.to_bytes_be();
        while em.len() < k {
            em.insert(0, 0x00);
        }

        // header: 01xx xxxx with the partial recovery bit set
        if em[0] & 0b1100_0000 != 0b0100_0000 {
            continue;
        }

        let (digest_algorithm, trailer_len) = match em[em.len()-1] {
            0xBC => (DigestAlgorithm::Sha1, 1),
            0xCC => {
                let digest_algorithm = match em[em.len()-2] {
                    0x33 => DigestAlgorithm::Sha1,
                    0x34 => DigestAlgorithm::Sha256,
                    0x35 => DigestAlgorithm::Sha512,
                    0x36 => DigestAlgorithm::Sha384,
                    0x38 => DigestAlgorithm::Sha224,
                    _ => continue,
                };
                (digest_algorithm, 2)
            },
            _ => continue,
        };

        let digest_len = digest_algorithm.output_size();
        if em.len() < 1 + digest_len + trailer_len {
            continue;
        }
        let message_1 = &em[1..em.len()-digest_len-trailer_len];
        let embedded_digest = &em[em.len()-digest_len-trailer_len..em.len()-trailer_len];

        let mut hashed_message = message_1.to_vec();
        hashed_message.extend(challenge);
        let digest = digest_algorithm.hash(&hashed_message);

        if bool::from(digest.ct_eq(embedded_digest)) {
            return Ok(());
        }
    }

    Err(Error::SignatureInvalid)
}


#[cfg(test)]
mod tests {
    use super::verify_signature;
    use crate::crypt::signature::{DigestAlgorithm, PublicKey, RsaPublicKeyData};
    use rand::rngs::OsRng;
    use rsa::BigUint;
    use rsa::traits::{PrivateKeyParts, PublicKeyParts};

    /// Builds an ISO 9796-2 scheme 1 signature the way a chip would.
    fn chip_sign(private_key: &rsa::RsaPrivateKey, challenge: &[u8]) -> Vec<u8> {
        let k = private_key.size();
        let digest_len = DigestAlgorithm::Sha1.output_size();

        // header 6A, maximal recoverable message, SHA-1 digest, trailer BC
        let message_1_len = k - 2 - digest_len;
        let message_1 = vec![0x5Au8; message_1_len];

        let mut hashed_message = message_1.clone();
        hashed_message.extend(challenge);
        let digest = DigestAlgorithm::Sha1.hash(&hashed_message);

        let mut em = Vec::with_capacity(k);
        em.push(0x6A);
        em.extend(&message_1);
        em.extend(&digest);
        em.push(0xBC);

        let m = BigUint::from_bytes_be(&em);
        let signature = m.modpow(private_key.d(), private_key.n());
        let mut sig_bytes = signature.to_bytes_be();
        while sig_bytes.len() < k {
            sig_bytes.insert(0, 0x00);
        }
        sig_bytes
    }

    #[test]
    fn test_iso9796_2_round_trip() {
        let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation");
        let public_key = PublicKey::Rsa(RsaPublicKeyData {
            modulus: private_key.n().to_bytes_be(),
            exponent: private_key.e().to_bytes_be(),
        });

        let challenge = [0xF1u8, 0x73, 0x58, 0x97, 0x44, 0x0F, 0xD2, 0x3B];
        let signature = chip_sign(&private_key, &challenge);

        verify_signature(&public_key, None, &challenge, &signature).expect("verification");

        let mut wrong_challenge = challenge;
        wrong_challenge[0] ^= 0x01;
        assert!(verify_signature(&public_key, None, &wrong_challenge, &signature).is_err());

        let mut tampered = signature.clone();
        tampered[17] ^= 0x80;
        assert!(verify_signature(&public_key, None, &challenge, &tampered).is_err());
    }
}
