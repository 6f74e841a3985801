//! Signature schemes used by the document security object and the
//! authenticity protocols.
//!
//! RSA arithmetic is performed directly on the key components with the `rsa`
//! crate's big integers; EMSA encodings are applied by hand so that both the
//! CMS signatures of the security object and the ISO/IEC 9796-2 scheme of
//! Active Authentication run through the same public-key operation. ECDSA is
//! verified over [`crate::crypt::elliptic`].


use std::fmt;
use std::ops::Mul;

use crypto_bigint::BoxedUint;
use crypto_bigint::modular::{BoxedMontyForm, BoxedMontyParams};
use digest::Digest;
use rasn::types::{ObjectIdentifier, Oid};
use rsa::BigUint;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::crypt::boxed_uint_from_be_slice;
use crate::crypt::elliptic::{curves, AffinePoint, PrimeWeierstrassCurve};
use crate::tlv::Tlv;


#[derive(Debug)]
pub enum Error {
    UnsupportedAlgorithm { oid: String },
    CryptoFailed { stage: &'static str },
    MalformedKey { reason: &'static str },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::UnsupportedAlgorithm { oid }
                => write!(f, "unsupported algorithm {}", oid),
            Self::CryptoFailed { stage }
                => write!(f, "cryptographic operation failed at stage {:?}", stage),
            Self::MalformedKey { reason }
                => write!(f, "malformed public key: {}", reason),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


/// A hash function from the SHA family.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}
impl DigestAlgorithm {
    pub fn output_size(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha224 => Sha224::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// The DER prefix of the `DigestInfo` structure for this hash, used by
    /// EMSA-PKCS1-v1_5.
    pub fn digest_info_prefix(&self) -> &'static [u8] {
        match self {
            Self::Sha1 => &[0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2B, 0x0E, 0x03, 0x02, 0x1A, 0x05, 0x00, 0x04, 0x14],
            Self::Sha224 => &[0x30, 0x2D, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04, 0x05, 0x00, 0x04, 0x1C],
            Self::Sha256 => &[0x30, 0x31, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00, 0x04, 0x20],
            Self::Sha384 => &[0x30, 0x41, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02, 0x05, 0x00, 0x04, 0x30],
            Self::Sha512 => &[0x30, 0x51, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03, 0x05, 0x00, 0x04, 0x40],
        }
    }

    /// The dotted identifier of this digest algorithm.
    pub fn oid_arcs(&self) -> &'static [u32] {
        match self {
            Self::Sha1 => &[1, 3, 14, 3, 2, 26],
            Self::Sha224 => &[2, 16, 840, 1, 101, 3, 4, 2, 4],
            Self::Sha256 => &[2, 16, 840, 1, 101, 3, 4, 2, 1],
            Self::Sha384 => &[2, 16, 840, 1, 101, 3, 4, 2, 2],
            Self::Sha512 => &[2, 16, 840, 1, 101, 3, 4, 2, 3],
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        ObjectIdentifier::new(self.oid_arcs().to_vec()).unwrap()
    }

    pub fn try_from_oid(oid: &Oid) -> Result<Self, Error> {
        let all = [Self::Sha1, Self::Sha224, Self::Sha256, Self::Sha384, Self::Sha512];
        for candidate in all {
            if oid.iter().copied().eq(candidate.oid_arcs().iter().copied()) {
                return Ok(candidate);
            }
        }
        Err(Error::UnsupportedAlgorithm { oid: format!("{:?}", oid) })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }
}


/// An RSA public key as its raw components.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RsaPublicKeyData {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}
impl RsaPublicKeyData {
    /// Size of the modulus in bytes.
    pub fn modulus_size(&self) -> usize {
        let mut modulus = &self.modulus[..];
        while modulus.first() == Some(&0x00) {
            modulus = &modulus[1..];
        }
        modulus.len()
    }

    /// The raw public-key operation `s^e mod n`, returning the result
    /// left-padded to the modulus size.
    pub fn public_operation(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let n = BigUint::from_bytes_be(&self.modulus);
        let e = BigUint::from_bytes_be(&self.exponent);
        let s = BigUint::from_bytes_be(input);
        if s >= n {
            return Err(Error::CryptoFailed { stage: "signature out of range" });
        }
        let em = s.modpow(&e, &n);
        let mut em_bytes = em.to_bytes_be();
        let k = self.modulus_size();
        while em_bytes.len() < k {
            em_bytes.insert(0, 0x00);
        }
        Ok(em_bytes)
    }

    /// RSASSA-PKCS1-v1_5 verification.
    pub fn verify_pkcs1v15(&self, digest_algorithm: DigestAlgorithm, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        let em = self.public_operation(signature)?;
        let expected = emsa_pkcs1_v1_5(digest_algorithm, message, em.len())?;
        if bool::from(em.ct_eq(&expected)) {
            Ok(())
        } else {
            Err(Error::CryptoFailed { stage: "PKCS#1 v1.5 comparison" })
        }
    }

    /// RSASSA-PSS verification with MGF1 and a salt as long as the hash.
    pub fn verify_pss(&self, digest_algorithm: DigestAlgorithm, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        let em = self.public_operation(signature)?;
        let mod_bits = 8 * self.modulus_size();
        // emBits = modBits - 1, so the encoded message may be one byte shorter
        let em_bits = mod_bits - 1;
        let em_len = (em_bits + 7) / 8;
        let em = &em[em.len()-em_len..];

        let h_len = digest_algorithm.output_size();
        let s_len = h_len;
        if em_len < h_len + s_len + 2 {
            return Err(Error::CryptoFailed { stage: "PSS length check" });
        }
        if em[em_len-1] != 0xBC {
            return Err(Error::CryptoFailed { stage: "PSS trailer" });
        }

        let masked_db = &em[0..em_len-h_len-1];
        let h = &em[em_len-h_len-1..em_len-1];
        let top_bits = 8*em_len - em_bits;
        if top_bits > 0 && masked_db[0] >> (8 - top_bits) != 0 {
            return Err(Error::CryptoFailed { stage: "PSS leading bits" });
        }

        let db_mask = mgf1(digest_algorithm, h, masked_db.len());
        let mut db: Vec<u8> = masked_db.iter().zip(db_mask.iter()).map(|(m, k)| m ^ k).collect();
        if top_bits > 0 {
            db[0] &= 0xFF >> top_bits;
        }

        for byte in &db[0..em_len-h_len-s_len-2] {
            if *byte != 0x00 {
                return Err(Error::CryptoFailed { stage: "PSS padding" });
            }
        }
        if db[em_len-h_len-s_len-2] != 0x01 {
            return Err(Error::CryptoFailed { stage: "PSS separator" });
        }
        let salt = &db[db.len()-s_len..];

        let m_hash = digest_algorithm.hash(message);
        let mut m_prime = vec![0u8; 8];
        m_prime.extend(&m_hash);
        m_prime.extend(salt);
        let h_prime = digest_algorithm.hash(&m_prime);

        if bool::from(h_prime.ct_eq(h)) {
            Ok(())
        } else {
            Err(Error::CryptoFailed { stage: "PSS comparison" })
        }
    }
}


/// EMSA-PKCS1-v1_5: `00 01 FF…FF 00 || DigestInfo(H(m))`.
pub fn emsa_pkcs1_v1_5(digest_algorithm: DigestAlgorithm, message: &[u8], em_len: usize) -> Result<Vec<u8>, Error> {
    let digest_info_len = digest_algorithm.digest_info_prefix().len() + digest_algorithm.output_size();
    if em_len < digest_info_len + 11 {
        return Err(Error::CryptoFailed { stage: "EMSA-PKCS1 length check" });
    }
    let mut em = Vec::with_capacity(em_len);
    em.push(0x00);
    em.push(0x01);
    em.resize(em_len - digest_info_len - 1, 0xFF);
    em.push(0x00);
    em.extend(digest_algorithm.digest_info_prefix());
    em.extend(digest_algorithm.hash(message));
    Ok(em)
}

/// The MGF1 mask generation function.
fn mgf1(digest_algorithm: DigestAlgorithm, seed: &[u8], mask_len: usize) -> Vec<u8> {
    let mut mask = Vec::with_capacity(mask_len);
    let mut counter: u32 = 0;
    while mask.len() < mask_len {
        let mut input = seed.to_vec();
        input.extend(counter.to_be_bytes());
        mask.extend(digest_algorithm.hash(&input));
        counter += 1;
    }
    mask.truncate(mask_len);
    mask
}


/// A document-signing private key for building security objects.
pub struct RsaSigningKey {
    key: rsa::RsaPrivateKey,
}
impl RsaSigningKey {
    pub fn new(key: rsa::RsaPrivateKey) -> Self {
        Self { key }
    }

    pub fn public_key_data(&self) -> RsaPublicKeyData {
        RsaPublicKeyData {
            modulus: self.key.n().to_bytes_be(),
            exponent: self.key.e().to_bytes_be(),
        }
    }

    /// RSASSA-PKCS1-v1_5 signature generation: EMSA encode, then `m^d mod n`.
    pub fn sign_pkcs1v15(&self, digest_algorithm: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>, Error> {
        let k = self.key.size();
        let em = emsa_pkcs1_v1_5(digest_algorithm, message, k)?;
        let m = BigUint::from_bytes_be(&em);
        let signature = m.modpow(self.key.d(), self.key.n());
        let mut sig_bytes = signature.to_bytes_be();
        while sig_bytes.len() < k {
            sig_bytes.insert(0, 0x00);
        }
        Ok(sig_bytes)
    }
}


/// An elliptic-curve public key with the subgroup order needed for ECDSA.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EcPublicKey {
    pub curve: PrimeWeierstrassCurve,
    pub subgroup_order: BoxedUint,
    pub point: AffinePoint,
}
impl EcPublicKey {
    /// ECDSA verification. The signature is accepted either as the DER
    /// `SEQUENCE { r INTEGER, s INTEGER }` used by CMS or as the plain `r‖s`
    /// concatenation returned by INTERNAL AUTHENTICATE.
    pub fn verify_ecdsa(&self, digest: &[u8], signature: &[u8]) -> Result<(), Error> {
        let (r, s) = decode_ecdsa_signature(signature)
            .ok_or(Error::CryptoFailed { stage: "ECDSA signature decoding" })?;

        let order = &self.subgroup_order;
        let precision = order.bits_precision();
        let r = r.widen(precision);
        let s = s.widen(precision);
        if bool::from(r.is_zero()) || bool::from(s.is_zero()) || &r >= order || &s >= order {
            return Err(Error::CryptoFailed { stage: "ECDSA range check" });
        }

        // leftmost bits(order) bits of the digest
        let mut z = boxed_uint_from_be_slice(digest);
        let digest_bits = u32::try_from(8 * digest.len()).unwrap();
        if digest_bits > order.bits() {
            z = &z >> (digest_bits - order.bits());
        }
        let wide = precision.max(z.bits_precision());
        let z = z.widen(wide)
            .rem(&crypto_bigint::NonZero::new(order.widen(wide)).unwrap())
            .shorten(precision);

        let params = BoxedMontyParams::new(order.to_odd().unwrap());
        let s_monty = BoxedMontyForm::new(s.clone(), params.clone());
        let w = s_monty.invert().into_option()
            .ok_or(Error::CryptoFailed { stage: "ECDSA inversion" })?;
        let u1 = BoxedMontyForm::new(z, params.clone()).mul(&w).retrieve();
        let u2 = BoxedMontyForm::new(r.clone(), params).mul(&w).retrieve();

        let point = self.curve.multiply_and_add(&u1, self.curve.generator(), &u2, &self.point)
            .ok_or(Error::CryptoFailed { stage: "ECDSA point computation" })?;

        let v_precision = point.x().bits_precision().max(precision);
        let v = point.x().widen(v_precision)
            .rem(&crypto_bigint::NonZero::new(order.widen(v_precision)).unwrap())
            .shorten(precision);
        if v == r {
            Ok(())
        } else {
            Err(Error::CryptoFailed { stage: "ECDSA comparison" })
        }
    }
}

/// Splits an ECDSA signature into `(r, s)`, accepting both the DER sequence
/// and the plain concatenated form.
fn decode_ecdsa_signature(signature: &[u8]) -> Option<(BoxedUint, BoxedUint)> {
    if signature.first() == Some(&0x30) {
        let (tlv, rest) = Tlv::parse(signature).ok()?;
        if rest.is_empty() {
            let children = tlv.children()?;
            if children.len() == 2 {
                let r = children[0].primitive_value()?;
                let s = children[1].primitive_value()?;
                return Some((
                    crate::der_util::uint_from_der_bytes(r).ok()?,
                    crate::der_util::uint_from_der_bytes(s).ok()?,
                ));
            }
        }
    }
    if signature.len() % 2 != 0 || signature.is_empty() {
        return None;
    }
    let half = signature.len() / 2;
    Some((
        boxed_uint_from_be_slice(&signature[0..half]),
        boxed_uint_from_be_slice(&signature[half..]),
    ))
}


/// A finite-field Diffie-Hellman public key with its domain parameters.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DhPublicKey {
    pub params: crate::crypt::dh::DiffieHellmanParams,
    pub value: BoxedUint,
}

/// A public key recovered from a `SubjectPublicKeyInfo` structure.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PublicKey {
    Rsa(RsaPublicKeyData),
    Ec(EcPublicKey),
    Dh(DhPublicKey),
}

const OID_RSA_ENCRYPTION: &[u32] = &[1, 2, 840, 113549, 1, 1, 1];
const OID_EC_PUBLIC_KEY: &[u32] = &[1, 2, 840, 10045, 2, 1];
const OID_PRIME_FIELD: &[u32] = &[1, 2, 840, 10045, 1, 1];
const OID_DH_PUBLIC_NUMBER: &[u32] = &[1, 2, 840, 10046, 2, 1];

/// Parses a DER `SubjectPublicKeyInfo`, as found in DG14, DG15 and the
/// document signer certificate.
///
/// Elliptic-curve keys are accepted with either a named curve or explicit
/// prime-field domain parameters; the subgroup order is taken from whichever
/// form is present.
pub fn parse_subject_public_key_info(der: &[u8]) -> Result<PublicKey, Error> {
    let (spki, _rest) = Tlv::parse(der)
        .map_err(|_| Error::MalformedKey { reason: "SubjectPublicKeyInfo does not parse" })?;
    let children = spki.children()
        .ok_or(Error::MalformedKey { reason: "SubjectPublicKeyInfo is not constructed" })?;
    if children.len() < 2 {
        return Err(Error::MalformedKey { reason: "SubjectPublicKeyInfo too short" });
    }

    let algorithm = &children[0];
    let algorithm_children = algorithm.children()
        .ok_or(Error::MalformedKey { reason: "AlgorithmIdentifier is not constructed" })?;
    let algorithm_oid_bytes = algorithm_children.first()
        .and_then(|c| c.primitive_value())
        .ok_or(Error::MalformedKey { reason: "algorithm OID missing" })?;

    let public_key_bits = children[1].primitive_value()
        .ok_or(Error::MalformedKey { reason: "subjectPublicKey is not primitive" })?;
    if public_key_bits.is_empty() {
        return Err(Error::MalformedKey { reason: "subjectPublicKey empty" });
    }
    // BIT STRING: the first content octet is the unused-bit count
    let public_key_bytes = &public_key_bits[1..];

    if oid_content_matches(algorithm_oid_bytes, OID_RSA_ENCRYPTION) {
        let (rsa_key, _) = Tlv::parse(public_key_bytes)
            .map_err(|_| Error::MalformedKey { reason: "RSAPublicKey does not parse" })?;
        let rsa_children = rsa_key.children()
            .ok_or(Error::MalformedKey { reason: "RSAPublicKey is not constructed" })?;
        if rsa_children.len() != 2 {
            return Err(Error::MalformedKey { reason: "RSAPublicKey must hold modulus and exponent" });
        }
        let modulus = rsa_children[0].primitive_value()
            .ok_or(Error::MalformedKey { reason: "modulus is not primitive" })?;
        let exponent = rsa_children[1].primitive_value()
            .ok_or(Error::MalformedKey { reason: "exponent is not primitive" })?;
        return Ok(PublicKey::Rsa(RsaPublicKeyData {
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        }));
    }

    if oid_content_matches(algorithm_oid_bytes, OID_EC_PUBLIC_KEY) {
        let parameters = algorithm_children.get(1)
            .ok_or(Error::MalformedKey { reason: "EC domain parameters missing" })?;
        let (curve, subgroup_order) = parse_ec_domain_parameters(parameters)?;
        let point = AffinePoint::try_from_be_bytes(public_key_bytes)
            .ok_or(Error::MalformedKey { reason: "EC point is not an uncompressed point" })?;
        return Ok(PublicKey::Ec(EcPublicKey {
            curve,
            subgroup_order,
            point,
        }));
    }

    if oid_content_matches(algorithm_oid_bytes, OID_DH_PUBLIC_NUMBER) {
        let parameters = algorithm_children.get(1)
            .ok_or(Error::MalformedKey { reason: "DH domain parameters missing" })?;
        let parameter_children = parameters.children()
            .ok_or(Error::MalformedKey { reason: "DomainParameters is not constructed" })?;
        if parameter_children.len() < 3 {
            return Err(Error::MalformedKey { reason: "DomainParameters too short" });
        }
        let prime = parameter_children[0].primitive_value()
            .ok_or(Error::MalformedKey { reason: "DH prime is not primitive" })
            .and_then(|bytes| crate::der_util::uint_from_der_bytes(bytes)
                .map_err(|_| Error::MalformedKey { reason: "DH prime does not decode" }))?;
        let generator = parameter_children[1].primitive_value()
            .ok_or(Error::MalformedKey { reason: "DH generator is not primitive" })
            .and_then(|bytes| crate::der_util::uint_from_der_bytes(bytes)
                .map_err(|_| Error::MalformedKey { reason: "DH generator does not decode" }))?;
        let subgroup_order = parameter_children[2].primitive_value()
            .ok_or(Error::MalformedKey { reason: "DH subgroup order is not primitive" })
            .and_then(|bytes| crate::der_util::uint_from_der_bytes(bytes)
                .map_err(|_| Error::MalformedKey { reason: "DH subgroup order does not decode" }))?;

        // the bit string wraps a DER INTEGER holding the public value
        let (value_tlv, _) = Tlv::parse(public_key_bytes)
            .map_err(|_| Error::MalformedKey { reason: "DH public value does not parse" })?;
        let value = value_tlv.primitive_value()
            .ok_or(Error::MalformedKey { reason: "DH public value is not primitive" })
            .and_then(|bytes| crate::der_util::uint_from_der_bytes(bytes)
                .map_err(|_| Error::MalformedKey { reason: "DH public value does not decode" }))?;

        return Ok(PublicKey::Dh(DhPublicKey {
            params: crate::crypt::dh::DiffieHellmanParams::new(prime, generator, subgroup_order),
            value,
        }));
    }

    Err(Error::UnsupportedAlgorithm { oid: hex_arc_string(algorithm_oid_bytes) })
}

fn parse_ec_domain_parameters(parameters: &Tlv) -> Result<(PrimeWeierstrassCurve, BoxedUint), Error> {
    if let Some(named_oid_bytes) = parameters.primitive_value() {
        // namedCurve form
        let arcs = decode_oid_arcs(named_oid_bytes)
            .ok_or(Error::MalformedKey { reason: "named curve OID does not decode" })?;
        let oid = ObjectIdentifier::new(arcs)
            .ok_or(Error::MalformedKey { reason: "named curve OID invalid" })?;
        return curves::curve_and_order_for_oid(&oid)
            .ok_or(Error::UnsupportedAlgorithm { oid: format!("{:?}", oid) });
    }

    // explicit ECParameters
    let children = parameters.children()
        .ok_or(Error::MalformedKey { reason: "ECParameters is not constructed" })?;
    if children.len() < 5 {
        return Err(Error::MalformedKey { reason: "ECParameters too short" });
    }

    let field_id = children[1].children()
        .ok_or(Error::MalformedKey { reason: "fieldID is not constructed" })?;
    let field_type = field_id.first()
        .and_then(|c| c.primitive_value())
        .ok_or(Error::MalformedKey { reason: "fieldType missing" })?;
    if !oid_content_matches(field_type, OID_PRIME_FIELD) {
        return Err(Error::UnsupportedAlgorithm { oid: hex_arc_string(field_type) });
    }
    let prime_bytes = field_id.get(1)
        .and_then(|c| c.primitive_value())
        .ok_or(Error::MalformedKey { reason: "field prime missing" })?;

    let curve_seq = children[2].children()
        .ok_or(Error::MalformedKey { reason: "curve is not constructed" })?;
    if curve_seq.len() < 2 {
        return Err(Error::MalformedKey { reason: "curve coefficients missing" });
    }
    let a_bytes = curve_seq[0].primitive_value()
        .ok_or(Error::MalformedKey { reason: "coefficient a is not primitive" })?;
    let b_bytes = curve_seq[1].primitive_value()
        .ok_or(Error::MalformedKey { reason: "coefficient b is not primitive" })?;

    let base_bytes = children[3].primitive_value()
        .ok_or(Error::MalformedKey { reason: "base point is not primitive" })?;
    let order_bytes = children[4].primitive_value()
        .ok_or(Error::MalformedKey { reason: "order is not primitive" })?;

    let cofactor = match children.get(5).and_then(|c| c.primitive_value()) {
        Some(bytes) => crate::der_util::int_from_der_bytes(bytes)
            .ok().and_then(|v| u8::try_from(v).ok())
            .ok_or(Error::MalformedKey { reason: "cofactor does not decode" })?,
        None => 1,
    };

    let generator = AffinePoint::try_from_be_bytes(base_bytes)
        .ok_or(Error::MalformedKey { reason: "base point is not an uncompressed point" })?;
    let prime = crate::der_util::uint_from_der_bytes(prime_bytes)
        .map_err(|_| Error::MalformedKey { reason: "field prime does not decode" })?;
    let order = crate::der_util::uint_from_der_bytes(order_bytes)
        .map_err(|_| Error::MalformedKey { reason: "order does not decode" })?;

    let curve = PrimeWeierstrassCurve::new(
        prime,
        boxed_uint_from_be_slice(a_bytes),
        boxed_uint_from_be_slice(b_bytes),
        generator,
        cofactor,
    );
    Ok((curve, order))
}

fn oid_content_matches(content: &[u8], arcs: &[u32]) -> bool {
    match decode_oid_arcs(content) {
        Some(decoded) => decoded == arcs,
        None => false,
    }
}

/// Decodes OID content octets into their arcs.
fn decode_oid_arcs(content: &[u8]) -> Option<Vec<u32>> {
    if content.is_empty() {
        return None;
    }
    let mut arcs = Vec::new();
    let mut accumulator: u32 = 0;
    for (index, byte) in content.iter().enumerate() {
        accumulator = accumulator.checked_mul(128)?
            .checked_add(u32::from(byte & 0x7F))?;
        if byte & 0x80 == 0 {
            if arcs.is_empty() && index <= 4 {
                let first = if accumulator < 40 { 0 } else if accumulator < 80 { 1 } else { 2 };
                arcs.push(first);
                arcs.push(accumulator - 40*first);
            } else {
                arcs.push(accumulator);
            }
            accumulator = 0;
        }
    }
    if accumulator != 0 {
        return None;
    }
    Some(arcs)
}

fn hex_arc_string(content: &[u8]) -> String {
    match decode_oid_arcs(content) {
        Some(arcs) => {
            arcs.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(".")
        },
        None => {
            content.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_pkcs1v15_sign_verify_round_trip() {
        let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation");
        let signer = RsaSigningKey::new(private_key);
        let public = signer.public_key_data();

        let message = b"attributes to be signed";
        let signature = signer.sign_pkcs1v15(DigestAlgorithm::Sha256, message).expect("signing");
        public.verify_pkcs1v15(DigestAlgorithm::Sha256, message, &signature).expect("verification");

        let mut tampered = signature.clone();
        tampered[12] ^= 0x40;
        assert!(public.verify_pkcs1v15(DigestAlgorithm::Sha256, message, &tampered).is_err());
        assert!(public.verify_pkcs1v15(DigestAlgorithm::Sha256, b"different message", &signature).is_err());
    }

    #[test]
    fn test_ecdsa_verify_brainpool_p256() {
        use crate::crypt::elliptic::curves::{get_brainpool_p256r1, get_brainpool_p256r1_order};
        use crypto_bigint::modular::{BoxedMontyForm, BoxedMontyParams};
        use std::ops::Mul;

        // fixed-scalar ECDSA signature built inline, then checked by the verifier
        let curve = get_brainpool_p256r1();
        let order = get_brainpool_p256r1_order();
        let precision = order.bits_precision();

        // deterministic fixed-scalar example
        let d = boxed_uint_from_be_slice(&[0x27; 32]).widen(precision);
        let k = boxed_uint_from_be_slice(&[0x35; 32]).widen(precision);

        let public_point = curve.calculate_public_key(&d);
        let digest = DigestAlgorithm::Sha256.hash(b"challenge data");
        let z = boxed_uint_from_be_slice(&digest).widen(precision);

        // r = (k*G).x mod n
        let k_point = curve.calculate_public_key(&k);
        let r = k_point.x().widen(precision * 2)
            .rem(&crypto_bigint::NonZero::new(order.widen(precision * 2)).unwrap())
            .shorten(precision);

        // s = k^-1 (z + r d) mod n
        let params = BoxedMontyParams::new(order.to_odd().unwrap());
        let k_inv = BoxedMontyForm::new(k.clone(), params.clone()).invert().into_option().unwrap();
        let rd = BoxedMontyForm::new(r.clone(), params.clone())
            .mul(&BoxedMontyForm::new(d.clone(), params.clone()));
        let z_m = BoxedMontyForm::new(
            z.widen(precision * 2)
                .rem(&crypto_bigint::NonZero::new(order.widen(precision * 2)).unwrap())
                .shorten(precision),
            params.clone(),
        );
        let s = z_m.add(&rd).mul(&k_inv).retrieve();

        let mut signature = Vec::new();
        let r_bytes = r.to_be_bytes();
        let s_bytes = s.to_be_bytes();
        signature.extend(&r_bytes[r_bytes.len()-32..]);
        signature.extend(&s_bytes[s_bytes.len()-32..]);

        let key = EcPublicKey {
            curve,
            subgroup_order: order,
            point: public_point,
        };
        key.verify_ecdsa(&digest, &signature).expect("ECDSA verification");

        let mut tampered = signature.clone();
        tampered[40] ^= 0x01;
        assert!(key.verify_ecdsa(&digest, &tampered).is_err());
    }
}
