use std::collections::BTreeMap;

use chrono::TimeZone;
use emrtd_core::crypt::signature::{DigestAlgorithm, RsaSigningKey};
use emrtd_core::der_util;
use emrtd_core::lds::sod::{Error as SodError, SodFile};
use emrtd_core::tlv::Tlv;
use rand::rngs::OsRng;
use rasn::types::{Any, Integer, ObjectIdentifier, Oid, SetOf};
use rsa::traits::PublicKeyParts;


const ID_RSA_ENCRYPTION: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 1]);
const ID_SHA256_WITH_RSA: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 11]);
const ID_COUNTRY_NAME: &'static Oid = Oid::const_new(&[2, 5, 4, 6]);


/// Builds the DER `RSAPublicKey` structure for the signer's public half.
fn rsa_public_key_der(key: &rsa::RsaPrivateKey) -> Vec<u8> {
    use emrtd_core::crypt::boxed_uint_from_be_slice;

    let n = boxed_uint_from_be_slice(&key.n().to_bytes_be());
    let e = boxed_uint_from_be_slice(&key.e().to_bytes_be());
    Tlv::constructed(0x30u32, vec![
        Tlv::primitive(0x02u32, der_util::uint_to_der_bytes(&n)),
        Tlv::primitive(0x02u32, der_util::uint_to_der_bytes(&e)),
    ]).to_bytes()
}

fn test_name() -> rasn_pkix::Name {
    let attribute = rasn_pkix::AttributeTypeAndValue {
        r#type: ID_COUNTRY_NAME.to_owned(),
        value: Any::new(vec![0x13, 0x02, 0x55, 0x54]), // PrintableString "UT"
    };
    rasn_pkix::Name::RdnSequence(vec![SetOf::from_vec(vec![attribute])])
}

/// Builds a minimal self-signed document signer certificate for the test
/// key.
fn self_signed_dsc(signer: &RsaSigningKey, key: &rsa::RsaPrivateKey) -> Vec<u8> {
    let algorithm = rasn_pkix::AlgorithmIdentifier {
        algorithm: ID_SHA256_WITH_RSA.to_owned(),
        parameters: Some(Any::new(vec![0x05, 0x00])),
    };

    let subject_public_key_info = rasn_pkix::SubjectPublicKeyInfo {
        algorithm: rasn_pkix::AlgorithmIdentifier {
            algorithm: ID_RSA_ENCRYPTION.to_owned(),
            parameters: Some(Any::new(vec![0x05, 0x00])),
        },
        subject_public_key: rasn::types::BitString::from_vec(rsa_public_key_der(key)),
    };

    let validity = rasn_pkix::Validity {
        not_before: rasn_pkix::Time::Utc(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        not_after: rasn_pkix::Time::Utc(chrono::Utc.with_ymd_and_hms(2034, 1, 1, 0, 0, 0).unwrap()),
    };

    let tbs_certificate = rasn_pkix::TbsCertificate {
        version: Integer::from(2), // v3
        serial_number: Integer::from(0x1DC5A4),
        signature: algorithm.clone(),
        issuer: test_name(),
        validity,
        subject: test_name(),
        subject_public_key_info,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };

    let tbs_der = rasn::der::encode(&tbs_certificate).expect("TBS encoding");
    let signature = signer.sign_pkcs1v15(DigestAlgorithm::Sha256, &tbs_der).expect("signing");

    let certificate = rasn_pkix::Certificate {
        tbs_certificate,
        signature_algorithm: algorithm,
        signature_value: rasn::types::BitString::from_vec(signature),
    };
    rasn::der::encode(&certificate).expect("certificate encoding")
}


#[test]
fn test_build_parse_verify_and_tamper() {
    let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
    let signer = RsaSigningKey::new(private_key.clone());
    let dsc_der = self_signed_dsc(&signer, &private_key);

    // two data groups, hashed over their full encodings
    let dg1_bytes = {
        use emrtd_core::lds::dg1::Dg1File;
        use emrtd_core::lds::mrz::MrzData;
        use emrtd_core::lds::LdsFile;
        const TD3: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<L898902C36UTO7408122F1204159ZE184226B<<<<<10";
        Dg1File::new(MrzData::parse(TD3).expect("MRZ")).to_bytes()
    };
    let dg2_bytes = vec![0x75, 0x03, 0x7F, 0x61, 0x00];

    let mut hashes = BTreeMap::new();
    hashes.insert(1u8, DigestAlgorithm::Sha256.hash(&dg1_bytes));
    hashes.insert(2u8, DigestAlgorithm::Sha256.hash(&dg2_bytes));

    let sod = SodFile::build(
        DigestAlgorithm::Sha256,
        &hashes,
        &signer,
        DigestAlgorithm::Sha256,
        &dsc_der,
        None,
    ).expect("building the security object");

    // parse the emitted file and verify
    let encoded = sod.encode();
    assert_eq!(encoded[0], 0x77);
    let parsed = SodFile::parse(&encoded).expect("parsing");
    assert_eq!(parsed.digest_algorithm(), DigestAlgorithm::Sha256);
    assert_eq!(parsed.data_group_hashes().len(), 2);
    assert_eq!(parsed.encode(), encoded);

    let mut data_groups = BTreeMap::new();
    data_groups.insert(1u8, dg1_bytes.clone());
    data_groups.insert(2u8, dg2_bytes.clone());
    parsed.verify(&data_groups, None).expect("verification");

    // a single flipped bit in DG2 must surface as a digest mismatch
    let mut tampered_dg2 = dg2_bytes.clone();
    tampered_dg2[4] ^= 0x01;
    let mut tampered_map = data_groups.clone();
    tampered_map.insert(2u8, tampered_dg2);
    match parsed.verify(&tampered_map, None) {
        Err(SodError::MismatchedDigest { data_group: 2 }) => {},
        other => panic!("expected MismatchedDigest for DG2, got {:?}", other.err()),
    }

    // a missing covered data group is reported as such
    let mut partial_map = data_groups.clone();
    partial_map.remove(&1u8);
    assert!(matches!(
        parsed.verify(&partial_map, None),
        Err(SodError::MissingDataGroup { data_group: 1 }),
    ));
}

#[test]
fn test_tampered_signature_is_rejected() {
    let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
    let signer = RsaSigningKey::new(private_key.clone());
    let dsc_der = self_signed_dsc(&signer, &private_key);

    let dg1_bytes = vec![0x61, 0x02, 0x5F, 0x1F];
    let dg2_bytes = vec![0x75, 0x02, 0x7F, 0x61];
    let mut hashes = BTreeMap::new();
    hashes.insert(1u8, DigestAlgorithm::Sha256.hash(&dg1_bytes));
    hashes.insert(2u8, DigestAlgorithm::Sha256.hash(&dg2_bytes));

    let sod = SodFile::build(
        DigestAlgorithm::Sha256,
        &hashes,
        &signer,
        DigestAlgorithm::Sha256,
        &dsc_der,
        Some(("0108", "060200")),
    ).expect("building the security object");
    assert_eq!(sod.lds_version(), Some("0108"));

    // replace the signing key: the signature must no longer verify
    let other_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
    let other_signer = RsaSigningKey::new(other_key.clone());
    let other_dsc = self_signed_dsc(&other_signer, &other_key);

    let forged = SodFile::build(
        DigestAlgorithm::Sha256,
        &hashes,
        &signer, // signed with the original key...
        DigestAlgorithm::Sha256,
        &other_dsc, // ...but carrying the other certificate
        None,
    ).expect("building the forged object");

    let mut data_groups = BTreeMap::new();
    data_groups.insert(1u8, dg1_bytes);
    data_groups.insert(2u8, dg2_bytes);
    assert!(matches!(
        forged.verify(&data_groups, None),
        Err(SodError::SignatureInvalid),
    ));
}
