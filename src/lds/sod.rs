//! EF.SOD: the document security object.
//!
//! A CMS `SignedData` container whose e-content is an `LDSSecurityObject`
//! listing one hash per data group. The document signer certificate is
//! embedded; its key signs the signed attributes (or, on older documents,
//! the e-content directly). Verifying a data group means recomputing its
//! hash from the full encoded file and comparing against the listed value.


use std::collections::BTreeMap;
use std::fmt;

use rasn::types::{Any, Integer, OctetString, Oid, SetOf};
use rasn::{AsnType, Decode, Encode};
use rasn_cms::{CertificateChoices, ContentInfo, SignedData, SignerIdentifier};

use crate::crypt::signature::{self, DigestAlgorithm, PublicKey, RsaSigningKey};
use crate::lds::{self, LdsFile, EF_SOD_TAG};
use crate::tlv::{Tag, TlvReader, TlvWriter};


/// `id-icao-ldsSecurityObject`, the standard e-content type.
pub const ID_LDS_SECURITY_OBJECT: &'static Oid = Oid::const_new(&[2, 23, 136, 1, 1, 1]);

/// Alternative e-content type seen on some issued French and Belgian
/// documents.
pub const ID_LDS_SECURITY_OBJECT_ALT: &'static Oid = Oid::const_new(&[1, 3, 27, 1, 1, 1]);

/// E-content type from an early worked example, seen on test documents.
pub const ID_LDS_SECURITY_OBJECT_SDU: &'static Oid = Oid::const_new(&[1, 2, 528, 1, 1006, 1, 20, 1]);

const ID_SIGNED_DATA: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 7, 2]);
const ID_CONTENT_TYPE_ATTR: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 9, 3]);
const ID_MESSAGE_DIGEST_ATTR: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 9, 4]);
const ID_RSA_ENCRYPTION: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 1]);
const ID_RSASSA_PSS: &'static Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 10]);


/// The ASN.1 shape of the e-content (ICAO Doc 9303 Part 10 Appendix D).
pub mod asn1 {
    use rasn::prelude::*;
    use rasn_cms::AlgorithmIdentifier;

    pub type DataGroupNumber = Integer;
    pub type DigestAlgorithmIdentifier = AlgorithmIdentifier;
    pub type LdsSecurityObjectVersion = Integer;

    #[derive(AsnType, Debug, Clone, Decode, Encode, PartialEq, Eq)]
    pub struct DataGroupHash {
        pub data_group_number: DataGroupNumber,
        pub data_group_hash_value: OctetString,
    }

    #[derive(AsnType, Debug, Clone, Decode, Encode, PartialEq, Eq)]
    pub struct LdsSecurityObject {
        pub version: LdsSecurityObjectVersion,
        pub hash_algorithm: DigestAlgorithmIdentifier,
        #[rasn(size("2..=16"))]
        pub data_group_hash_values: SequenceOf<DataGroupHash>,
        pub lds_version_info: Option<LdsVersionInfo>,
    }

    #[derive(AsnType, Debug, Clone, Decode, Encode, PartialEq, Eq)]
    pub struct LdsVersionInfo {
        pub lds_version: PrintableString,
        pub unicode_version: PrintableString,
    }
}


#[derive(Debug)]
pub enum Error {
    Lds(lds::Error),
    Asn1(rasn::error::DecodeError),
    Encode,
    Malformed { reason: &'static str },
    UnsupportedAlgorithm { oid: String },
    MismatchedDigest { data_group: u8 },
    MissingDataGroup { data_group: u8 },
    SignatureInvalid,
    UntrustedSigner,
    Signature(signature::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Lds(e)
                => write!(f, "file error: {}", e),
            Self::Asn1(e)
                => write!(f, "ASN.1 decoding error: {}", e),
            Self::Encode
                => write!(f, "ASN.1 encoding failed"),
            Self::Malformed { reason }
                => write!(f, "malformed security object: {}", reason),
            Self::UnsupportedAlgorithm { oid }
                => write!(f, "unsupported algorithm {}", oid),
            Self::MismatchedDigest { data_group }
                => write!(f, "the hash of data group {} does not match the security object", data_group),
            Self::MissingDataGroup { data_group }
                => write!(f, "data group {} is covered by the security object but was not supplied", data_group),
            Self::SignatureInvalid
                => write!(f, "the security object signature does not verify"),
            Self::UntrustedSigner
                => write!(f, "the document signer certificate does not chain to the trust anchor"),
            Self::Signature(e)
                => write!(f, "signature operation failed: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lds(e) => Some(e),
            Self::Asn1(e) => Some(e),
            Self::Signature(e) => Some(e),
            _ => None,
        }
    }
}
impl From<lds::Error> for Error {
    fn from(value: lds::Error) -> Self { Self::Lds(value) }
}
impl From<rasn::error::DecodeError> for Error {
    fn from(value: rasn::error::DecodeError) -> Self { Self::Asn1(value) }
}
impl From<signature::Error> for Error {
    fn from(value: signature::Error) -> Self { Self::Signature(value) }
}


/// The parsed security object.
///
/// The original `ContentInfo` encoding is retained, so re-encoding the file
/// reproduces the input byte for byte.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SodFile {
    content_info_der: Vec<u8>,

    digest_algorithm: DigestAlgorithm,
    data_group_hashes: BTreeMap<u8, Vec<u8>>,
    lds_version: Option<String>,
    unicode_version: Option<String>,

    e_content: Vec<u8>,
    signed_attributes_der: Option<Vec<u8>>,
    message_digest_attribute: Option<Vec<u8>>,
    signer_digest_algorithm: DigestAlgorithm,
    signature_algorithm: Vec<u32>,
    signature: Vec<u8>,
    document_signer_certificate_der: Option<Vec<u8>>,
}
impl SodFile {
    /// The name of the algorithm hashing the data groups, e.g. `SHA-256`.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// The listed data group hashes, keyed by data group number (1..=16).
    pub fn data_group_hashes(&self) -> &BTreeMap<u8, Vec<u8>> {
        &self.data_group_hashes
    }

    /// The LDS version (`aabb`), present from LDS 1.8 on.
    pub fn lds_version(&self) -> Option<&str> {
        self.lds_version.as_deref()
    }

    /// The Unicode version (`aabbcc`), present from LDS 1.8 on.
    pub fn unicode_version(&self) -> Option<&str> {
        self.unicode_version.as_deref()
    }

    /// The embedded document signer certificate in DER.
    pub fn document_signer_certificate(&self) -> Option<&[u8]> {
        self.document_signer_certificate_der.as_deref()
    }

    /// Builds and signs a new security object.
    ///
    /// `data_group_hashes` maps data group numbers to hashes computed with
    /// `digest_algorithm` over the full encoded files. The document signer
    /// certificate must belong to `signer`.
    pub fn build(
        digest_algorithm: DigestAlgorithm,
        data_group_hashes: &BTreeMap<u8, Vec<u8>>,
        signer: &RsaSigningKey,
        signer_digest_algorithm: DigestAlgorithm,
        document_signer_certificate_der: &[u8],
        version_info: Option<(&str, &str)>,
    ) -> Result<Self, Error> {
        // the e-content listing the hashes
        let hash_values: Vec<asn1::DataGroupHash> = data_group_hashes.iter()
            .map(|(number, hash)| asn1::DataGroupHash {
                data_group_number: Integer::from(*number),
                data_group_hash_value: OctetString::copy_from_slice(hash),
            })
            .collect();
        let security_object = asn1::LdsSecurityObject {
            version: Integer::from(if version_info.is_some() { 1 } else { 0 }),
            hash_algorithm: rasn_cms::AlgorithmIdentifier {
                algorithm: digest_algorithm.oid(),
                parameters: None,
            },
            data_group_hash_values: hash_values,
            lds_version_info: match version_info {
                Some((lds, unicode)) => Some(asn1::LdsVersionInfo {
                    lds_version: lds.try_into().map_err(|_| Error::Encode)?,
                    unicode_version: unicode.try_into().map_err(|_| Error::Encode)?,
                }),
                None => None,
            },
        };
        let e_content = rasn::der::encode(&security_object).map_err(|_| Error::Encode)?;

        // signed attributes: content type and message digest
        let content_type_value = rasn::der::encode(&ID_LDS_SECURITY_OBJECT.to_owned())
            .map_err(|_| Error::Encode)?;
        let message_digest = signer_digest_algorithm.hash(&e_content);
        let message_digest_value = rasn::der::encode(&OctetString::copy_from_slice(&message_digest))
            .map_err(|_| Error::Encode)?;
        let signed_attributes = SetOf::from_vec(vec![
            rasn_cms::Attribute {
                r#type: ID_CONTENT_TYPE_ATTR.to_owned(),
                values: SetOf::from_vec(vec![Any::new(content_type_value)]),
            },
            rasn_cms::Attribute {
                r#type: ID_MESSAGE_DIGEST_ATTR.to_owned(),
                values: SetOf::from_vec(vec![Any::new(message_digest_value)]),
            },
        ]);

        // the signature covers the signed attributes under their SET OF tag
        let mut signing_input = rasn::der::encode(&signed_attributes).map_err(|_| Error::Encode)?;
        signing_input[0] = 0x31;
        let signature = signer.sign_pkcs1v15(signer_digest_algorithm, &signing_input)?;

        let certificate: rasn_pkix::Certificate = rasn::der::decode(document_signer_certificate_der)?;
        let signer_info = rasn_cms::SignerInfo {
            version: Integer::from(1),
            sid: SignerIdentifier::IssuerAndSerialNumber(rasn_cms::IssuerAndSerialNumber {
                issuer: certificate.tbs_certificate.issuer.clone(),
                serial_number: certificate.tbs_certificate.serial_number.clone(),
            }),
            digest_algorithm: rasn_cms::AlgorithmIdentifier {
                algorithm: signer_digest_algorithm.oid(),
                parameters: None,
            },
            signed_attrs: Some(signed_attributes),
            signature_algorithm: rasn_cms::AlgorithmIdentifier {
                algorithm: ID_RSA_ENCRYPTION.to_owned(),
                parameters: Some(Any::new(vec![0x05, 0x00])),
            },
            signature: OctetString::copy_from_slice(&signature),
            unsigned_attrs: None,
        };

        // the e-content travels as an OCTET STRING
        let e_content_octets = rasn::der::encode(&OctetString::copy_from_slice(&e_content))
            .map_err(|_| Error::Encode)?;
        let signed_data = SignedData {
            version: Integer::from(3),
            digest_algorithms: SetOf::from_vec(vec![rasn_cms::AlgorithmIdentifier {
                algorithm: signer_digest_algorithm.oid(),
                parameters: None,
            }]),
            encap_content_info: rasn_cms::EncapsulatedContentInfo {
                content_type: ID_LDS_SECURITY_OBJECT.to_owned(),
                content: Some(Any::new(e_content_octets)),
            },
            certificates: Some(SetOf::from_vec(vec![
                CertificateChoices::Certificate(certificate),
            ])),
            crls: None,
            signer_infos: SetOf::from_vec(vec![signer_info]),
        };

        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA.to_owned(),
            content: Any::new(rasn::der::encode(&signed_data).map_err(|_| Error::Encode)?),
        };
        let content_info_der = rasn::der::encode(&content_info).map_err(|_| Error::Encode)?;

        Self::parse_content(&content_info_der)
    }

    fn parse_content(content: &[u8]) -> Result<Self, Error> {
        let content_info: ContentInfo = rasn::der::decode(content)?;
        if &*content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Malformed { reason: "content type is not id-signedData" });
        }
        let signed_data: SignedData = rasn::der::decode(content_info.content.as_bytes())?;

        let e_content_type = &signed_data.encap_content_info.content_type;
        let known_types = [ID_LDS_SECURITY_OBJECT, ID_LDS_SECURITY_OBJECT_ALT, ID_LDS_SECURITY_OBJECT_SDU];
        if !known_types.iter().any(|known| &**e_content_type == *known) {
            return Err(Error::UnsupportedAlgorithm { oid: format!("{:?}", e_content_type) });
        }

        let wrapped_content = signed_data.encap_content_info.content
            .as_ref()
            .ok_or(Error::Malformed { reason: "security object carries no e-content" })?;
        // the e-content is normally wrapped in an OCTET STRING
        let e_content: Vec<u8> = if wrapped_content.as_bytes().first() == Some(&0x04) {
            let octets: OctetString = rasn::der::decode(wrapped_content.as_bytes())?;
            octets.to_vec()
        } else {
            wrapped_content.as_bytes().to_vec()
        };

        let security_object: asn1::LdsSecurityObject = rasn::der::decode(&e_content)?;
        let digest_algorithm = DigestAlgorithm::try_from_oid(&security_object.hash_algorithm.algorithm)
            .map_err(Error::from)?;

        let mut data_group_hashes = BTreeMap::new();
        for entry in &security_object.data_group_hash_values {
            let number = (1u8..=16)
                .find(|candidate| entry.data_group_number == Integer::from(*candidate))
                .ok_or(Error::Malformed { reason: "data group number out of range" })?;
            if entry.data_group_hash_value.len() != digest_algorithm.output_size() {
                return Err(Error::Malformed { reason: "hash length does not match the digest algorithm" });
            }
            data_group_hashes.insert(number, entry.data_group_hash_value.to_vec());
        }

        let (lds_version, unicode_version) = match &security_object.lds_version_info {
            Some(info) => (
                Some(String::from_utf8_lossy(info.lds_version.as_bytes()).into_owned()),
                Some(String::from_utf8_lossy(info.unicode_version.as_bytes()).into_owned()),
            ),
            None => (None, None),
        };

        let document_signer_certificate_der = signed_data.certificates.iter()
            .flat_map(|certificates| certificates.to_vec())
            .find_map(|choice| match choice {
                CertificateChoices::Certificate(certificate)
                    => rasn::der::encode(&certificate).ok(),
                _ => None,
            });

        let signer_infos = signed_data.signer_infos.to_vec();
        let signer_info = signer_infos.first()
            .ok_or(Error::Malformed { reason: "security object carries no signer info" })?;
        let signer_digest_algorithm = DigestAlgorithm::try_from_oid(&signer_info.digest_algorithm.algorithm)
            .map_err(Error::from)?;

        let (signed_attributes_der, message_digest_attribute) = match &signer_info.signed_attrs {
            Some(signed_attrs) => {
                let mut encoded = rasn::der::encode(signed_attrs).map_err(|_| Error::Encode)?;
                // the digest input uses the SET OF tag, not the implicit [0]
                encoded[0] = 0x31;

                let mut message_digest = None;
                for attribute in signed_attrs.to_vec() {
                    if &*attribute.r#type == ID_MESSAGE_DIGEST_ATTR {
                        let values = attribute.values.to_vec();
                        let value = values.first()
                            .ok_or(Error::Malformed { reason: "message digest attribute is empty" })?;
                        let octets: OctetString = rasn::der::decode(value.as_bytes())?;
                        message_digest = Some(octets.to_vec());
                    }
                }
                (Some(encoded), message_digest)
            },
            None => (None, None),
        };

        let signature_algorithm: Vec<u32> = signer_info.signature_algorithm.algorithm.iter().copied().collect();

        Ok(Self {
            content_info_der: content.to_vec(),
            digest_algorithm,
            data_group_hashes,
            lds_version,
            unicode_version,
            e_content,
            signed_attributes_der,
            message_digest_attribute,
            signer_digest_algorithm,
            signature_algorithm,
            signature: signer_info.signature.to_vec(),
            document_signer_certificate_der,
        })
    }

    /// Checks the supplied data groups against the listed hashes.
    ///
    /// `data_groups` maps data group numbers to the full encoded files. Every
    /// data group covered by the security object must be present.
    pub fn verify_data_groups(&self, data_groups: &BTreeMap<u8, Vec<u8>>) -> Result<(), Error> {
        for (number, expected_hash) in &self.data_group_hashes {
            let file_bytes = data_groups.get(number)
                .ok_or(Error::MissingDataGroup { data_group: *number })?;
            let computed = self.digest_algorithm.hash(file_bytes);
            if &computed != expected_hash {
                return Err(Error::MismatchedDigest { data_group: *number });
            }
        }
        Ok(())
    }

    /// Verifies the CMS signature with the embedded document signer
    /// certificate. This is a structural check; trust in the signer is
    /// established separately.
    pub fn verify_signature(&self) -> Result<(), Error> {
        let certificate_der = self.document_signer_certificate_der
            .as_deref()
            .ok_or(Error::Malformed { reason: "security object embeds no document signer certificate" })?;
        let public_key = document_signer_public_key(certificate_der)?;

        // with signed attributes present, they also bind the e-content digest
        let signed_data: &[u8] = match &self.signed_attributes_der {
            Some(signed_attributes) => {
                let message_digest = self.message_digest_attribute
                    .as_ref()
                    .ok_or(Error::Malformed { reason: "signed attributes lack the message digest" })?;
                let computed = self.signer_digest_algorithm.hash(&self.e_content);
                if &computed != message_digest {
                    return Err(Error::SignatureInvalid);
                }
                signed_attributes
            },
            None => &self.e_content,
        };

        verify_with_algorithm(
            &public_key,
            &self.signature_algorithm,
            self.signer_digest_algorithm,
            signed_data,
            &self.signature,
        )
    }

    /// Verifies the full object: every supplied data group hash and the CMS
    /// signature. When a trust anchor key is supplied, the document signer
    /// certificate must verify under it.
    pub fn verify(
        &self,
        data_groups: &BTreeMap<u8, Vec<u8>>,
        trust_anchor_spki: Option<&[u8]>,
    ) -> Result<(), Error> {
        self.verify_data_groups(data_groups)?;
        self.verify_signature()?;

        if let Some(anchor_spki) = trust_anchor_spki {
            self.verify_document_signer(anchor_spki)?;
        }
        Ok(())
    }

    /// Checks the document signer certificate's signature under the given
    /// trust anchor key (a DER `SubjectPublicKeyInfo`).
    fn verify_document_signer(&self, trust_anchor_spki: &[u8]) -> Result<(), Error> {
        let certificate_der = self.document_signer_certificate_der
            .as_deref()
            .ok_or(Error::UntrustedSigner)?;
        let certificate: rasn_pkix::Certificate = rasn::der::decode(certificate_der)?;

        let tbs_der = rasn::der::encode(&certificate.tbs_certificate).map_err(|_| Error::Encode)?;
        let algorithm: Vec<u32> = certificate.signature_algorithm.algorithm.iter().copied().collect();
        let digest_algorithm = digest_for_signature_algorithm(&algorithm)
            .ok_or(Error::UntrustedSigner)?;
        let anchor_key = signature::parse_subject_public_key_info(trust_anchor_spki)?;

        let signature_bytes: Vec<u8> = certificate.signature_value.as_raw_slice().to_vec();
        verify_with_algorithm(
            &anchor_key,
            &algorithm,
            digest_algorithm,
            &tbs_der,
            &signature_bytes,
        ).map_err(|_| Error::UntrustedSigner)
    }
}
impl LdsFile for SodFile {
    const TAG: u32 = EF_SOD_TAG;

    fn read_content(content: &[u8]) -> Result<Self, lds::Error> {
        Self::parse_content(content)
            .map_err(|_| lds::Error::Malformed { reason: "security object does not parse" })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        output.extend(&self.content_info_der);
    }
}
impl SodFile {
    /// Decodes a security object from its full binary representation,
    /// surfacing the security-object error detail lost through the generic
    /// [`LdsFile::from_bytes`].
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut reader = TlvReader::new(data);
        let tag = reader.read_tag().map_err(lds::Error::from)?;
        if tag != Tag::new(EF_SOD_TAG) {
            return Err(Error::Lds(lds::Error::UnexpectedTag {
                expected: Tag::new(EF_SOD_TAG),
                found: tag,
            }));
        }
        let length = reader.read_length().map_err(lds::Error::from)?;
        let content = reader.read_value(length).map_err(lds::Error::from)?;
        Self::parse_content(content)
    }

    /// Encodes the full file, outer tag included.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = TlvWriter::new();
        writer.write_tag(EF_SOD_TAG);
        writer.write_value(&self.content_info_der);
        writer.into_bytes()
    }
}


/// Extracts the public key out of a certificate without validating it.
fn document_signer_public_key(certificate_der: &[u8]) -> Result<PublicKey, Error> {
    let certificate: rasn_pkix::Certificate = rasn::der::decode(certificate_der)?;
    let spki_der = rasn::der::encode(&certificate.tbs_certificate.subject_public_key_info)
        .map_err(|_| Error::Encode)?;
    Ok(signature::parse_subject_public_key_info(&spki_der)?)
}

/// Maps a signature algorithm to the digest baked into its identifier.
fn digest_for_signature_algorithm(algorithm: &[u32]) -> Option<DigestAlgorithm> {
    match algorithm {
        [1, 2, 840, 113549, 1, 1, 5] => Some(DigestAlgorithm::Sha1),
        [1, 2, 840, 113549, 1, 1, 14] => Some(DigestAlgorithm::Sha224),
        [1, 2, 840, 113549, 1, 1, 11] => Some(DigestAlgorithm::Sha256),
        [1, 2, 840, 113549, 1, 1, 12] => Some(DigestAlgorithm::Sha384),
        [1, 2, 840, 113549, 1, 1, 13] => Some(DigestAlgorithm::Sha512),
        [1, 2, 840, 10045, 4, 1] => Some(DigestAlgorithm::Sha1),
        [1, 2, 840, 10045, 4, 3, 1] => Some(DigestAlgorithm::Sha224),
        [1, 2, 840, 10045, 4, 3, 2] => Some(DigestAlgorithm::Sha256),
        [1, 2, 840, 10045, 4, 3, 3] => Some(DigestAlgorithm::Sha384),
        [1, 2, 840, 10045, 4, 3, 4] => Some(DigestAlgorithm::Sha512),
        _ => None,
    }
}

/// Dispatches signature verification on the signature algorithm identifier.
fn verify_with_algorithm(
    public_key: &PublicKey,
    algorithm: &[u32],
    digest_algorithm: DigestAlgorithm,
    signed_data: &[u8],
    signature_bytes: &[u8],
) -> Result<(), Error> {
    let is_pss = ID_RSASSA_PSS.iter().copied().eq(algorithm.iter().copied());
    let is_ecdsa = algorithm.starts_with(&[1, 2, 840, 10045, 4]);

    match public_key {
        PublicKey::Rsa(rsa_key) => {
            let result = if is_pss {
                rsa_key.verify_pss(digest_algorithm, signed_data, signature_bytes)
            } else {
                rsa_key.verify_pkcs1v15(digest_algorithm, signed_data, signature_bytes)
            };
            result.map_err(|_| Error::SignatureInvalid)
        },
        PublicKey::Ec(ec_key) => {
            if !is_ecdsa && !algorithm.starts_with(&[1, 2, 840, 10045]) {
                return Err(Error::UnsupportedAlgorithm {
                    oid: algorithm.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("."),
                });
            }
            let digest = digest_algorithm.hash(signed_data);
            ec_key.verify_ecdsa(&digest, signature_bytes)
                .map_err(|_| Error::SignatureInvalid)
        },
        PublicKey::Dh(_) => Err(Error::Malformed { reason: "document signer key is not a signature key" }),
    }
}
