//! DG15: the Active Authentication public key.


use crate::crypt::signature::{self, PublicKey};
use crate::lds::{Error, LdsFile, EF_DG15_TAG};


/// The DG15 file, wrapping the chip's Active Authentication public key as a
/// `SubjectPublicKeyInfo`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg15File {
    subject_public_key_info: Vec<u8>,
}
impl Dg15File {
    pub fn new(subject_public_key_info: Vec<u8>) -> Self {
        Self { subject_public_key_info }
    }

    /// The raw DER `SubjectPublicKeyInfo`.
    pub fn subject_public_key_info(&self) -> &[u8] {
        &self.subject_public_key_info
    }

    /// Parses the wrapped key for use with the Active Authentication
    /// verifier.
    pub fn public_key(&self) -> Result<PublicKey, signature::Error> {
        signature::parse_subject_public_key_info(&self.subject_public_key_info)
    }
}
impl LdsFile for Dg15File {
    const TAG: u32 = EF_DG15_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            subject_public_key_info: content.to_vec(),
        })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        output.extend(&self.subject_public_key_info);
    }
}
