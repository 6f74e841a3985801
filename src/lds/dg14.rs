//! DG14: security options for additional access-control and authenticity
//! protocols.


use crate::lds::security_info::SecurityInfo;
use crate::lds::{Error, LdsFile, EF_DG14_TAG};
use crate::tlv::TlvReader;


/// The DG14 file: a set of [`SecurityInfo`] entries.
///
/// Entry order is preserved from the file so that re-encoding reproduces the
/// input bytes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg14File {
    security_infos: Vec<SecurityInfo>,
}
impl Dg14File {
    pub fn new(security_infos: Vec<SecurityInfo>) -> Self {
        Self { security_infos }
    }

    pub fn security_infos(&self) -> &[SecurityInfo] {
        &self.security_infos
    }

    /// The first Chip Authentication info, if any.
    pub fn chip_authentication_info(&self) -> Option<&crate::lds::security_info::ChipAuthenticationInfo> {
        self.security_infos.iter().find_map(|info| match info {
            SecurityInfo::ChipAuthentication(ca) => Some(ca),
            _ => None,
        })
    }

    /// The first Chip Authentication public key info, if any.
    pub fn chip_authentication_public_key_info(&self) -> Option<&crate::lds::security_info::ChipAuthenticationPublicKeyInfo> {
        self.security_infos.iter().find_map(|info| match info {
            SecurityInfo::ChipAuthenticationPublicKey(pk) => Some(pk),
            _ => None,
        })
    }

    /// The first Active Authentication info, if any.
    pub fn active_authentication_info(&self) -> Option<&crate::lds::security_info::ActiveAuthenticationInfo> {
        self.security_infos.iter().find_map(|info| match info {
            SecurityInfo::ActiveAuthentication(aa) => Some(aa),
            _ => None,
        })
    }
}
impl LdsFile for Dg14File {
    const TAG: u32 = EF_DG14_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        // SecurityInfos ::= SET OF SecurityInfo
        let mut reader = TlvReader::new(content);
        reader.expect_tag(0x31u32)?;
        let length = reader.read_length()?;
        let set_content = reader.read_value(length)?;

        let mut security_infos = Vec::new();
        let mut entry_reader = TlvReader::new(set_content);
        while !entry_reader.is_at_end() {
            let before = entry_reader.rest();
            entry_reader.read_tlv()?;
            let after = entry_reader.rest();
            let raw_entry = &before[..before.len() - after.len()];
            security_infos.push(SecurityInfo::from_der(raw_entry)?);
        }
        Ok(Self { security_infos })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        let mut set_content = Vec::new();
        for info in &self.security_infos {
            // entries produced by `from_der` always re-encode
            if let Ok(der) = info.to_der() {
                set_content.extend(der);
            }
        }
        output.push(0x31);
        crate::der_util::encode_primitive_length(output, set_content.len());
        output.extend(set_content);
    }
}


#[cfg(test)]
mod tests {
    use super::Dg14File;
    use crate::lds::security_info::SecurityInfo;
    use crate::lds::LdsFile;
    use hex_literal::hex;

    // a SecurityInfos set with one ChipAuthenticationInfo
    // (id-CA-ECDH-AES-CBC-CMAC-128, version 1) and one unknown entry
    const DG14_SAMPLE: [u8; 35] = hex!("
        6E 21 31 1F
        30 12 06 0A 04 00 7F 00 07 02 02 03 02 02 02 01 01 02 01 0E
        30 09 06 04 2A 03 04 05 02 01 2A
    ");

    #[test]
    fn test_decode() {
        let dg14 = Dg14File::from_bytes(&DG14_SAMPLE).expect("decoding");
        assert_eq!(dg14.security_infos().len(), 2);

        let ca = dg14.chip_authentication_info().expect("chip authentication info");
        assert_eq!(ca.version, rasn::types::Integer::from(1));
        assert_eq!(ca.key_id, Some(rasn::types::Integer::from(14)));

        assert!(matches!(dg14.security_infos()[1], SecurityInfo::Unknown(_)));
    }

    #[test]
    fn test_round_trip() {
        let dg14 = Dg14File::from_bytes(&DG14_SAMPLE).expect("decoding");
        assert_eq!(dg14.to_bytes(), &DG14_SAMPLE);
    }
}
