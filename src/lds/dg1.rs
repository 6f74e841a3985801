//! DG1: the machine-readable zone.


use crate::lds::{Error, LdsFile, EF_DG1_TAG};
use crate::lds::mrz::MrzData;
use crate::tlv::{TlvReader, TlvWriter};


const MRZ_INFO_TAG: u32 = 0x5F1F;


/// The DG1 file, wrapping the machine-readable zone of the data page.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg1File {
    mrz: MrzData,
}
impl Dg1File {
    pub fn new(mrz: MrzData) -> Self {
        Self { mrz }
    }

    pub fn mrz(&self) -> &MrzData {
        &self.mrz
    }

    pub fn into_mrz(self) -> MrzData {
        self.mrz
    }
}
impl LdsFile for Dg1File {
    const TAG: u32 = EF_DG1_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        let mut reader = TlvReader::new(content);
        reader.skip_to_tag(MRZ_INFO_TAG)?;
        reader.read_tag()?;
        let length = reader.read_length()?;
        let mrz_bytes = reader.read_value(length)?;
        let mrz_text = std::str::from_utf8(mrz_bytes)
            .map_err(|_| Error::Malformed { reason: "MRZ is not valid UTF-8" })?;
        let mrz = MrzData::parse(mrz_text)?;
        Ok(Self { mrz })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        let mut writer = TlvWriter::new();
        writer.write_primitive(MRZ_INFO_TAG, self.mrz.to_mrz_string().as_bytes());
        output.extend(writer.into_bytes());
    }
}


#[cfg(test)]
mod tests {
    use super::Dg1File;
    use crate::lds::LdsFile;
    use crate::lds::mrz::MrzData;
    use hex_literal::hex;

    const TD3_SAMPLE: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    #[test]
    fn test_encode_starts_with_expected_header() {
        let dg1 = Dg1File::new(MrzData::parse(TD3_SAMPLE).expect("parsing"));
        let encoded = dg1.to_bytes();
        assert_eq!(&encoded[0..5], &hex!("61 5B 5F 1F 58"));
        assert_eq!(&encoded[5..], TD3_SAMPLE.as_bytes());
    }

    #[test]
    fn test_round_trip() {
        let dg1 = Dg1File::new(MrzData::parse(TD3_SAMPLE).expect("parsing"));
        let encoded = dg1.to_bytes();

        let decoded = Dg1File::from_bytes(&encoded).expect("decoding");
        assert_eq!(decoded, dg1);
        assert_eq!(decoded.mrz().to_mrz_string(), TD3_SAMPLE);
        assert_eq!(decoded.to_bytes(), encoded);
    }
}
