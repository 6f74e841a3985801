//! EF.COM: version information and the list of present data groups.


use crate::lds::{Error, LdsFile, EF_COM_TAG};
use crate::tlv::{TlvReader, TlvWriter};


const LDS_VERSION_TAG: u32 = 0x5F01;
const UNICODE_VERSION_TAG: u32 = 0x5F36;
const DATA_GROUP_TAG_LIST_TAG: u32 = 0x5C;


/// The EF.COM file.
///
/// The LDS version is four digits `aabb` (e.g. `0107` for 1.7), the Unicode
/// version six digits `aabbcc`. The tag list carries the outer tags of the
/// data groups present on the chip.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ComFile {
    lds_version: String,
    unicode_version: String,
    data_group_tags: Vec<u8>,
}
impl ComFile {
    pub fn new(lds_version: &str, unicode_version: &str, data_group_tags: Vec<u8>) -> Self {
        Self {
            lds_version: lds_version.to_owned(),
            unicode_version: unicode_version.to_owned(),
            data_group_tags,
        }
    }

    pub fn lds_version(&self) -> &str {
        &self.lds_version
    }

    pub fn unicode_version(&self) -> &str {
        &self.unicode_version
    }

    /// The outer tags of the data groups present on the chip.
    pub fn data_group_tags(&self) -> &[u8] {
        &self.data_group_tags
    }
}
impl LdsFile for ComFile {
    const TAG: u32 = EF_COM_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        let mut reader = TlvReader::new(content);

        reader.expect_tag(LDS_VERSION_TAG)?;
        let length = reader.read_length()?;
        let lds_version = String::from_utf8_lossy(reader.read_value(length)?).into_owned();

        reader.expect_tag(UNICODE_VERSION_TAG)?;
        let length = reader.read_length()?;
        let unicode_version = String::from_utf8_lossy(reader.read_value(length)?).into_owned();

        reader.expect_tag(DATA_GROUP_TAG_LIST_TAG)?;
        let length = reader.read_length()?;
        let data_group_tags = reader.read_value(length)?.to_vec();

        Ok(Self {
            lds_version,
            unicode_version,
            data_group_tags,
        })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        let mut writer = TlvWriter::new();
        writer.write_primitive(LDS_VERSION_TAG, self.lds_version.as_bytes());
        writer.write_primitive(UNICODE_VERSION_TAG, self.unicode_version.as_bytes());
        writer.write_primitive(DATA_GROUP_TAG_LIST_TAG, &self.data_group_tags);
        output.extend(writer.into_bytes());
    }
}


#[cfg(test)]
mod tests {
    use super::ComFile;
    use crate::lds::LdsFile;
    use hex_literal::hex;

    // the EF.COM from the Doc 9303 Secure Messaging worked example:
    // LDS 1.7, Unicode 4.0.0, DG1 and DG2 present
    const COM_SAMPLE: [u8; 22] = hex!("
        60 14 5F 01 04 30 31 30 37 5F 36 06 30 34 30 30 30 30 5C 02 61 75
    ");

    #[test]
    fn test_decode() {
        let com = ComFile::from_bytes(&COM_SAMPLE).expect("decoding");
        assert_eq!(com.lds_version(), "0107");
        assert_eq!(com.unicode_version(), "040000");
        assert_eq!(com.data_group_tags(), &[0x61, 0x75]);
    }

    #[test]
    fn test_round_trip() {
        let com = ComFile::from_bytes(&COM_SAMPLE).expect("decoding");
        assert_eq!(com.to_bytes(), &COM_SAMPLE);

        let built = ComFile::new("0107", "040000", vec![0x61, 0x75]);
        assert_eq!(built.to_bytes(), &COM_SAMPLE);
    }
}
