//! DG4: the encoded irises.


use crate::cbeff::{self, BiometricDataBlock, BiometricKind, CbeffInfo};
use crate::iso19794::DecodeConfig;
use crate::lds::{Error, LdsFile, EF_DG4_TAG};


/// The DG4 file: a biometric information group of iris records.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg4File {
    infos: Vec<CbeffInfo>,
}
impl Dg4File {
    pub fn new(infos: Vec<CbeffInfo>) -> Self {
        Self { infos }
    }

    /// Decodes the file with explicit configuration for the record parsers,
    /// including the iris subtype aggregation behaviour.
    pub fn from_bytes_with_config(data: &[u8], config: DecodeConfig) -> Result<Self, Error> {
        let mut reader = crate::tlv::TlvReader::new(data);
        reader.expect_tag(Self::TAG)?;
        let length = reader.read_length()?;
        let content = reader.read_value(length)?;
        let infos = cbeff::decode_bit_group(content, BiometricKind::Iris, config)?;
        Ok(Self { infos })
    }

    pub fn cbeff_infos(&self) -> &[CbeffInfo] {
        &self.infos
    }

    /// All ISO 19794-6 iris records in the group, in file order.
    pub fn iris_records_19794(&self) -> Vec<&crate::iso19794::iris::IrisRecord> {
        fn collect<'i>(infos: &'i [CbeffInfo], records: &mut Vec<&'i crate::iso19794::iris::IrisRecord>) {
            for info in infos {
                match info {
                    CbeffInfo::Simple(simple) => {
                        if let BiometricDataBlock::Iris19794(record) = &simple.block {
                            records.push(record);
                        }
                    },
                    CbeffInfo::Complex(nested) => collect(nested, records),
                }
            }
        }
        let mut records = Vec::new();
        collect(&self.infos, &mut records);
        records
    }
}
impl LdsFile for Dg4File {
    const TAG: u32 = EF_DG4_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        let infos = cbeff::decode_bit_group(content, BiometricKind::Iris, DecodeConfig::default())?;
        Ok(Self { infos })
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        output.extend(cbeff::encode_bit_group(&self.infos));
    }
}
