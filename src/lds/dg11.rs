//! DG11: additional personal details.
//!
//! All fields are optional. The tag list at the start of the file names the
//! fields that are present; the fields follow in the listed order.


use crate::lds::additional_details::{
    normalize_list, read_content_specific_list, read_full_date, read_list, read_string,
    read_tag_list, write_content_specific_list, write_list, write_string, write_tag_list,
    CONTENT_SPECIFIC_CONSTRUCTED_TAG,
};
use crate::lds::{Error, LdsFile, EF_DG11_TAG};
use crate::tlv::{Tag, TlvReader, TlvWriter};


pub const FULL_NAME_TAG: u32 = 0x5F0E;
pub const OTHER_NAME_TAG: u32 = 0x5F0F;
pub const PERSONAL_NUMBER_TAG: u32 = 0x5F10;
pub const PLACE_OF_BIRTH_TAG: u32 = 0x5F11;
pub const TELEPHONE_TAG: u32 = 0x5F12;
pub const PROFESSION_TAG: u32 = 0x5F13;
pub const TITLE_TAG: u32 = 0x5F14;
pub const PERSONAL_SUMMARY_TAG: u32 = 0x5F15;
pub const PROOF_OF_CITIZENSHIP_TAG: u32 = 0x5F16;
pub const OTHER_VALID_TD_NUMBERS_TAG: u32 = 0x5F17;
pub const CUSTODY_INFORMATION_TAG: u32 = 0x5F18;
pub const FULL_DATE_OF_BIRTH_TAG: u32 = 0x5F2B;
pub const PERMANENT_ADDRESS_TAG: u32 = 0x5F42;


/// The DG11 file with additional details about the document holder.
///
/// Names of the holder and of other persons follow the MRZ conventions with
/// `<` as separator; the full date of birth is `yyyyMMdd`.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg11File {
    name_of_holder: Option<String>,
    other_names: Option<Vec<String>>,
    personal_number: Option<String>,
    full_date_of_birth: Option<String>,
    place_of_birth: Option<Vec<String>>,
    permanent_address: Option<Vec<String>>,
    telephone: Option<String>,
    profession: Option<String>,
    title: Option<String>,
    personal_summary: Option<String>,
    proof_of_citizenship: Option<Vec<u8>>,
    other_valid_td_numbers: Option<Vec<String>>,
    custody_information: Option<String>,

    tag_order: Vec<u32>,
}
impl Dg11File {
    /// Constructs a new file. Absent data elements are `None`; list entries
    /// are separated only structurally, each entry already trimmed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name_of_holder: Option<String>,
        other_names: Option<Vec<String>>,
        personal_number: Option<String>,
        full_date_of_birth: Option<String>,
        place_of_birth: Option<Vec<String>>,
        permanent_address: Option<Vec<String>>,
        telephone: Option<String>,
        profession: Option<String>,
        title: Option<String>,
        personal_summary: Option<String>,
        proof_of_citizenship: Option<Vec<u8>>,
        other_valid_td_numbers: Option<Vec<String>>,
        custody_information: Option<String>,
    ) -> Self {
        let mut file = Self {
            name_of_holder,
            other_names,
            personal_number,
            full_date_of_birth,
            place_of_birth: place_of_birth.map(normalize_list),
            permanent_address: permanent_address.map(normalize_list),
            telephone,
            profession,
            title,
            personal_summary,
            proof_of_citizenship,
            other_valid_td_numbers: other_valid_td_numbers.map(normalize_list),
            custody_information,
            tag_order: Vec::new(),
        };
        file.tag_order = file.present_tags();
        file
    }

    /// The tags of the fields that are present, in canonical order.
    fn present_tags(&self) -> Vec<u32> {
        let mut tags = Vec::with_capacity(13);
        if self.name_of_holder.is_some() {
            tags.push(FULL_NAME_TAG);
        }
        if self.other_names.is_some() {
            tags.push(OTHER_NAME_TAG);
        }
        if self.personal_number.is_some() {
            tags.push(PERSONAL_NUMBER_TAG);
        }
        if self.full_date_of_birth.is_some() {
            tags.push(FULL_DATE_OF_BIRTH_TAG);
        }
        if self.place_of_birth.is_some() {
            tags.push(PLACE_OF_BIRTH_TAG);
        }
        if self.permanent_address.is_some() {
            tags.push(PERMANENT_ADDRESS_TAG);
        }
        if self.telephone.is_some() {
            tags.push(TELEPHONE_TAG);
        }
        if self.profession.is_some() {
            tags.push(PROFESSION_TAG);
        }
        if self.title.is_some() {
            tags.push(TITLE_TAG);
        }
        if self.personal_summary.is_some() {
            tags.push(PERSONAL_SUMMARY_TAG);
        }
        if self.proof_of_citizenship.is_some() {
            tags.push(PROOF_OF_CITIZENSHIP_TAG);
        }
        if self.other_valid_td_numbers.is_some() {
            tags.push(OTHER_VALID_TD_NUMBERS_TAG);
        }
        if self.custody_information.is_some() {
            tags.push(CUSTODY_INFORMATION_TAG);
        }
        tags
    }

    /// The tags of the fields that are present, in file order.
    pub fn tag_presence_list(&self) -> &[u32] {
        &self.tag_order
    }

    pub fn name_of_holder(&self) -> Option<&str> { self.name_of_holder.as_deref() }
    pub fn other_names(&self) -> Option<&[String]> { self.other_names.as_deref() }
    pub fn personal_number(&self) -> Option<&str> { self.personal_number.as_deref() }
    pub fn full_date_of_birth(&self) -> Option<&str> { self.full_date_of_birth.as_deref() }
    pub fn place_of_birth(&self) -> Option<&[String]> { self.place_of_birth.as_deref() }
    pub fn permanent_address(&self) -> Option<&[String]> { self.permanent_address.as_deref() }
    pub fn telephone(&self) -> Option<&str> { self.telephone.as_deref() }
    pub fn profession(&self) -> Option<&str> { self.profession.as_deref() }
    pub fn title(&self) -> Option<&str> { self.title.as_deref() }
    pub fn personal_summary(&self) -> Option<&str> { self.personal_summary.as_deref() }
    pub fn proof_of_citizenship(&self) -> Option<&[u8]> { self.proof_of_citizenship.as_deref() }
    pub fn other_valid_td_numbers(&self) -> Option<&[String]> { self.other_valid_td_numbers.as_deref() }
    pub fn custody_information(&self) -> Option<&str> { self.custody_information.as_deref() }
}
impl LdsFile for Dg11File {
    const TAG: u32 = EF_DG11_TAG;

    fn read_content(content: &[u8]) -> Result<Self, Error> {
        let mut reader = TlvReader::new(content);
        let tag_order = read_tag_list(&mut reader)?;

        let mut file = Self {
            tag_order: tag_order.clone(),
            ..Self::default()
        };

        for expected in tag_order {
            let field = reader.read_tlv()?;
            if field.tag != expected && field.tag != CONTENT_SPECIFIC_CONSTRUCTED_TAG {
                return Err(Error::UnexpectedTag { expected: Tag::new(expected), found: field.tag });
            }

            if field.tag == CONTENT_SPECIFIC_CONSTRUCTED_TAG {
                file.other_names = Some(read_content_specific_list(&field, OTHER_NAME_TAG)?);
                continue;
            }

            let value = field.primitive_value()
                .ok_or(Error::Malformed { reason: "detail field is constructed" })?;
            match field.tag.value() {
                FULL_NAME_TAG => file.name_of_holder = Some(read_string(value)),
                // work around non-compliant early samples carrying a bare 5F0F
                OTHER_NAME_TAG => file.other_names = Some(vec![read_string(value)]),
                PERSONAL_NUMBER_TAG => file.personal_number = Some(read_string(value)),
                FULL_DATE_OF_BIRTH_TAG => file.full_date_of_birth = Some(read_full_date(value)),
                PLACE_OF_BIRTH_TAG => file.place_of_birth = Some(read_list(value)),
                PERMANENT_ADDRESS_TAG => file.permanent_address = Some(read_list(value)),
                TELEPHONE_TAG => file.telephone = Some(read_string(value)),
                PROFESSION_TAG => file.profession = Some(read_string(value)),
                TITLE_TAG => file.title = Some(read_string(value)),
                PERSONAL_SUMMARY_TAG => file.personal_summary = Some(read_string(value)),
                PROOF_OF_CITIZENSHIP_TAG => file.proof_of_citizenship = Some(value.to_vec()),
                OTHER_VALID_TD_NUMBERS_TAG => file.other_valid_td_numbers = Some(read_list(value)),
                CUSTODY_INFORMATION_TAG => file.custody_information = Some(read_string(value)),
                _ => return Err(Error::Malformed { reason: "unknown field tag in DG11" }),
            }
        }
        Ok(file)
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        let mut writer = TlvWriter::new();
        write_tag_list(&mut writer, &self.tag_order);

        for tag in &self.tag_order {
            match *tag {
                FULL_NAME_TAG => write_string(&mut writer, FULL_NAME_TAG, self.name_of_holder.as_deref().unwrap_or("")),
                OTHER_NAME_TAG => write_content_specific_list(&mut writer, OTHER_NAME_TAG, self.other_names.as_deref().unwrap_or(&[])),
                PERSONAL_NUMBER_TAG => write_string(&mut writer, PERSONAL_NUMBER_TAG, self.personal_number.as_deref().unwrap_or("")),
                FULL_DATE_OF_BIRTH_TAG => write_string(&mut writer, FULL_DATE_OF_BIRTH_TAG, self.full_date_of_birth.as_deref().unwrap_or("")),
                PLACE_OF_BIRTH_TAG => write_list(&mut writer, PLACE_OF_BIRTH_TAG, self.place_of_birth.as_deref().unwrap_or(&[])),
                PERMANENT_ADDRESS_TAG => write_list(&mut writer, PERMANENT_ADDRESS_TAG, self.permanent_address.as_deref().unwrap_or(&[])),
                TELEPHONE_TAG => write_string(&mut writer, TELEPHONE_TAG, self.telephone.as_deref().unwrap_or("")),
                PROFESSION_TAG => write_string(&mut writer, PROFESSION_TAG, self.profession.as_deref().unwrap_or("")),
                TITLE_TAG => write_string(&mut writer, TITLE_TAG, self.title.as_deref().unwrap_or("")),
                PERSONAL_SUMMARY_TAG => write_string(&mut writer, PERSONAL_SUMMARY_TAG, self.personal_summary.as_deref().unwrap_or("")),
                PROOF_OF_CITIZENSHIP_TAG => {
                    writer.write_primitive(PROOF_OF_CITIZENSHIP_TAG, self.proof_of_citizenship.as_deref().unwrap_or(&[]));
                },
                OTHER_VALID_TD_NUMBERS_TAG => write_list(&mut writer, OTHER_VALID_TD_NUMBERS_TAG, self.other_valid_td_numbers.as_deref().unwrap_or(&[])),
                CUSTODY_INFORMATION_TAG => write_string(&mut writer, CUSTODY_INFORMATION_TAG, self.custody_information.as_deref().unwrap_or("")),
                _ => {},
            }
        }
        output.extend(writer.into_bytes());
    }
}


#[cfg(test)]
mod tests {
    use super::Dg11File;
    use crate::lds::LdsFile;

    /// A minimal DG11 with mostly empty fields and a full date of birth.
    const SIMPLE_DG11: [u8; 54] = [
        0x6B, 0x34, 0x5C, 0x10, 0x5F, 0x0E, 0x5F, 0x10,
        0x5F, 0x2B, 0x5F, 0x12, 0x5F, 0x13, 0x5F, 0x14,
        0x5F, 0x15, 0x5F, 0x18, 0x5F, 0x0E, 0x02, 0x3C,
        0x3C, 0x5F, 0x10, 0x00, 0x5F, 0x2B, 0x08, 0x31,
        0x39, 0x37, 0x31, 0x31, 0x30, 0x31, 0x39, 0x5F,
        0x12, 0x00, 0x5F, 0x13, 0x00, 0x5F, 0x14, 0x00,
        0x5F, 0x15, 0x00, 0x5F, 0x18, 0x00,
    ];

    #[test]
    fn test_decode_minimal_fixture() {
        let dg11 = Dg11File::from_bytes(&SIMPLE_DG11).expect("decoding");
        assert_eq!(dg11.name_of_holder(), Some("<<"));
        assert_eq!(dg11.full_date_of_birth(), Some("19711019"));
        assert_eq!(dg11.personal_number(), Some(""));
        assert_eq!(dg11.telephone(), Some(""));
        assert!(dg11.other_names().is_none());
        assert!(dg11.place_of_birth().is_none());
    }

    #[test]
    fn test_minimal_fixture_round_trip() {
        let dg11 = Dg11File::from_bytes(&SIMPLE_DG11).expect("decoding");
        assert_eq!(dg11.to_bytes(), &SIMPLE_DG11);
    }

    #[test]
    fn test_constructed_round_trip() {
        let dg11 = Dg11File::new(
            Some("SILVERHAND<<JOHNNY".to_owned()),
            Some(vec!["ROBERT<JOHN<LINDER".to_owned()]),
            Some("123456789".to_owned()),
            Some("19881116".to_owned()),
            Some(vec!["NIGHT CITY".to_owned(), "NUSA".to_owned()]),
            None,
            None,
            Some("ROCKERBOY".to_owned()),
            None,
            None,
            None,
            Some(Vec::new()),
            None,
        );

        // empty lists are preserved as a single empty entry
        assert_eq!(dg11.other_valid_td_numbers(), Some(&[String::new()][..]));

        let encoded = dg11.to_bytes();
        let decoded = Dg11File::from_bytes(&encoded).expect("decoding");
        assert_eq!(decoded, dg11);
        assert_eq!(decoded.to_bytes(), encoded);
    }

    #[test]
    fn test_noncompliant_bare_other_name_field() {
        // 5F0F directly in the stream instead of nested under A0
        let data: Vec<u8> = {
            let mut d = vec![0x6B, 0x0E, 0x5C, 0x02, 0x5F, 0x0F];
            d.extend([0x5F, 0x0F, 0x07]);
            d.extend(b"DOE<JON");
            d
        };
        let dg11 = Dg11File::from_bytes(&data).expect("decoding");
        assert_eq!(dg11.other_names(), Some(&["DOE<JON".to_owned()][..]));
    }
}
