//! DG12: additional document details.


use crate::lds::additional_details::{
    normalize_list, read_content_specific_list, read_full_date, read_string, read_tag_list,
    write_content_specific_list, write_string, write_tag_list, CONTENT_SPECIFIC_CONSTRUCTED_TAG,
};
use crate::lds::{Error, LdsFile, EF_DG12_TAG};
use crate::tlv::{Tag, TlvReader, TlvWriter};


pub const ISSUING_AUTHORITY_TAG: u32 = 0x5F19;
pub const NAME_OF_OTHER_PERSON_TAG: u32 = 0x5F1A;
pub const ENDORSEMENTS_AND_OBSERVATIONS_TAG: u32 = 0x5F1B;
pub const TAX_OR_EXIT_REQUIREMENTS_TAG: u32 = 0x5F1C;
pub const IMAGE_OF_FRONT_TAG: u32 = 0x5F1D;
pub const IMAGE_OF_REAR_TAG: u32 = 0x5F1E;
pub const DATE_OF_ISSUE_TAG: u32 = 0x5F26;
pub const DATE_AND_TIME_OF_PERSONALIZATION_TAG: u32 = 0x5F55;
pub const PERSONALIZATION_SYSTEM_SERIAL_NUMBER_TAG: u32 = 0x5F56;


/// The DG12 file with additional details about the document itself.
///
/// Dates of issue are `yyyyMMdd`; the personalization timestamp is
/// `yyyyMMddhhmmss`. The front and rear images are compressed per
/// ISO/IEC 10918.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dg12File {
    issuing_authority: Option<String>,
    date_of_issue: Option<String>,
    names_of_other_persons: Option<Vec<String>>,
    endorsements_and_observations: Option<String>,
    tax_or_exit_requirements: Option<String>,
    image_of_front: Option<Vec<u8>>,
    image_of_rear: Option<Vec<u8>>,
    date_and_time_of_personalization: Option<String>,
    personalization_system_serial_number: Option<String>,

    tag_order: Vec<u32>,
}
impl Dg12File {
    /// Constructs a new file. Absent data elements are `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuing_authority: Option<String>,
        date_of_issue: Option<String>,
        names_of_other_persons: Option<Vec<String>>,
        endorsements_and_observations: Option<String>,
        tax_or_exit_requirements: Option<String>,
        image_of_front: Option<Vec<u8>>,
        image_of_rear: Option<Vec<u8>>,
        date_and_time_of_personalization: Option<String>,
        personalization_system_serial_number: Option<String>,
    ) -> Self {
        let mut file = Self {
            issuing_authority,
            date_of_issue,
            names_of_other_persons: names_of_other_persons.map(normalize_list),
            endorsements_and_observations,
            tax_or_exit_requirements,
            image_of_front,
            image_of_rear,
            date_and_time_of_personalization,
            personalization_system_serial_number,
            tag_order: Vec::new(),
        };
        file.tag_order = file.present_tags();
        file
    }

    fn present_tags(&self) -> Vec<u32> {
        let mut tags = Vec::with_capacity(9);
        if self.issuing_authority.is_some() {
            tags.push(ISSUING_AUTHORITY_TAG);
        }
        if self.date_of_issue.is_some() {
            tags.push(DATE_OF_ISSUE_TAG);
        }
        if self.names_of_other_persons.is_some() {
            tags.push(NAME_OF_OTHER_PERSON_TAG);
        }
        if self.endorsements_and_observations.is_some() {
            tags.push(ENDORSEMENTS_AND_OBSERVATIONS_TAG);
        }
        if self.tax_or_exit_requirements.is_some() {
            tags.push(TAX_OR_EXIT_REQUIREMENTS_TAG);
        }
        if self.image_of_front.is_some() {
            tags.push(IMAGE_OF_FRONT_TAG);
        }
        if self.image_of_rear.is_some() {
            tags.push(IMAGE_OF_REAR_TAG);
        }
        if self.date_and_time_of_personalization.is_some() {
            tags.push(DATE_AND_TIME_OF_PERSONALIZATION_TAG);
        }
        if self.personalization_system_serial_number.is_some() {
            tags.push(PERSONALIZATION_SYSTEM_SERIAL_NUMBER_TAG);
        }
        tags
    }

    /// The tags of the fields that are present, in file order.
    pub fn tag_presence_list(&self) -> &[u32] {
        &self.tag_order
    }

    pub fn issuing_authority(&self) -> Option<&str> { self.issuing_authority.as_deref() }
    pub fn date_of_issue(&self) -> Option<&str> { self.date_of_issue.as_deref() }
    pub fn names_of_other_persons(&self) -> Option<&[String]> { self.names_of_other_persons.as_deref() }
    pub fn endorsements_and_observations(&self) -> Option<&str> { self.endorsements_and_observations.as_deref() }
    pub fn tax_or_exit_requirements(&self) -> Option<&str> { self.tax_or_exit_requirements.as_deref() }
    pub fn image_of_front(&self) -> Option<&[u8]> { self.image_of_front.as_deref() }
    pub fn image_of_rear(&self) -> Option<&[u8]> { self.image_of_rear.as_deref() }
    pub fn date_and_time_of_personalization(&self) -> Option<&str> { self.date_and_time_of_personalization.as_deref() }
    pub fn personalization_system_serial_number(&self) -> Option<&str> { self.personalization_system_serial_number.as_deref() }
}
impl LdsFile for Dg12File {
    const TAG: u32 = EF_DG12_TAG;

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
                file.names_of_other_persons = Some(read_content_specific_list(&field, NAME_OF_OTHER_PERSON_TAG)?);
                continue;
            }

            let value = field.primitive_value()
                .ok_or(Error::Malformed { reason: "detail field is constructed" })?;
            match field.tag.value() {
                ISSUING_AUTHORITY_TAG => file.issuing_authority = Some(read_string(value)),
                DATE_OF_ISSUE_TAG => file.date_of_issue = Some(read_full_date(value)),
                // work around non-compliant early samples carrying a bare 5F1A
                NAME_OF_OTHER_PERSON_TAG => file.names_of_other_persons = Some(vec![read_string(value)]),
                ENDORSEMENTS_AND_OBSERVATIONS_TAG => file.endorsements_and_observations = Some(read_string(value)),
                TAX_OR_EXIT_REQUIREMENTS_TAG => file.tax_or_exit_requirements = Some(read_string(value)),
                IMAGE_OF_FRONT_TAG => file.image_of_front = Some(value.to_vec()),
                IMAGE_OF_REAR_TAG => file.image_of_rear = Some(value.to_vec()),
                DATE_AND_TIME_OF_PERSONALIZATION_TAG => file.date_and_time_of_personalization = Some(read_full_date(value)),
                PERSONALIZATION_SYSTEM_SERIAL_NUMBER_TAG => file.personalization_system_serial_number = Some(read_string(value)),
                _ => return Err(Error::Malformed { reason: "unknown field tag in DG12" }),
            }
        }
        Ok(file)
    }

    fn write_content(&self, output: &mut Vec<u8>) {
        let mut writer = TlvWriter::new();
        write_tag_list(&mut writer, &self.tag_order);

        for tag in &self.tag_order {
            match *tag {
                ISSUING_AUTHORITY_TAG => write_string(&mut writer, ISSUING_AUTHORITY_TAG, self.issuing_authority.as_deref().unwrap_or("")),
                DATE_OF_ISSUE_TAG => write_string(&mut writer, DATE_OF_ISSUE_TAG, self.date_of_issue.as_deref().unwrap_or("")),
                NAME_OF_OTHER_PERSON_TAG => write_content_specific_list(&mut writer, NAME_OF_OTHER_PERSON_TAG, self.names_of_other_persons.as_deref().unwrap_or(&[])),
                ENDORSEMENTS_AND_OBSERVATIONS_TAG => write_string(&mut writer, ENDORSEMENTS_AND_OBSERVATIONS_TAG, self.endorsements_and_observations.as_deref().unwrap_or("")),
                TAX_OR_EXIT_REQUIREMENTS_TAG => write_string(&mut writer, TAX_OR_EXIT_REQUIREMENTS_TAG, self.tax_or_exit_requirements.as_deref().unwrap_or("")),
                IMAGE_OF_FRONT_TAG => {
                    writer.write_primitive(IMAGE_OF_FRONT_TAG, self.image_of_front.as_deref().unwrap_or(&[]));
                },
                IMAGE_OF_REAR_TAG => {
                    writer.write_primitive(IMAGE_OF_REAR_TAG, self.image_of_rear.as_deref().unwrap_or(&[]));
                },
                DATE_AND_TIME_OF_PERSONALIZATION_TAG => write_string(&mut writer, DATE_AND_TIME_OF_PERSONALIZATION_TAG, self.date_and_time_of_personalization.as_deref().unwrap_or("")),
                PERSONALIZATION_SYSTEM_SERIAL_NUMBER_TAG => write_string(&mut writer, PERSONALIZATION_SYSTEM_SERIAL_NUMBER_TAG, self.personalization_system_serial_number.as_deref().unwrap_or("")),
                _ => {},
            }
        }
        output.extend(writer.into_bytes());
    }
}


#[cfg(test)]
mod tests {
    use super::Dg12File;
    use crate::lds::LdsFile;

    #[test]
    fn test_round_trip() {
        let dg12 = Dg12File::new(
            Some("UTOPIA PASSPORT OFFICE".to_owned()),
            Some("20140703".to_owned()),
            Some(vec!["VAN<DER<STEEN<<MARIANNE".to_owned()]),
            Some("NONE".to_owned()),
            None,
            None,
            None,
            Some("20140703102030".to_owned()),
            Some("PS01-000123".to_owned()),
        );

        let encoded = dg12.to_bytes();
        let decoded = Dg12File::from_bytes(&encoded).expect("decoding");
        assert_eq!(decoded, dg12);
        assert_eq!(decoded.to_bytes(), encoded);
    }

    #[test]
    fn test_empty_names_list_round_trip() {
        let dg12 = Dg12File::new(
            Some("UTOPIA PASSPORT OFFICE".to_owned()),
            None,
            Some(Vec::new()),
            None, None, None, None, None, None,
        );
        assert_eq!(dg12.names_of_other_persons(), Some(&[String::new()][..]));

        let encoded = dg12.to_bytes();
        let decoded = Dg12File::from_bytes(&encoded).expect("decoding");
        assert_eq!(decoded, dg12);
        assert_eq!(decoded.to_bytes(), encoded);
    }
}
