//! Decoding of machine-readable zones.
//!
//! Three form factors are defined: TD1 (credit-card size), TD2 (old German ID card size, ISO 216
//! size A7) and TD3 (passport, ISO 216 size B7).
//!
//! The TD1 encoding is:
//! ```plain
//! TTSSSNNNNNNNNNCOOOOOOOOOOOOOOO
//! BBBBBBDXEEEEEEFAAAPPPPPPPPPPPG
//! IIIIIIIIIIIIIIIIIIIIIIIIIIIIII
//! ```
//! with
//! * `TT`: type of document (right-padded with `<`)
//! * `SSS`: issuing state or organization (right-padded with `<`)
//! * `NNNNNNNNN`: first 9 characters of document number (spaces replaced by `<`, right-padded with
//!   `<`)
//! * `C`: check digit of document number, or `<` if document number is longer than 9 digits
//! * `OOOOOOOOOOOOOOO`: optional data (right-padded with `<`); if document number is longer than 9
//!   digits, begins with remaining digits of document number followed by check digit followed by
//!   `<`
//! * `BBBBBB`: date of birth as YYMMDD
//! * `D`: check digit of date of birth
//! * `X`: sex (`F`, `M`, or `<` for unspecified)
//! * `EEEEEE`: date of expiry as YYMMDD
//! * `F`: check digit of date of expiry
//! * `AAA`: nationality
//! * `PPPPPPPPPPP`: optional data (right-padded with `<`)
//! * `G`: composite check digit of `NNNNNNNNNCOOOOOOOOOOOOOOOBBBBBBDEEEEEEFPPPPPPPPPPP`
//! * `IIIIIIIIIIIIIIIIIIIIIIIIIIIIII`: name (possibly truncated):
//!   1. primary identifier (components separated by `<`)
//!   2. if there is a secondary identifier: `<<`
//!   3. secondary identifier (components separated by `<`)
//!   4. padding with `<`
//!
//! The TD2 encoding is:
//! ```plain
//! TTSSSIIIIIIIIIIIIIIIIIIIIIIIIIIIIIII
//! NNNNNNNNNCAAABBBBBBDXEEEEEEFOOOOOOOG
//! ```
//! The fields are as with TD1, except the composite check digit `G` is calculated from
//! `NNNNNNNNNCBBBBBBDEEEEEEFOOOOOOO`.
//!
//! The TD3 encoding is:
//! ```plain
//! TTSSSIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIII
//! NNNNNNNNNCAAABBBBBBDXEEEEEEFOOOOOOOOOOOOOOQG
//! ```
//! The fields are as with TD1, except:
//! * `NNNNNNNNN` (passport number) cannot be longer than 9 characters
//! * `Q` is a check digit of `OOOOOOOOOOOOOO`
//! * `G` (composite check digit) is calculated from
//!   `NNNNNNNNNCBBBBBBDEEEEEEFOOOOOOOOOOOOOOQ`


use std::fmt;
use std::fmt::Write;

use smallstr::SmallString;


#[derive(Debug)]
pub enum Error {
    Length { obtained: usize },
    NotAscii,
    CheckDigitValue { byte: u8 },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Length { obtained }
                => write!(f, "no machine-readable zone variant has {} characters", obtained),
            Self::NotAscii
                => write!(f, "the machine-readable zone contains non-ASCII characters"),
            Self::CheckDigitValue { byte }
                => write!(f, "byte 0x{:02X} is not a check digit", byte),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Variant {
    Td1,
    Td2,
    Td3,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Sex {
    Female,
    Male,
    Unspecified,
}
impl Sex {
    fn from_mrz_byte(byte: u8) -> Self {
        match byte {
            b'F' => Self::Female,
            b'M' => Self::Male,
            _ => Self::Unspecified,
        }
    }

    const fn to_mrz_char(self) -> char {
        match self {
            Self::Female => 'F',
            Self::Male => 'M',
            Self::Unspecified => '<',
        }
    }
}


/// Calculates the 7-3-1 weighted check digit over MRZ characters.
///
/// Digits carry their value, letters 10 through 35; the filler `<` counts as
/// zero but still advances the weight cycle.
pub fn check_digit(data: &str) -> u8 {
    const WEIGHTS: [u8; 3] = [7, 3, 1];

    let mut result: u8 = 0;
    for (b, weight) in data.bytes().zip(WEIGHTS.iter().copied().cycle()) {
        let value = if b.is_ascii_digit() {
            b - b'0'
        } else if b.is_ascii_uppercase() {
            b + 10 - b'A'
        } else {
            // '<' and invalid characters count as zero but keep the weight cycling
            0
        };

        // worst-case: 'Z' at weight 7 (7 * 35 = 245) plus current digit 9 always fits into u8
        let weighted = (value % 10) * weight;
        result = (result + weighted) % 10;
    }

    result
}

fn parse_check_digit(byte: u8) -> Result<u8, Error> {
    if byte.is_ascii_digit() {
        Ok(byte - b'0')
    } else if byte == b'<' {
        // a filler marks an absent or relocated check digit
        Ok(0)
    } else {
        Err(Error::CheckDigitValue { byte })
    }
}

fn trimmed(field: &str) -> &str {
    field.trim_end_matches('<')
}

fn pad_to(value: &str, width: usize, output: &mut String) {
    output.push_str(value);
    for _ in value.len()..width {
        output.push('<');
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Td1Data {
    /// Document type.
    pub document_type: SmallString<[u8; 2]>,

    /// Issuer state or organization of the document.
    pub issuer: SmallString<[u8; 3]>,

    /// Number of the document.
    ///
    /// Can be alphanumeric.
    pub document_number: SmallString<[u8; 22]>,

    /// Check digit of the document number.
    pub document_number_check: u8,

    /// Optional data 1.
    pub optional_data_1: SmallString<[u8; 15]>,

    /// Date of birth.
    pub date_of_birth: SmallString<[u8; 6]>,

    /// Check digit for date of birth.
    pub date_of_birth_check: u8,

    /// Sex.
    pub sex: Sex,

    /// Date of expiry.
    pub date_of_expiry: SmallString<[u8; 6]>,

    /// Check digit for date of expiry.
    pub date_of_expiry_check: u8,

    /// Nationality of holder.
    pub nationality: SmallString<[u8; 3]>,

    /// Optional data 2.
    pub optional_data_2: SmallString<[u8; 11]>,

    /// Composite check digit.
    pub composite_check: u8,

    /// Name of holder.
    pub name: SmallString<[u8; 39]>,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Td2Data {
    /// Document type.
    pub document_type: SmallString<[u8; 2]>,

    /// Issuer state or organization of the document.
    pub issuer: SmallString<[u8; 3]>,

    /// Name of holder.
    pub name: SmallString<[u8; 39]>,

    /// Number of the document.
    ///
    /// Can be alphanumeric.
    pub document_number: SmallString<[u8; 22]>,

    /// Check digit of the document number.
    pub document_number_check: u8,

    /// Nationality of holder.
    pub nationality: SmallString<[u8; 3]>,

    /// Date of birth.
    pub date_of_birth: SmallString<[u8; 6]>,

    /// Check digit for date of birth.
    pub date_of_birth_check: u8,

    /// Sex.
    pub sex: Sex,

    /// Date of expiry.
    pub date_of_expiry: SmallString<[u8; 6]>,

    /// Check digit for date of expiry.
    pub date_of_expiry_check: u8,

    /// Optional data 1.
    pub optional_data_1: SmallString<[u8; 15]>,

    /// Composite check digit.
    pub composite_check: u8,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Td3Data {
    /// Document type.
    pub document_type: SmallString<[u8; 2]>,

    /// Issuer state or organization of the document.
    pub issuer: SmallString<[u8; 3]>,

    /// Name of holder.
    pub name: SmallString<[u8; 39]>,

    /// Number of the document.
    ///
    /// Can be alphanumeric.
    pub document_number: SmallString<[u8; 22]>,

    /// Check digit of the document number.
    pub document_number_check: u8,

    /// Nationality of holder.
    pub nationality: SmallString<[u8; 3]>,

    /// Date of birth.
    pub date_of_birth: SmallString<[u8; 6]>,

    /// Check digit for date of birth.
    pub date_of_birth_check: u8,

    /// Sex.
    pub sex: Sex,

    /// Date of expiry.
    pub date_of_expiry: SmallString<[u8; 6]>,

    /// Check digit for date of expiry.
    pub date_of_expiry_check: u8,

    /// Optional data 1.
    pub optional_data_1: SmallString<[u8; 15]>,

    /// Check digit for optional data 1.
    pub optional_data_1_check: u8,

    /// Composite check digit.
    pub composite_check: u8,
}


macro_rules! mrz_field {
    ($name:ident, $type:ty) => {
        pub fn $name(&self) -> $type {
            match self {
                Self::Td1(d) => &d.$name,
                Self::Td2(d) => &d.$name,
                Self::Td3(d) => &d.$name,
            }
        }
    };
    ($name:ident, $type:ty, copy) => {
        pub fn $name(&self) -> $type {
            match self {
                Self::Td1(d) => d.$name,
                Self::Td2(d) => d.$name,
                Self::Td3(d) => d.$name,
            }
        }
    };
    ($name:ident, $type:ty, 1) => {
        pub fn $name(&self) -> Option<$type> {
            match self {
                Self::Td1(d) => Some(&d.$name),
                Self::Td2(_) => None,
                Self::Td3(_) => None,
            }
        }
    };
    ($name:ident, $type:ty, copy3) => {
        pub fn $name(&self) -> Option<$type> {
            match self {
                Self::Td1(_) => None,
                Self::Td2(_) => None,
                Self::Td3(d) => Some(d.$name),
            }
        }
    };
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MrzData {
    Td1(Td1Data),
    Td2(Td2Data),
    Td3(Td3Data),
}
impl MrzData {
    mrz_field!(document_type, &str);
    mrz_field!(issuer, &str);
    mrz_field!(document_number, &str);
    mrz_field!(document_number_check, u8, copy);
    mrz_field!(optional_data_1, &str);
    mrz_field!(date_of_birth, &str);
    mrz_field!(date_of_birth_check, u8, copy);
    mrz_field!(sex, Sex, copy);
    mrz_field!(date_of_expiry, &str);
    mrz_field!(date_of_expiry_check, u8, copy);
    mrz_field!(nationality, &str);
    mrz_field!(optional_data_2, &str, 1);
    mrz_field!(composite_check, u8, copy);
    mrz_field!(name, &str);

    mrz_field!(optional_data_1_check, u8, copy3);

    pub fn variant(&self) -> Variant {
        match self {
            Self::Td1(_) => Variant::Td1,
            Self::Td2(_) => Variant::Td2,
            Self::Td3(_) => Variant::Td3,
        }
    }

    /// Parses a machine-readable zone. Line breaks are ignored; the variant
    /// is chosen by the total character count.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if !compact.is_ascii() {
            return Err(Error::NotAscii);
        }
        match compact.len() {
            90 => Td1Data::parse(compact.as_bytes()).map(Self::Td1),
            72 => Td2Data::parse(compact.as_bytes()).map(Self::Td2),
            88 => Td3Data::parse(compact.as_bytes()).map(Self::Td3),
            obtained => Err(Error::Length { obtained }),
        }
    }

    /// Re-encodes the machine-readable zone without line breaks, exactly as
    /// stored in DG1.
    pub fn to_mrz_string(&self) -> String {
        match self {
            Self::Td1(d) => d.to_mrz_string(),
            Self::Td2(d) => d.to_mrz_string(),
            Self::Td3(d) => d.to_mrz_string(),
        }
    }

    /// The key string for Basic Access Control: document number, date of
    /// birth and date of expiry, each with its check digit.
    pub fn mrz_key(&self) -> String {
        let mut ret = String::with_capacity(22 + 1 + 6 + 1 + 6 + 1);
        let mut padded_number = self.document_number().to_owned();
        while padded_number.len() < 9 {
            padded_number.push('<');
        }
        ret.push_str(&padded_number);
        write!(ret, "{}", self.document_number_check()).unwrap();
        ret.push_str(self.date_of_birth());
        write!(ret, "{}", self.date_of_birth_check()).unwrap();
        ret.push_str(self.date_of_expiry());
        write!(ret, "{}", self.date_of_expiry_check()).unwrap();
        ret
    }

    pub fn is_document_number_valid(&self) -> bool {
        let mut padded_number = self.document_number().to_owned();
        while padded_number.len() < 9 {
            padded_number.push('<');
        }
        check_digit(&padded_number) == self.document_number_check()
    }

    pub fn is_date_of_birth_valid(&self) -> bool {
        check_digit(self.date_of_birth()) == self.date_of_birth_check()
    }

    pub fn is_date_of_expiry_valid(&self) -> bool {
        check_digit(self.date_of_expiry()) == self.date_of_expiry_check()
    }
}

impl Td3Data {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(data.len(), 88);
        let line1 = &data[0..44];
        let line2 = &data[44..88];

        let field = |bytes: &[u8]| -> SmallString<[u8; 22]> {
            SmallString::from_str(trimmed(std::str::from_utf8(bytes).unwrap()))
        };

        Ok(Self {
            document_type: SmallString::from_str(trimmed(std::str::from_utf8(&line1[0..2]).unwrap())),
            issuer: SmallString::from_str(trimmed(std::str::from_utf8(&line1[2..5]).unwrap())),
            name: SmallString::from_str(trimmed(std::str::from_utf8(&line1[5..44]).unwrap())),
            document_number: field(&line2[0..9]),
            document_number_check: parse_check_digit(line2[9])?,
            nationality: SmallString::from_str(trimmed(std::str::from_utf8(&line2[10..13]).unwrap())),
            date_of_birth: SmallString::from_str(std::str::from_utf8(&line2[13..19]).unwrap()),
            date_of_birth_check: parse_check_digit(line2[19])?,
            sex: Sex::from_mrz_byte(line2[20]),
            date_of_expiry: SmallString::from_str(std::str::from_utf8(&line2[21..27]).unwrap()),
            date_of_expiry_check: parse_check_digit(line2[27])?,
            optional_data_1: SmallString::from_str(trimmed(std::str::from_utf8(&line2[28..42]).unwrap())),
            optional_data_1_check: parse_check_digit(line2[42])?,
            composite_check: parse_check_digit(line2[43])?,
        })
    }

    fn to_mrz_string(&self) -> String {
        let mut ret = String::with_capacity(88);
        pad_to(&self.document_type, 2, &mut ret);
        pad_to(&self.issuer, 3, &mut ret);
        pad_to(&self.name, 39, &mut ret);
        pad_to(&self.document_number, 9, &mut ret);
        write!(ret, "{}", self.document_number_check).unwrap();
        pad_to(&self.nationality, 3, &mut ret);
        ret.push_str(&self.date_of_birth);
        write!(ret, "{}", self.date_of_birth_check).unwrap();
        ret.push(self.sex.to_mrz_char());
        ret.push_str(&self.date_of_expiry);
        write!(ret, "{}", self.date_of_expiry_check).unwrap();
        pad_to(&self.optional_data_1, 14, &mut ret);
        write!(ret, "{}", self.optional_data_1_check).unwrap();
        write!(ret, "{}", self.composite_check).unwrap();
        ret
    }
}

impl Td2Data {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(data.len(), 72);
        let line1 = &data[0..36];
        let line2 = &data[36..72];

        Ok(Self {
            document_type: SmallString::from_str(trimmed(std::str::from_utf8(&line1[0..2]).unwrap())),
            issuer: SmallString::from_str(trimmed(std::str::from_utf8(&line1[2..5]).unwrap())),
            name: SmallString::from_str(trimmed(std::str::from_utf8(&line1[5..36]).unwrap())),
            document_number: SmallString::from_str(trimmed(std::str::from_utf8(&line2[0..9]).unwrap())),
            document_number_check: parse_check_digit(line2[9])?,
            nationality: SmallString::from_str(trimmed(std::str::from_utf8(&line2[10..13]).unwrap())),
            date_of_birth: SmallString::from_str(std::str::from_utf8(&line2[13..19]).unwrap()),
            date_of_birth_check: parse_check_digit(line2[19])?,
            sex: Sex::from_mrz_byte(line2[20]),
            date_of_expiry: SmallString::from_str(std::str::from_utf8(&line2[21..27]).unwrap()),
            date_of_expiry_check: parse_check_digit(line2[27])?,
            optional_data_1: SmallString::from_str(trimmed(std::str::from_utf8(&line2[28..35]).unwrap())),
            composite_check: parse_check_digit(line2[35])?,
        })
    }

    fn to_mrz_string(&self) -> String {
        let mut ret = String::with_capacity(72);
        pad_to(&self.document_type, 2, &mut ret);
        pad_to(&self.issuer, 3, &mut ret);
        pad_to(&self.name, 31, &mut ret);
        pad_to(&self.document_number, 9, &mut ret);
        write!(ret, "{}", self.document_number_check).unwrap();
        pad_to(&self.nationality, 3, &mut ret);
        ret.push_str(&self.date_of_birth);
        write!(ret, "{}", self.date_of_birth_check).unwrap();
        ret.push(self.sex.to_mrz_char());
        ret.push_str(&self.date_of_expiry);
        write!(ret, "{}", self.date_of_expiry_check).unwrap();
        pad_to(&self.optional_data_1, 7, &mut ret);
        write!(ret, "{}", self.composite_check).unwrap();
        ret
    }
}

impl Td1Data {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(data.len(), 90);
        let line1 = &data[0..30];
        let line2 = &data[30..60];
        let line3 = &data[60..90];

        let mut document_number = SmallString::<[u8; 22]>::from_str(
            trimmed(std::str::from_utf8(&line1[5..14]).unwrap())
        );
        let mut optional_data_1 = SmallString::<[u8; 15]>::from_str(
            trimmed(std::str::from_utf8(&line1[15..30]).unwrap())
        );
        let document_number_check;
        if line1[14] == b'<' {
            // document number longer than nine characters: continued in the
            // optional data, terminated by its check digit and a filler
            let continued = optional_data_1.to_string();
            let continuation = continued.split('<').next().unwrap_or("").to_owned();
            if continuation.is_empty() {
                document_number_check = 0;
            } else {
                let (number_part, check_part) = continuation.split_at(continuation.len() - 1);
                document_number.push_str(number_part);
                document_number_check = parse_check_digit(check_part.as_bytes()[0])?;
            }
            optional_data_1 = SmallString::from_str(
                trimmed(continued.splitn(2, '<').nth(1).unwrap_or(""))
            );
        } else {
            document_number_check = parse_check_digit(line1[14])?;
        }

        Ok(Self {
            document_type: SmallString::from_str(trimmed(std::str::from_utf8(&line1[0..2]).unwrap())),
            issuer: SmallString::from_str(trimmed(std::str::from_utf8(&line1[2..5]).unwrap())),
            document_number,
            document_number_check,
            optional_data_1,
            date_of_birth: SmallString::from_str(std::str::from_utf8(&line2[0..6]).unwrap()),
            date_of_birth_check: parse_check_digit(line2[6])?,
            sex: Sex::from_mrz_byte(line2[7]),
            date_of_expiry: SmallString::from_str(std::str::from_utf8(&line2[8..14]).unwrap()),
            date_of_expiry_check: parse_check_digit(line2[14])?,
            nationality: SmallString::from_str(trimmed(std::str::from_utf8(&line2[15..18]).unwrap())),
            optional_data_2: SmallString::from_str(trimmed(std::str::from_utf8(&line2[18..29]).unwrap())),
            composite_check: parse_check_digit(line2[29])?,
            name: SmallString::from_str(trimmed(std::str::from_utf8(&line3[0..30]).unwrap())),
        })
    }

    fn to_mrz_string(&self) -> String {
        let mut ret = String::with_capacity(90);
        pad_to(&self.document_type, 2, &mut ret);
        pad_to(&self.issuer, 3, &mut ret);
        if self.document_number.len() <= 9 {
            pad_to(&self.document_number, 9, &mut ret);
            write!(ret, "{}", self.document_number_check).unwrap();
            pad_to(&self.optional_data_1, 15, &mut ret);
        } else {
            // overlong document number spills into the optional data
            ret.push_str(&self.document_number[0..9]);
            ret.push('<');
            let mut spill = self.document_number[9..].to_owned();
            write!(spill, "{}", self.document_number_check).unwrap();
            spill.push('<');
            spill.push_str(&self.optional_data_1);
            pad_to(&spill, 15, &mut ret);
        }
        ret.push_str(&self.date_of_birth);
        write!(ret, "{}", self.date_of_birth_check).unwrap();
        ret.push(self.sex.to_mrz_char());
        ret.push_str(&self.date_of_expiry);
        write!(ret, "{}", self.date_of_expiry_check).unwrap();
        pad_to(&self.nationality, 3, &mut ret);
        pad_to(&self.optional_data_2, 11, &mut ret);
        write!(ret, "{}", self.composite_check).unwrap();
        pad_to(&self.name, 30, &mut ret);
        ret
    }
}


#[cfg(test)]
mod tests {
    use super::{check_digit, MrzData, Sex, Variant};

    const TD3_SAMPLE: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    #[test]
    fn test_check_digit() {
        // worked examples from ICAO Doc 9303 Part 3
        assert_eq!(check_digit("L898902C<"), 3);
        assert_eq!(check_digit("690806"), 1);
        assert_eq!(check_digit("940623"), 6);
        assert_eq!(check_digit("740812"), 2);
    }

    #[test]
    fn test_td3_parse() {
        let mrz = MrzData::parse(TD3_SAMPLE).expect("parsing");
        assert_eq!(mrz.variant(), Variant::Td3);
        assert_eq!(mrz.document_type(), "P");
        assert_eq!(mrz.issuer(), "UTO");
        assert_eq!(mrz.name(), "ERIKSSON<<ANNA<MARIA");
        assert_eq!(mrz.document_number(), "L898902C3");
        assert_eq!(mrz.nationality(), "UTO");
        assert_eq!(mrz.date_of_birth(), "740812");
        assert_eq!(mrz.sex(), Sex::Female);
        assert_eq!(mrz.date_of_expiry(), "120415");
        assert_eq!(mrz.optional_data_1(), "ZE184226B");
    }

    #[test]
    fn test_td3_round_trip() {
        let mrz = MrzData::parse(TD3_SAMPLE).expect("parsing");
        assert_eq!(mrz.to_mrz_string(), TD3_SAMPLE);

        let reparsed = MrzData::parse(&mrz.to_mrz_string()).expect("reparsing");
        assert_eq!(reparsed, mrz);
    }

    #[test]
    fn test_field_validity() {
        let mrz = MrzData::parse(TD3_SAMPLE).expect("parsing");
        assert!(mrz.is_date_of_birth_valid());
        assert!(mrz.is_date_of_expiry_valid());
    }
}
