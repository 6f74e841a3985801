//! Shared encoding helpers for the additional-detail data groups DG11 and
//! DG12.
//!
//! Both files start with a `5C` tag list enumerating the fields that follow,
//! then carry the fields as TLVs in that same order. List-valued fields
//! separate their entries with the filler `<`; the "other names"-style
//! fields nest under an `A0` template with a leading count.


use crate::lds::Error;
use crate::tlv::{Tag, Tlv, TlvReader, TlvWriter, Value};


/// The tag of the leading tag list.
pub const TAG_LIST_TAG: u32 = 0x5C;

/// Some fields nest in a constructed template with a count instead of
/// standing alone.
pub const CONTENT_SPECIFIC_CONSTRUCTED_TAG: u32 = 0xA0;

/// The count inside a content-specific constructed template.
pub const COUNT_TAG: u32 = 0x02;


/// Reads the `5C` tag list: tag octets back to back, no lengths.
pub fn read_tag_list(reader: &mut TlvReader) -> Result<Vec<u32>, Error> {
    reader.expect_tag(TAG_LIST_TAG)?;
    let length = reader.read_length()?;
    let list_bytes = reader.read_value(length)?;

    let mut tags = Vec::new();
    let mut list_reader = TlvReader::new(list_bytes);
    while !list_reader.is_at_end() {
        tags.push(list_reader.read_tag()?.value());
    }
    Ok(tags)
}

/// Writes the `5C` tag list.
pub fn write_tag_list(writer: &mut TlvWriter, tags: &[u32]) {
    let mut list_bytes = Vec::with_capacity(2 * tags.len());
    for tag in tags {
        list_bytes.extend(Tag::new(*tag).to_bytes());
    }
    writer.write_primitive(TAG_LIST_TAG, &list_bytes);
}

/// Reads a UTF-8 string field, trimming surrounding whitespace.
pub fn read_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).trim().to_owned()
}

/// Writes a string field. Absent values are not written at all, so only the
/// trimmed content lands in the file.
pub fn write_string(writer: &mut TlvWriter, tag: u32, value: &str) {
    writer.write_primitive(tag, value.trim().as_bytes());
}

/// Reads a full date. A four-byte value is packed BCD (seen on some
/// documents); eight bytes are the plain `yyyyMMdd` text.
pub fn read_full_date(value: &[u8]) -> String {
    if value.len() == 4 {
        let mut date = String::with_capacity(8);
        for byte in value {
            date.push_str(&format!("{:02X}", byte));
        }
        date
    } else {
        String::from_utf8_lossy(value).trim().to_owned()
    }
}

/// Reads a `<`-separated list field, trimming each entry.
pub fn read_list(value: &[u8]) -> Vec<String> {
    let field = read_string(value);
    field.split('<').map(|token| token.trim().to_owned()).collect()
}

/// Writes a `<`-separated list field.
pub fn write_list(writer: &mut TlvWriter, tag: u32, list: &[String]) {
    let mut encoded = String::new();
    for (index, entry) in list.iter().enumerate() {
        if index > 0 {
            encoded.push('<');
        }
        encoded.push_str(entry.trim());
    }
    writer.write_primitive(tag, encoded.as_bytes());
}

/// Reads the `A0`-wrapped content-specific list: a `02` count followed by
/// that many string fields.
pub fn read_content_specific_list(template: &Tlv, entry_tag: u32) -> Result<Vec<String>, Error> {
    let children = match &template.value {
        Value::Constructed(children) => children.as_slice(),
        Value::Primitive(_) => return Err(Error::Malformed { reason: "content-specific template is primitive" }),
    };

    let count_field = children.first()
        .filter(|child| child.tag == COUNT_TAG)
        .ok_or(Error::MissingField { tag: COUNT_TAG })?;
    let count_value = count_field.primitive_value()
        .ok_or(Error::Malformed { reason: "count is constructed" })?;
    if count_value.len() != 1 {
        return Err(Error::Malformed { reason: "count is not a single byte" });
    }
    let count = usize::from(count_value[0]);

    let mut entries = Vec::with_capacity(count);
    for child in children.iter().skip(1) {
        if child.tag != entry_tag {
            return Err(Error::UnexpectedTag { expected: Tag::new(entry_tag), found: child.tag });
        }
        let value = child.primitive_value()
            .ok_or(Error::Malformed { reason: "list entry is constructed" })?;
        entries.push(read_string(value));
    }
    if entries.len() != count {
        return Err(Error::Malformed { reason: "content-specific list count mismatch" });
    }
    Ok(entries)
}

/// Writes the `A0`-wrapped content-specific list.
pub fn write_content_specific_list(writer: &mut TlvWriter, entry_tag: u32, list: &[String]) {
    writer.begin_constructed(CONTENT_SPECIFIC_CONSTRUCTED_TAG);
    writer.write_primitive(COUNT_TAG, &[list.len() as u8]);
    for entry in list {
        writer.write_primitive(entry_tag, entry.trim().as_bytes());
    }
    writer.end_constructed();
}

/// An empty list is stored as a list holding one empty string, so that its
/// presence survives a round trip.
pub fn normalize_list(list: Vec<String>) -> Vec<String> {
    if list.is_empty() {
        vec![String::new()]
    } else {
        list
    }
}
