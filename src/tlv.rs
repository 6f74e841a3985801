//! Tag-length-value codec for BER-encoded structures.
//!
//! The LDS file formats are built from BER TLV data objects (ISO/IEC 7816-4
//! Annex D). This module provides a pull-style reader and a push-style writer
//! over byte slices. Lengths are encoded in definite short or long form;
//! indefinite lengths are tolerated when reading constructed values but are
//! never produced.


use std::fmt;


/// A BER tag, at most three identifier octets.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag(u32);
impl Tag {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The first identifier octet, which carries the class and
    /// primitive/constructed bits.
    const fn leading_byte(&self) -> u8 {
        if self.0 > 0xFFFF {
            ((self.0 >> 16) & 0xFF) as u8
        } else if self.0 > 0xFF {
            ((self.0 >> 8) & 0xFF) as u8
        } else {
            (self.0 & 0xFF) as u8
        }
    }

    pub const fn is_constructed(&self) -> bool {
        self.leading_byte() & 0b0010_0000 != 0
    }

    pub const fn class(&self) -> TagClass {
        match self.leading_byte() >> 6 {
            0b00 => TagClass::Universal,
            0b01 => TagClass::Application,
            0b10 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    /// Serializes the identifier octets.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.0 > 0xFFFF {
            vec![(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
        } else if self.0 > 0xFF {
            vec![(self.0 >> 8) as u8, self.0 as u8]
        } else {
            vec![self.0 as u8]
        }
    }

    /// The number of identifier octets.
    pub const fn byte_count(&self) -> usize {
        if self.0 > 0xFFFF {
            3
        } else if self.0 > 0xFF {
            2
        } else {
            1
        }
    }
}
impl From<u32> for Tag {
    fn from(value: u32) -> Self { Self(value) }
}
impl PartialEq<u32> for Tag {
    fn eq(&self, other: &u32) -> bool { self.0 == *other }
}
impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(0x{:02X})", self.0)
    }
}
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}


#[derive(Debug)]
pub enum Error {
    Malformed { reason: &'static str },
    UnexpectedTag { expected: Tag, found: Tag },
    UnexpectedEndOfData,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Malformed { reason }
                => write!(f, "malformed TLV: {}", reason),
            Self::UnexpectedTag { expected, found }
                => write!(f, "expected tag {}, found {}", expected, found),
            Self::UnexpectedEndOfData
                => write!(f, "unexpected end of data"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}


/// The length field of a data object.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Length {
    Definite(usize),
    Indefinite,
}


/// A fully parsed data object.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tlv {
    pub tag: Tag,
    pub value: Value,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Value {
    Primitive(Vec<u8>),
    Constructed(Vec<Tlv>),
}

impl Tlv {
    pub fn primitive<T: Into<Tag>>(tag: T, value: Vec<u8>) -> Self {
        Self { tag: tag.into(), value: Value::Primitive(value) }
    }

    pub fn constructed<T: Into<Tag>>(tag: T, children: Vec<Tlv>) -> Self {
        Self { tag: tag.into(), value: Value::Constructed(children) }
    }

    /// Parses one complete data object from the front of `data`, returning it
    /// together with the unconsumed rest.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let mut reader = TlvReader::new(data);
        let tlv = reader.read_tlv()?;
        Ok((tlv, reader.rest()))
    }

    /// Returns the primitive payload, if this object is primitive.
    pub fn primitive_value(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Primitive(bytes) => Some(bytes),
            Value::Constructed(_) => None,
        }
    }

    /// Returns the child objects, if this object is constructed.
    pub fn children(&self) -> Option<&[Tlv]> {
        match &self.value {
            Value::Primitive(_) => None,
            Value::Constructed(children) => Some(children),
        }
    }

    /// Finds the first direct child with the given tag.
    pub fn find_child<T: Into<Tag>>(&self, tag: T) -> Option<&Tlv> {
        let tag = tag.into();
        self.children()?.iter().find(|child| child.tag == tag)
    }

    /// Serializes this object in definite-length BER.
    pub fn encode(&self, output: &mut Vec<u8>) {
        output.extend(self.tag.to_bytes());
        match &self.value {
            Value::Primitive(bytes) => {
                encode_length(output, bytes.len());
                output.extend(bytes);
            },
            Value::Constructed(children) => {
                let mut inner = Vec::new();
                for child in children {
                    child.encode(&mut inner);
                }
                encode_length(output, inner.len());
                output.extend(inner);
            },
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::new();
        self.encode(&mut output);
        output
    }
}


/// Encodes a definite length in short or long form.
pub fn encode_length(output: &mut Vec<u8>, length: usize) {
    if length < 128 {
        output.push(length as u8);
    } else {
        // 0b1nnn_nnnn and then n additional big-endian length bytes
        let length_bytes = length.to_be_bytes();
        let mut trimmed = &length_bytes[..];
        while trimmed[0] == 0x00 {
            trimmed = &trimmed[1..];
        }
        output.push(0b1000_0000 | u8::try_from(trimmed.len()).unwrap());
        output.extend(trimmed);
    }
}

/// The number of bytes `encode_length` produces for the given length.
pub fn length_byte_count(length: usize) -> usize {
    if length < 128 {
        1
    } else {
        let mut bytes = 0;
        let mut rest = length;
        while rest > 0 {
            rest >>= 8;
            bytes += 1;
        }
        1 + bytes
    }
}


/// A pull-style reader over a TLV-encoded byte slice.
pub struct TlvReader<'d> {
    data: &'d [u8],
    pos: usize,
}
impl<'d> TlvReader<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The unconsumed rest of the input.
    pub fn rest(&self) -> &'d [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, count: usize) -> Result<&'d [u8], Error> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEndOfData);
        }
        let slice = &self.data[self.pos..self.pos+count];
        self.pos += count;
        Ok(slice)
    }

    /// Reads the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, Error> {
        let mut copy = TlvReader { data: self.data, pos: self.pos };
        copy.read_tag()
    }

    /// Reads identifier octets. Tags longer than three octets are rejected.
    pub fn read_tag(&mut self) -> Result<Tag, Error> {
        let first = self.take(1)?[0];
        if first & 0b0001_1111 != 0b0001_1111 {
            return Ok(Tag::new(first.into()));
        }
        let second = self.take(1)?[0];
        if second & 0b1000_0000 == 0 {
            return Ok(Tag::new((u32::from(first) << 8) | u32::from(second)));
        }
        let third = self.take(1)?[0];
        if third & 0b1000_0000 != 0 {
            return Err(Error::Malformed { reason: "tag longer than three octets" });
        }
        Ok(Tag::new((u32::from(first) << 16) | (u32::from(second) << 8) | u32::from(third)))
    }

    /// Reads a tag and verifies that it matches the expectation.
    pub fn expect_tag<T: Into<Tag>>(&mut self, expected: T) -> Result<Tag, Error> {
        let expected = expected.into();
        let found = self.read_tag()?;
        if found != expected {
            return Err(Error::UnexpectedTag { expected, found });
        }
        Ok(found)
    }

    /// Reads a length field, allowing the indefinite form.
    pub fn read_any_length(&mut self) -> Result<Length, Error> {
        let first = self.take(1)?[0];
        if first & 0b1000_0000 == 0 {
            return Ok(Length::Definite(first.into()));
        }
        let count = usize::from(first & 0b0111_1111);
        if count == 0 {
            return Ok(Length::Indefinite);
        }
        if count > std::mem::size_of::<usize>() {
            return Err(Error::Malformed { reason: "length field too wide" });
        }
        let mut length: usize = 0;
        for byte in self.take(count)? {
            length = length.checked_mul(256)
                .and_then(|l| l.checked_add(usize::from(*byte)))
                .ok_or(Error::Malformed { reason: "length overflow" })?;
        }
        Ok(Length::Definite(length))
    }

    /// Reads a definite length field.
    pub fn read_length(&mut self) -> Result<usize, Error> {
        match self.read_any_length()? {
            Length::Definite(length) => Ok(length),
            Length::Indefinite => Err(Error::Malformed { reason: "indefinite length where definite required" }),
        }
    }

    /// Reads `length` content octets.
    pub fn read_value(&mut self, length: usize) -> Result<&'d [u8], Error> {
        self.take(length)
    }

    /// Reads one complete data object. Constructed values are parsed
    /// recursively; an indefinite-length constructed value is consumed up to
    /// its end-of-contents marker.
    pub fn read_tlv(&mut self) -> Result<Tlv, Error> {
        let tag = self.read_tag()?;
        let length = self.read_any_length()?;

        if !tag.is_constructed() {
            let length = match length {
                Length::Definite(length) => length,
                Length::Indefinite => return Err(Error::Malformed { reason: "indefinite length on primitive value" }),
            };
            let value = self.read_value(length)?.to_vec();
            return Ok(Tlv { tag, value: Value::Primitive(value) });
        }

        let mut children = Vec::new();
        match length {
            Length::Definite(length) => {
                let content = self.read_value(length)?;
                let mut inner = TlvReader::new(content);
                while !inner.is_at_end() {
                    children.push(inner.read_tlv()?);
                }
            },
            Length::Indefinite => {
                loop {
                    if self.remaining() >= 2 && self.data[self.pos] == 0x00 && self.data[self.pos+1] == 0x00 {
                        self.pos += 2;
                        break;
                    }
                    if self.is_at_end() {
                        return Err(Error::Malformed { reason: "missing end-of-contents marker" });
                    }
                    children.push(self.read_tlv()?);
                }
            },
        }
        Ok(Tlv { tag, value: Value::Constructed(children) })
    }

    /// Skips complete data objects until the next tag equals `tag`, leaving
    /// the reader positioned on that tag.
    pub fn skip_to_tag<T: Into<Tag>>(&mut self, tag: T) -> Result<(), Error> {
        let tag = tag.into();
        loop {
            if self.is_at_end() {
                return Err(Error::UnexpectedEndOfData);
            }
            if self.peek_tag()? == tag {
                return Ok(());
            }
            self.read_tlv()?;
        }
    }
}


/// A push-style writer producing definite-length BER.
///
/// Constructed values with contents of unknown length are written by bracketing
/// the content between [`TlvWriter::begin_constructed`] and
/// [`TlvWriter::end_constructed`]; the length field is inserted when the
/// bracket closes.
pub struct TlvWriter {
    output: Vec<u8>,
    open_values: Vec<usize>,
}
impl TlvWriter {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            open_values: Vec::new(),
        }
    }

    pub fn write_tag<T: Into<Tag>>(&mut self, tag: T) {
        self.output.extend(tag.into().to_bytes());
    }

    /// Writes a length field followed by the content octets. The tag must
    /// already have been written.
    pub fn write_value(&mut self, value: &[u8]) {
        encode_length(&mut self.output, value.len());
        self.output.extend(value);
    }

    /// Writes a complete primitive data object.
    pub fn write_primitive<T: Into<Tag>>(&mut self, tag: T, value: &[u8]) {
        self.write_tag(tag);
        self.write_value(value);
    }

    /// Opens a constructed data object whose length is determined when
    /// [`TlvWriter::end_constructed`] is called.
    pub fn begin_constructed<T: Into<Tag>>(&mut self, tag: T) {
        self.write_tag(tag);
        self.open_values.push(self.output.len());
    }

    /// Closes the innermost open constructed data object, inserting its
    /// length field.
    pub fn end_constructed(&mut self) {
        let content_start = self.open_values.pop()
            .expect("end_constructed without begin_constructed");
        let content_length = self.output.len() - content_start;
        let mut length_field = Vec::with_capacity(5);
        encode_length(&mut length_field, content_length);
        self.output.splice(content_start..content_start, length_field);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        assert!(self.open_values.is_empty(), "unclosed constructed value");
        self.output
    }
}
impl Default for TlvWriter {
    fn default() -> Self { Self::new() }
}


#[cfg(test)]
mod tests {
    use super::{Tag, Tlv, TlvReader, TlvWriter, Value};
    use hex_literal::hex;

    #[test]
    fn test_single_byte_tag() {
        let data = hex!("4F 08 D2 76 00 01 24 01 03 04");
        let (tlv, rest) = Tlv::parse(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(tlv.tag, Tag::new(0x4F));
        assert_eq!(tlv.primitive_value(), Some(&hex!("D276000124010304")[..]));
        assert_eq!(tlv.to_bytes(), &data);
    }

    #[test]
    fn test_two_byte_tag() {
        let data = hex!("5F 50 0B 65 78 61 6D 70 6C 65 2E 63 6F 6D");
        let (tlv, _) = Tlv::parse(&data).unwrap();
        assert_eq!(tlv.tag, Tag::new(0x5F50));
        assert_eq!(tlv.primitive_value(), Some(&b"example.com"[..]));
        assert_eq!(tlv.to_bytes(), &data);
    }

    #[test]
    fn test_constructed() {
        let data = hex!("65 08 5B 06 44 6F 65 20 3C 3C");
        let (tlv, _) = Tlv::parse(&data).unwrap();
        assert!(tlv.tag.is_constructed());
        let children = tlv.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].tag, Tag::new(0x5B));
        assert_eq!(tlv.to_bytes(), &data);
    }

    #[test]
    fn test_long_length() {
        let mut data = hex!("5F 2E 81 80").to_vec();
        data.extend(vec![0xAB; 128]);
        let (tlv, _) = Tlv::parse(&data).unwrap();
        assert_eq!(tlv.primitive_value().unwrap().len(), 128);
        assert_eq!(tlv.to_bytes(), data);
    }

    #[test]
    fn test_indefinite_constructed_read() {
        // indefinite length is accepted on read but re-encoded definite
        let data = hex!("30 80 04 02 AB CD 00 00");
        let (tlv, rest) = Tlv::parse(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(tlv.children().unwrap().len(), 1);
        assert_eq!(tlv.to_bytes(), hex!("30 04 04 02 AB CD"));
    }

    #[test]
    fn test_skip_to_tag() {
        let data = hex!("5F 01 01 30 5F 36 01 34 5C 02 61 75");
        let mut reader = TlvReader::new(&data);
        reader.skip_to_tag(0x5Cu32).unwrap();
        let tlv = reader.read_tlv().unwrap();
        assert_eq!(tlv.tag, Tag::new(0x5C));
        assert_eq!(tlv.primitive_value(), Some(&hex!("61 75")[..]));
    }

    #[test]
    fn test_deferred_length_writer() {
        let mut writer = TlvWriter::new();
        writer.begin_constructed(0x7F61u32);
        writer.write_primitive(0x02u32, &[0x01]);
        writer.begin_constructed(0x7F60u32);
        writer.write_primitive(0x81u32, &[0xAA, 0xBB]);
        writer.end_constructed();
        writer.end_constructed();
        let bytes = writer.into_bytes();
        assert_eq!(bytes, hex!("7F 61 09 02 01 01 7F 60 04 81 02 AA BB"));

        let (tlv, _) = Tlv::parse(&bytes).unwrap();
        assert_eq!(tlv.to_bytes(), bytes);
    }

    #[test]
    fn test_primitive_round_trip_construction() {
        let tlv = Tlv::constructed(0xA1u32, vec![
            Tlv::primitive(0x81u32, vec![0x01, 0x02]),
            Tlv::primitive(0x87u32, vec![0x01, 0x01]),
        ]);
        let encoded = tlv.to_bytes();
        let (reparsed, _) = Tlv::parse(&encoded).unwrap();
        assert_eq!(reparsed, tlv);
        match reparsed.value {
            Value::Constructed(ref children) => assert_eq!(children.len(), 2),
            _ => panic!("expected constructed"),
        }
    }
}
