//! Utility functions for Distinguished Encoding Rules.
//!
//! The heavier ASN.1 schemas (SecurityInfos, the CMS container) are handled by
//! `rasn`; this module covers the places where the crate works on raw DER:
//! Secure Messaging data objects, PACE dynamic authentication data, the
//! LDS security object e-content and the ISO/IEC 39794 biometric blocks.


use std::collections::BTreeMap;

use crypto_bigint::BoxedUint;
use rasn::types::Oid;

use crate::tlv::{self, Tag, Tlv, Value};


/// Encode an ASN.1 DER primitive value length.
pub fn encode_primitive_length(output: &mut Vec<u8>, length: usize) {
    if length < 128 {
        // single-byte encoding
        output.push(length.try_into().unwrap());
    } else {
        // 0b1nnn_nnnn and then n additional bytes that actually specify the length
        // (big-endian)
        let length_bytes = length.to_be_bytes();
        let mut trimmed_length_slice = &length_bytes[..];
        while trimmed_length_slice[0] == 0x00 {
            trimmed_length_slice = &trimmed_length_slice[1..];
        }
        output.push(0b1000_0000 | u8::try_from(trimmed_length_slice.len()).unwrap());
        output.extend(trimmed_length_slice);
    }
}


/// Decode an ASN.1 DER primitive value length.
///
/// The length must be at the beginning of the input slice.
///
/// Returns a tuple `(length, rest)` where `rest` is the rest of the input slice once the length has
/// been removed.
pub fn try_decode_primitive_length(input: &[u8]) -> Option<(usize, &[u8])> {
    if input.len() == 0 {
        return None;
    }
    let start_byte = input[0];
    let start_lower_bits = start_byte & 0b0111_1111;
    if start_byte & 0b1000_0000 != 0 {
        // multiple bytes
        let length_byte_count: usize = start_lower_bits.into();
        if length_byte_count == 0 {
            return None;
        }
        if length_byte_count > input.len() - 1 {
            // that will never fit
            return None;
        }
        let mut length: usize = 0;
        for length_byte in &input[1..1+length_byte_count] {
            let Some(multiplied) = length.checked_mul(256) else { return None };
            length = multiplied;
            let Some(added) = length.checked_add(usize::from(*length_byte)) else { return None };
            length = added;
        }
        Some((length, &input[1+length_byte_count..]))
    } else {
        let length = start_lower_bits.into();
        Some((length, &input[1..]))
    }
}


/// Encode an object identifier value into bytes using DER encoding rules.
///
/// No tag or length is encoded, only the actual value.
pub fn oid_to_der_bytes(oid: &Oid) -> Vec<u8> {
    const SEVEN_BIT_MASK: u32 = 0b0111_1111;
    const TOP_BIT: u8 = 0b1000_0000;

    assert!(oid.len() >= 2);
    assert!(oid[0] <= 2);
    if oid[0] < 2 {
        assert!(oid[1] <= 39);
    }

    fn encode_arc(ret: &mut Vec<u8>, arc: u32) {
        if arc <= 0b111_1111 {
            // 0b0nnn_nnnn
            ret.push(u8::try_from((arc >>  0) & SEVEN_BIT_MASK).unwrap());
        } else if arc <= 0b111_1111_111_1111 {
            // 0b1nnn_nnnn 0b0nnn_nnnn
            ret.push(u8::try_from((arc >>  7) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  0) & SEVEN_BIT_MASK).unwrap());
        } else if arc <= 0b111_1111_111_1111_111_1111 {
            // 0b1nnn_nnnn 0b1nnn_nnnn 0b0nnn_nnnn
            ret.push(u8::try_from((arc >> 14) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  7) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  0) & SEVEN_BIT_MASK).unwrap());
        } else if arc <= 0b111_1111_111_1111_111_1111_111_1111 {
            // 0b1nnn_nnnn 0b1nnn_nnnn 0b1nnn_nnnn 0b0nnn_nnnn
            ret.push(u8::try_from((arc >> 21) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >> 14) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  7) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  0) & SEVEN_BIT_MASK).unwrap());
        } else {
            // 0b1nnn_nnnn 0b1nnn_nnnn 0b1nnn_nnnn 0b1nnn_nnnn 0b0nnn_nnnn
            ret.push(u8::try_from((arc >> 28) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >> 21) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >> 14) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  7) & SEVEN_BIT_MASK).unwrap() | TOP_BIT);
            ret.push(u8::try_from((arc >>  0) & SEVEN_BIT_MASK).unwrap());
        }
    }

    let mut ret = Vec::new();
    let first_arc_pair = 40*oid[0] + oid[1];
    encode_arc(&mut ret, first_arc_pair);

    for arc in oid.iter().skip(2) {
        encode_arc(&mut ret, *arc);
    }

    ret
}


/// Encode the content octets of a signed INTEGER with the smallest two's
/// complement representation.
pub fn int_to_der_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant_positive = bytes[start] == 0x00 && bytes[start+1] & 0x80 == 0;
        let redundant_negative = bytes[start] == 0xFF && bytes[start+1] & 0x80 != 0;
        if redundant_positive || redundant_negative {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

/// Decode the content octets of a signed INTEGER.
pub fn int_from_der_bytes(content: &[u8]) -> Result<i64, tlv::Error> {
    if content.is_empty() {
        return Err(tlv::Error::Malformed { reason: "empty INTEGER" });
    }
    if content.len() > 8 {
        return Err(tlv::Error::Malformed { reason: "INTEGER too wide" });
    }
    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for byte in content {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

/// Encode the content octets of an unsigned INTEGER, prefixing a zero octet
/// when the leading bit would otherwise mark the value negative.
pub fn uint_to_der_bytes(value: &BoxedUint) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut trimmed = &bytes[..];
    while trimmed.len() > 1 && trimmed[0] == 0x00 {
        trimmed = &trimmed[1..];
    }
    let mut ret = Vec::with_capacity(trimmed.len() + 1);
    if trimmed[0] & 0x80 != 0 {
        ret.push(0x00);
    }
    ret.extend(trimmed);
    ret
}

/// Decode the content octets of an INTEGER into an unsigned big integer.
/// Negative values are rejected.
pub fn uint_from_der_bytes(content: &[u8]) -> Result<BoxedUint, tlv::Error> {
    if content.is_empty() {
        return Err(tlv::Error::Malformed { reason: "empty INTEGER" });
    }
    if content[0] & 0x80 != 0 {
        return Err(tlv::Error::Malformed { reason: "negative INTEGER where unsigned expected" });
    }
    let mut trimmed = content;
    while trimmed.len() > 1 && trimmed[0] == 0x00 {
        trimmed = &trimmed[1..];
    }
    let bits = u32::try_from(8 * trimmed.len())
        .map_err(|_| tlv::Error::Malformed { reason: "INTEGER too wide" })?;
    BoxedUint::from_be_slice(trimmed, bits)
        .map_err(|_| tlv::Error::Malformed { reason: "INTEGER decoding failed" })
}


/// The tag of a context-specific tagged object, e.g. `[2]`.
pub const fn context_tag(number: u32, constructed: bool) -> Tag {
    let leading = 0b1000_0000 | (if constructed { 0b0010_0000 } else { 0 }) | number;
    Tag::new(leading)
}

/// The tag of an `APPLICATION n` tagged object. The 39794 biometric records
/// use `[APPLICATION 4]`, `[APPLICATION 5]` and `[APPLICATION 6]` as their
/// outermost tags.
pub const fn application_tag(number: u32, constructed: bool) -> Tag {
    let leading = 0b0100_0000 | (if constructed { 0b0010_0000 } else { 0 }) | number;
    Tag::new(leading)
}

/// Collects the context-specific children of a constructed value into a map
/// keyed by tag number. Later duplicates win, matching a decoder that walks
/// the children in order.
pub fn decode_tagged_objects(tlv: &Tlv) -> Result<BTreeMap<u32, &Tlv>, tlv::Error> {
    let children = tlv.children()
        .ok_or(tlv::Error::Malformed { reason: "expected constructed value" })?;
    let mut tagged = BTreeMap::new();
    for child in children {
        if child.tag.class() == crate::tlv::TagClass::ContextSpecific {
            tagged.insert(child.tag.value() & 0x1F, child);
        }
    }
    Ok(tagged)
}

/// Reads an integer out of a tagged object that may be primitive (content
/// octets directly) or an explicitly tagged INTEGER.
pub fn tagged_int(tlv: &Tlv) -> Result<i64, tlv::Error> {
    match &tlv.value {
        Value::Primitive(bytes) => int_from_der_bytes(bytes),
        Value::Constructed(children) => {
            let first = children.first()
                .ok_or(tlv::Error::Malformed { reason: "empty explicitly tagged value" })?;
            let bytes = first.primitive_value()
                .ok_or(tlv::Error::Malformed { reason: "expected primitive INTEGER" })?;
            int_from_der_bytes(bytes)
        },
    }
}

/// Decodes an integer code from a `CHOICE { code [0], extension [1] }`
/// structure. If the explicit arm `[0]` is present its value is returned; if
/// only the extension arm `[1]` is present, the first integer inside it is
/// returned. This fallback keeps decoders working against records produced by
/// newer editions of the schema.
pub fn code_from_choice_with_extension_fallback(tlv: &Tlv) -> Result<Option<i64>, tlv::Error> {
    let tagged = decode_tagged_objects(tlv)?;
    if let Some(code) = tagged.get(&0) {
        return Ok(Some(tagged_int(code)?));
    }
    if let Some(extension) = tagged.get(&1) {
        let inner = decode_tagged_objects(extension)?;
        if let Some(first) = inner.values().next() {
            return Ok(Some(tagged_int(first)?));
        }
        return Err(tlv::Error::Malformed { reason: "empty extension block" });
    }
    Ok(None)
}

/// Encodes an integer code as the explicit arm `[0]` of a
/// `CHOICE { code [0], extension [1] }` structure.
pub fn code_as_choice(number: i64) -> Tlv {
    Tlv::primitive(context_tag(0, false), int_to_der_bytes(number))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crypto_bigint::BoxedUint;
    use hex_literal::hex;

    #[test]
    fn test_length_codec() {
        let mut buf = Vec::new();
        encode_primitive_length(&mut buf, 0x7F);
        assert_eq!(buf, hex!("7F"));
        buf.clear();
        encode_primitive_length(&mut buf, 0x80);
        assert_eq!(buf, hex!("81 80"));
        buf.clear();
        encode_primitive_length(&mut buf, 0x1234);
        assert_eq!(buf, hex!("82 12 34"));

        assert_eq!(try_decode_primitive_length(&hex!("7F FF")), Some((0x7F, &hex!("FF")[..])));
        assert_eq!(try_decode_primitive_length(&hex!("82 12 34")), Some((0x1234, &[][..])));
        assert_eq!(try_decode_primitive_length(&hex!("80")), None);
    }

    #[test]
    fn test_oid_encoding() {
        let oid = rasn::types::Oid::const_new(&[0, 4, 0, 127, 0, 7, 2, 2, 4, 2, 2]);
        assert_eq!(oid_to_der_bytes(oid), hex!("04 00 7F 00 07 02 02 04 02 02"));

        let lds = rasn::types::Oid::const_new(&[2, 23, 136, 1, 1, 1]);
        assert_eq!(oid_to_der_bytes(lds), hex!("67 81 08 01 01 01"));
    }

    #[test]
    fn test_int_codec() {
        assert_eq!(int_to_der_bytes(0), hex!("00"));
        assert_eq!(int_to_der_bytes(127), hex!("7F"));
        assert_eq!(int_to_der_bytes(128), hex!("00 80"));
        assert_eq!(int_to_der_bytes(-1), hex!("FF"));
        assert_eq!(int_to_der_bytes(-129), hex!("FF 7F"));

        assert_eq!(int_from_der_bytes(&hex!("00 80")).unwrap(), 128);
        assert_eq!(int_from_der_bytes(&hex!("FF 7F")).unwrap(), -129);
    }

    #[test]
    fn test_uint_codec() {
        let value = BoxedUint::from_be_slice(&hex!("C2 B0"), 16).unwrap();
        assert_eq!(uint_to_der_bytes(&value), hex!("00 C2 B0"));
        let round = uint_from_der_bytes(&hex!("00 C2 B0")).unwrap();
        assert_eq!(round.to_be_bytes().as_ref(), &hex!("C2 B0"));
    }

    #[test]
    fn test_choice_extension_fallback() {
        use crate::tlv::Tlv;

        // explicit arm
        let explicit = Tlv::constructed(0x30u32, vec![
            Tlv::primitive(0x80u32, vec![0x05]),
        ]);
        assert_eq!(code_from_choice_with_extension_fallback(&explicit).unwrap(), Some(5));

        // extension arm only
        let extension = Tlv::constructed(0x30u32, vec![
            Tlv::constructed(0xA1u32, vec![
                Tlv::primitive(0x80u32, vec![0x2A]),
            ]),
        ]);
        assert_eq!(code_from_choice_with_extension_fallback(&extension).unwrap(), Some(42));

        // neither arm
        let empty = Tlv::constructed(0x30u32, Vec::new());
        assert_eq!(code_from_choice_with_extension_fallback(&empty).unwrap(), None);
    }
}
