//! Core protocols and codecs for electronic machine-readable travel
//! documents (ICAO Doc 9303).
//!
//! The crate covers three tightly coupled layers of an eMRTD reader:
//!
//! * the access-control ceremonies ([`bac`], [`pace`],
//!   [`chip_authentication`], [`terminal_authentication`],
//!   [`active_authentication`]) that derive session keys and authenticity
//!   proofs over an APDU transport,
//! * the [`secure_messaging`] wrapper that encrypts and MAC-protects every
//!   APDU once a ceremony has succeeded,
//! * the logical data structure codecs ([`lds`], [`cbeff`], [`iso19794`],
//!   [`iso39794`]) for the files stored on the chip, up to the signed
//!   document security object.
//!
//! The APDU transport itself is pluggable through
//! [`iso7816::card::SmartCard`]; an implementation for `pcsc` readers is
//! provided.

pub mod active_authentication;
pub mod bac;
pub mod cbeff;
pub mod chip_authentication;
pub mod crypt;
pub mod der_util;
pub mod iso19794;
pub mod iso39794;
pub mod iso7816;
pub mod lds;
pub mod pace;
pub mod secure_messaging;
pub mod terminal_authentication;
pub mod tlv;


/// Renders a byte string as spaced upper-case hex for trace output.
pub(crate) fn hex_bytes(buf: &[u8]) -> String {
    let mut ret = String::with_capacity(3 * buf.len());
    for (index, byte) in buf.iter().enumerate() {
        if index > 0 {
            ret.push(' ');
        }
        ret.push_str(&format!("{:02X}", byte));
    }
    ret
}
