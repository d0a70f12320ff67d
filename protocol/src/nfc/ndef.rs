//! NDEF URI records.
//!
//! Tags carry a single NFC Forum well-known URI record. The first payload
//! byte is the URI identifier code, which abbreviates common prefixes:
//!
//! | code | prefix         |
//! |------|----------------|
//! | 0x00 | (none)         |
//! | 0x01 | `http://www.`  |
//! | 0x02 | `https://www.` |
//! | 0x03 | `http://`      |
//! | 0x04 | `https://`     |
//!
//! Records up to 255 payload bytes use the short-record layout
//! (`0xD1 0x01 <len> 'U'`); longer ones use a 4-byte length.

use crate::config::MAX_NDEF_MESSAGE_LENGTH;

use super::NfcError;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_WELL_KNOWN: u8 = 0x01;
const RTD_URI: u8 = b'U';

/// Prefix table, longest first so `https://www.` wins over `https://`.
const URI_PREFIXES: [(u8, &str); 4] = [
    (0x02, "https://www."),
    (0x01, "http://www."),
    (0x04, "https://"),
    (0x03, "http://"),
];

fn prefix_for_code(code: u8) -> Option<&'static str> {
    if code == 0x00 {
        return Some("");
    }
    URI_PREFIXES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, prefix)| *prefix)
}

/// Encode `url` as a one-record NDEF message.
pub fn encode_uri_record(url: &str) -> Vec<u8> {
    let (code, rest) = URI_PREFIXES
        .iter()
        .find_map(|(code, prefix)| url.strip_prefix(prefix).map(|rest| (*code, rest)))
        .unwrap_or((0x00, url));

    let payload_len = 1 + rest.len();
    let mut out = Vec::with_capacity(payload_len + 7);
    if payload_len <= u8::MAX as usize {
        out.push(FLAG_MB | FLAG_ME | FLAG_SR | TNF_WELL_KNOWN);
        out.push(1);
        out.push(payload_len as u8);
    } else {
        out.push(FLAG_MB | FLAG_ME | TNF_WELL_KNOWN);
        out.push(1);
        out.extend_from_slice(&(payload_len as u32).to_be_bytes());
    }
    out.push(RTD_URI);
    out.push(code);
    out.extend_from_slice(rest.as_bytes());
    out
}

/// Byte length of [`encode_uri_record`] without building it.
pub fn encoded_len(url: &str) -> usize {
    encode_uri_record(url).len()
}

/// Decode a one-record NDEF message back into its URL.
///
/// Messages longer than a reader's NDEF buffer are rejected up front.
pub fn decode_uri_record(bytes: &[u8]) -> Result<String, NfcError> {
    if bytes.len() > MAX_NDEF_MESSAGE_LENGTH {
        return Err(NfcError::NdefTooLarge {
            len: bytes.len(),
            max: MAX_NDEF_MESSAGE_LENGTH,
        });
    }
    let malformed = |reason: &str| NfcError::MalformedNdef(reason.to_string());

    let header = *bytes.first().ok_or_else(|| malformed("empty message"))?;
    if header & TNF_MASK != TNF_WELL_KNOWN {
        return Err(malformed("record is not a well-known type"));
    }
    let mut pos = 1;
    let mut take = |n: usize| -> Result<&[u8], NfcError> {
        let slice = bytes
            .get(pos..pos + n)
            .ok_or_else(|| NfcError::MalformedNdef("record truncated".into()))?;
        pos += n;
        Ok(slice)
    };

    let type_len = take(1)?[0] as usize;
    let payload_len = if header & FLAG_SR != 0 {
        take(1)?[0] as usize
    } else {
        let raw = take(4)?;
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
    };
    let id_len = if header & FLAG_IL != 0 {
        take(1)?[0] as usize
    } else {
        0
    };
    if take(type_len)? != [RTD_URI] {
        return Err(malformed("record type is not 'U'"));
    }
    take(id_len)?;
    let payload = take(payload_len)?;

    let (code, rest) = payload
        .split_first()
        .ok_or_else(|| malformed("URI payload is empty"))?;
    let prefix = prefix_for_code(*code)
        .ok_or_else(|| NfcError::MalformedNdef(format!("unsupported URI code 0x{:02x}", code)))?;
    let rest = std::str::from_utf8(rest).map_err(|_| malformed("URI is not UTF-8"))?;
    Ok(format!("{}{}", prefix, rest))
}
