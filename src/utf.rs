//! UTF-8/UTF-16 transcoding for the text-binding path.
//!
//! Malformed input never fails: undecodable sequences become U+FFFD, the
//! same policy SQLite's utf.c applies when it converts between encodings.

use crate::types::Encoding;

const REPLACEMENT_CHAR: u32 = 0xFFFD;

// Payload bits carried by a UTF-8 lead byte, indexed by (lead - 0xc0).
const UTF8_LEAD_BITS: [u8; 64] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x00, 0x01, 0x02, 0x03, 0x00, 0x01, 0x00, 0x00,
];

/// Decode one code point from UTF-8 starting at `*pos`.
fn read_utf8(bytes: &[u8], pos: &mut usize) -> u32 {
    let c = bytes[*pos] as u32;
    *pos += 1;
    if c < 0xc0 {
        return c;
    }
    let mut v = UTF8_LEAD_BITS[(c - 0xc0) as usize] as u32;
    while *pos < bytes.len() && (bytes[*pos] & 0xc0) == 0x80 {
        v = (v << 6) + (bytes[*pos] as u32 & 0x3f);
        *pos += 1;
    }
    if v < 0x80 || (v & 0xFFFF_F800) == 0xD800 || (v & 0xFFFF_FFFE) == 0xFFFE {
        REPLACEMENT_CHAR
    } else {
        v
    }
}

/// Decode one code point from UTF-16 starting at `*pos`.
///
/// The caller guarantees at least two bytes remain.
fn read_utf16(bytes: &[u8], pos: &mut usize, big_endian: bool) -> u32 {
    let unit_at = |i: usize| {
        let pair = [bytes[i], bytes[i + 1]];
        if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        }
    };

    let unit = unit_at(*pos);
    *pos += 2;
    match unit {
        0xD800..=0xDBFF => {
            if *pos + 2 > bytes.len() {
                return REPLACEMENT_CHAR;
            }
            let low = unit_at(*pos);
            if (0xDC00..=0xDFFF).contains(&low) {
                *pos += 2;
                0x10000 + (((unit as u32 - 0xD800) << 10) | (low as u32 - 0xDC00))
            } else {
                REPLACEMENT_CHAR
            }
        }
        0xDC00..=0xDFFF => REPLACEMENT_CHAR,
        _ => unit as u32,
    }
}

fn write_utf8(out: &mut Vec<u8>, cp: u32) {
    let ch = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut tmp = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
}

fn write_utf16(out: &mut Vec<u8>, cp: u32, big_endian: bool) {
    let ch = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut tmp = [0u16; 2];
    for unit in ch.encode_utf16(&mut tmp).iter() {
        if big_endian {
            out.extend_from_slice(&unit.to_be_bytes());
        } else {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }
}

/// Truncate a UTF-16 buffer to an even number of bytes.
pub fn utf16_even(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len() & !1]
}

/// Number of bytes `bytes` will occupy once converted from `from` to `to`.
///
/// This is an upper bound used to reserve space before transcoding.
pub fn transcoded_len_hint(len: usize, from: Encoding, to: Encoding) -> usize {
    match (from.is_utf16(), to.is_utf16()) {
        (false, true) => len * 2,
        (true, false) => len / 2 * 3,
        _ => len,
    }
}

/// Convert text between encodings.
///
/// Same-encoding input is copied through untouched (UTF-16 input is first
/// trimmed to an even length).
pub fn transcode(bytes: &[u8], from: Encoding, to: Encoding) -> Vec<u8> {
    let bytes = if from.is_utf16() { utf16_even(bytes) } else { bytes };
    if from == to {
        return bytes.to_vec();
    }

    let mut out = Vec::with_capacity(transcoded_len_hint(bytes.len(), from, to));
    let mut pos = 0usize;
    while pos < bytes.len() {
        let cp = match from {
            Encoding::Utf8 => read_utf8(bytes, &mut pos),
            Encoding::Utf16le => read_utf16(bytes, &mut pos, false),
            Encoding::Utf16be => read_utf16(bytes, &mut pos, true),
        };
        match to {
            Encoding::Utf8 => write_utf8(&mut out, cp),
            Encoding::Utf16le => write_utf16(&mut out, cp, false),
            Encoding::Utf16be => write_utf16(&mut out, cp, true),
        }
    }
    out
}

/// Decode text in any encoding into a Rust string.
pub fn decode_to_string(bytes: &[u8], enc: Encoding) -> String {
    match enc {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            let utf8 = transcode(bytes, enc, Encoding::Utf8);
            String::from_utf8_lossy(&utf8).into_owned()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_to_utf16le() {
        let out = transcode("hé".as_bytes(), Encoding::Utf8, Encoding::Utf16le);
        assert_eq!(out, vec![b'h', 0, 0xe9, 0]);
    }

    #[test]
    fn test_utf16be_to_utf8_surrogate_pair() {
        // U+1F600 as a big-endian surrogate pair
        let input = [0xD8, 0x3D, 0xDE, 0x00];
        let out = transcode(&input, Encoding::Utf16be, Encoding::Utf8);
        assert_eq!(String::from_utf8(out).unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_odd_utf16_length_is_truncated() {
        let out = transcode(&[b'a', 0, b'b'], Encoding::Utf16le, Encoding::Utf16le);
        assert_eq!(out, vec![b'a', 0]);
    }

    #[test]
    fn test_lone_surrogate_becomes_replacement() {
        let out = transcode(&[0x00, 0xDC], Encoding::Utf16le, Encoding::Utf8);
        assert_eq!(String::from_utf8(out).unwrap(), "\u{FFFD}");
    }

    #[test]
    fn test_decode_to_string() {
        let utf16 = transcode("abc".as_bytes(), Encoding::Utf8, Encoding::Utf16be);
        assert_eq!(decode_to_string(&utf16, Encoding::Utf16be), "abc");
    }
}
