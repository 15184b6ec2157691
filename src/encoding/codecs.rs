//! Built-in codecs.
//!
//! Every decoder here consumes whole characters only. A truncated multi-byte
//! sequence at the end of the input is left unconsumed; a complete sequence
//! that is not valid decodes to U+FFFD.

use super::{Decoded, EncodingCodec};
use crate::error::TransferResult;

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// 7-bit US-ASCII. Unrepresentable characters encode as `?`; bytes above
/// 0x7F decode as `?`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii;

impl EncodingCodec for Ascii {
    fn name(&self) -> &str {
        "us-ascii"
    }

    fn max_bytes_per_char(&self) -> usize {
        1
    }

    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
        out.extend(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        Ok(())
    }

    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        let n = bytes.len().min(max_chars);
        out.extend(bytes[..n].iter().map(|&b| if b.is_ascii() { b as char } else { '?' }));
        Decoded::new(n, n)
    }
}

/// ISO-8859-1: each byte is the code point of the same value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl EncodingCodec for Latin1 {
    fn name(&self) -> &str {
        "iso-8859-1"
    }

    fn max_bytes_per_char(&self) -> usize {
        1
    }

    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
        out.extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
        Ok(())
    }

    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        let n = bytes.len().min(max_chars);
        out.extend(bytes[..n].iter().map(|&b| char::from(b)));
        Decoded::new(n, n)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl EncodingCodec for Utf8 {
    fn name(&self) -> &str {
        "utf-8"
    }

    fn max_bytes_per_char(&self) -> usize {
        4
    }

    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
        out.extend_from_slice(text.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        let mut consumed = 0;
        let mut chars = 0;
        while chars < max_chars && consumed < bytes.len() {
            let rest = &bytes[consumed..];
            let (valid, invalid_len) = match std::str::from_utf8(rest) {
                Ok(s) => (s, None),
                Err(e) => {
                    // `valid_up_to` marks a char boundary, so this cannot fail.
                    let valid = std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap_or_default();
                    (valid, Some(e.error_len()))
                }
            };
            for c in valid.chars() {
                if chars == max_chars {
                    return Decoded::new(consumed, chars);
                }
                out.push(c);
                consumed += c.len_utf8();
                chars += 1;
            }
            match invalid_len {
                None => break,
                // Truncated sequence at the tail; wait for the rest.
                Some(None) => break,
                Some(Some(len)) => {
                    if chars == max_chars {
                        break;
                    }
                    out.push(REPLACEMENT);
                    consumed += len;
                    chars += 1;
                }
            }
        }
        Decoded::new(consumed, chars)
    }
}

/// UTF-16 in either byte order.
#[derive(Debug, Clone, Copy)]
pub struct Utf16 {
    big_endian: bool,
}

impl Utf16 {
    pub const LE: Utf16 = Utf16 { big_endian: false };
    pub const BE: Utf16 = Utf16 { big_endian: true };

    fn unit(&self, pair: &[u8]) -> u16 {
        let raw = [pair[0], pair[1]];
        if self.big_endian {
            u16::from_be_bytes(raw)
        } else {
            u16::from_le_bytes(raw)
        }
    }
}

impl EncodingCodec for Utf16 {
    fn name(&self) -> &str {
        if self.big_endian {
            "utf-16be"
        } else {
            "utf-16le"
        }
    }

    fn max_bytes_per_char(&self) -> usize {
        4
    }

    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
        for unit in text.encode_utf16() {
            let bytes = if self.big_endian {
                unit.to_be_bytes()
            } else {
                unit.to_le_bytes()
            };
            out.extend_from_slice(&bytes);
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        let mut consumed = 0;
        let mut chars = 0;
        while chars < max_chars && bytes.len() - consumed >= 2 {
            let first = self.unit(&bytes[consumed..]);
            match first {
                0xD800..=0xDBFF => {
                    if bytes.len() - consumed < 4 {
                        break;
                    }
                    let second = self.unit(&bytes[consumed + 2..]);
                    if (0xDC00..=0xDFFF).contains(&second) {
                        let scalar = 0x10000
                            + ((u32::from(first) - 0xD800) << 10)
                            + (u32::from(second) - 0xDC00);
                        out.push(char::from_u32(scalar).unwrap_or(REPLACEMENT));
                        consumed += 4;
                    } else {
                        out.push(REPLACEMENT);
                        consumed += 2;
                    }
                }
                0xDC00..=0xDFFF => {
                    out.push(REPLACEMENT);
                    consumed += 2;
                }
                unit => {
                    out.push(char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT));
                    consumed += 2;
                }
            }
            chars += 1;
        }
        Decoded::new(consumed, chars)
    }
}

/// Little-endian UTF-32.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf32;

impl EncodingCodec for Utf32 {
    fn name(&self) -> &str {
        "utf-32le"
    }

    fn max_bytes_per_char(&self) -> usize {
        4
    }

    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
        for c in text.chars() {
            out.extend_from_slice(&u32::from(c).to_le_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        let mut chars = 0;
        for quad in bytes.chunks_exact(4).take(max_chars) {
            let scalar = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
            out.push(char::from_u32(scalar).unwrap_or(REPLACEMENT));
            chars += 1;
        }
        Decoded::new(chars * 4, chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(codec: &dyn EncodingCodec, text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        codec.encode(text, &mut out).unwrap();
        out
    }

    fn decode(codec: &dyn EncodingCodec, bytes: &[u8], max: usize) -> (String, Decoded) {
        let mut out = String::new();
        let decoded = codec.decode(bytes, max, &mut out);
        (out, decoded)
    }

    #[test]
    fn test_ascii_replaces_unrepresentable() {
        assert_eq!(encode(&Ascii, "aé"), b"a?");
        let (text, decoded) = decode(&Ascii, &[b'o', 0xE9, b'k'], 8);
        assert_eq!(text, "o?k");
        assert_eq!(decoded, Decoded::new(3, 3));
    }

    #[test]
    fn test_latin1_covers_high_half() {
        assert_eq!(encode(&Latin1, "ÿé€"), vec![0xFF, 0xE9, b'?']);
        let (text, _) = decode(&Latin1, &[0xFF, 0xE9], 8);
        assert_eq!(text, "ÿé");
    }

    #[test]
    fn test_utf8_leaves_partial_tail() {
        let bytes = encode(&Utf8, "a€");
        assert_eq!(bytes.len(), 4);
        let (text, decoded) = decode(&Utf8, &bytes[..3], 8);
        assert_eq!(text, "a");
        assert_eq!(decoded, Decoded::new(1, 1));
        let (text, decoded) = decode(&Utf8, &bytes, 8);
        assert_eq!(text, "a€");
        assert_eq!(decoded, Decoded::new(4, 2));
    }

    #[test]
    fn test_utf8_respects_max_chars() {
        let (text, decoded) = decode(&Utf8, "héllo".as_bytes(), 2);
        assert_eq!(text, "hé");
        assert_eq!(decoded.bytes_consumed, 3);
    }

    #[test]
    fn test_utf8_invalid_byte_becomes_replacement() {
        let (text, decoded) = decode(&Utf8, &[b'a', 0xFF, b'b'], 8);
        assert_eq!(text, "a\u{FFFD}b");
        assert_eq!(decoded, Decoded::new(3, 3));
    }

    #[test]
    fn test_utf16_surrogate_pair_needs_four_bytes() {
        for codec in [Utf16::LE, Utf16::BE] {
            let bytes = encode(&codec, "x𝄞");
            assert_eq!(bytes.len(), 6);
            let (text, decoded) = decode(&codec, &bytes[..5], 8);
            assert_eq!(text, "x");
            assert_eq!(decoded.bytes_consumed, 2);
            let (text, decoded) = decode(&codec, &bytes, 8);
            assert_eq!(text, "x𝄞");
            assert_eq!(decoded, Decoded::new(6, 2));
        }
    }

    #[test]
    fn test_utf16_byte_order() {
        assert_eq!(encode(&Utf16::LE, "A"), vec![0x41, 0x00]);
        assert_eq!(encode(&Utf16::BE, "A"), vec![0x00, 0x41]);
    }

    #[test]
    fn test_utf16_lone_low_surrogate() {
        let (text, decoded) = decode(&Utf16::LE, &[0x00, 0xDC, 0x41, 0x00], 8);
        assert_eq!(text, "\u{FFFD}A");
        assert_eq!(decoded, Decoded::new(4, 2));
    }

    #[test]
    fn test_utf32_whole_units_only() {
        let bytes = encode(&Utf32, "hi");
        let (text, decoded) = decode(&Utf32, &bytes[..7], 8);
        assert_eq!(text, "h");
        assert_eq!(decoded, Decoded::new(4, 1));
    }
}
