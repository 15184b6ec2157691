//! Character/byte conversion for the text path.
//!
//! An [`EncodingAdapter`] wraps a pluggable [`EncodingCodec`]. Assigning a
//! codec validates it eagerly: it must report a positive
//! [`max_bytes_per_char`](EncodingCodec::max_bytes_per_char) and round-trip a
//! probe character. Stateful code pages (UTF-7, ISO-2022-JP, ISCII) are refused
//! by name because a single pass cannot tell where their characters end.
//!
//! The adapter is a cheap clone. The engine snapshots it at the start of each
//! call, so swapping the encoding never re-interprets bytes that an in-flight
//! call is already decoding.

pub mod codecs;

use crate::error::{TransferError, TransferResult};
use std::fmt;
use std::sync::Arc;

pub use codecs::{Ascii, Latin1, Utf16, Utf32, Utf8};

/// Outcome of one decode step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Bytes consumed; always ends on a character boundary.
    pub bytes_consumed: usize,
    /// Characters appended to the output.
    pub chars: usize,
}

impl Decoded {
    pub fn new(bytes_consumed: usize, chars: usize) -> Self {
        Self {
            bytes_consumed,
            chars,
        }
    }
}

/// A byte/char codec.
pub trait EncodingCodec: Send + Sync + fmt::Debug {
    /// Stable identifier, e.g. `"utf-8"`.
    fn name(&self) -> &str;

    /// Upper bound on bytes produced for a single character.
    fn max_bytes_per_char(&self) -> usize;

    /// Append the encoding of `text` to `out`.
    fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()>;

    /// Decode at most `max_chars` whole characters from the front of `bytes`
    /// into `out`. A partial character at the end must be left unconsumed.
    fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded;
}

const PROBE: &str = "A";

/// Name fragments of code pages that cannot be decoded in a single pass.
const STATEFUL_ENCODINGS: &[&str] = &[
    "utf-7",
    "utf7",
    "unicode-1-1-utf-7",
    "csunicode11utf7",
    "iso-2022-jp",
    "csiso2022jp",
    "iso-2022-kr",
    "x-iscii",
    "iscii",
    "65000",
    "50220",
    "50221",
    "50222",
    "50225",
];

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

fn is_stateful(name: &str) -> bool {
    let name = normalize(name);
    // ISCII code pages are 57002..=57011.
    let iscii_page = name
        .parse::<u32>()
        .map(|page| (57002..=57011).contains(&page))
        .unwrap_or(false);
    iscii_page
        || STATEFUL_ENCODINGS
            .iter()
            .any(|stateful| name == *stateful || name.starts_with(&format!("{stateful}-")))
}

/// Look up a built-in codec by name, alias or Windows code page number.
pub fn codec_for_name(name: &str) -> TransferResult<Arc<dyn EncodingCodec>> {
    if is_stateful(name) {
        return Err(TransferError::unsupported_encoding(format!(
            "'{name}' is a stateful encoding and cannot be decoded one character at a time"
        )));
    }
    let codec: Arc<dyn EncodingCodec> = match normalize(name).as_str() {
        "us-ascii" | "ascii" | "ansi-x3.4-1968" | "20127" => Arc::new(Ascii),
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "28591" => Arc::new(Latin1),
        "utf-8" | "utf8" | "65001" => Arc::new(Utf8),
        "utf-16" | "utf-16le" | "utf16" | "unicode" | "1200" => Arc::new(Utf16::LE),
        "utf-16be" | "unicodefffe" | "bigendianunicode" | "1201" => Arc::new(Utf16::BE),
        "utf-32" | "utf-32le" | "utf32" | "12000" => Arc::new(Utf32),
        _ => {
            return Err(TransferError::unsupported_encoding(format!(
                "unknown encoding '{name}'"
            )))
        }
    };
    Ok(codec)
}

/// A validated codec, ready for use by the engine.
#[derive(Clone)]
pub struct EncodingAdapter {
    codec: Arc<dyn EncodingCodec>,
}

impl EncodingAdapter {
    /// Validate and wrap `codec`.
    pub fn new(codec: Arc<dyn EncodingCodec>) -> TransferResult<Self> {
        validate(codec.as_ref())?;
        Ok(Self { codec })
    }

    /// Like [`new`](Self::new), but an absent codec is a `NullArgument`.
    pub fn from_option(codec: Option<Arc<dyn EncodingCodec>>) -> TransferResult<Self> {
        codec
            .ok_or(TransferError::NullArgument("encoding"))
            .and_then(Self::new)
    }

    /// Build from a built-in codec name.
    pub fn for_name(name: &str) -> TransferResult<Self> {
        Self::new(codec_for_name(name)?)
    }

    pub fn name(&self) -> &str {
        self.codec.name()
    }

    pub fn max_bytes_per_char(&self) -> usize {
        self.codec.max_bytes_per_char()
    }

    pub fn codec(&self) -> &Arc<dyn EncodingCodec> {
        &self.codec
    }

    pub fn encode(&self, text: &str) -> TransferResult<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len());
        self.codec.encode(text, &mut out)?;
        Ok(out)
    }

    pub fn encode_chars(&self, chars: &[char]) -> TransferResult<Vec<u8>> {
        let text: String = chars.iter().collect();
        self.encode(&text)
    }

    /// Number of bytes `text` encodes to.
    pub fn byte_count(&self, text: &str) -> TransferResult<usize> {
        Ok(self.encode(text)?.len())
    }

    /// Decode at most `max_chars` whole characters. See [`EncodingCodec::decode`].
    pub fn decode(&self, bytes: &[u8], max_chars: usize, out: &mut String) -> Decoded {
        self.codec.decode(bytes, max_chars, out)
    }

    /// Decode every whole character in `bytes`.
    pub fn decode_all(&self, bytes: &[u8]) -> (String, Decoded) {
        let mut out = String::new();
        let decoded = self.codec.decode(bytes, usize::MAX, &mut out);
        (out, decoded)
    }
}

impl Default for EncodingAdapter {
    fn default() -> Self {
        Self {
            codec: Arc::new(Ascii),
        }
    }
}

impl fmt::Debug for EncodingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingAdapter")
            .field("name", &self.name())
            .field("max_bytes_per_char", &self.max_bytes_per_char())
            .finish()
    }
}

fn validate(codec: &dyn EncodingCodec) -> TransferResult<()> {
    let name = codec.name();
    if is_stateful(name) {
        return Err(TransferError::unsupported_encoding(format!(
            "'{name}' is a stateful encoding and cannot be decoded one character at a time"
        )));
    }
    let max = codec.max_bytes_per_char();
    if max == 0 {
        return Err(TransferError::unsupported_encoding(format!(
            "'{name}' does not report a byte length per character"
        )));
    }

    let mut bytes = Vec::new();
    codec.encode(PROBE, &mut bytes).map_err(|e| {
        TransferError::unsupported_encoding(format!("'{name}' failed to encode a probe: {e}"))
    })?;
    if bytes.is_empty() || bytes.len() > max {
        return Err(TransferError::unsupported_encoding(format!(
            "'{name}' encoded one character to {} bytes, outside 1..={max}",
            bytes.len()
        )));
    }

    let mut text = String::new();
    let decoded = codec.decode(&bytes, usize::MAX, &mut text);
    if text != PROBE || decoded != Decoded::new(bytes.len(), 1) {
        return Err(TransferError::unsupported_encoding(format!(
            "'{name}' does not round-trip a single character"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Throwing;

    impl EncodingCodec for Throwing {
        fn name(&self) -> &str {
            "throwing"
        }
        fn max_bytes_per_char(&self) -> usize {
            1
        }
        fn encode(&self, _text: &str, _out: &mut Vec<u8>) -> TransferResult<()> {
            Err(TransferError::invalid_argument("text", "codec refuses everything"))
        }
        fn decode(&self, _bytes: &[u8], _max: usize, _out: &mut String) -> Decoded {
            Decoded::default()
        }
    }

    #[derive(Debug)]
    struct Unbounded;

    impl EncodingCodec for Unbounded {
        fn name(&self) -> &str {
            "unbounded"
        }
        fn max_bytes_per_char(&self) -> usize {
            0
        }
        fn encode(&self, text: &str, out: &mut Vec<u8>) -> TransferResult<()> {
            out.extend_from_slice(text.as_bytes());
            Ok(())
        }
        fn decode(&self, bytes: &[u8], max: usize, out: &mut String) -> Decoded {
            Utf8.decode(bytes, max, out)
        }
    }

    #[test]
    fn test_null_encoding_is_null_argument() {
        let err = EncodingAdapter::from_option(None).unwrap_err();
        assert!(matches!(err, TransferError::NullArgument("encoding")));
    }

    #[test]
    fn test_supported_names() {
        for (name, canonical) in [
            ("ASCII", "us-ascii"),
            ("utf-8", "utf-8"),
            ("Unicode", "utf-16le"),
            ("BigEndianUnicode", "utf-16be"),
            ("utf-32", "utf-32le"),
            ("latin1", "iso-8859-1"),
            ("65001", "utf-8"),
        ] {
            assert_eq!(EncodingAdapter::for_name(name).unwrap().name(), canonical);
        }
    }

    #[test]
    fn test_stateful_names_rejected() {
        for name in ["utf-7", "UTF7", "iso-2022-jp", "x-iscii-de", "57006", "50220"] {
            let err = EncodingAdapter::for_name(name).unwrap_err();
            assert!(
                matches!(err, TransferError::UnsupportedEncoding(_)),
                "{name} was accepted"
            );
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(matches!(
            EncodingAdapter::for_name("klingon"),
            Err(TransferError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_custom_codec_that_fails_is_rejected() {
        assert!(matches!(
            EncodingAdapter::new(Arc::new(Throwing)),
            Err(TransferError::UnsupportedEncoding(_))
        ));
        assert!(matches!(
            EncodingAdapter::new(Arc::new(Unbounded)),
            Err(TransferError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_default_is_ascii() {
        let adapter = EncodingAdapter::default();
        assert_eq!(adapter.name(), "us-ascii");
        assert_eq!(adapter.byte_count("abc").unwrap(), 3);
    }

    #[test]
    fn test_encode_chars_and_decode_all() {
        let adapter = EncodingAdapter::for_name("utf-16le").unwrap();
        let bytes = adapter.encode_chars(&['h', 'i']).unwrap();
        assert_eq!(bytes.len(), 4);
        let (text, decoded) = adapter.decode_all(&bytes[..3]);
        assert_eq!(text, "h");
        assert_eq!(decoded.bytes_consumed, 2);
    }

    fn round_trip(name: &str, text: &str) -> String {
        let adapter = EncodingAdapter::for_name(name).unwrap();
        let bytes = adapter.encode(text).unwrap();
        let (back, decoded) = adapter.decode_all(&bytes);
        assert_eq!(decoded.bytes_consumed, bytes.len());
        back
    }

    proptest! {
        #[test]
        fn prop_unicode_codecs_round_trip(text in any::<String>()) {
            for name in ["utf-8", "utf-16le", "utf-16be", "utf-32le"] {
                prop_assert_eq!(round_trip(name, &text), text.clone());
            }
        }

        #[test]
        fn prop_ascii_round_trip(text in "[\\x00-\\x7F]{0,64}") {
            prop_assert_eq!(round_trip("us-ascii", &text), text);
        }

        #[test]
        fn prop_latin1_round_trip(text in "[\\x00-\\u{FF}]{0,64}") {
            prop_assert_eq!(round_trip("iso-8859-1", &text), text);
        }
    }
}
