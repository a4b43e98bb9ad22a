//! Well Known Text ("T") record payload codec.
//!
//! `status = lang_len | (utf16? 0x80 : 0)`, followed by the language code
//! then the text. UTF-16 is decoded as little-endian with space-trimming;
//! this codec only ever *emits* UTF-8 (`utf16 = false`).

use crate::error::{Error, ErrorKind, Result};

pub const DEFAULT_LANG: &str = "en";

pub fn encode_payload(text: &str, lang: &str) -> Vec<u8> {
    let lang = if lang.is_empty() { DEFAULT_LANG } else { lang };
    let lang_bytes = lang.as_bytes();
    debug_assert!(lang_bytes.len() <= 0x3F, "language code must fit in 6 bits");

    let mut payload = Vec::with_capacity(1 + lang_bytes.len() + text.len());
    let status = (lang_bytes.len() as u8) & 0x3F; // bit 7 = 0 => UTF-8
    payload.push(status);
    payload.extend_from_slice(lang_bytes);
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Decoded text record contents: the text and its language code.
pub struct DecodedText {
    pub text: String,
    pub lang: String,
}

pub fn decode_payload(payload: &[u8]) -> Result<DecodedText> {
    let status = *payload
        .first()
        .ok_or_else(|| malformed("empty text payload", 0))?;
    let utf16 = status & 0x80 != 0;
    let lang_len = (status & 0x3F) as usize;

    let lang_start = 1;
    let lang_end = lang_start + lang_len;
    if lang_end > payload.len() {
        return Err(malformed("language code runs past payload end", lang_start));
    }
    let lang = String::from_utf8_lossy(&payload[lang_start..lang_end]).into_owned();

    let text_bytes = &payload[lang_end..];
    let text = if utf16 {
        decode_utf16_le(text_bytes)
    } else {
        String::from_utf8(text_bytes.to_vec())
            .map_err(|_| malformed("text is not valid UTF-8", lang_end))?
    };

    Ok(DecodedText { text, lang })
}

fn decode_utf16_le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units).trim().to_string()
}

fn malformed(reason: &str, offset: usize) -> Error {
    Error::new(
        ErrorKind::MalformedNdef {
            reason: reason.to_string(),
            offset,
        },
        "text::decode_payload",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_text_and_language() {
        for lang in ["en", "fr", "de", "ja"] {
            let payload = encode_payload("hello world", lang);
            let decoded = decode_payload(&payload).unwrap();
            assert_eq!(decoded.text, "hello world");
            assert_eq!(decoded.lang, lang);
        }
    }

    #[test]
    fn empty_language_falls_back_to_default() {
        let payload = encode_payload("x", "");
        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded.lang, DEFAULT_LANG);
    }

    #[test]
    fn utf16_text_is_decoded_and_trimmed() {
        let text = "hi";
        let mut payload = vec![0x80 | 2u8];
        payload.extend_from_slice(b"en");
        for u in text.encode_utf16() {
            payload.extend_from_slice(&u.to_le_bytes());
        }
        payload.extend_from_slice(&[0x20, 0x00]); // trailing space, LE
        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded.text, "hi");
    }
}
