//! Well Known URI ("U") record payload codec.
//!
//! One identifier byte selects a well-known prefix, followed by the URI
//! tail. Unknown identifier codes decode with no prefix — round-trippable
//! only when the URI genuinely has no standard prefix.

use crate::error::{Error, ErrorKind, Result};

const PREFIXES: &[(u8, &str)] = &[
    (0x00, ""),
    (0x01, "http://www."),
    (0x02, "https://www."),
    (0x03, "http://"),
    (0x04, "https://"),
];

pub fn encode_payload(uri: &str) -> Vec<u8> {
    let (code, tail) = PREFIXES
        .iter()
        .filter(|(c, _)| *c != 0x00)
        .find(|(_, prefix)| uri.starts_with(prefix))
        .map(|(c, prefix)| (*c, &uri[prefix.len()..]))
        .unwrap_or((0x00, uri));

    let mut payload = Vec::with_capacity(1 + tail.len());
    payload.push(code);
    payload.extend_from_slice(tail.as_bytes());
    payload
}

pub fn decode_payload(payload: &[u8]) -> Result<String> {
    let code = *payload.first().ok_or_else(|| {
        Error::new(
            ErrorKind::MalformedNdef {
                reason: "empty URI payload".to_string(),
                offset: 0,
            },
            "uri::decode_payload",
        )
    })?;

    let prefix = PREFIXES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, p)| *p)
        .unwrap_or("");

    let tail = String::from_utf8_lossy(&payload[1..]);
    Ok(format!("{prefix}{tail}"))
}
