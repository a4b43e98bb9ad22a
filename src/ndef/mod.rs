//! NDEF record/message codec.
//!
//! Bit-exact with the NFC Forum NDEF record format: header bit layout,
//! short/long payload-length field, optional ID length, and MB/ME
//! placement on encode. Chunked records are rejected on decode.

pub mod text;
pub mod tlv;
pub mod uri;

use crate::error::{Error, ErrorKind, Result};

/// Type Name Format — a 3-bit NDEF record classifier.
pub const TNF_EMPTY: u8 = 0x00;
pub const TNF_WELL_KNOWN: u8 = 0x01;
pub const TNF_MIME_MEDIA: u8 = 0x02;
pub const TNF_ABSOLUTE_URI: u8 = 0x03;
pub const TNF_EXTERNAL: u8 = 0x04;
pub const TNF_UNKNOWN: u8 = 0x05;
pub const TNF_UNCHANGED: u8 = 0x06;
pub const TNF_RESERVED: u8 = 0x07;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: u8,
    pub r#type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn new(tnf: u8, r#type: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tnf,
            r#type: r#type.into(),
            id: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.id = id.into();
        self
    }

    /// Convenience constructor for a Well Known "T" (text) record.
    pub fn text(text: &str, lang: &str) -> Self {
        Self::new(TNF_WELL_KNOWN, b"T".to_vec(), self::text::encode_payload(text, lang))
    }

    /// Convenience constructor for a Well Known "U" (URI) record.
    pub fn uri(uri: &str) -> Self {
        Self::new(TNF_WELL_KNOWN, b"U".to_vec(), self::uri::encode_payload(uri))
    }

    fn short_record(&self) -> bool {
        self.payload.len() <= 255
    }

    fn id_present(&self) -> bool {
        !self.id.is_empty()
    }

    /// Size of this record once encoded, used to size the TLV length field.
    pub fn encoded_len(&self) -> usize {
        let mut n = 1 + 1; // header + type length
        n += if self.short_record() { 1 } else { 4 };
        if self.id_present() {
            n += 1;
        }
        n += self.r#type.len() + self.id.len() + self.payload.len();
        n
    }

    fn encode_into(&self, buf: &mut Vec<u8>, is_first: bool, is_last: bool) {
        let short = self.short_record();
        let has_id = self.id_present();

        let mut header = self.tnf & 0x07;
        if is_first {
            header |= 0x80; // MB
        }
        if is_last {
            header |= 0x40; // ME
        }
        if short {
            header |= 0x10; // SR
        }
        if has_id {
            header |= 0x08; // IL
        }
        buf.push(header);

        buf.push(self.r#type.len() as u8);
        if short {
            buf.push(self.payload.len() as u8);
        } else {
            buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        }
        if has_id {
            buf.push(self.id.len() as u8);
        }
        buf.extend_from_slice(&self.r#type);
        if has_id {
            buf.extend_from_slice(&self.id);
        }
        buf.extend_from_slice(&self.payload);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    pub fn single(record: NdefRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let n = self.records.len();
        for (i, record) in self.records.iter().enumerate() {
            record.encode_into(&mut buf, i == 0, i == n.saturating_sub(1));
        }
        buf
    }

    /// Decode a sequence of NDEF records, consuming until ME is observed.
    /// Fails precisely at the offset where the buffer is truncated or
    /// malformed. Chunked records (`CF=1`) are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::new(ErrorKind::EmptyMessage, "NdefMessage::decode"));
        }

        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            if offset >= bytes.len() {
                return Err(malformed("truncated before ME", offset));
            }

            let header = bytes[offset];
            let is_first = header & 0x80 != 0;
            let is_last = header & 0x40 != 0;
            let chunked = header & 0x20 != 0;
            let short = header & 0x10 != 0;
            let id_present = header & 0x08 != 0;
            let tnf = header & 0x07;

            if chunked {
                return Err(Error::new(
                    ErrorKind::UnsupportedChunked,
                    "NdefMessage::decode",
                ));
            }
            if offset == 0 && !is_first {
                return Err(malformed("first record missing MB", offset));
            }

            let mut pos = offset + 1;
            let type_len = read_u8(bytes, pos)? as usize;
            pos += 1;

            let payload_len = if short {
                let v = read_u8(bytes, pos)? as usize;
                pos += 1;
                v
            } else {
                let v = read_u32(bytes, pos)? as usize;
                pos += 4;
                v
            };

            let id_len = if id_present {
                let v = read_u8(bytes, pos)? as usize;
                pos += 1;
                v
            } else {
                0
            };

            let type_end = pos + type_len;
            check_bounds(bytes, type_end, pos)?;
            let r#type = bytes[pos..type_end].to_vec();
            pos = type_end;

            let id_end = pos + id_len;
            check_bounds(bytes, id_end, pos)?;
            let id = bytes[pos..id_end].to_vec();
            pos = id_end;

            let payload_end = pos + payload_len;
            check_bounds(bytes, payload_end, pos)?;
            let payload = bytes[pos..payload_end].to_vec();

            records.push(NdefRecord {
                tnf,
                r#type,
                id,
                payload,
            });

            offset = payload_end;

            if is_last {
                break;
            }
            if offset >= bytes.len() {
                return Err(malformed("truncated before ME", offset));
            }
        }

        Ok(NdefMessage { records })
    }
}

fn malformed(reason: &str, offset: usize) -> Error {
    Error::new(
        ErrorKind::MalformedNdef {
            reason: reason.to_string(),
            offset,
        },
        "NdefMessage::decode",
    )
}

fn check_bounds(bytes: &[u8], end: usize, field_offset: usize) -> Result<()> {
    if end > bytes.len() {
        return Err(malformed("field runs past end of buffer", field_offset));
    }
    Ok(())
}

fn read_u8(bytes: &[u8], pos: usize) -> Result<u8> {
    bytes
        .get(pos)
        .copied()
        .ok_or_else(|| malformed("truncated field", pos))
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32> {
    if pos + 4 > bytes.len() {
        return Err(malformed("truncated payload length field", pos));
    }
    let mut a = [0u8; 4];
    a.copy_from_slice(&bytes[pos..pos + 4]);
    Ok(u32::from_be_bytes(a))
}

/// A tag's contents that did not parse as NDEF: the raw bytes plus their
/// lossless UTF-8 view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub raw: Vec<u8>,
}

impl TextMessage {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Either a parsed NDEF message, or the raw bytes when parsing fails
///.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagContent {
    Ndef(NdefMessage),
    Text(TextMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_text_record() {
        let msg = NdefMessage::single(NdefRecord::text("Hello, NFC!", "en"));
        let encoded = msg.encode();
        let decoded = NdefMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_multi_record_message() {
        let msg = NdefMessage::new(vec![
            NdefRecord::text("Hello", "en"),
            NdefRecord::uri("https://example.com"),
            NdefRecord::new(TNF_EXTERNAL, b"example.com:type".to_vec(), vec![1, 2, 3])
                .with_id(b"id1".to_vec()),
        ]);
        let encoded = msg.encode();
        let decoded = NdefMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn mb_me_and_sr_bits_are_correct() {
        let msg = NdefMessage::new(vec![NdefRecord::text("hi", "en"), NdefRecord::uri("x")]);
        let encoded = msg.encode();
        assert_eq!(encoded[0] & 0x80, 0x80, "first record must have MB");
        assert_eq!(encoded[0] & 0x40, 0, "first record must not have ME");
    }

    #[test]
    fn short_vs_long_boundary_at_255_256() {
        let short = NdefRecord::new(TNF_MIME_MEDIA, b"a".to_vec(), vec![0u8; 255]);
        assert!(short.short_record());
        let long = NdefRecord::new(TNF_MIME_MEDIA, b"a".to_vec(), vec![0u8; 256]);
        assert!(!long.short_record());

        let msg = NdefMessage::single(long.clone());
        let encoded = msg.encode();
        assert_eq!(encoded[0] & 0x10, 0, "long record must not set SR");
        let decoded = NdefMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.records[0], long);
    }

    #[test]
    fn chunked_records_are_rejected() {
        let mut bytes = NdefMessage::single(NdefRecord::text("x", "en")).encode();
        bytes[0] |= 0x20; // set CF
        let err = NdefMessage::decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedChunked);
    }

    #[test]
    fn truncation_reports_precise_offset() {
        let bytes = NdefMessage::single(NdefRecord::text("hello", "en")).encode();
        let truncated = &bytes[..bytes.len() - 3];
        let err = NdefMessage::decode(truncated).unwrap_err();
        match err.kind {
            ErrorKind::MalformedNdef { offset, .. } => assert_eq!(offset, 4),
            other => panic!("expected MalformedNdef, got {other:?}"),
        }
    }

    #[test]
    fn empty_buffer_is_empty_message_error() {
        let err = NdefMessage::decode(&[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EmptyMessage);
    }
}
