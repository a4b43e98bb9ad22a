//! The streaming read/write façade over a `Tag`.
//!
//! Generalises a lazy "read only if changed" pattern into an explicit
//! buffered-read/buffered-write state machine.

use std::time::Instant;

use crate::capability::TagFamily;
use crate::error::Result;
use crate::ndef::{NdefMessage, TagContent, TextMessage};
use crate::tag::Tag;
use crate::transport::Transport;
use crate::uid::Uid;

/// A streaming view over one `Tag`, borrowing the `Transport` that
/// reaches it for as long as the `Card` lives — mirroring the short-lived
/// borrow every `Tag` method already takes.
pub struct Card<'t> {
    tag: Tag,
    transport: &'t mut dyn Transport,
    scanned_at: Instant,
    last_accessed: Instant,
    read_buf: Option<Vec<u8>>,
    read_pos: usize,
    write_buf: Vec<u8>,
    closed: bool,
}

impl<'t> Card<'t> {
    pub fn new(tag: Tag, transport: &'t mut dyn Transport) -> Self {
        let now = Instant::now();
        Self {
            tag,
            transport,
            scanned_at: now,
            last_accessed: now,
            read_buf: None,
            read_pos: 0,
            write_buf: Vec::new(),
            closed: false,
        }
    }

    pub fn uid(&self) -> &Uid {
        self.tag.uid()
    }

    pub fn family(&self) -> TagFamily {
        self.tag.family()
    }

    pub fn technology(&self) -> &'static str {
        self.tag.capabilities().technology
    }

    pub fn scanned_at(&self) -> Instant {
        self.scanned_at
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    fn ensure_read_buf(&mut self) -> Result<()> {
        if self.read_buf.is_none() {
            let bytes = self.tag.read_ndef(self.transport)?;
            self.read_buf = Some(bytes);
            self.read_pos = 0;
        }
        Ok(())
    }

    /// Lazily fills the read buffer on first call; subsequent calls
    /// stream from it. Returns the number of bytes copied into `buf`
    /// (`0` at end-of-stream).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_read_buf()?;
        self.last_accessed = Instant::now();
        let source = self.read_buf.as_ref().expect("just filled");
        let remaining = &source[self.read_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }

    /// Appends to the deferred write buffer; no side effect until
    /// `flush`/`close`.
    pub fn write(&mut self, buf: &[u8]) {
        self.write_buf.extend_from_slice(buf);
        self.last_accessed = Instant::now();
    }

    /// Flushes the write buffer through exactly one `Tag::write_ndef`
    /// call, if non-empty.
    pub fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.tag.write_ndef(self.transport, &self.write_buf)?;
            self.write_buf.clear();
        }
        Ok(())
    }

    /// Idempotent: flushes once, then marks the card closed.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Drops the read buffer so the next `read`/`read_message` re-fetches.
    pub fn reset(&mut self) {
        self.read_buf = None;
        self.read_pos = 0;
    }

    /// Reads the whole tag and attempts an NDEF parse, falling back to a
    /// raw `TextMessage` on parse failure. Shares the same lazily-filled
    /// buffer as `read`, so this never triggers a second `read_ndef`.
    pub fn read_message(&mut self) -> Result<TagContent> {
        self.ensure_read_buf()?;
        self.last_accessed = Instant::now();
        let raw = self.read_buf.clone().expect("just filled");
        match NdefMessage::decode(&raw) {
            Ok(msg) => Ok(TagContent::Ndef(msg)),
            Err(_) => Ok(TagContent::Text(TextMessage::new(raw))),
        }
    }

    /// Encodes `msg`, enqueues it as the write buffer, and flushes.
    pub fn write_message(&mut self, msg: &NdefMessage) -> Result<()> {
        self.write_buf = msg.encode();
        self.flush()
    }
}

impl Drop for Card<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::ndef::NdefRecord;
    use crate::tag::ultralight::UltralightDriver;

    fn ultralight_card(transport: &mut MockTransport) -> Tag {
        let driver = UltralightDriver::new(Uid::from_hex("04AABBCC"), TagFamily::Ntag213);
        transport.format_blank_pages(45);
        Tag::Ultralight(driver)
    }

    #[test]
    fn write_message_then_read_message_round_trips() {
        let mut transport = MockTransport::new();
        let tag = ultralight_card(&mut transport);
        let mut card = Card::new(tag, &mut transport);

        let msg = NdefMessage::single(NdefRecord::text("hi card", "en"));
        card.write_message(&msg).unwrap();

        card.reset();
        match card.read_message().unwrap() {
            TagContent::Ndef(decoded) => assert_eq!(decoded, msg),
            TagContent::Text(_) => panic!("expected a parsed NDEF message"),
        }
    }

    #[test]
    fn read_streams_from_a_single_underlying_fetch() {
        let mut transport = MockTransport::new();
        let tag = ultralight_card(&mut transport);
        let mut card = Card::new(tag, &mut transport);
        card.write_message(&NdefMessage::single(NdefRecord::text("stream me", "en")))
            .unwrap();
        card.reset();

        let mut first = [0u8; 4];
        let n1 = card.read(&mut first).unwrap();
        let mut second = [0u8; 64];
        let n2 = card.read(&mut second).unwrap();
        let mut all = first[..n1].to_vec();
        all.extend_from_slice(&second[..n2]);

        let decoded = NdefMessage::decode(&all).unwrap();
        assert_eq!(decoded.records[0].payload[3..], *b"stream me");
    }

    #[test]
    fn close_is_idempotent() {
        let mut transport = MockTransport::new();
        let tag = ultralight_card(&mut transport);
        let mut card = Card::new(tag, &mut transport);
        card.write(b"irrelevant, never flushed via write_message");
        card.close().unwrap();
        card.close().unwrap();
    }
}
