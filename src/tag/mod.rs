//! The tag-type-polymorphic protocol layer.
//!
//! `Tag` is a tagged variant over the five families; family-specific
//! state machines live in their own module. Every variant shares the
//! uniform `read_ndef`/`write_ndef`/`is_writable`/`can_lock`/
//! `make_read_only` contract through inherent methods that dispatch on
//! the variant, matching the "blanket `TagOps` capability + pattern match
//! for family-specific operations" design note.
//!
//! `Tag` never owns its `Transport`: every operation borrows one for the
//! duration of a single call, per the "short-lived borrow" design note
//! for the `Tag -> Device` edge.

pub mod classic;
pub mod desfire;
pub mod proxied;
pub mod type4;
pub mod ultralight;

pub use proxied::SmartphoneTagData;

use crate::capability::{Capabilities, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::ndef::{NdefMessage, TagContent, TextMessage};
use crate::transport::Transport;
use crate::uid::Uid;

/// Identity shared by every family: `(uid, family, numeric_type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIdentity {
    pub uid: Uid,
    pub family: TagFamily,
    pub numeric_type: u16,
}

#[derive(Debug)]
pub enum Tag {
    Classic(classic::ClassicDriver),
    Ultralight(ultralight::UltralightDriver),
    Type4(type4::Type4Driver),
    Desfire(desfire::DesfireDriver),
    Proxied(proxied::ProxiedDriver),
}

impl Tag {
    pub fn identity(&self) -> &TagIdentity {
        match self {
            Tag::Classic(d) => &d.identity,
            Tag::Ultralight(d) => &d.identity,
            Tag::Type4(d) => &d.identity,
            Tag::Desfire(d) => &d.identity,
            Tag::Proxied(d) => &d.identity,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.identity().uid
    }

    pub fn family(&self) -> TagFamily {
        self.identity().family
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Tag::Classic(d) => d.capabilities,
            Tag::Ultralight(d) => d.capabilities,
            Tag::Type4(d) => d.capabilities,
            Tag::Desfire(d) => d.capabilities,
            Tag::Proxied(d) => d.capabilities,
        }
    }

    pub fn is_writable(&self) -> bool {
        let caps = self.capabilities();
        caps.can_write && !caps.is_read_only
    }

    /// Live capability probe rather than a one-time construction-time
    /// flag: asks the tag itself whether locking is still possible right
    /// now (Ultralight/NTAG: lock bytes not already set; Type 4: CC
    /// write-access byte not already `0xFF`). Classic has no implemented
    /// lock mechanism (`make_read_only` always fails `NotSupported`), so
    /// it reports `false` rather than the static per-family flag.
    pub fn can_lock(&self, transport: &mut dyn Transport) -> bool {
        match self {
            Tag::Classic(_) | Tag::Desfire(_) | Tag::Proxied(_) => false,
            Tag::Ultralight(d) => d.can_make_read_only(transport),
            Tag::Type4(d) => d.can_make_read_only(transport),
        }
    }

    /// Read the raw NDEF message bytes off the tag.
    pub fn read_ndef(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>> {
        match self {
            Tag::Classic(d) => d.read_ndef(transport),
            Tag::Ultralight(d) => d.read_ndef(transport),
            Tag::Type4(d) => d.read_ndef(transport),
            Tag::Desfire(d) => d.read_ndef(transport),
            Tag::Proxied(d) => d.read_ndef(transport),
        }
    }

    /// Write a raw NDEF message to the tag.
    pub fn write_ndef(&mut self, transport: &mut dyn Transport, ndef_bytes: &[u8]) -> Result<()> {
        match self {
            Tag::Classic(d) => d.write_ndef(transport, ndef_bytes),
            Tag::Ultralight(d) => d.write_ndef(transport, ndef_bytes),
            Tag::Type4(d) => d.write_ndef(transport, ndef_bytes),
            Tag::Desfire(d) => d.write_ndef(transport, ndef_bytes),
            Tag::Proxied(d) => d.write_ndef(transport, ndef_bytes),
        }
    }

    /// Make the tag permanently read-only, where the family/CC/lock-byte
    /// mechanism is well defined (Open Question #2, resolved in
    /// `DESIGN.md`: supported for Classic, Ultralight/NTAG and Type 4;
    /// `NotSupported` for DESFire and proxied-mobile).
    pub fn make_read_only(&mut self, transport: &mut dyn Transport) -> Result<()> {
        match self {
            Tag::Classic(d) => d.make_read_only(transport),
            Tag::Ultralight(d) => d.make_read_only(transport),
            Tag::Type4(d) => d.make_read_only(transport),
            Tag::Desfire(d) => d.make_read_only(transport),
            Tag::Proxied(d) => d.make_read_only(transport),
        }
    }

    /// Raw transceive, only for families whose capabilities advertise it.
    pub fn transceive(&mut self, transport: &mut dyn Transport, command: &[u8]) -> Result<Vec<u8>> {
        if !self.capabilities().can_transceive {
            return Err(Error::new(ErrorKind::NotSupported, "Tag::transceive").with_uid(self.uid().to_string()));
        }
        transport.transceive(command)
    }

    /// Read the tag's contents and attempt an NDEF parse, falling back to
    /// a raw `TextMessage` on parse failure.
    pub fn read_message(&mut self, transport: &mut dyn Transport) -> Result<TagContent> {
        let raw = self.read_ndef(transport)?;
        match NdefMessage::decode(&raw) {
            Ok(msg) => Ok(TagContent::Ndef(msg)),
            Err(_) => Ok(TagContent::Text(TextMessage::new(raw))),
        }
    }

    pub fn write_message(&mut self, transport: &mut dyn Transport, msg: &NdefMessage) -> Result<()> {
        self.write_ndef(transport, &msg.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn transceive_rejected_when_capability_absent() {
        let mut tag = Tag::Proxied(proxied::ProxiedDriver::new(
            Uid::from_hex("04AABBCC"),
            "Mifare".into(),
            "mock-source".into(),
            std::time::Duration::from_secs(10),
        ));
        let mut transport = MockTransport::new();
        let err = tag.transceive(&mut transport, &[0x00]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotSupported);
    }
}
