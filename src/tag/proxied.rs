//! Proxied-mobile virtual tag driver.
//!
//! A phone acting as a virtual card pushes NDEF bytes over an external
//! message channel rather than answering APDUs; this driver has no
//! `Transport` traffic of its own. It tracks the emulated technology the
//! phone reports and a heartbeat so a stale session reads as removed
//! rather than silently returning last-known data forever.

use std::time::{Duration, Instant};

use crate::capability::{infer_tag_capabilities, Capabilities, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::ndef::{NdefMessage, NdefRecord};
use crate::transport::Transport;
use crate::uid::Uid;

use super::{Tag, TagIdentity};

#[derive(Debug)]
pub struct ProxiedDriver {
    pub identity: TagIdentity,
    pub capabilities: Capabilities,
    source_device: String,
    emulated_family: TagFamily,
    pending_ndef: Option<Vec<u8>>,
    last_heartbeat: Option<Instant>,
    heartbeat_timeout: Duration,
}

impl ProxiedDriver {
    pub fn new(uid: Uid, emulated_technology: String, source_device: String, heartbeat_timeout: Duration) -> Self {
        let emulated_family = infer_tag_capabilities(&emulated_technology).family;
        Self {
            identity: TagIdentity { uid, family: TagFamily::ProxiedMobile, numeric_type: 0xF00D },
            capabilities: Capabilities::for_family(TagFamily::ProxiedMobile),
            source_device,
            emulated_family,
            pending_ndef: None,
            last_heartbeat: None,
            heartbeat_timeout,
        }
    }

    pub fn source_device(&self) -> &str {
        &self.source_device
    }

    pub fn emulated_family(&self) -> TagFamily {
        self.emulated_family
    }

    /// Record NDEF bytes pushed over the external message channel; also
    /// counts as a heartbeat.
    pub fn ingest(&mut self, ndef_bytes: Vec<u8>) {
        self.pending_ndef = Some(ndef_bytes);
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn is_session_alive(&self) -> bool {
        match self.last_heartbeat {
            Some(t) => t.elapsed() < self.heartbeat_timeout,
            None => false,
        }
    }

    fn op_err(&self, kind: ErrorKind, op: &'static str) -> Error {
        Error::new(kind, op).with_uid(self.identity.uid.to_string())
    }

    pub fn read_ndef(&mut self, _transport: &mut dyn Transport) -> Result<Vec<u8>> {
        if !self.is_session_alive() {
            return Err(self.op_err(ErrorKind::TagRemoved, "ProxiedDriver::read_ndef"));
        }
        self.pending_ndef
            .clone()
            .ok_or_else(|| self.op_err(ErrorKind::NoTagDetected, "ProxiedDriver::read_ndef"))
    }

    pub fn write_ndef(&mut self, _transport: &mut dyn Transport, _ndef_bytes: &[u8]) -> Result<()> {
        Err(self.op_err(ErrorKind::NotSupported, "ProxiedDriver::write_ndef"))
    }

    pub fn make_read_only(&mut self, _transport: &mut dyn Transport) -> Result<()> {
        Err(self.op_err(ErrorKind::NotSupported, "ProxiedDriver::make_read_only"))
    }
}

/// A mobile-proxy ingest payload, accepted from whatever external
/// channel a phone acting as an emulated card reports over. The UID is
/// tolerated in any of `AB:CD:..`, `ABCD..`, `AB-CD..` or `AB CD..`
/// form; `ndef_records`, when present, is encoded into one `NdefMessage`
/// and ingested immediately so the first `read_ndef` already has data.
#[derive(Debug, Clone)]
pub struct SmartphoneTagData {
    pub uid: String,
    pub technology: String,
    pub source_device: String,
    pub ndef_records: Option<Vec<NdefRecord>>,
}

impl SmartphoneTagData {
    /// `heartbeat_timeout` is the reader's configured
    /// `ReaderConfig::smartphone_device_timeout`, not a per-payload value.
    pub fn into_tag(self, heartbeat_timeout: Duration) -> Tag {
        let uid = Uid::parse_lenient(&self.uid);
        let mut driver = ProxiedDriver::new(uid, self.technology, self.source_device, heartbeat_timeout);
        match self.ndef_records {
            Some(records) => driver.ingest(NdefMessage::new(records).encode()),
            None => driver.heartbeat(),
        }
        Tag::Proxied(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const TEST_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

    fn driver() -> ProxiedDriver {
        ProxiedDriver::new(
            Uid::from_hex("04AABBCC"),
            "Mifare Classic 1K".into(),
            "phone-123".into(),
            TEST_HEARTBEAT_TIMEOUT,
        )
    }

    #[test]
    fn no_session_reads_as_tag_removed() {
        let mut d = driver();
        let mut transport = MockTransport::new();
        let err = d.read_ndef(&mut transport).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TagRemoved);
    }

    #[test]
    fn ingested_bytes_are_returned_while_session_alive() {
        let mut d = driver();
        let mut transport = MockTransport::new();
        d.ingest(vec![1, 2, 3]);
        assert_eq!(d.read_ndef(&mut transport).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn write_and_lock_are_not_supported() {
        let mut d = driver();
        let mut transport = MockTransport::new();
        assert_eq!(
            d.write_ndef(&mut transport, b"x").unwrap_err().kind,
            ErrorKind::NotSupported
        );
        assert_eq!(d.make_read_only(&mut transport).unwrap_err().kind, ErrorKind::NotSupported);
    }

    #[test]
    fn emulated_family_is_inferred_from_reported_technology() {
        let d = driver();
        assert_eq!(d.emulated_family(), TagFamily::Classic1K);
        assert_eq!(d.source_device(), "phone-123");
    }

    #[test]
    fn smartphone_tag_data_converts_into_a_proxied_tag_with_lenient_uid() {
        let payload = SmartphoneTagData {
            uid: "04:ab:cd:ef".into(),
            technology: "Mifare Classic 1K".into(),
            source_device: "phone-123".into(),
            ndef_records: Some(vec![NdefRecord::text("hi", "en")]),
        };
        let mut tag = payload.into_tag(TEST_HEARTBEAT_TIMEOUT);
        assert_eq!(tag.uid().as_str(), "04ABCDEF");

        let mut transport = MockTransport::new();
        let content = tag.read_message(&mut transport).unwrap();
        match content {
            crate::ndef::TagContent::Ndef(msg) => assert_eq!(msg.records[0].payload[3..], *b"hi"),
            crate::ndef::TagContent::Text(_) => panic!("expected NDEF content"),
        }
    }

    #[test]
    fn smartphone_tag_data_without_ndef_just_heartbeats() {
        let payload = SmartphoneTagData {
            uid: "04ABCDEF".into(),
            technology: "NTAG213".into(),
            source_device: "phone-456".into(),
            ndef_records: None,
        };
        let mut tag = payload.into_tag(TEST_HEARTBEAT_TIMEOUT);
        let mut transport = MockTransport::new();
        let err = tag.read_message(&mut transport).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoTagDetected);
    }
}
