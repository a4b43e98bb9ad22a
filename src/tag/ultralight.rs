//! MIFARE Ultralight / Ultralight C / NTAG21x driver.
//!
//! Page-oriented (4 bytes/page), no sector authentication. Generalises a
//! TLV/length-aware page read/write loop across the whole Ultralight/NTAG
//! family rather than one hardcoded page layout.

use crate::apdu::{self, ApduResponse};
use crate::capability::{Capabilities, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::ndef::tlv;
use crate::transport::Transport;
use crate::uid::Uid;

use super::TagIdentity;

const PAGE_SIZE: usize = 4;
/// First page of user memory; pages 0-2 are UID/BCC/lock, page 3 is the
/// Capability Container.
const USER_MEMORY_START_PAGE: u8 = 4;
const CC_PAGE: u8 = 3;
const STATIC_LOCK_PAGE: u8 = 2;

#[derive(Debug)]
pub struct UltralightDriver {
    pub identity: TagIdentity,
    pub capabilities: Capabilities,
}

impl UltralightDriver {
    pub fn new(uid: Uid, family: TagFamily) -> Self {
        Self {
            identity: TagIdentity {
                uid,
                family,
                numeric_type: match family {
                    TagFamily::Ultralight => 0x0001,
                    TagFamily::UltralightC => 0x0002,
                    TagFamily::Ntag213 => 0x0213,
                    TagFamily::Ntag215 => 0x0215,
                    TagFamily::Ntag216 => 0x0216,
                    _ => 0x0000,
                },
            },
            capabilities: Capabilities::for_family(family),
        }
    }

    fn op_err(&self, kind: ErrorKind, op: &'static str) -> Error {
        Error::new(kind, op).with_uid(self.identity.uid.to_string())
    }

    fn page_count(&self) -> Result<u8> {
        let size = self
            .capabilities
            .memory_size
            .ok_or_else(|| self.op_err(ErrorKind::DeviceConfig, "UltralightDriver::page_count"))?;
        Ok((size / PAGE_SIZE) as u8)
    }

    fn read_page(&self, transport: &mut dyn Transport, page: u8) -> Result<[u8; PAGE_SIZE]> {
        let resp = transport.transceive(&apdu::read_binary(page as u16, PAGE_SIZE as u8))?;
        let data = ApduResponse::parse(&resp)?.into_result()?;
        if data.len() < PAGE_SIZE {
            return Err(self.op_err(ErrorKind::ResponseTooShort, "UltralightDriver::read_page"));
        }
        let mut page_bytes = [0u8; PAGE_SIZE];
        page_bytes.copy_from_slice(&data[..PAGE_SIZE]);
        Ok(page_bytes)
    }

    fn write_page(&self, transport: &mut dyn Transport, page: u8, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let resp = transport.transceive(&apdu::update_binary(page as u16, data))?;
        ApduResponse::parse(&resp)?.into_result().map(|_| ())
    }

    pub fn read_ndef(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>> {
        let last_page = self.page_count()?;
        let mut block = Vec::new();
        for page in USER_MEMORY_START_PAGE..last_page {
            match self.read_page(transport, page) {
                Ok(data) => block.extend(data),
                Err(err) => {
                    // Stop on the first page error; if the transport confirms
                    // the tag is simply gone, surface that instead of
                    // whatever raw failure the partial read produced.
                    if matches!(transport.tag_uid_hint(), Ok(None)) {
                        return Err(self.op_err(ErrorKind::CardRemoved, "UltralightDriver::read_ndef"));
                    }
                    return Err(err);
                }
            }
        }

        tlv::find_ndef(&block).map(|p| p.to_vec()).ok_or_else(|| {
            self.op_err(
                ErrorKind::MalformedNdef { reason: "no NDEF TLV in user memory".into(), offset: 0 },
                "UltralightDriver::read_ndef",
            )
        })
    }

    pub fn write_ndef(&mut self, transport: &mut dyn Transport, ndef_bytes: &[u8]) -> Result<()> {
        let last_page = self.page_count()?;
        let user_pages = (last_page - USER_MEMORY_START_PAGE) as usize;
        let capacity = user_pages * PAGE_SIZE;

        let mut block = tlv::encode(ndef_bytes, tlv::TAG_NDEF);
        if block.len() > capacity {
            return Err(self.op_err(ErrorKind::CapacityExceeded, "UltralightDriver::write_ndef"));
        }
        block.resize(block.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0);

        let cc = self.read_page(transport, CC_PAGE)?;
        if cc[0] != 0xE1 {
            let new_cc = [0xE1, 0x10, (capacity / 8) as u8, 0x00];
            self.write_page(transport, CC_PAGE, &new_cc)?;
        }

        for (i, chunk) in block.chunks(PAGE_SIZE).enumerate() {
            let page = USER_MEMORY_START_PAGE + i as u8;
            let mut page_bytes = [0u8; PAGE_SIZE];
            page_bytes.copy_from_slice(chunk);
            self.write_page(transport, page, &page_bytes)?;
        }
        Ok(())
    }

    /// Probes whether the static lock bytes (page 2, bytes 2-3) can still
    /// be set: false if they're already `0xFF` or the page can't be read.
    pub fn can_make_read_only(&self, transport: &mut dyn Transport) -> bool {
        match self.read_page(transport, STATIC_LOCK_PAGE) {
            Ok(page) => page[2] != 0xFF || page[3] != 0xFF,
            Err(_) => false,
        }
    }

    /// Sets the static lock bytes (page 2, bytes 2-3) to freeze user
    /// memory 0-7 permanently; per-page dynamic locking for the larger
    /// NTAG variants is out of scope (Open Question #2, `DESIGN.md`).
    pub fn make_read_only(&mut self, transport: &mut dyn Transport) -> Result<()> {
        let mut lock_page = self.read_page(transport, STATIC_LOCK_PAGE)?;
        lock_page[2] = 0xFF;
        lock_page[3] = 0xFF;
        self.write_page(transport, STATIC_LOCK_PAGE, &lock_page)?;
        self.capabilities.is_read_only = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn driver(family: TagFamily) -> UltralightDriver {
        UltralightDriver::new(Uid::from_hex("04AABBCC"), family)
    }

    #[test]
    fn page_count_matches_memory_size() {
        let d = driver(TagFamily::Ntag213);
        assert_eq!(d.page_count().unwrap(), 45);
    }

    #[test]
    fn write_then_read_round_trips_through_mock_transport() {
        let mut d = driver(TagFamily::Ntag213);
        let mut transport = MockTransport::new();
        transport.format_blank_pages(d.page_count().unwrap());

        d.write_ndef(&mut transport, b"hello ultralight").unwrap();
        let read_back = d.read_ndef(&mut transport).unwrap();
        assert_eq!(read_back, b"hello ultralight");
    }

    #[test]
    fn write_rejects_payload_larger_than_capacity() {
        let mut d = driver(TagFamily::Ultralight);
        let mut transport = MockTransport::new();
        transport.format_blank_pages(d.page_count().unwrap());

        let huge = vec![0u8; 1000];
        let err = d.write_ndef(&mut transport, &huge).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    }

    #[test]
    fn read_surfaces_card_removed_when_tag_is_gone() {
        let mut d = driver(TagFamily::Ntag213);
        let mut transport = MockTransport::new();
        transport.format_blank_pages(d.page_count().unwrap());
        transport.remove_tag();

        let err = d.read_ndef(&mut transport).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CardRemoved);
    }

    #[test]
    fn can_make_read_only_goes_false_once_lock_bytes_are_set() {
        let mut d = driver(TagFamily::Ntag213);
        let mut transport = MockTransport::new();
        transport.format_blank_pages(d.page_count().unwrap());

        assert!(d.can_make_read_only(&mut transport));
        d.make_read_only(&mut transport).unwrap();
        assert!(!d.can_make_read_only(&mut transport));
    }

    #[test]
    fn make_read_only_sets_static_lock_bytes() {
        let mut d = driver(TagFamily::Ntag213);
        let mut transport = MockTransport::new();
        transport.format_blank_pages(d.page_count().unwrap());

        d.make_read_only(&mut transport).unwrap();
        assert!(d.capabilities.is_read_only);
        let lock_page = d.read_page(&mut transport, STATIC_LOCK_PAGE).unwrap();
        assert_eq!(lock_page[2], 0xFF);
        assert_eq!(lock_page[3], 0xFF);
    }
}
