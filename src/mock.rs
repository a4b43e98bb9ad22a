//! An in-memory `Transport` double for driver tests (no hardware, no
//! feature flag). Understands exactly the APDU dialect `src/apdu.rs`
//! builds: READ/UPDATE BINARY addressed by a raw block/page index (not a
//! byte offset, matching how every driver in `src/tag/` calls it), plus
//! the ACR122U MIFARE key-load/authenticate pseudo-APDUs.

use std::collections::{HashMap, HashSet};

use crate::capability::{DeviceEventEmitter, DeviceInfoProvider, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::transport::Transport;

const SW_OK: [u8; 2] = [0x90, 0x00];
const SW_AUTH_FAILED: [u8; 2] = [0x63, 0x00];
const SW_NOT_FOUND: [u8; 2] = [0x6A, 0x82];

pub struct MockTransport {
    blocks: HashMap<u16, Vec<u8>>,
    /// Per-FID contiguous byte buffers, for file-selecting (Type 4)
    /// drivers, which address within a file by true byte offset and
    /// read/write arbitrary-length sub-ranges. `blocks` above is used
    /// instead by drivers that address whole fixed-size blocks/pages
    /// directly without ever selecting a file.
    files: HashMap<[u8; 2], Vec<u8>>,
    selected_fid: Option<[u8; 2]>,
    loaded_keys: HashMap<u8, [u8; 6]>,
    authenticated: HashSet<u16>,
    opened: bool,
    tag_type_hint: Option<String>,
    tag_uid_hint: Option<Vec<u8>>,
    tag_present: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
            files: HashMap::new(),
            selected_fid: None,
            loaded_keys: HashMap::new(),
            authenticated: HashSet::new(),
            opened: false,
            tag_type_hint: None,
            tag_uid_hint: None,
            tag_present: true,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.tag_type_hint = Some(hint.into());
        self
    }

    pub fn with_tag_uid_hint(mut self, uid: Vec<u8>) -> Self {
        self.tag_uid_hint = Some(uid);
        self
    }

    /// Simulates the tag leaving the field: every subsequent READ/UPDATE
    /// BINARY fails and the hint methods report no tag present.
    pub fn remove_tag(&mut self) {
        self.tag_present = false;
    }

    /// Blank out `page_count` 4-byte pages for an Ultralight/NTAG test.
    pub fn format_blank_pages(&mut self, page_count: u8) {
        for page in 0..page_count {
            self.blocks.insert(page as u16, vec![0u8; 4]);
        }
    }

    /// Blank-format a MIFARE Classic card: every sector trailer carries
    /// the factory key as both Key A and Key B with wide-open access
    /// bits, every data block is zeroed.
    pub fn format_blank_classic(&mut self, is_4k: bool) {
        const FACTORY: [u8; 6] = [0xFF; 6];
        let sector_count = if is_4k { 40 } else { 16 };
        for sector in 0..sector_count {
            let (base, blocks_per_sector) = if sector < 32 {
                (sector * 4, 4)
            } else {
                (128 + (sector - 32) * 16, 16)
            };
            for block in 0..blocks_per_sector - 1 {
                self.blocks.insert((base + block) as u16, vec![0u8; 16]);
            }
            let mut trailer = vec![0u8; 16];
            trailer[0..6].copy_from_slice(&FACTORY);
            trailer[6..9].copy_from_slice(&[0xFF, 0x07, 0x80]);
            trailer[9] = 0x69;
            trailer[10..16].copy_from_slice(&FACTORY);
            self.blocks.insert((base + blocks_per_sector - 1) as u16, trailer);
        }
    }

    /// Seed a raw TLV/NDEF payload at a given block/page, for read-path
    /// tests that don't go through a driver's own write path.
    pub fn set_block(&mut self, offset: u16, data: Vec<u8>) {
        self.blocks.insert(offset, data);
    }

    /// Seed a file's contents for a Type 4 driver at a byte offset,
    /// keyed by FID, so the Capability Container and the NDEF file don't
    /// alias the same address space.
    pub fn set_file_block(&mut self, fid: [u8; 2], offset: u16, data: Vec<u8>) {
        let buf = self.files.entry(fid).or_default();
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(&data);
    }

    fn decode_offset(p1: u8, p2: u8) -> u16 {
        (((p1 & 0x7F) as u16) << 8) | p2 as u16
    }

    fn select_by_fid(&mut self, fid: [u8; 2]) {
        self.files.entry(fid).or_default();
        self.selected_fid = Some(fid);
    }

    /// Within a selected file, bytes are a true contiguous address space:
    /// a sub-range read/write sees and mutates the same underlying
    /// buffer regardless of chunk boundaries.
    fn read_binary(&self, p1: u8, p2: u8, le: u16) -> Vec<u8> {
        let offset = Self::decode_offset(p1, p2) as usize;
        let mut data = match self.selected_fid.and_then(|fid| self.files.get(&fid)) {
            Some(buf) => {
                let end = (offset + le as usize).min(buf.len());
                if offset < buf.len() {
                    buf[offset..end].to_vec()
                } else {
                    Vec::new()
                }
            }
            None => self.blocks.get(&(offset as u16)).cloned().unwrap_or_default(),
        };
        data.resize(le as usize, 0);
        let mut resp = data;
        resp.extend_from_slice(&SW_OK);
        resp
    }

    fn update_binary(&mut self, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
        let offset = Self::decode_offset(p1, p2) as usize;
        match self.selected_fid {
            Some(fid) => {
                let buf = self.files.entry(fid).or_default();
                let end = offset + data.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[offset..end].copy_from_slice(data);
            }
            None => {
                self.blocks.insert(offset as u16, data.to_vec());
            }
        }
        SW_OK.to_vec()
    }

    fn load_key(&mut self, slot: u8, key: [u8; 6]) -> Vec<u8> {
        self.loaded_keys.insert(slot, key);
        SW_OK.to_vec()
    }

    fn authenticate(&mut self, block: u8, key_type: u8, slot: u8) -> Vec<u8> {
        let Some(key) = self.loaded_keys.get(&slot).copied() else {
            return SW_AUTH_FAILED.to_vec();
        };
        let Some(trailer) = self.blocks.get(&(block as u16)) else {
            return SW_NOT_FOUND.to_vec();
        };
        if trailer.len() != 16 {
            return SW_NOT_FOUND.to_vec();
        }
        let expected = match key_type {
            0x60 => &trailer[0..6],
            0x61 => &trailer[10..16],
            _ => return SW_AUTH_FAILED.to_vec(),
        };
        if expected == key {
            self.authenticated.insert(block as u16);
            SW_OK.to_vec()
        } else {
            SW_AUTH_FAILED.to_vec()
        }
    }
}

impl Transport for MockTransport {
    fn list_devices(&self) -> Result<Vec<String>> {
        Ok(vec!["mock-reader-0".to_string()])
    }

    fn open(&mut self, _device_id: &str) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if !self.tag_present {
            return match command {
                [0x00, 0xB0, ..] | [0x00, 0xD6, ..] => Ok(SW_NOT_FOUND.to_vec()),
                _ => Err(Error::new(ErrorKind::NotSupported, "MockTransport::transceive")),
            };
        }
        match command {
            [0xFF, 0x82, 0x00, slot, 0x06, key @ ..] if key.len() == 6 => {
                let mut k = [0u8; 6];
                k.copy_from_slice(key);
                Ok(self.load_key(*slot, k))
            }
            [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type, slot] => {
                Ok(self.authenticate(*block, *key_type, *slot))
            }
            [0x00, 0xB0, p1, p2, le] => Ok(self.read_binary(*p1, *p2, *le as u16)),
            [0x00, 0xB0, p1, p2, 0x00, le_hi, le_lo] => {
                Ok(self.read_binary(*p1, *p2, u16::from_be_bytes([*le_hi, *le_lo])))
            }
            [0x00, 0xD6, p1, p2, lc, data @ ..] if *lc as usize == data.len() => {
                Ok(self.update_binary(*p1, *p2, data))
            }
            [0x00, 0xD6, p1, p2, 0x00, lc_hi, lc_lo, data @ ..]
                if u16::from_be_bytes([*lc_hi, *lc_lo]) as usize == data.len() =>
            {
                Ok(self.update_binary(*p1, *p2, data))
            }
            [0x00, 0xA4, 0x04, 0x00, _lc, _aid @ ..] => Ok(SW_OK.to_vec()),
            [0x00, 0xA4, 0x00, 0x0C, 0x02, fid0, fid1] => {
                self.select_by_fid([*fid0, *fid1]);
                Ok(SW_OK.to_vec())
            }
            [0xFF, 0xCA, 0x00, 0x00, 0x00] => {
                let mut resp = self.tag_uid_hint.clone().unwrap_or_default();
                resp.extend_from_slice(&SW_OK);
                Ok(resp)
            }
            _ => Err(Error::new(ErrorKind::NotSupported, "MockTransport::transceive")),
        }
    }

    fn tag_type_hint(&mut self) -> Result<Option<String>> {
        Ok(if self.tag_present { self.tag_type_hint.clone() } else { None })
    }

    fn tag_uid_hint(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(if self.tag_present { self.tag_uid_hint.clone() } else { None })
    }
}

/// A fixed-answer `DeviceInfoProvider`, for capability-inference tests.
pub struct MockDeviceInfo {
    pub device_type: String,
    pub supported: Vec<TagFamily>,
}

impl DeviceInfoProvider for MockDeviceInfo {
    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn supported_tag_types(&self) -> Vec<TagFamily> {
        self.supported.clone()
    }
}

/// A `DeviceEventEmitter` whose `supports_events()` answer is set at
/// construction, for exercising the event-driven device-capability path.
pub struct MockEventEmitter(pub bool);

impl DeviceEventEmitter for MockEventEmitter {
    fn supports_events(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu;

    #[test]
    fn read_after_write_round_trips_through_binary_apdus() {
        let mut t = MockTransport::new();
        let write = apdu::update_binary(5, &[1, 2, 3, 4]);
        t.transceive(&write).unwrap();
        let read = apdu::read_binary(5, 4);
        let resp = t.transceive(&read).unwrap();
        assert_eq!(&resp[..4], &[1, 2, 3, 4]);
        assert_eq!(&resp[4..], &[0x90, 0x00]);
    }

    #[test]
    fn removed_tag_fails_binary_apdus_and_clears_hints() {
        let mut t = MockTransport::new().with_tag_uid_hint(vec![0x04, 0xAA]);
        t.remove_tag();
        let resp = t.transceive(&apdu::read_binary(0, 4)).unwrap();
        assert_eq!(&resp, &[0x6A, 0x82]);
        assert_eq!(t.tag_uid_hint().unwrap(), None);
    }

    #[test]
    fn authenticate_fails_without_matching_loaded_key() {
        let mut t = MockTransport::new();
        t.format_blank_classic(false);
        let auth = apdu::mifare_authenticate(3, 0x60, 0x00);
        let resp = t.transceive(&auth).unwrap();
        assert_eq!(&resp, &[0x63, 0x00]);
    }

    #[test]
    fn authenticate_succeeds_after_loading_factory_key() {
        let mut t = MockTransport::new();
        t.format_blank_classic(false);
        t.transceive(&apdu::mifare_load_key(&[0xFF; 6], 0x00)).unwrap();
        let resp = t.transceive(&apdu::mifare_authenticate(3, 0x60, 0x00)).unwrap();
        assert_eq!(&resp, &[0x90, 0x00]);
    }
}
