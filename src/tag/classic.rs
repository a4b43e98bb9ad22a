//! MIFARE Classic driver.
//!
//! Generalises a flat key-search loop over a fixed block list into the
//! full sector/MAD-aware state machine: address translation, a
//! session-memoised winning key per sector, MAD-driven application
//! sector enumeration, and a sector-trailer formatter.

use std::collections::HashMap;

use crate::apdu::{self, ApduResponse};
use crate::capability::{Capabilities, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::ndef::tlv;
use crate::transport::Transport;
use crate::uid::Uid;

use super::TagIdentity;

const KEY_FACTORY: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
const KEY_NFC_FORUM_PUBLIC: [u8; 6] = [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7];
const KEY_MAD: [u8; 6] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5];
const KEY_ZERO: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

const KEY_TYPE_A: u8 = 0x60;
const KEY_TYPE_B: u8 = 0x61;

/// AID that marks a sector as an NFC Forum NDEF application sector in MAD.
const NFC_FORUM_AID: u16 = 0x03E1;

const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    fn apdu_code(self) -> u8 {
        match self {
            KeyType::A => KEY_TYPE_A,
            KeyType::B => KEY_TYPE_B,
        }
    }
}

#[derive(Debug)]
pub struct ClassicDriver {
    pub identity: TagIdentity,
    pub capabilities: Capabilities,
    is_4k: bool,
    /// Keys supplied by the caller, tried before giving up on a sector.
    user_keys: Vec<[u8; 6]>,
    /// Session-scoped memo of the winning (key, key type) per sector,
    /// so repeated operations in one session don't re-search.
    sector_keys: HashMap<u8, ([u8; 6], KeyType)>,
}

impl ClassicDriver {
    pub fn new(uid: Uid, is_4k: bool, user_keys: Vec<[u8; 6]>) -> Self {
        let family = if is_4k { TagFamily::Classic4K } else { TagFamily::Classic1K };
        Self {
            identity: TagIdentity {
                uid,
                family,
                numeric_type: if is_4k { 0x4000 } else { 0x1000 },
            },
            capabilities: Capabilities::for_family(family),
            is_4k,
            user_keys,
            sector_keys: HashMap::new(),
        }
    }

    fn candidate_keys(&self) -> Vec<[u8; 6]> {
        let mut keys = vec![KEY_FACTORY, KEY_NFC_FORUM_PUBLIC, KEY_MAD, KEY_ZERO];
        keys.extend(self.user_keys.iter().copied());
        keys
    }

    fn sector_count(&self) -> u8 {
        if self.is_4k { 40 } else { 16 }
    }

    fn op_err(&self, kind: ErrorKind, op: &'static str) -> Error {
        Error::new(kind, op).with_uid(self.identity.uid.to_string())
    }

    /// `(sector, block) -> absolute block`.
    pub fn absolute_block(&self, sector: u8, block: u8) -> Result<u8> {
        if sector < 32 {
            if block >= 4 {
                return Err(self.op_err(ErrorKind::NotSupported, "ClassicDriver::absolute_block"));
            }
            if sector >= self.sector_count() {
                return Err(self.op_err(ErrorKind::NotSupported, "ClassicDriver::absolute_block"));
            }
            Ok(sector * 4 + block)
        } else {
            if !self.is_4k || sector >= 40 {
                return Err(self.op_err(ErrorKind::NotSupported, "ClassicDriver::absolute_block"));
            }
            if block >= 16 {
                return Err(self.op_err(ErrorKind::NotSupported, "ClassicDriver::absolute_block"));
            }
            Ok(128 + (sector - 32) * 16 + block)
        }
    }

    fn blocks_per_sector(&self, sector: u8) -> u8 {
        if sector < 32 { 4 } else { 16 }
    }

    fn trailer_block(&self, sector: u8) -> Result<u8> {
        let bps = self.blocks_per_sector(sector);
        self.absolute_block(sector, bps - 1)
    }

    fn mad_sectors(&self) -> Vec<u8> {
        if self.is_4k { vec![0, 16] } else { vec![0] }
    }

    fn data_sectors(&self) -> Vec<u8> {
        (0..self.sector_count())
            .filter(|s| !self.mad_sectors().contains(s))
            .collect()
    }

    fn load_key(&self, transport: &mut dyn Transport, key: &[u8; 6]) -> Result<()> {
        let resp = transport.transceive(&apdu::mifare_load_key(key, 0x00))?;
        ApduResponse::parse(&resp)?.into_result().map(|_| ())
    }

    fn authenticate_block(
        &self,
        transport: &mut dyn Transport,
        block: u8,
        key_type: KeyType,
    ) -> Result<()> {
        let resp = transport.transceive(&apdu::mifare_authenticate(block, key_type.apdu_code(), 0x00))?;
        ApduResponse::parse(&resp)?.into_result().map(|_| ())
    }

    /// Try every candidate key (Key A then Key B) against `sector`'s
    /// trailer, memoising the winner for the rest of the session.
    fn authenticate_sector(&mut self, transport: &mut dyn Transport, sector: u8) -> Result<([u8; 6], KeyType)> {
        if let Some(winner) = self.sector_keys.get(&sector) {
            let trailer = self.trailer_block(sector)?;
            if self.authenticate_block(transport, trailer, winner.1).is_ok() {
                return Ok(*winner);
            }
        }

        let trailer = self.trailer_block(sector)?;
        for key in self.candidate_keys() {
            if self.load_key(transport, &key).is_err() {
                continue;
            }
            if self.authenticate_block(transport, trailer, KeyType::A).is_ok() {
                self.sector_keys.insert(sector, (key, KeyType::A));
                return Ok((key, KeyType::A));
            }
            if self.authenticate_block(transport, trailer, KeyType::B).is_ok() {
                self.sector_keys.insert(sector, (key, KeyType::B));
                return Ok((key, KeyType::B));
            }
        }

        Err(self
            .op_err(ErrorKind::AuthFailed, "ClassicDriver::authenticate_sector"))
    }

    fn read_block(&self, transport: &mut dyn Transport, block: u8) -> Result<Vec<u8>> {
        let resp = transport.transceive(&apdu::read_binary(block as u16, BLOCK_SIZE as u8))?;
        ApduResponse::parse(&resp)?.into_result()
    }

    fn write_block(&self, transport: &mut dyn Transport, block: u8, data: &[u8; 16]) -> Result<()> {
        let resp = transport.transceive(&apdu::update_binary(block as u16, data))?;
        ApduResponse::parse(&resp)?.into_result().map(|_| ())
    }

    /// Read the MAD and return the set of sector numbers whose AID marks
    /// them as NFC Forum application sectors.
    fn read_mad_application_sectors(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>> {
        self.authenticate_sector(transport, 0)?;
        let mad1_b1 = self.read_block(transport, 1)?;
        let mad1_b2 = self.read_block(transport, 2)?;

        let mut aids: Vec<(u8, u16)> = Vec::new();
        for (i, chunk) in mad1_b1[2..].chunks(2).enumerate() {
            aids.push((1 + i as u8, u16::from_be_bytes([chunk[0], chunk[1]])));
        }
        for (i, chunk) in mad1_b2.chunks(2).enumerate() {
            aids.push((8 + i as u8, u16::from_be_bytes([chunk[0], chunk[1]])));
        }

        if self.is_4k {
            self.authenticate_sector(transport, 16)?;
            let mad2_b64 = self.read_block(transport, 64)?;
            for (i, chunk) in mad2_b64[2..].chunks(2).enumerate() {
                aids.push((17 + i as u8, u16::from_be_bytes([chunk[0], chunk[1]])));
            }
            let mad2_b65 = self.read_block(transport, 65)?;
            for (i, chunk) in mad2_b65.chunks(2).enumerate() {
                aids.push((24 + i as u8, u16::from_be_bytes([chunk[0], chunk[1]])));
            }
            let mad2_b66 = self.read_block(transport, 66)?;
            for (i, chunk) in mad2_b66.chunks(2).enumerate() {
                aids.push((32 + i as u8, u16::from_be_bytes([chunk[0], chunk[1]])));
            }
        }

        let sector_count = self.sector_count();
        Ok(aids
            .into_iter()
            .filter(|(sector, aid)| *aid == NFC_FORUM_AID && *sector < sector_count)
            .map(|(sector, _)| sector)
            .collect())
    }

    /// Declares factory mode if a factory-key authenticate succeeds on
    /// the MAD trailer.
    fn detect_factory_mode(&mut self, transport: &mut dyn Transport) -> Result<bool> {
        let trailer = self.trailer_block(0)?;
        if self.load_key(transport, &KEY_FACTORY).is_err() {
            return Ok(false);
        }
        Ok(self.authenticate_block(transport, trailer, KeyType::A).is_ok())
    }

    pub fn read_ndef(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>> {
        if self.read_mad_application_sectors(transport).is_err() {
            if self.detect_factory_mode(transport)? {
                return Ok(Vec::new());
            }
            return Err(self.op_err(ErrorKind::ReadFailed, "ClassicDriver::read_ndef"));
        }

        let app_sectors = self.read_mad_application_sectors(transport)?;
        let mut block_data = Vec::new();
        for sector in app_sectors {
            self.authenticate_sector(transport, sector)?;
            let trailer = self.trailer_block(sector)?;
            let bps = self.blocks_per_sector(sector);
            for block in 0..bps - 1 {
                let abs = self.absolute_block(sector, block)?;
                if abs == trailer {
                    continue;
                }
                block_data.extend(self.read_block(transport, abs)?);
            }
        }

        tlv::find_ndef(&block_data)
            .map(|p| p.to_vec())
            .ok_or_else(|| self.op_err(ErrorKind::MalformedNdef { reason: "no NDEF TLV in application sectors".into(), offset: 0 }, "ClassicDriver::read_ndef"))
    }

    fn format_factory_card(&mut self, transport: &mut dyn Transport) -> Result<()> {
        for sector in self.mad_sectors() {
            self.authenticate_sector(transport, sector)?;
            let trailer_block = self.trailer_block(sector)?;
            let trailer = build_trailer(KEY_MAD, 0b000, 0b001, 0b110, 0b011, 0xC1, KEY_MAD);
            self.write_block(transport, trailer_block, &trailer)?;
        }
        for sector in self.data_sectors() {
            self.authenticate_sector(transport, sector)?;
            let trailer_block = self.trailer_block(sector)?;
            let trailer = build_trailer(
                KEY_NFC_FORUM_PUBLIC,
                0b110,
                0b110,
                0b110,
                0b111,
                0x40,
                KEY_ZERO,
            );
            self.write_block(transport, trailer_block, &trailer)?;
        }
        Ok(())
    }

    pub fn write_ndef(&mut self, transport: &mut dyn Transport, ndef_bytes: &[u8]) -> Result<()> {
        let factory = self.detect_factory_mode(transport)?;
        if factory {
            self.format_factory_card(transport)?;
        }

        let mut block = tlv::encode(ndef_bytes, tlv::TAG_NDEF);
        while block.len() % BLOCK_SIZE != 0 {
            block.push(0);
        }

        let data_sectors = self.data_sectors();
        let mut offset = 0usize;

        for sector in data_sectors {
            if offset >= block.len() {
                break;
            }
            self.authenticate_sector(transport, sector)?;
            let trailer = self.trailer_block(sector)?;
            let bps = self.blocks_per_sector(sector);
            for local_block in 0..bps - 1 {
                if offset >= block.len() {
                    break;
                }
                let abs = self.absolute_block(sector, local_block)?;
                if abs == trailer {
                    continue;
                }
                let mut chunk = [0u8; BLOCK_SIZE];
                let n = (block.len() - offset).min(BLOCK_SIZE);
                chunk[..n].copy_from_slice(&block[offset..offset + n]);
                self.write_block(transport, abs, &chunk)?;
                offset += BLOCK_SIZE;
            }
        }

        if offset < block.len() {
            return Err(self.op_err(ErrorKind::CapacityExceeded, "ClassicDriver::write_ndef"));
        }
        Ok(())
    }

    pub fn make_read_only(&mut self, _transport: &mut dyn Transport) -> Result<()> {
        // Open Question #1 (see DESIGN.md): MakeReadOnly for Classic would
        // need to rewrite every application sector's trailer access bits
        // to read-only, which this driver does not yet perform.
        Err(self.op_err(ErrorKind::NotSupported, "ClassicDriver::make_read_only"))
    }
}

/// Encode a 16-byte sector trailer: `KeyA(6) AccessBits(3) GPB(1) KeyB(6)`.
///
/// `ab0`/`ab1`/`ab2`/`ab_tb` are the 3-bit access codes for data block
/// 0/1/2 and the trailer block, packed into a 12-bit vector and expanded
/// via `byte_k = ((¬ab>>4k & 0xF)<<4) | (ab>>4k & 0xF)`.
pub fn build_trailer(key_a: [u8; 6], ab0: u8, ab1: u8, ab2: u8, ab_tb: u8, gpb: u8, key_b: [u8; 6]) -> [u8; 16] {
    let ab: u16 = ((ab_tb as u16 & 0x7) << 9) | ((ab2 as u16 & 0x7) << 6) | ((ab1 as u16 & 0x7) << 3) | (ab0 as u16 & 0x7);

    let mut trailer = [0u8; 16];
    trailer[0..6].copy_from_slice(&key_a);
    for k in 0..3 {
        let nibble = ((ab >> (4 * k)) & 0x0F) as u8;
        let inv_nibble = (!(ab >> (4 * k)) & 0x0F) as u8;
        trailer[6 + k] = (inv_nibble << 4) | nibble;
    }
    trailer[9] = gpb;
    trailer[10..16].copy_from_slice(&key_b);
    trailer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(is_4k: bool) -> ClassicDriver {
        ClassicDriver::new(Uid::from_hex("04AABBCC"), is_4k, Vec::new())
    }

    #[test]
    fn address_translation_1k_bijective() {
        let d = driver(false);
        let mut seen = std::collections::HashSet::new();
        for sector in 0..16u8 {
            for block in 0..4u8 {
                let abs = d.absolute_block(sector, block).unwrap();
                assert!(seen.insert(abs), "duplicate absolute block {abs}");
            }
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn address_translation_4k_large_sector_boundaries() {
        let d = driver(true);
        assert_eq!(d.absolute_block(32, 0).unwrap(), 128);
        assert_eq!(d.absolute_block(32, 15).unwrap(), 143);
        assert!(d.absolute_block(32, 16).is_err());
        assert!(d.absolute_block(40, 0).is_err());
    }

    #[test]
    fn address_translation_1k_rejects_out_of_range_block() {
        let d = driver(false);
        assert!(d.absolute_block(0, 4).is_err());
        assert!(d.absolute_block(16, 0).is_err());
    }

    #[test]
    fn trailer_access_bytes_encode_nibble_and_complement() {
        let trailer = build_trailer(KEY_NFC_FORUM_PUBLIC, 0b110, 0b110, 0b110, 0b111, 0x40, KEY_ZERO);
        assert_eq!(trailer[0..6], KEY_NFC_FORUM_PUBLIC);
        assert_eq!(trailer[9], 0x40);
        assert_eq!(trailer[10..16], KEY_ZERO);
        for k in 0..3 {
            let byte = trailer[6 + k];
            let low = byte & 0x0F;
            let high = (byte >> 4) & 0x0F;
            assert_eq!(high, (!low) & 0x0F);
        }
    }

    #[test]
    fn mad_sectors_excluded_from_data_sectors() {
        let d = driver(true);
        let data = d.data_sectors();
        assert!(!data.contains(&0));
        assert!(!data.contains(&16));
        assert_eq!(data.len(), 38);
    }

    fn fill_aid_entries(block: &mut [u8], start: usize, count: usize) {
        for i in 0..count {
            block[start + i * 2] = 0x03;
            block[start + i * 2 + 1] = 0xE1;
        }
    }

    #[test]
    fn read_mad_application_sectors_uses_sector_8_not_9_for_mad1_block2() {
        use crate::mock::MockTransport;

        let mut d = driver(false);
        let mut transport = MockTransport::new();
        transport.format_blank_classic(false);

        let mut b1 = vec![0u8; 16];
        fill_aid_entries(&mut b1, 2, 7);
        transport.set_block(1, b1);
        let mut b2 = vec![0u8; 16];
        fill_aid_entries(&mut b2, 0, 8);
        transport.set_block(2, b2);

        let mut sectors = d.read_mad_application_sectors(&mut transport).unwrap();
        sectors.sort();
        assert_eq!(sectors, (1..=15).collect::<Vec<u8>>());
    }

    #[test]
    fn read_mad_application_sectors_skips_mad2_block64_header() {
        use crate::mock::MockTransport;

        let mut d = driver(true);
        let mut transport = MockTransport::new();
        transport.format_blank_classic(true);

        let mut b64 = vec![0u8; 16];
        fill_aid_entries(&mut b64, 2, 7);
        transport.set_block(64, b64);
        let mut b65 = vec![0u8; 16];
        fill_aid_entries(&mut b65, 0, 8);
        transport.set_block(65, b65);
        let mut b66 = vec![0u8; 16];
        fill_aid_entries(&mut b66, 0, 8);
        transport.set_block(66, b66);

        let sectors = d.read_mad_application_sectors(&mut transport).unwrap();
        let mut mad2_sectors: Vec<u8> = sectors.into_iter().filter(|s| *s >= 17).collect();
        mad2_sectors.sort();
        assert_eq!(mad2_sectors, (17..=39).collect::<Vec<u8>>());
    }
}
