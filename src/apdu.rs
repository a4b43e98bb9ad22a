//! ISO 7816-4 APDU builder & parser, plus the ACR122U pseudo-APDU dialect
//! for MIFARE key loading/authentication.
//! `CLA INS P1 P2 [Lc Data] [Le]`.

use crate::error::{Error, ErrorKind, Result};

/// NDEF Application AID.
pub const NDEF_AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

/// Build a SELECT-by-AID APDU (`00 A4 04 00 Lc AID`).
pub fn select_by_aid(aid: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
    apdu.extend_from_slice(aid);
    apdu
}

/// Build a SELECT-by-FID APDU (`00 A4 00 0C Lc FID`).
pub fn select_by_fid(fid: [u8; 2]) -> Vec<u8> {
    vec![0x00, 0xA4, 0x00, 0x0C, 0x02, fid[0], fid[1]]
}

/// READ BINARY with a short (15-bit) offset: `00 B0 P1 P2 Le`.
pub fn read_binary(offset: u16, le: u8) -> Vec<u8> {
    let p1 = ((offset >> 8) & 0x7F) as u8;
    let p2 = (offset & 0xFF) as u8;
    vec![0x00, 0xB0, p1, p2, le]
}

/// Extended-length `Le` (two-byte) READ BINARY, for reads longer than
/// 256 bytes in one APDU.
pub fn read_binary_extended_le(offset: u16, le: u16) -> Vec<u8> {
    let p1 = ((offset >> 8) & 0x7F) as u8;
    let p2 = (offset & 0xFF) as u8;
    let mut apdu = vec![0x00, 0xB0, p1, p2, 0x00];
    apdu.extend_from_slice(&le.to_be_bytes());
    apdu
}

/// UPDATE BINARY with a short offset: `00 D6 P1 P2 Lc Data`.
pub fn update_binary(offset: u16, data: &[u8]) -> Vec<u8> {
    let p1 = ((offset >> 8) & 0x7F) as u8;
    let p2 = (offset & 0xFF) as u8;
    let mut apdu = vec![0x00, 0xD6, p1, p2, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu
}

/// UPDATE BINARY with extended-length `Lc` for payloads over 255 bytes.
pub fn update_binary_extended(offset: u16, data: &[u8]) -> Vec<u8> {
    let p1 = ((offset >> 8) & 0x7F) as u8;
    let p2 = (offset & 0xFF) as u8;
    let mut apdu = vec![0x00, 0xD6, p1, p2, 0x00];
    apdu.extend_from_slice(&(data.len() as u16).to_be_bytes());
    apdu.extend_from_slice(data);
    apdu
}

/// GET UID (ACR122U pseudo-APDU): `FF CA 00 00 00`.
pub fn get_uid() -> Vec<u8> {
    vec![0xFF, 0xCA, 0x00, 0x00, 0x00]
}

/// Load a MIFARE key into reader memory (ACR122U standard):
/// `FF 82 00 key_slot 06 [KEY]`. `key_slot` is `0x00` or `0x20`.
pub fn mifare_load_key(key: &[u8; 6], key_slot: u8) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0x82, 0x00, key_slot, 0x06];
    apdu.extend_from_slice(key);
    apdu
}

/// Authenticate against a MIFARE block using a previously loaded key:
/// `FF 86 00 00 05 01 00 Block KeyType KeySlot`. `key_type` is `0x60`
/// (Key A) or `0x61` (Key B).
pub fn mifare_authenticate(block: u8, key_type: u8, key_slot: u8) -> Vec<u8> {
    vec![
        0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type, key_slot,
    ]
}

/// Wrap a DESFire native command in the `CLA=0x90` pseudo-APDU envelope
///: `90 INS 00 00 Lc Data 00`.
pub fn desfire_native(ins: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x90, ins, 0x00, 0x00, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu.push(0x00);
    apdu
}

/// A parsed APDU response: `[data, SW1, SW2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::new(ErrorKind::ResponseTooShort, "ApduResponse::parse"));
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// `61xx` — more response data is available via GET RESPONSE.
    pub fn has_more_data(&self) -> bool {
        self.sw1 == 0x61
    }

    pub fn error(&self) -> Error {
        Error::new(
            ErrorKind::Apdu {
                sw1: self.sw1,
                sw2: self.sw2,
            },
            "ApduResponse::error",
        )
    }

    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(self.error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_by_aid_has_expected_layout() {
        let apdu = select_by_aid(&NDEF_AID);
        assert_eq!(apdu[..4], [0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(apdu[4], NDEF_AID.len() as u8);
        assert_eq!(&apdu[5..], &NDEF_AID);
    }

    #[test]
    fn read_binary_short_offset() {
        let apdu = read_binary(0x0003, 0x0F);
        assert_eq!(apdu, vec![0x00, 0xB0, 0x00, 0x03, 0x0F]);
    }

    #[test]
    fn parse_success_response() {
        let raw = [0xDE, 0xAD, 0x90, 0x00];
        let resp = ApduResponse::parse(&raw).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.data, vec![0xDE, 0xAD]);
    }

    #[test]
    fn parse_too_short_response_errors() {
        let err = ApduResponse::parse(&[0x90]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResponseTooShort);
    }

    #[test]
    fn error_response_carries_status_word() {
        let resp = ApduResponse::parse(&[0x6A, 0x82]).unwrap();
        assert!(!resp.is_success());
        let err = resp.error();
        assert_eq!(err.kind, ErrorKind::Apdu { sw1: 0x6A, sw2: 0x82 });
    }

    #[test]
    fn has_more_data_detects_61xx() {
        let resp = ApduResponse::parse(&[0x61, 0x10]).unwrap();
        assert!(resp.has_more_data());
        assert!(!resp.is_success());
    }
}
