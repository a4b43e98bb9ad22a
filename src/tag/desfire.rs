//! DESFire driver.
//!
//! DESFire's native command set (application selection, file reads,
//! cryptographic authentication) sits well outside this core's scope;
//! this driver only establishes identity/capability and exposes the raw
//! `CLA=0x90` native-command transceive `apdu::desfire_native` already
//! wraps. Reads and writes through the uniform
//! NDEF contract are `NotSupported` until a caller does the
//! application-specific file mapping themselves via `transceive`.

use crate::apdu;
use crate::capability::{Capabilities, TagFamily};
use crate::error::{Error, ErrorKind, Result};
use crate::transport::Transport;
use crate::uid::Uid;

use super::TagIdentity;

#[derive(Debug)]
pub struct DesfireDriver {
    pub identity: TagIdentity,
    pub capabilities: Capabilities,
}

impl DesfireDriver {
    pub fn new(uid: Uid) -> Self {
        Self {
            identity: TagIdentity {
                uid,
                family: TagFamily::Desfire,
                numeric_type: 0x4403,
            },
            capabilities: Capabilities::for_family(TagFamily::Desfire),
        }
    }

    fn unsupported(&self, op: &'static str) -> Error {
        Error::new(ErrorKind::NotSupported, op).with_uid(self.identity.uid.to_string())
    }

    pub fn read_ndef(&mut self, _transport: &mut dyn Transport) -> Result<Vec<u8>> {
        Err(self.unsupported("DesfireDriver::read_ndef"))
    }

    pub fn write_ndef(&mut self, _transport: &mut dyn Transport, _ndef_bytes: &[u8]) -> Result<()> {
        Err(self.unsupported("DesfireDriver::write_ndef"))
    }

    pub fn make_read_only(&mut self, _transport: &mut dyn Transport) -> Result<()> {
        Err(self.unsupported("DesfireDriver::make_read_only"))
    }

    /// Issue one native DESFire command (e.g. `GetVersion`, ins `0x60`)
    /// and return its raw response, including status byte(s).
    pub fn native_command(&self, transport: &mut dyn Transport, ins: u8, data: &[u8]) -> Result<Vec<u8>> {
        transport.transceive(&apdu::desfire_native(ins, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn read_and_write_ndef_are_not_supported() {
        let mut d = DesfireDriver::new(Uid::from_hex("04AABBCC"));
        let mut transport = MockTransport::new();
        assert_eq!(d.read_ndef(&mut transport).unwrap_err().kind, ErrorKind::NotSupported);
        assert_eq!(
            d.write_ndef(&mut transport, b"x").unwrap_err().kind,
            ErrorKind::NotSupported
        );
    }

    #[test]
    fn native_command_wraps_cla_90() {
        let d = DesfireDriver::new(Uid::from_hex("04AABBCC"));
        let apdu = apdu::desfire_native(0x60, &[]);
        assert_eq!(apdu[0], 0x90);
        assert_eq!(apdu[1], 0x60);
        let _ = d;
    }
}
