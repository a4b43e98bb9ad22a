//! The `Transport` capability: the boundary to whatever actually moves
//! bytes to a physical reader. This core never talks to
//! hardware directly — every protocol driver is generic over `Transport`.
//!
//! A concrete PC/SC-backed implementation, using the `pcsc` crate's
//! command encoding, lives behind the `pcsc-transport` feature; it is
//! additive and is not required to use this crate.

use crate::error::Result;

/// Raw device/reader enumeration and connection lifecycle. Mirrors the
/// libnfc-style initiator / PC/SC-style card-channel split:
/// `open` establishes exclusive access to one physical reader,
/// `transceive` executes one command/response exchange, `close` releases
/// it. Implementations are not assumed reentrant.
pub trait Transport: Send {
    /// Enumerate currently visible reader identities.
    fn list_devices(&self) -> Result<Vec<String>>;

    /// Open exclusive access to the named reader.
    fn open(&mut self, device_id: &str) -> Result<()>;

    /// Release the reader opened by `open`. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Execute one raw command/response exchange against whatever tag is
    /// currently in the field. No pipelining: callers serialise
    /// one `transceive` at a time.
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Best-effort type/ATR descriptor for the tag currently in the
    /// field, fed to `capability::infer_tag_capabilities`. `None` when no
    /// tag is present or the transport cannot report one.
    fn tag_type_hint(&mut self) -> Result<Option<String>>;

    /// Raw UID of the tag currently in the field, when the transport can
    /// report it without an explicit `GET UID` transceive (e.g. PC/SC's
    /// ATR, or a native anticollision result).
    fn tag_uid_hint(&mut self) -> Result<Option<Vec<u8>>>;
}

#[cfg(feature = "pcsc-transport")]
pub mod pcsc_transport {
    //! Concrete `Transport` built directly on the PC/SC crate, using
    //! `src/apdu.rs`'s ACR122U pseudo-APDUs.

    use super::Transport;
    use crate::error::{Error, ErrorKind, Result};
    use pcsc::{Card, Context, Protocols, ShareMode};

    pub struct PcscTransport {
        ctx: Context,
        card: Option<Card>,
    }

    impl PcscTransport {
        pub fn establish() -> Result<Self> {
            let ctx = Context::establish(pcsc::Scope::User)
                .map_err(|e| Error::new(ErrorKind::DeviceConfig, "PcscTransport::establish").with_source(e))?;
            Ok(Self { ctx, card: None })
        }
    }

    impl Transport for PcscTransport {
        fn list_devices(&self) -> Result<Vec<String>> {
            let mut buf = [0u8; 2048];
            let readers = self
                .ctx
                .list_readers(&mut buf)
                .map_err(|e| Error::new(ErrorKind::Io, "PcscTransport::list_devices").with_source(e))?;
            Ok(readers.map(|r| r.to_string_lossy().into_owned()).collect())
        }

        fn open(&mut self, device_id: &str) -> Result<()> {
            let name = std::ffi::CString::new(device_id).map_err(|e| {
                Error::new(ErrorKind::DeviceConfig, "PcscTransport::open").with_source(e)
            })?;
            let card = self
                .ctx
                .connect(&name, ShareMode::Shared, Protocols::ANY)
                .map_err(|e| Error::new(ErrorKind::DeviceClosed, "PcscTransport::open").with_source(e))?;
            self.card = Some(card);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.card = None;
            Ok(())
        }

        fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>> {
            let card = self
                .card
                .as_ref()
                .ok_or_else(|| Error::new(ErrorKind::DeviceClosed, "PcscTransport::transceive"))?;
            let mut recv_buffer = [0u8; 280];
            card.transmit(command, &mut recv_buffer)
                .map(|resp| resp.to_vec())
                .map_err(|e| Error::new(ErrorKind::Io, "PcscTransport::transceive").with_source(e))
        }

        fn tag_type_hint(&mut self) -> Result<Option<String>> {
            let card = match &self.card {
                Some(c) => c,
                None => return Ok(None),
            };
            let mut names_buf = [0u8; 128];
            let mut atr_buf = [0u8; 64];
            match card.status2(&mut names_buf, &mut atr_buf) {
                Ok(status) => Ok(status.atr().last().map(|b| format!("{b:02x}"))),
                Err(_) => Ok(None),
            }
        }

        fn tag_uid_hint(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }
}
