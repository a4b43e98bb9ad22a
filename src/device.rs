//! Connection lifecycle, cooldown and reconnect policy.
//!
//! Generalises an outer `Context::establish` retry-with-sleep loop and
//! its ACR122-specific error handling into an explicit `Device` +
//! `DeviceManager` pair so the policy can be exercised without a real
//! reader.

use std::time::{Duration, Instant};

use crate::apdu::{self, ApduResponse};
use crate::capability::{infer_tag_capabilities, DeviceCapabilities};
use crate::config::ReaderConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::tag::{classic::ClassicDriver, desfire::DesfireDriver, type4::Type4Driver, ultralight::UltralightDriver, Tag};
use crate::transport::Transport;
use crate::uid::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
    Cooldown,
}

/// `(identity string, capabilities, state)` — owns at most one active
/// `Tag` session at a time, since the transport is not assumed reentrant.
pub struct Device {
    device_id: String,
    transport: Box<dyn Transport>,
    pub capabilities: DeviceCapabilities,
    state: DeviceState,
}

impl Device {
    pub fn new(device_id: String, transport: Box<dyn Transport>) -> Self {
        Self {
            device_id,
            transport,
            capabilities: DeviceCapabilities::default(),
            state: DeviceState::Closed,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open(&self.device_id)?;
        self.state = DeviceState::Open;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()?;
        self.state = DeviceState::Closed;
        Ok(())
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Poll the transport for whatever tag is currently in the field and
    /// build the matching family driver. Proxied-mobile tags never come
    /// from this path; they are constructed directly from ingested data.
    pub fn get_tags(&mut self) -> Result<Vec<Tag>> {
        let Some(uid_bytes) = self.transport.tag_uid_hint()? else {
            return Ok(Vec::new());
        };
        let uid = Uid::from_bytes(&uid_bytes);
        let type_string = self.transport.tag_type_hint()?.unwrap_or_default();
        let capabilities = infer_tag_capabilities(&type_string);

        let tag = match capabilities.family {
            crate::capability::TagFamily::Classic1K => Tag::Classic(ClassicDriver::new(uid, false, Vec::new())),
            crate::capability::TagFamily::Classic4K => Tag::Classic(ClassicDriver::new(uid, true, Vec::new())),
            crate::capability::TagFamily::Ultralight
            | crate::capability::TagFamily::UltralightC
            | crate::capability::TagFamily::Ntag213
            | crate::capability::TagFamily::Ntag215
            | crate::capability::TagFamily::Ntag216 => {
                Tag::Ultralight(UltralightDriver::new(uid, capabilities.family))
            }
            crate::capability::TagFamily::Type4 => Tag::Type4(Type4Driver::new(uid)),
            crate::capability::TagFamily::Desfire => Tag::Desfire(DesfireDriver::new(uid)),
            crate::capability::TagFamily::ProxiedMobile | crate::capability::TagFamily::Unknown => return Ok(Vec::new()),
        };

        Ok(vec![tag])
    }

    /// `FF CA 00 00 00` — used when the transport can't report a UID hint
    /// directly.
    pub fn fetch_uid_via_apdu(&mut self) -> Result<Vec<u8>> {
        let resp = self.transport.transceive(&apdu::get_uid())?;
        ApduResponse::parse(&resp)?.into_result()
    }
}

/// Owns at most one `Device`, tracking the `Disconnected → Connected →
/// Cooldown → Disconnected` cycle and the retry/cooldown policy.
pub struct DeviceManager {
    device: Option<Device>,
    retry_count: u32,
    cooldown_started_at: Option<Instant>,
    cooldown_duration: Duration,
    config: ReaderConfig,
}

impl DeviceManager {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            device: None,
            retry_count: 0,
            cooldown_started_at: None,
            cooldown_duration: config.device_cooldown,
            config,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.device.as_ref().map(Device::state), Some(DeviceState::Open))
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_started_at.is_some()
    }

    pub fn device_mut(&mut self) -> Option<&mut Device> {
        self.device.as_mut()
    }

    pub fn try_connect(&mut self, mut device: Device) -> Result<()> {
        device.open()?;
        self.device = Some(device);
        self.retry_count = 0;
        Ok(())
    }

    /// Removes the owned `Device` so a caller can move it across a
    /// thread boundary (e.g. for a timeout-bounded write) and hand it
    /// back with `put_device`.
    pub fn take_device(&mut self) -> Option<Device> {
        self.device.take()
    }

    pub fn put_device(&mut self, device: Device) {
        self.device = Some(device);
    }

    /// Classify `err` and decide `(new_retry_count, needs_cooldown)`,
    /// entering cooldown as a side effect when the policy calls for it.
    pub fn handle_error(&mut self, err: &Error) -> (u32, bool) {
        match err.kind {
            ErrorKind::TagRemoved | ErrorKind::CardRemoved => {
                self.retry_count += 1;
                (self.retry_count, false)
            }
            ErrorKind::Io | ErrorKind::DeviceConfig | ErrorKind::DeviceClosed => {
                if let Some(device) = &mut self.device {
                    let _ = device.close();
                }
                std::thread::sleep(self.config.post_error_pause_time);
                self.retry_count += 1;
                let reconnect_failed = self
                    .device
                    .as_mut()
                    .map(|d| d.open().is_err())
                    .unwrap_or(true);
                if reconnect_failed {
                    let needs_hard_cooldown = self.retry_count >= self.config.max_retries;
                    let duration = if needs_hard_cooldown {
                        self.config.max_retries_cooldown
                    } else {
                        self.config.device_cooldown
                    };
                    self.enter_cooldown(duration);
                    (self.retry_count, true)
                } else {
                    (self.retry_count, false)
                }
            }
            ErrorKind::Apdu { .. } => {
                if let Some(device) = &mut self.device {
                    let _ = device.close();
                }
                self.enter_cooldown(self.config.device_cooldown);
                (self.retry_count, true)
            }
            _ => (self.retry_count, false),
        }
    }

    fn enter_cooldown(&mut self, duration: Duration) {
        self.cooldown_started_at = Some(Instant::now());
        self.cooldown_duration = duration;
        if let Some(device) = &mut self.device {
            device.state = DeviceState::Cooldown;
        }
    }

    /// Fires once when the cooldown period has elapsed.
    pub fn cooldown_channel(&self) -> bool {
        self.cooldown_started_at
            .map(|t| t.elapsed() >= self.cooldown_duration)
            .unwrap_or(false)
    }

    /// Attempts reconnect after a cooldown completes.
    pub fn end_cooldown(&mut self) -> Result<()> {
        self.cooldown_started_at = None;
        match &mut self.device {
            Some(device) => device.open(),
            None => Err(Error::new(ErrorKind::DeviceClosed, "DeviceManager::end_cooldown")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn device() -> Device {
        Device::new("mock-reader-0".into(), Box::new(MockTransport::new()))
    }

    #[test]
    fn try_connect_opens_and_resets_retry_count() {
        let mut manager = DeviceManager::new(ReaderConfig::default());
        manager.try_connect(device()).unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn tag_removed_increments_retry_without_cooldown() {
        let mut manager = DeviceManager::new(ReaderConfig::default());
        manager.try_connect(device()).unwrap();
        let err = Error::new(ErrorKind::TagRemoved, "poll_once");
        let (retries, needs_cooldown) = manager.handle_error(&err);
        assert_eq!(retries, 1);
        assert!(!needs_cooldown);
        assert!(!manager.is_cooling_down());
    }

    #[test]
    fn apdu_error_always_triggers_cooldown() {
        let mut manager = DeviceManager::new(ReaderConfig::default());
        manager.try_connect(device()).unwrap();
        let err = Error::new(ErrorKind::Apdu { sw1: 0x6A, sw2: 0x82 }, "transceive");
        let (_, needs_cooldown) = manager.handle_error(&err);
        assert!(needs_cooldown);
        assert!(manager.is_cooling_down());
    }

    #[test]
    fn cooldown_channel_fires_once_elapsed() {
        let mut manager = DeviceManager::new(ReaderConfig::default());
        manager.try_connect(device()).unwrap();
        manager.enter_cooldown(Duration::from_millis(5));
        assert!(!manager.cooldown_channel());
        std::thread::sleep(Duration::from_millis(15));
        assert!(manager.cooldown_channel());
        manager.end_cooldown().unwrap();
        assert!(!manager.is_cooling_down());
    }

    #[test]
    fn take_and_put_device_round_trips() {
        let mut manager = DeviceManager::new(ReaderConfig::default());
        manager.try_connect(device()).unwrap();
        let taken = manager.take_device().unwrap();
        assert!(manager.device_mut().is_none());
        manager.put_device(taken);
        assert!(manager.device_mut().is_some());
    }
}
