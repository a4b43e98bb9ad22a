//! The single-reader event loop.
//!
//! The same `get_status_change`-style priority arbitration (stop, device
//! check, card check, cooldown, default poll) as a classic reader
//! daemon, but over `Device::get_tags` + `Card` instead of one hardcoded
//! tag family, with an explicit operation mutex guarding writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::card::Card;
use crate::cache::TagCache;
use crate::config::{ReaderConfig, ReaderMode};
use crate::device::{Device, DeviceManager};
use crate::error::{Error, ErrorKind, Result};
use crate::ndef::{NdefMessage, NdefRecord, TagContent, TextMessage};
use crate::uid::Uid;

/// Emitted on the status channel; cheap to clone for a capacity-1
/// broadcast with intentional drops.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub device_id: Option<String>,
    pub message: String,
}

impl DeviceStatus {
    fn new(device_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            device_id: device_id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Emitted on the data channel. `content` is never `None` when `error`
/// is `None`.
#[derive(Debug, Clone)]
pub struct NfcDataEvent {
    pub uid: Option<Uid>,
    pub content: Option<TagContent>,
    pub error: Option<Arc<Error>>,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub overwrite: bool,
    pub index: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            index: -1,
        }
    }
}

/// Owns a `DeviceManager` and a `TagCache`; alternates, in priority
/// order, stop → device-check → card-check → cooldown → default poll
///.
pub struct ReaderWorker {
    device_manager: DeviceManager,
    cache: TagCache,
    config: ReaderConfig,
    card_present: bool,
    last_device_check: Instant,
    last_card_check: Instant,
    is_writing: Arc<AtomicBool>,
    operation_mutex: Arc<Mutex<()>>,
    status_tx: tokio::sync::broadcast::Sender<DeviceStatus>,
    data_tx: tokio::sync::broadcast::Sender<NfcDataEvent>,
    stop_rx: crossbeam_channel::Receiver<()>,
}

impl ReaderWorker {
    pub fn new(
        config: ReaderConfig,
        status_tx: tokio::sync::broadcast::Sender<DeviceStatus>,
        data_tx: tokio::sync::broadcast::Sender<NfcDataEvent>,
        stop_rx: crossbeam_channel::Receiver<()>,
    ) -> Self {
        let cache = TagCache::new(config.presence_ttl);
        Self {
            device_manager: DeviceManager::new(config.clone()),
            cache,
            config,
            card_present: false,
            last_device_check: Instant::now(),
            last_card_check: Instant::now(),
            is_writing: Arc::new(AtomicBool::new(false)),
            operation_mutex: Arc::new(Mutex::new(())),
            status_tx,
            data_tx,
        stop_rx,
        }
    }

    fn emit_status(&self, device_id: Option<&str>, message: impl Into<String>) {
        let status = DeviceStatus::new(device_id, message);
        if self.status_tx.send(status).is_err() {
            warn!("status channel has no receiver, dropping update");
        }
    }

    fn emit_data(&self, event: NfcDataEvent) {
        if self.data_tx.send(event).is_err() {
            warn!("data channel has no receiver, dropping event");
        }
    }

    /// Runs the loop until the stop channel fires. A device, when not
    /// yet connected, must be supplied by the caller via `try_connect`
    /// up front or the loop stays idle polling for one forever — this
    /// core has no device-discovery policy of its own.
    pub fn run(&mut self, mut connect: impl FnMut() -> Result<Device>) {
        loop {
            if self.stop_rx.try_recv().is_ok() {
                if let Some(device) = self.device_manager.device_mut() {
                    let _ = device.close();
                }
                self.emit_status(None, "Worker stopped");
                return;
            }

            if self.last_device_check.elapsed() >= self.config.device_check_interval {
                self.last_device_check = Instant::now();
                if !self.device_manager.is_connected() && !self.device_manager.is_cooling_down() {
                    match connect() {
                        Ok(device) => {
                            let device_id = device.device_id().to_string();
                            if self.device_manager.try_connect(device).is_ok() {
                                self.emit_status(Some(&device_id), "Device connected");
                            }
                        }
                        Err(err) => warn!("device connect attempt failed: {err}"),
                    }
                }
                continue;
            }

            if self.last_card_check.elapsed() >= self.config.card_check_interval {
                self.last_card_check = Instant::now();
                self.reconcile_card_presence();
                continue;
            }

            if self.device_manager.is_cooling_down() && self.device_manager.cooldown_channel() {
                if self.device_manager.end_cooldown().is_ok() {
                    self.emit_status(None, "Device reconnected after cooldown");
                }
                continue;
            }

            if !self.device_manager.is_connected() || self.device_manager.is_cooling_down() {
                std::thread::sleep(self.config.device_idle_check_interval);
                continue;
            }
            if self.is_writing.load(Ordering::SeqCst) {
                std::thread::sleep(self.config.write_check_interval);
                continue;
            }

            if let Err(err) = self.poll_once() {
                let (_, needs_cooldown) = self.device_manager.handle_error(&err);
                if needs_cooldown {
                    self.emit_status(None, format!("device entering cooldown: {err}"));
                }
            }
        }
    }

    fn reconcile_card_presence(&mut self) {
        let now_present = self.cache.is_present();
        if now_present && !self.card_present {
            if let Some(uid) = self.cache.get_last_scanned() {
                self.emit_status(None, format!("Card detected (UID: {uid})"));
            }
        } else if !now_present && self.card_present {
            self.emit_status(None, "Card removed");
            self.cache.clear();
        }
        self.card_present = now_present;
    }

    /// Polls the device for currently present tags, reads each one that
    /// changed since last seen, and emits a data event per change.
    /// `ReaderMode::ReadOnly` and `ReaderMode::WriteOnly` both skip the
    /// decode/emit step — a tag touch still refreshes the cache, but no
    /// `NfcDataEvent` is ever produced from polling. Only `ReadWrite`
    /// decodes and emits. The data channel also carries an event for a
    /// `get_tags` failure that isn't one `DeviceManager::handle_error`
    /// already classifies and retries internally.
    pub fn poll_once(&mut self) -> Result<()> {
        let device = self
            .device_manager
            .device_mut()
            .ok_or_else(|| Error::new(ErrorKind::DeviceClosed, "ReaderWorker::poll_once"))?;
        let tags = match device.get_tags() {
            Ok(tags) => tags,
            Err(err) => {
                if !is_classified(&err.kind) {
                    self.emit_data(NfcDataEvent {
                        uid: None,
                        content: None,
                        error: Some(Arc::new(Error::new(err.kind.clone(), err.op))),
                    });
                }
                return Err(err);
            }
        };

        for tag in tags {
            let uid = tag.uid().clone();
            self.cache.touch(&uid);

            if self.config.reader_mode != ReaderMode::ReadWrite {
                std::thread::sleep(self.config.default_polling_interval);
                continue;
            }

            let transport = device.transport_mut();
            let mut card = Card::new(tag, transport);
            let content = card.read_message();
            drop(card);

            match content {
                Ok(content) => {
                    let hash = TagCache::hash_payload(&content_bytes(&content));
                    if self.cache.has_changed(&uid, hash) {
                        self.emit_data(NfcDataEvent {
                            uid: Some(uid),
                            content: Some(content),
                            error: None,
                        });
                    }
                }
                Err(err) => {
                    self.emit_data(NfcDataEvent {
                        uid: Some(uid),
                        content: None,
                        error: Some(Arc::new(err)),
                    });
                }
            }

            std::thread::sleep(self.config.default_polling_interval);
        }

        Ok(())
    }

    /// Acquires the operation mutex, sets `is_writing`, performs the
    /// write against the unique present tag, bounded by
    /// `operation_timeout` (best-effort cancellation only: on timeout
    /// the underlying write may still complete on its own thread).
    pub fn write_card_data(&mut self, text: &str, opts: WriteOptions) -> Result<()> {
        if self.config.reader_mode == ReaderMode::ReadOnly {
            return Err(Error::new(ErrorKind::NotSupported, "ReaderWorker::write_card_data"));
        }
        let _guard = self.operation_mutex.lock().unwrap();
        self.is_writing.store(true, Ordering::SeqCst);
        let result = self.write_card_data_inner(text, opts);
        self.is_writing.store(false, Ordering::SeqCst);
        result
    }

    fn write_card_data_inner(&mut self, text: &str, opts: WriteOptions) -> Result<()> {
        let device = self
            .device_manager
            .take_device()
            .ok_or_else(|| Error::new(ErrorKind::DeviceClosed, "ReaderWorker::write_card_data"))?;

        let (tx, rx) = std::sync::mpsc::channel();
        let text_owned = text.to_string();
        std::thread::spawn(move || {
            let mut device = device;
            let result = perform_write(&mut device, &text_owned, opts);
            let _ = tx.send((device, result));
        });

        match rx.recv_timeout(self.config.operation_timeout) {
            Ok((device, result)) => {
                self.device_manager.put_device(device);
                result
            }
            Err(_) => Err(Error::new(ErrorKind::OperationTimedOut, "ReaderWorker::write_card_data")),
        }
    }
}

/// Mirrors the match arms `DeviceManager::handle_error` gives specific
/// retry/cooldown treatment to. Anything else is "unclassified" and
/// surfaces on the data channel instead of only being handled internally.
fn is_classified(kind: &ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TagRemoved
            | ErrorKind::CardRemoved
            | ErrorKind::Io
            | ErrorKind::DeviceConfig
            | ErrorKind::DeviceClosed
            | ErrorKind::Apdu { .. }
    )
}

fn content_bytes(content: &TagContent) -> Vec<u8> {
    match content {
        TagContent::Ndef(msg) => msg.encode(),
        TagContent::Text(TextMessage { raw }) => raw.clone(),
    }
}

fn perform_write(device: &mut Device, text: &str, opts: WriteOptions) -> Result<()> {
    let mut tags = device.get_tags()?;
    match tags.len() {
        0 => return Err(Error::new(ErrorKind::NoTagDetected, "perform_write")),
        1 => {}
        _ => return Err(Error::new(ErrorKind::MultipleTagsPresent, "perform_write")),
    }
    let tag = tags.remove(0);
    let transport = device.transport_mut();
    let mut card = Card::new(tag, transport);

    if opts.overwrite {
        card.write_message(&NdefMessage::single(NdefRecord::text(text, "en")))?;
    } else {
        let mut msg = match card.read_message()? {
            TagContent::Ndef(msg) => msg,
            TagContent::Text(_) => NdefMessage::new(Vec::new()),
        };
        let record = NdefRecord::text(text, "en");
        if opts.index < 0 || opts.index as usize >= msg.records.len() {
            msg.records.push(record);
        } else {
            msg.records[opts.index as usize] = record;
        }
        card.write_message(&msg)?;
    }
    card.close()
}
