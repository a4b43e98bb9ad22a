//! Protocol-agnostic core for reading and writing NDEF messages across
//! heterogeneous contactless smartcards.
//!
//! `transport` is the hardware boundary; `tag` holds one driver per
//! family behind a `Tag` enum; `device`/`worker` split connection
//! lifecycle from the reader loop; `ndef` is a full record/message
//! codec.

pub mod apdu;
pub mod cache;
pub mod capability;
pub mod card;
pub mod config;
pub mod device;
pub mod error;
pub mod mock;
pub mod ndef;
pub mod tag;
pub mod transport;
pub mod uid;
pub mod worker;

pub use cache::TagCache;
pub use card::Card;
pub use config::{ReaderConfig, ReaderConfigBuilder, ReaderMode};
pub use device::{Device, DeviceManager};
pub use error::{Error, ErrorKind, Result};
pub use ndef::{NdefMessage, NdefRecord, TagContent, TextMessage};
pub use tag::{SmartphoneTagData, Tag, TagIdentity};
pub use transport::Transport;
pub use uid::Uid;
pub use worker::{DeviceStatus, NfcDataEvent, ReaderWorker, WriteOptions};
