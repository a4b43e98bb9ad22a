//! Structured error taxonomy shared by every layer of the core.
//!
//! Every public operation returns `Result<T, Error>`. `Error` always carries
//! the `op` (the function/phase that failed) and, where known, the tag
//! `uid` that was involved — callers should never need to match on
//! `Display` text to decide what happened.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// The kind of failure, independent of where it happened.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("operation not supported on this tag/device")]
    NotSupported,
    #[error("read failed")]
    ReadFailed,
    #[error("write failed")]
    WriteFailed,
    #[error("authentication failed")]
    AuthFailed,
    #[error("tag removed during operation")]
    TagRemoved,
    #[error("card removed")]
    CardRemoved,
    #[error("APDU error (SW={sw1:02X}{sw2:02X})")]
    Apdu { sw1: u8, sw2: u8 },
    #[error("malformed NDEF: {reason} (offset {offset})")]
    MalformedNdef { reason: String, offset: usize },
    #[error("empty NDEF message")]
    EmptyMessage,
    #[error("I/O error")]
    Io,
    #[error("operation timed out")]
    Timeout,
    #[error("device closed")]
    DeviceClosed,
    #[error("device misconfigured")]
    DeviceConfig,
    #[error("device is cooling down after repeated failures")]
    CooldownRequired,
    #[error("multiple tags present")]
    MultipleTagsPresent,
    #[error("no tag detected")]
    NoTagDetected,
    #[error("operation timed out (best-effort cancellation only)")]
    OperationTimedOut,
    #[error("capacity exceeded")]
    CapacityExceeded,
    #[error("response too short to contain a status word")]
    ResponseTooShort,
    #[error("NDEF length mismatch")]
    NLengthMismatch,
    #[error("unsupported chunked record")]
    UnsupportedChunked,
}

/// A structured error: `kind` + the originating `op` + optional `tag_uid`
/// + an optional wrapped cause.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub op: &'static str,
    pub tag_uid: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, op: &'static str) -> Self {
        Self {
            kind,
            op,
            tag_uid: None,
            source: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.tag_uid = Some(uid.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::OperationTimedOut)
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }

    pub fn is_tag_removed(&self) -> bool {
        matches!(self.kind, ErrorKind::TagRemoved | ErrorKind::CardRemoved)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.kind, ErrorKind::AuthFailed)
    }

    pub fn is_device_config(&self) -> bool {
        matches!(self.kind, ErrorKind::DeviceConfig)
    }

    pub fn is_device_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::DeviceClosed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (op={}", self.kind, self.op)?;
        if let Some(uid) = &self.tag_uid {
            write!(f, ", uid={uid}")?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Small helper for drivers: build an error quickly, attaching `op` at the
/// call site instead of threading it through every `Result`.
pub(crate) fn err(kind: ErrorKind, op: &'static str) -> Error {
    Error::new(kind, op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_kind() {
        let e = Error::new(ErrorKind::Timeout, "poll_once");
        assert!(e.is_timeout());
        assert!(!e.is_auth());
    }

    #[test]
    fn display_includes_op_and_uid() {
        let e = Error::new(ErrorKind::AuthFailed, "authenticate").with_uid("04AABBCC");
        let s = e.to_string();
        assert!(s.contains("authenticate"));
        assert!(s.contains("04AABBCC"));
    }
}
