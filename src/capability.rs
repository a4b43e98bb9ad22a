//! The capability model: a uniform description of what a tag or reader
//! can do. Derived once at construction, never mutated by
//! the core except the `is_read_only` flip on a successful `MakeReadOnly`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    Classic1K,
    Classic4K,
    Ultralight,
    UltralightC,
    Ntag213,
    Ntag215,
    Ntag216,
    Desfire,
    Type4,
    ProxiedMobile,
    Unknown,
}

impl TagFamily {
    pub const fn memory_size(self) -> Option<usize> {
        match self {
            TagFamily::Classic1K => Some(1024),
            TagFamily::Classic4K => Some(4096),
            TagFamily::Ultralight => Some(64),
            TagFamily::UltralightC => Some(192),
            TagFamily::Ntag213 => Some(180),
            TagFamily::Ntag215 => Some(540),
            TagFamily::Ntag216 => Some(924),
            _ => None,
        }
    }

    pub const fn max_ndef_size(self) -> Option<usize> {
        match self {
            TagFamily::Classic1K => Some(716),
            TagFamily::Classic4K => Some(3356),
            TagFamily::Ultralight => Some(46),
            TagFamily::UltralightC => Some(137),
            TagFamily::Ntag213 => Some(144),
            TagFamily::Ntag215 => Some(504),
            TagFamily::Ntag216 => Some(888),
            _ => None,
        }
    }

    pub const fn supports_ndef(self) -> bool {
        !matches!(self, TagFamily::Unknown)
    }

    pub const fn supports_auth(self) -> bool {
        matches!(self, TagFamily::Classic1K | TagFamily::Classic4K)
    }

    pub const fn supports_crypto(self) -> bool {
        matches!(self, TagFamily::Desfire)
    }

    pub const fn technology(self) -> &'static str {
        match self {
            TagFamily::Classic1K | TagFamily::Classic4K => "ISO14443A/MIFARE Classic",
            TagFamily::Ultralight | TagFamily::UltralightC => "ISO14443A/MIFARE Ultralight",
            TagFamily::Ntag213 | TagFamily::Ntag215 | TagFamily::Ntag216 => "ISO14443A/NTAG",
            TagFamily::Desfire => "ISO14443A/DESFire",
            TagFamily::Type4 => "ISO14443-4",
            TagFamily::ProxiedMobile => "ProxiedMobile",
            TagFamily::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_write: bool,
    pub can_transceive: bool,
    pub can_lock: bool,
    pub is_read_only: bool,
    pub memory_size: Option<usize>,
    pub max_ndef_size: Option<usize>,
    pub technology: &'static str,
    pub family: TagFamily,
    pub supports_ndef: bool,
    pub supports_crypto: bool,
    pub supports_auth: bool,
}

impl Capabilities {
    pub fn for_family(family: TagFamily) -> Self {
        let (can_read, can_write, can_transceive, can_lock) = match family {
            TagFamily::ProxiedMobile => (true, false, false, false),
            TagFamily::Desfire => (true, false, true, false),
            TagFamily::Unknown => (false, false, false, false),
            _ => (true, true, true, true),
        };

        Capabilities {
            can_read,
            can_write,
            can_transceive,
            can_lock,
            is_read_only: false,
            memory_size: family.memory_size(),
            max_ndef_size: family.max_ndef_size(),
            technology: family.technology(),
            family,
            supports_ndef: family.supports_ndef(),
            supports_crypto: family.supports_crypto(),
            supports_auth: family.supports_auth(),
        }
    }
}

/// Case-insensitive substring classification of a reader-reported type
/// string (e.g. an ATR-derived descriptor or a PC/SC card name) into a
/// `TagFamily`, then into its `Capabilities` record.
pub fn infer_tag_capabilities(type_string: &str) -> Capabilities {
    let s = type_string.to_ascii_lowercase();

    let family = if s.contains("desfire") {
        TagFamily::Desfire
    } else if s.contains("4a") || s.contains("type4") || s.contains("type 4") || s.contains("iso14443-4") {
        TagFamily::Type4
    } else if s.contains("ntag216") {
        TagFamily::Ntag216
    } else if s.contains("ntag215") {
        TagFamily::Ntag215
    } else if s.contains("ntag213") {
        TagFamily::Ntag213
    } else if s.contains("ultralight c") || s.contains("ultralightc") || s.contains("mf0ul1") {
        TagFamily::UltralightC
    } else if s.contains("ultralight") || s.contains("ul-c") || s.contains("mf0ul") {
        TagFamily::Ultralight
    } else if s.contains("4k") || s.contains("classic 4k") || s.contains("mifare 4k") {
        TagFamily::Classic4K
    } else if s.contains("1k") || s.contains("classic") || s.contains("mifare") {
        TagFamily::Classic1K
    } else if s.contains("proxied") || s.contains("mobile") || s.contains("smartphone") {
        TagFamily::ProxiedMobile
    } else {
        TagFamily::Unknown
    };

    Capabilities::for_family(family)
}

/// Optional trait a `Device` (or its transport) may implement to expose
/// what kind of reader it is.
pub trait DeviceInfoProvider {
    fn device_type(&self) -> &str;
    fn supported_tag_types(&self) -> Vec<TagFamily>;
}

/// Event-driven virtual readers (mobile proxies) implement this instead
/// of being polled; when `supports_events()` is true, reader-level
/// capabilities are overridden to `can_poll=false, can_transceive=false`.
pub trait DeviceEventEmitter {
    fn supports_events(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub can_poll: bool,
    pub can_transceive: bool,
    pub supports_events: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            can_poll: true,
            can_transceive: true,
            supports_events: false,
        }
    }
}

/// Build device-level capabilities from whatever optional traits the
/// concrete device/transport implements.
pub fn infer_device_capabilities(emitter: Option<&dyn DeviceEventEmitter>) -> DeviceCapabilities {
    match emitter {
        Some(e) if e.supports_events() => DeviceCapabilities {
            can_poll: false,
            can_transceive: false,
            supports_events: true,
        },
        _ => DeviceCapabilities::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_families() {
        let cases = [
            ("MIFARE Classic 1K", TagFamily::Classic1K),
            ("MIFARE Classic 4K", TagFamily::Classic4K),
            ("NTAG213", TagFamily::Ntag213),
            ("NTAG215", TagFamily::Ntag215),
            ("NTAG216", TagFamily::Ntag216),
            ("MIFARE Ultralight C", TagFamily::UltralightC),
            ("MIFARE Ultralight", TagFamily::Ultralight),
            ("some DESFire EV1", TagFamily::Desfire),
            ("ISO14443-4 Type4 tag", TagFamily::Type4),
            ("totally unknown card", TagFamily::Unknown),
        ];
        for (input, expected) in cases {
            let caps = infer_tag_capabilities(input);
            assert_eq!(caps.family, expected, "input={input}");
        }
    }

    #[test]
    fn memory_figures_match_known_family_constants() {
        assert_eq!(TagFamily::Classic1K.memory_size(), Some(1024));
        assert_eq!(TagFamily::Classic1K.max_ndef_size(), Some(716));
        assert_eq!(TagFamily::Classic4K.memory_size(), Some(4096));
        assert_eq!(TagFamily::Classic4K.max_ndef_size(), Some(3356));
        assert_eq!(TagFamily::Ultralight.memory_size(), Some(64));
        assert_eq!(TagFamily::Ultralight.max_ndef_size(), Some(46));
        assert_eq!(TagFamily::UltralightC.memory_size(), Some(192));
        assert_eq!(TagFamily::UltralightC.max_ndef_size(), Some(137));
        assert_eq!(TagFamily::Ntag213.max_ndef_size(), Some(144));
        assert_eq!(TagFamily::Ntag215.max_ndef_size(), Some(504));
        assert_eq!(TagFamily::Ntag216.max_ndef_size(), Some(888));
    }

    #[test]
    fn event_emitter_overrides_device_capabilities() {
        struct AlwaysEvents;
        impl DeviceEventEmitter for AlwaysEvents {
            fn supports_events(&self) -> bool {
                true
            }
        }
        let caps = infer_device_capabilities(Some(&AlwaysEvents));
        assert!(!caps.can_poll);
        assert!(!caps.can_transceive);
        assert!(caps.supports_events);
    }

    #[test]
    fn default_device_capabilities_allow_polling() {
        let caps = infer_device_capabilities(None);
        assert!(caps.can_poll);
        assert!(caps.can_transceive);
        assert!(!caps.supports_events);
    }
}
