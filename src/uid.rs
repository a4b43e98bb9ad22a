//! UID canonicalisation.
//!
//! Every UID is stored and compared as uppercase hex with no separators.
//! Mobile-proxy input additionally tolerates `:`, `-`, and space as
//! separators.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(String);

impl Uid {
    /// Build a canonical UID from raw tag bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Uid(hex::encode_upper(bytes))
    }

    /// Parse a UID that is already plain hex (no separators) — the
    /// internal form used by every non-proxied family.
    pub fn from_hex(s: &str) -> Self {
        Uid(s.to_ascii_uppercase())
    }

    /// Parse a UID in any of the mobile-proxy-tolerant forms:
    /// `AB:CD:EF`, `ABCDEF`, `AB-CD-EF`, `AB CD EF`.
    pub fn parse_lenient(s: &str) -> Self {
        let cleaned: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();
        Uid(cleaned.to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uid> for String {
    fn from(u: Uid) -> String {
        u.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parse_strips_separators() {
        let forms = ["04:AB:CD:EF", "04ABCDEF", "04-AB-CD-EF", "04 AB CD EF"];
        for f in forms {
            assert_eq!(Uid::parse_lenient(f).as_str(), "04ABCDEF");
        }
    }

    #[test]
    fn from_bytes_is_uppercase_hex() {
        assert_eq!(Uid::from_bytes(&[0x04, 0xab]).as_str(), "04AB");
    }

    #[test]
    fn equality_is_on_canonical_form() {
        assert_eq!(Uid::parse_lenient("ab:cd"), Uid::from_hex("ABCD"));
    }
}
