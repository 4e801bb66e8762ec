//! Content fingerprints using FxHash.
//!
//! A fingerprint pairs a fast non-cryptographic 64-bit hash with the content
//! length. It only has to answer "did anything actually change", so collision
//! resistance beyond that is not needed. The hex form doubles as the bundle
//! `ETag` and as the dedupe key for push payloads.
//!
//! ```ignore
//! let fp = Fingerprint::of("console.log(1)");
//! assert_eq!(fp, Fingerprint::of("console.log(1)"));
//! ```

use rustc_hash::FxHasher;
use std::fmt;
use std::hash::Hasher;

/// Deterministic fingerprint of string content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    hash: u64,
    len: u64,
}

impl Fingerprint {
    /// Fingerprint arbitrary content.
    #[inline]
    pub fn of<T: AsRef<[u8]> + ?Sized>(content: &T) -> Self {
        let bytes = content.as_ref();
        let mut hasher = FxHasher::default();
        hasher.write(bytes);
        Self {
            hash: hasher.finish(),
            len: bytes.len() as u64,
        }
    }

    /// Content length in bytes.
    #[cfg(test)]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Check if the fingerprinted content was empty.
    #[cfg(test)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hex form: `<hash:16>-<len>`.
    pub fn to_hex(self) -> String {
        format!("{:016x}-{:x}", self.hash, self.len)
    }

    /// Parse the hex form produced by [`Fingerprint::to_hex`].
    #[cfg(test)]
    pub fn parse(s: &str) -> Option<Self> {
        let (hash, len) = s.trim().split_once('-')?;
        if hash.len() != 16 {
            return None;
        }
        Some(Self {
            hash: u64::from_str_radix(hash, 16).ok()?,
            len: u64::from_str_radix(len, 16).ok()?,
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough for log lines
        write!(f, "{:08x}", self.hash >> 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_fingerprint() {
        assert_eq!(Fingerprint::of("C1"), Fingerprint::of("C1"));
        assert_ne!(Fingerprint::of("C1"), Fingerprint::of("C2"));
    }

    #[test]
    fn test_length_is_part_of_identity() {
        let fp = Fingerprint::of("hello");
        assert_eq!(fp.len(), 5);
        assert!(Fingerprint::of("").is_empty());
    }

    #[test]
    fn test_hex_parse() {
        let fp = Fingerprint::of("console.log('hi')");
        let hex = fp.to_hex();
        assert_eq!(Fingerprint::parse(&hex), Some(fp));
        assert_eq!(Fingerprint::parse("not-a-fingerprint"), None);
        assert_eq!(Fingerprint::parse("abc"), None);
    }

    #[test]
    fn test_display_is_short() {
        let fp = Fingerprint::of("payload");
        assert_eq!(fp.to_string().len(), 8);
    }
}
