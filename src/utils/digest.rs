//! MD5 digest type and helpers.
//!
//! A [`Digest`] is the 16-byte MD5 of a plaintext. Textual form is 32 hex
//! characters; parsing is case-insensitive and formatting is always lowercase.

use crate::engine::{EngineError, Result};
use md5::{Digest as _, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an MD5 digest in bytes
pub const DIGEST_LEN: usize = 16;

/// Length of a hex-encoded MD5 digest
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// A 128-bit MD5 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Compute the digest of arbitrary bytes
    #[inline]
    pub fn of(bytes: &[u8]) -> Self {
        let out = Md5::digest(bytes);
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&out);
        Self(raw)
    }

    /// Parse the raw 16-byte binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| EngineError::MalformedDigest(format!("{} raw bytes", bytes.len())))?;
        Ok(Self(raw))
    }

    /// Parse the hex form. Case-insensitive, surrounding whitespace ignored.
    pub fn from_hex(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != DIGEST_HEX_LEN {
            return Err(EngineError::MalformedDigest(truncate_for_error(trimmed)));
        }

        let mut raw = [0u8; DIGEST_LEN];
        hex::decode_to_slice(trimmed, &mut raw)
            .map_err(|_| EngineError::MalformedDigest(truncate_for_error(trimmed)))?;
        Ok(Self(raw))
    }

    /// Cheap check used by the line parser before attempting a full decode
    pub fn looks_like_hex(token: &str) -> bool {
        token.len() == DIGEST_HEX_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Pick a shard for this digest. `shard_count` must be a power of two.
    ///
    /// MD5 output is uniformly distributed, so the leading bytes are a good
    /// enough shard key without rehashing.
    #[inline]
    pub fn shard(&self, shard_count: usize) -> usize {
        let lead = u16::from_be_bytes([self.0[0], self.0[1]]) as usize;
        lead & (shard_count - 1)
    }
}

/// Compute the MD5 digest of a byte string
#[inline]
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::of(bytes)
}

fn truncate_for_error(input: &str) -> String {
    // Keep error payloads bounded when clients send garbage
    input.chars().take(64).collect()
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(digest(b"").to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest(b"123456").to_hex(), "e10adc3949ba59abbe56e057f20f883e");
        assert_eq!(digest(b"password").to_hex(), "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(digest(b"hunter2").to_hex(), "2ab96390c7dbe3439de74d0c9b0b1767");
    }

    #[test]
    fn test_binary_input() {
        let bytes: Vec<u8> = (0..=255).collect();
        let a = digest(&bytes);
        let b = digest(&bytes);
        assert_eq!(a, b);
        assert_ne!(a, digest(&bytes[1..]));
    }

    #[test]
    fn test_hex_is_case_insensitive() {
        let lower = Digest::from_hex("e10adc3949ba59abbe56e057f20f883e").unwrap();
        let upper = Digest::from_hex("E10ADC3949BA59ABBE56E057F20F883E").unwrap();
        let padded = Digest::from_hex("  e10adc3949BA59abbe56e057f20f883e\n").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, padded);
        assert_eq!(upper.to_string(), "e10adc3949ba59abbe56e057f20f883e");
    }

    #[test]
    fn test_malformed_hex() {
        assert!(matches!(
            Digest::from_hex("e10adc39"),
            Err(EngineError::MalformedDigest(_))
        ));
        assert!(matches!(
            Digest::from_hex("zz0adc3949ba59abbe56e057f20f883e"),
            Err(EngineError::MalformedDigest(_))
        ));
        assert!(matches!(
            Digest::from_hex(""),
            Err(EngineError::MalformedDigest(_))
        ));
    }

    #[test]
    fn test_from_bytes() {
        let d = digest(b"letmein");
        assert_eq!(Digest::from_bytes(d.as_bytes()).unwrap(), d);
        assert!(Digest::from_bytes(&[0u8; 15]).is_err());
        assert!(Digest::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_looks_like_hex() {
        assert!(Digest::looks_like_hex("0d107d09f5bbe40cade3de5c71e9e9b7"));
        assert!(!Digest::looks_like_hex("0d107d09f5bbe40cade3de5c71e9e9b"));
        assert!(!Digest::looks_like_hex("0d107d09f5bbe40cade3de5c71e9e9bg"));
    }

    #[test]
    fn test_shard_in_range() {
        for word in ["a", "b", "password", "123456"] {
            assert!(digest(word.as_bytes()).shard(64) < 64);
        }
        assert_eq!(digest(b"x").shard(1), 0);
    }

    #[test]
    fn test_serde_as_hex() {
        let d = digest(b"123456");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"e10adc3949ba59abbe56e057f20f883e\"");
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<Digest>("\"nothex\"").is_err());
    }
}
