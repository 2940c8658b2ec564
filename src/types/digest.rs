// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! 32-byte BLAKE3 digests, serialized as lowercase hex.

use crate::error::{KernelError, KernelResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DIGEST_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// `prevHash` of the first block.
    pub const SENTINEL: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn of(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> KernelResult<Self> {
        // Uppercase would decode fine but would not match the canonical form.
        if s.len() != DIGEST_LEN * 2 || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(KernelError::InvalidDigest(s.to_string()));
        }
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|_| KernelError::InvalidDigest(s.to_string()))?;
        Ok(Digest(out))
    }

    /// First 12 hex characters, for log lines and tables.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(12);
        s
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl core::fmt::Debug for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl core::fmt::Display for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl core::str::FromStr for Digest {
    type Err = KernelError;

    fn from_str(s: &str) -> KernelResult<Self> {
        Digest::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_64_zeros() {
        assert_eq!(Digest::SENTINEL.to_hex(), "0".repeat(64));
        assert!(Digest::SENTINEL.is_sentinel());
    }

    #[test]
    fn test_hex_rejects_uppercase_and_bad_length() {
        let d = Digest::of(b"weights");
        let upper = d.to_hex().to_uppercase();
        assert!(Digest::from_hex(&upper).is_err());
        assert!(Digest::from_hex("abcd").is_err());
        assert_eq!(Digest::from_hex(&d.to_hex()).unwrap(), d);
    }
}
