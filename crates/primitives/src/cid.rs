#[cfg(test)]
#[path = "tests/cid.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
use thiserror::Error;

/// Multihash code for sha2-256.
pub const SHA2_256_CODE: u8 = 0x12;

/// Digest length byte for sha2-256.
pub const SHA2_256_LEN: u8 = 0x20;

const DIGEST_LEN: usize = 32;

/// Length of the binary form: hash code, digest length, digest.
pub const CID_LEN: usize = DIGEST_LEN + 2;

/// A self-describing reference to an immutable block.
///
/// The binary form is a sha2-256 multihash; the canonical string form is the
/// base58btc encoding of the binary form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct ContentId {
    digest: [u8; DIGEST_LEN],
}

impl ContentId {
    /// Identifier of a block with the given bytes.
    #[must_use]
    pub fn for_block(data: &[u8]) -> Self {
        Self {
            digest: sha2::Sha256::digest(data).into(),
        }
    }

    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; CID_LEN] {
        let mut bytes = [0; CID_LEN];
        bytes[0] = SHA2_256_CODE;
        bytes[1] = SHA2_256_LEN;
        bytes[2..].copy_from_slice(&self.digest);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let [code, len, digest @ ..] = bytes else {
            return Err(Error::InvalidLength);
        };

        if *code != SHA2_256_CODE {
            return Err(Error::UnsupportedHash(*code));
        }

        if *len != SHA2_256_LEN || digest.len() != DIGEST_LEN {
            return Err(Error::InvalidLength);
        }

        let mut out = [0; DIGEST_LEN];
        out.copy_from_slice(digest);

        Ok(Self { digest: out })
    }

    /// Whether the given bytes hash to this identifier.
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::for_block(data) == *self
    }
}

impl From<[u8; DIGEST_LEN]> for ContentId {
    fn from(digest: [u8; DIGEST_LEN]) -> Self {
        Self { digest }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&bs58::encode(self.to_bytes()).into_string())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentId").field(&self.to_string()).finish()
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid content id length")]
    InvalidLength,

    #[error("unsupported multihash code {0:#04x}")]
    UnsupportedHash(u8),

    #[error("invalid base58")]
    DecodeError(#[from] bs58::decode::Error),
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; CID_LEN + 1];

        let len = bs58::decode(s).onto(&mut bytes[..])?;

        Self::from_bytes(&bytes[..len])
    }
}

impl serde::Serialize for ContentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ContentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContentIdVisitor;

        impl serde::de::Visitor<'_> for ContentIdVisitor {
            type Value = ContentId;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a base58 encoded content id")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ContentIdVisitor)
    }
}
