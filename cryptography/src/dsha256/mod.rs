//! Double-SHA-256 implementation of the `Hasher` trait.
//!
//! Bitcoin names headers and transactions by `SHA-256(SHA-256(bytes))` and so do the
//! content identifiers built on top of this crate. Digests are kept in the byte order the
//! hash function produces them (what Bitcoin calls "internal" or little-endian order); the
//! familiar big-endian hex identifiers are the same bytes reversed (see [Digest::to_hash_hex]).
//!
//! # Example
//! ```rust
//! use ipld_bitcoin_cryptography::{Hasher, DblSha256};
//!
//! let mut hasher = DblSha256::new();
//! hasher.update(b"hello,");
//! hasher.update(b"world!");
//! let digest = hasher.finalize();
//! println!("digest: {}", digest);
//! ```

use crate::{Error, Hasher};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use sha2::{Digest as _, Sha256 as ISha256};
use std::{
    fmt::{Debug, Display},
    ops::Deref,
};

/// Length of a double-SHA-256 digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Generate a double-SHA-256 digest from a message.
pub fn hash(message: &[u8]) -> Digest {
    let mut hasher = DblSha256::new();
    hasher.update(message);
    hasher.finalize()
}

/// Double-SHA-256 hasher.
#[derive(Debug)]
pub struct DblSha256 {
    hasher: ISha256,
}

impl Default for DblSha256 {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DblSha256 {
    fn clone(&self) -> Self {
        // We manually implement `Clone` to avoid cloning the hasher state.
        Self::default()
    }
}

impl Hasher for DblSha256 {
    type Digest = Digest;

    fn new() -> Self {
        Self {
            hasher: ISha256::new(),
        }
    }

    fn update(&mut self, message: &[u8]) {
        self.hasher.update(message);
    }

    fn finalize(&mut self) -> Self::Digest {
        let first = self.hasher.finalize_reset();
        let array: [u8; DIGEST_LENGTH] = ISha256::digest(first).into();
        Self::Digest::from(array)
    }

    fn reset(&mut self) {
        self.hasher = ISha256::new();
    }
}

/// Digest of a double-SHA-256 hashing operation.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// The all-zero digest.
    ///
    /// Used as the stand-in for the coinbase in the witness merkle tree and to encode an
    /// absent link in fixed-width layouts.
    pub const ZERO: Self = Self([0u8; DIGEST_LENGTH]);

    /// Returns true if every byte of the digest is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LENGTH]
    }

    /// Returns the raw digest bytes.
    pub fn to_bytes(self) -> [u8; DIGEST_LENGTH] {
        self.0
    }

    /// Parse a hex string into a digest.
    ///
    /// When `reverse` is set the decoded bytes are reversed, converting a conventional
    /// big-endian Bitcoin identifier into internal byte order.
    pub fn from_hash_hex(value: &str, reverse: bool) -> Result<Self, Error> {
        let mut bytes =
            hex::decode(value).map_err(|_| Error::InvalidDigestLength(value.len() / 2))?;
        if reverse {
            bytes.reverse();
        }
        Self::try_from(bytes)
    }

    /// Render the digest as a big-endian hex string (the inverse of
    /// [Digest::from_hash_hex] with `reverse` set).
    pub fn to_hash_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }
}

impl Write for Digest {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Digest {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(<[u8; DIGEST_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for Digest {
    const SIZE: usize = DIGEST_LENGTH;
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; DIGEST_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidDigestLength(value.len()))?;
        Ok(Self(array))
    }
}

impl TryFrom<Vec<u8>> for Digest {
    type Error = Error;
    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
