//! Hash the bytes of content-addressed Bitcoin blocks.
//!
//! Every block produced by this workspace (header, transaction, merkle node, witness commitment)
//! is named by the double-SHA-256 digest of its bytes. This crate provides that digest as a plain
//! 32-byte value type ([dsha256::Digest]) and a streaming [Hasher] to compute it.

use thiserror::Error;

pub mod dsha256;
pub use dsha256::{hash, DblSha256};

/// Errors that can occur when constructing a digest.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLength(usize),
}

/// Streaming hash interface.
///
/// Block identifiers and merkle nodes are computed through this trait.
///
/// This trait is required to implement the `Clone` trait because it is often
/// part of a struct that is cloned. Implementations do not clone the hasher state,
/// so callers should not rely on a cloned hasher carrying over previous updates.
pub trait Hasher: Clone + Send + Sync + 'static {
    /// Digest generated by the hasher.
    type Digest: Copy + Eq + AsRef<[u8]>;

    /// Create a new hasher.
    fn new() -> Self;

    /// Append message to previously recorded data.
    fn update(&mut self, message: &[u8]);

    /// Hash all recorded data and reset the hasher
    /// to the initial state.
    fn finalize(&mut self) -> Self::Digest;

    /// Reset the hasher without generating a hash.
    ///
    /// This function does not need to be called after `finalize`.
    fn reset(&mut self);
}
