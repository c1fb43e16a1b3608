//! Reassemble Bitcoin blocks from content-addressed, hash-linked binary blocks.
//!
//! # Overview
//!
//! Given a [Loader] that can fetch the bytes named by a [Cid] and the identifier of a block
//! header, an [Assembler] walks the header's transaction tree (and, for segwit blocks, the
//! witness tree and witness commitment) and rebuilds a [bitcoin::Block] whose serialization is
//! identical to the one that was originally encoded.
//!
//! Only the blocks reachable from the header are fetched. Loading is sequential and each
//! identifier is fetched at most once per assembly.
//!
//! # Example
//!
//! ```
//! use bitcoin::{constants::genesis_block, Network};
//! use futures::executor::block_on;
//! use ipld_bitcoin_assembly::{Assembler, Config, Memory};
//! use ipld_bitcoin_codec::block;
//!
//! let genesis = genesis_block(Network::Bitcoin);
//! let blocks = block::encode(&genesis).unwrap();
//! let header = blocks[0].cid;
//!
//! let assembler = Assembler::new(blocks.into_iter().collect::<Memory>(), Config::default());
//! let assembled = block_on(assembler.assemble(&header)).unwrap();
//! assert_eq!(assembled.block, genesis);
//! ```

use bytes::Bytes;
use ipld_bitcoin_codec::Cid;
use std::future::Future;
use thiserror::Error;

mod assembler;
pub use assembler::{Assembled, Assembler};
mod memory;
pub use memory::Memory;

/// Segwit activation on mainnet (the timestamp of block 481824).
pub const SEGWIT_ACTIVATION_TIME: u32 = 1_503_539_857;

/// Errors that can occur when assembling a block.
#[derive(Error, Debug)]
pub enum Error {
    #[error("block not found: {0}")]
    BlockNotFound(Cid),
    #[error("digest mismatch: {0}")]
    DigestMismatch(Cid),
    #[error("missing witness merkle root")]
    MissingWitnessMerkleRoot,
    #[error("no coinbase under: {0}")]
    MissingCoinbase(Cid),
    #[error("codec error: {0}")]
    Codec(#[from] ipld_bitcoin_codec::Error),
    #[error("loader error: {0}")]
    Loader(Box<dyn std::error::Error + Send + Sync>),
}

/// A source of content-addressed blocks.
///
/// Any retry, timeout or backoff policy belongs to the implementation: the [Assembler] treats a
/// failed load as terminal.
pub trait Loader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the bytes named by `cid`, or `None` if they are not available.
    fn load(&self, cid: &Cid) -> impl Future<Output = Result<Option<Bytes>, Self::Error>>;
}

/// Configuration for an [Assembler].
#[derive(Clone, Debug)]
pub struct Config {
    /// Header timestamp at or after which a coinbase advertising a witness commitment marks a
    /// segwit block.
    pub segwit_activation_time: u32,

    /// Whether to hash every loaded block and reject it if the digest does not match the
    /// identifier it was requested with.
    pub verify_digests: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segwit_activation_time: SEGWIT_ACTIVATION_TIME,
            verify_digests: true,
        }
    }
}
