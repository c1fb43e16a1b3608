//! Encode Bitcoin blocks as content-addressed, hash-linked binary blocks.
//!
//! # Overview
//!
//! A Bitcoin block is split into three kinds of addressable blocks, each identified by a [Cid]
//! that carries the double-SHA-256 digest of its bytes:
//!
//! - [header::Header]: the 80-byte block header. Its identifier is the block hash.
//! - [tx::Node]: either a full transaction or a 64-byte interior merkle node. Leaf identifiers
//!   are transaction ids (or witness transaction ids), interior identifiers are the merkle hashes
//!   Bitcoin already computes.
//! - [witness_commitment::WitnessCommitment]: the 64-byte pair `(witness merkle root, nonce)`
//!   whose hash a segwit coinbase commits to.
//!
//! Because every identifier is a hash Bitcoin itself uses, a block hash or transaction id can be
//! turned into a [Cid] with [cid::block_hash_to_cid] or [cid::tx_hash_to_cid] and looked up
//! directly.
//!
//! # Example
//!
//! ```
//! use bitcoin::{constants::genesis_block, Network};
//! use ipld_bitcoin_codec::{block, cid::cid_to_hash, Codec};
//!
//! let genesis = genesis_block(Network::Bitcoin);
//! let encoded = block::encode(&genesis).unwrap();
//!
//! // The header comes first, followed by the lone coinbase
//! assert_eq!(encoded.len(), 2);
//! assert_eq!(encoded[0].cid.codec(), Codec::Header);
//! assert_eq!(
//!     cid_to_hash(&encoded[0].cid),
//!     "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
//! );
//! ```

use bytes::Bytes;

pub mod block;
pub mod cid;
pub mod error;
pub mod header;
pub mod tx;
pub mod witness_commitment;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use cid::{Cid, Codec};
pub use error::Error;

/// A single addressable block: an identifier and the bytes it hashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub cid: Cid,
    pub bytes: Bytes,
}

impl Encoded {
    /// Hash `bytes` and tag the result with `codec`.
    pub fn new(codec: Codec, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let cid = Cid::for_bytes(codec, &bytes);
        Self { cid, bytes }
    }
}
