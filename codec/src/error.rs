//! Error types for codec operations

use commonware_codec::Error as CodecError;
use ipld_bitcoin_cryptography::dsha256::Digest;
use thiserror::Error;

/// Error type for codec operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("trailing bytes: {0}")]
    TrailingBytes(usize),
    #[error("type mismatch: {0}")]
    TypeMismatch(&'static str),
    #[error("invalid hash format: {0}")]
    InvalidHashFormat(String),
    #[error("invalid cid: {0}")]
    InvalidCid(&'static str),
    #[error("witness commitment mismatch: expected {expected}, computed {computed}")]
    WitnessCommitmentMismatch { expected: Digest, computed: Digest },
    #[error("missing witness merkle root")]
    MissingWitnessMerkleRoot,
    #[error("missing witness commitment")]
    MissingWitnessCommitment,
    #[error("missing witness nonce")]
    MissingWitnessNonce,
    #[error("first transaction is not a coinbase")]
    MissingCoinbase,
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("wire: {0}")]
    Wire(#[from] bitcoin::consensus::encode::Error),
}
