//! Codec for the nodes of a block's transaction tree.
//!
//! A node is either a full transaction (the leaves) or a 64-byte [MerkleNode] (everything
//! above them). Both are addressed with [Codec::Transaction], so a loader cannot tell them apart
//! by identifier: [Node::decode] recovers the variant from the bytes alone.
//!
//! # Disambiguation
//!
//! A transaction with no inputs or no outputs can serialize to exactly 64 bytes, the length of a
//! merkle node. Decoding therefore applies a heuristic:
//!
//! - Buffers that are not 64 bytes, or whose first 32 bytes are not all zero, are first decoded
//!   as a transaction.
//! - A 64-byte buffer that decodes as a transaction without inputs or without outputs is treated
//!   as a merkle node instead.
//! - Any other 64-byte buffer that fails to decode as a transaction is a merkle node. Failures on
//!   buffers of other lengths are returned as [Error::Wire].
//!
//! This is a heuristic, not a guarantee.

use crate::{witness_commitment::commitment_in, Cid, Codec, Encoded, Error};
use bitcoin::{consensus::encode as wire, hashes::Hash as _, Witness};
use bytes::Bytes;
use commonware_codec::{DecodeExt, Encode};
use ipld_bitcoin_cryptography::dsha256::{Digest, DIGEST_LENGTH};
use tracing::debug;

pub mod merkle;
pub use merkle::{Builder, Kind, MerkleNode, Tree, MERKLE_NODE_LENGTH};

/// Serialize a transaction with its witness data (if any).
pub fn encode(tx: &bitcoin::Transaction) -> Vec<u8> {
    wire::serialize(tx)
}

/// Serialize a transaction as if it carried no witness data.
pub fn encode_no_witness(tx: &bitcoin::Transaction) -> Vec<u8> {
    if tx.input.iter().all(|input| input.witness.is_empty()) {
        return wire::serialize(tx);
    }
    let mut stripped = tx.clone();
    for input in stripped.input.iter_mut() {
        input.witness = Witness::new();
    }
    wire::serialize(&stripped)
}

/// Build the witness tree of a block's ordered transactions.
pub fn encode_all(txs: &[bitcoin::Transaction]) -> Tree {
    build(Kind::Witnesses, txs)
}

/// Build the transaction tree (the one the header commits to) of a block's ordered transactions.
pub fn encode_all_no_witness(txs: &[bitcoin::Transaction]) -> Tree {
    build(Kind::Transactions, txs)
}

fn build(kind: Kind, txs: &[bitcoin::Transaction]) -> Tree {
    let mut builder = Builder::new(kind, txs.len());
    for tx in txs {
        builder.add(tx);
    }
    builder.build()
}

/// A decoded transaction decorated with the links derived from its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The raw transaction as understood by the wire codec.
    pub tx: bitcoin::Transaction,
    /// For each input, a link to the transaction it spends (`None` for the coinbase input).
    pub inputs: Vec<Option<Cid>>,
    /// For a coinbase, a link to the witness commitment block its outputs advertise.
    ///
    /// This is derived from an output script pattern and can match pre-segwit coinbases, so it
    /// is provisional until the referenced block is loaded.
    pub witness_commitment: Option<Cid>,
}

impl Transaction {
    /// Derive the links of a raw transaction.
    pub fn new(tx: bitcoin::Transaction) -> Self {
        let inputs = tx
            .input
            .iter()
            .map(|input| {
                (!input.previous_output.is_null()).then(|| {
                    let digest = Digest::from(input.previous_output.txid.to_byte_array());
                    Cid::new(Codec::Transaction, digest)
                })
            })
            .collect();
        let witness_commitment = if tx.is_coinbase() {
            commitment_in(&tx).map(|digest| Cid::new(Codec::WitnessCommitment, digest))
        } else {
            None
        };
        Self {
            tx,
            inputs,
            witness_commitment,
        }
    }

    /// Serialize with witness data.
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.tx)
    }

    /// Serialize without witness data.
    pub fn encode_no_witness(&self) -> Vec<u8> {
        encode_no_witness(&self.tx)
    }

    /// The identifier of the transaction in the transaction tree (its txid).
    pub fn cid(&self) -> Cid {
        Cid::new(
            Codec::Transaction,
            Digest::from(self.tx.compute_txid().to_byte_array()),
        )
    }

    /// The identifier of the transaction in the witness tree (its wtxid).
    pub fn witness_cid(&self) -> Cid {
        Cid::new(
            Codec::Transaction,
            Digest::from(self.tx.compute_wtxid().to_byte_array()),
        )
    }
}

impl From<bitcoin::Transaction> for Transaction {
    fn from(tx: bitcoin::Transaction) -> Self {
        Self::new(tx)
    }
}

/// A node of a transaction tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Transaction(Transaction),
    Merkle(MerkleNode),
}

impl Node {
    /// Decode a transaction tree node (see the module documentation for the heuristic).
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let node_sized = bytes.len() == MERKLE_NODE_LENGTH;
        if !node_sized || bytes[..DIGEST_LENGTH].iter().any(|b| *b != 0) {
            match wire::deserialize::<bitcoin::Transaction>(bytes) {
                Ok(tx) if node_sized && (tx.input.is_empty() || tx.output.is_empty()) => {
                    debug!(
                        inputs = tx.input.len(),
                        outputs = tx.output.len(),
                        "treating 64-byte transaction as merkle node"
                    );
                }
                Ok(tx) => return Ok(Self::Transaction(Transaction::new(tx))),
                Err(err) if !node_sized => return Err(err.into()),
                Err(_) => {}
            }
        }
        Ok(Self::Merkle(MerkleNode::decode(bytes)?))
    }

    /// Serialize the node. Transactions keep whatever witness data they carry.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Transaction(tx) => Bytes::from(tx.encode()),
            Self::Merkle(node) => node.encode().freeze(),
        }
    }

    /// Serialize and name the node.
    pub fn to_encoded(&self) -> Encoded {
        Encoded::new(Codec::Transaction, self.encode())
    }

    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(tx) => Some(tx),
            Self::Merkle(_) => None,
        }
    }

    pub fn as_merkle(&self) -> Option<&MerkleNode> {
        match self {
            Self::Merkle(node) => Some(node),
            Self::Transaction(_) => None,
        }
    }
}
