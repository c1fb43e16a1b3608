//! Bitcoin's binary merkle tree over transactions, emitted as content-addressed blocks.
//!
//! Leaves are transactions and every interior node is a 64-byte [MerkleNode] naming its two
//! children. When a layer has an odd number of nodes, the last node is paired with itself.
//!
//! The witness variant of the tree replaces the coinbase leaf with an all-zero placeholder
//! that is never emitted; interior nodes referencing it carry no left link.

use super::{encode, encode_no_witness};
use crate::{Cid, Codec, Encoded, Error};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use ipld_bitcoin_cryptography::{
    dsha256::{Digest, DIGEST_LENGTH},
    DblSha256, Hasher,
};
use std::collections::HashSet;

/// Length of a serialized [MerkleNode].
pub const MERKLE_NODE_LENGTH: usize = 2 * DIGEST_LENGTH;

/// An interior node of a transaction merkle tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MerkleNode {
    left: Option<Cid>,
    right: Cid,
}

impl MerkleNode {
    /// Create a node from two child links.
    ///
    /// Both children must be transaction tree links.
    pub fn new(left: Option<Cid>, right: Cid) -> Result<Self, Error> {
        let valid = |cid: &Cid| cid.codec() == Codec::Transaction;
        if !valid(&right) || !left.as_ref().map_or(true, valid) {
            return Err(Error::TypeMismatch("merkle node child must be a transaction link"));
        }
        Ok(Self { left, right })
    }

    /// Create a node from two child digests. An all-zero `left` is the witness tree's coinbase
    /// placeholder and yields no left link.
    pub fn from_digests(left: Digest, right: Digest) -> Self {
        Self {
            left: (!left.is_zero()).then_some(Cid::new(Codec::Transaction, left)),
            right: Cid::new(Codec::Transaction, right),
        }
    }

    /// Link to the left child, `None` for the witness tree's coinbase placeholder.
    pub fn left(&self) -> Option<Cid> {
        self.left
    }

    /// Link to the right child (which equals the left child when it was duplicated).
    pub fn right(&self) -> Cid {
        self.right
    }

    /// The identifier of this node (the merkle hash of its children).
    pub fn cid(&self) -> Cid {
        Cid::for_bytes(Codec::Transaction, &self.encode())
    }
}

impl Write for MerkleNode {
    fn write(&self, buf: &mut impl BufMut) {
        self.left.map_or(Digest::ZERO, |cid| cid.digest()).write(buf);
        self.right.digest().write(buf);
    }
}

impl Read for MerkleNode {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let left = Digest::read(buf)?;
        let right = Digest::read(buf)?;
        Ok(Self::from_digests(left, right))
    }
}

impl FixedSize for MerkleNode {
    const SIZE: usize = MERKLE_NODE_LENGTH;
}

/// Which transaction encoding the leaves of a tree hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Leaves are transactions without witness data (the header's merkle root).
    Transactions,
    /// Leaves are transactions with witness data and the coinbase is replaced by a placeholder
    /// (the root committed to by the coinbase).
    Witnesses,
}

/// A constructed tree: every emitted block (leaves first, then interior nodes layer by layer)
/// and the root.
#[derive(Clone, Debug)]
pub struct Tree {
    blocks: Vec<Encoded>,
    root: Option<Cid>,
}

impl Tree {
    /// The root of the tree, `None` when the tree is empty or consists only of the witness
    /// placeholder.
    pub fn root(&self) -> Option<Cid> {
        self.root
    }

    /// Emitted blocks, each identifier at most once.
    pub fn blocks(&self) -> &[Encoded] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Encoded> {
        self.blocks
    }
}

/// Builder for a [Tree] over the ordered transactions of a block.
pub struct Builder {
    kind: Kind,
    hasher: DblSha256,
    leaves: Vec<Digest>,
    blocks: Vec<Encoded>,
    emitted: HashSet<Cid>,
}

impl Builder {
    /// Creates a new builder expecting `capacity` transactions.
    pub fn new(kind: Kind, capacity: usize) -> Self {
        Self {
            kind,
            hasher: DblSha256::new(),
            leaves: Vec::with_capacity(capacity),
            blocks: Vec::with_capacity(2 * capacity),
            emitted: HashSet::with_capacity(2 * capacity),
        }
    }

    /// Adds the next transaction to the tree, returning its leaf position.
    pub fn add(&mut self, tx: &bitcoin::Transaction) -> usize {
        let position = self.leaves.len();
        if self.kind == Kind::Witnesses && position == 0 {
            self.leaves.push(Digest::ZERO);
            return position;
        }
        let bytes = match self.kind {
            Kind::Transactions => encode_no_witness(tx),
            Kind::Witnesses => encode(tx),
        };
        let block = Encoded::new(Codec::Transaction, bytes);
        self.leaves.push(block.cid.digest());
        self.emit(block);
        position
    }

    fn emit(&mut self, block: Encoded) {
        if self.emitted.insert(block.cid) {
            self.blocks.push(block);
        }
    }

    /// Hash the tree layer by layer and return every emitted block with the root.
    pub fn build(mut self) -> Tree {
        let mut layer = std::mem::take(&mut self.leaves);
        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            for pair in layer.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                self.hasher.update(&left);
                self.hasher.update(&right);
                let digest = self.hasher.finalize();
                next.push(digest);
                self.emit(Encoded {
                    cid: Cid::new(Codec::Transaction, digest),
                    bytes: MerkleNode::from_digests(left, right).encode().freeze(),
                });
            }
            layer = next;
        }
        let root = layer
            .pop()
            .filter(|digest| !digest.is_zero())
            .map(|digest| Cid::new(Codec::Transaction, digest));
        Tree {
            blocks: self.blocks,
            root,
        }
    }
}
