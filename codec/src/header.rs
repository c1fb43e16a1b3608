//! Codec for the 80-byte Bitcoin block header.
//!
//! The wire form is exactly the consensus encoding of the header. Decoding additionally derives
//! two links from the header's own hash fields: `parent` (the previous block, absent for the
//! genesis block) and `tx` (the root of the transaction merkle tree). Neither link is part of the
//! wire bytes; encoding ignores them.

use crate::{Cid, Codec};
use bitcoin::{consensus::encode, hashes::Hash as _};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use ipld_bitcoin_cryptography::dsha256::Digest;

/// Length of a serialized block header.
pub const HEADER_LENGTH: usize = 80;

/// A block header decorated with the links derived from its hash fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// The raw header as understood by the wire codec.
    pub header: bitcoin::block::Header,
    /// Link to the previous block's header, `None` for the genesis block.
    pub parent: Option<Cid>,
    /// Link to the root of the transaction merkle tree.
    pub tx: Cid,
}

impl Header {
    /// Derive the `parent` and `tx` links of a raw header.
    ///
    /// The `tx` link is trusted from the header's merkle root field and is not checked
    /// against any transactions.
    pub fn new(header: bitcoin::block::Header) -> Self {
        let previous = Digest::from(header.prev_blockhash.to_byte_array());
        let parent = (!previous.is_zero()).then(|| Cid::new(Codec::Header, previous));
        let tx = Cid::new(
            Codec::Transaction,
            Digest::from(header.merkle_root.to_byte_array()),
        );
        Self { header, parent, tx }
    }

    /// The identifier of this header (its block hash).
    pub fn cid(&self) -> Cid {
        Cid::for_bytes(Codec::Header, &self.encode())
    }

    /// The header timestamp.
    pub fn time(&self) -> u32 {
        self.header.time
    }

    /// The merkle root as a big-endian hex string.
    pub fn merkle_root_hex(&self) -> String {
        self.tx.to_hash_hex()
    }
}

impl From<bitcoin::block::Header> for Header {
    fn from(header: bitcoin::block::Header) -> Self {
        Self::new(header)
    }
}

impl Write for Header {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&encode::serialize(&self.header));
    }
}

impl Read for Header {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; HEADER_LENGTH]>::read(buf)?;
        let header: bitcoin::block::Header = encode::deserialize(&raw)
            .map_err(|_| CodecError::Invalid("Header", "malformed header"))?;
        Ok(Self::new(header))
    }
}

impl FixedSize for Header {
    const SIZE: usize = HEADER_LENGTH;
}
