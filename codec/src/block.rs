//! Split a full Bitcoin block into content-addressed blocks.

use crate::{
    header::Header,
    tx,
    witness_commitment::{declares_segwit, derive_and_verify},
    Codec, Encoded, Error,
};
use bitcoin::consensus::encode as wire;
use commonware_codec::Encode;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Decode a full block, rejecting any bytes past its end.
pub fn deserialize(bytes: &[u8]) -> Result<bitcoin::Block, Error> {
    let (block, consumed) = wire::deserialize_partial::<bitcoin::Block>(bytes)?;
    if consumed < bytes.len() {
        return Err(Error::TrailingBytes(bytes.len() - consumed));
    }
    Ok(block)
}

/// Serialize a full block (with witness data).
pub fn serialize(block: &bitcoin::Block) -> Vec<u8> {
    wire::serialize(block)
}

/// Emit every block needed to reassemble `block`.
///
/// The header comes first, followed by the transaction tree (leaves, then interior nodes). If
/// the coinbase carries witness data, the witness tree and the verified witness commitment
/// follow. Each identifier is emitted once: transactions without witness data share their
/// identifier across both trees.
pub fn encode(block: &bitcoin::Block) -> Result<Vec<Encoded>, Error> {
    let coinbase = block.txdata.first().ok_or(Error::EmptyBlock)?;
    let header = Header::new(block.header);

    let mut emitted = HashSet::new();
    let mut blocks = Vec::new();
    let mut push = |encoded: Encoded| -> bool {
        if emitted.insert(encoded.cid) {
            blocks.push(encoded);
            return true;
        }
        false
    };
    push(Encoded::new(Codec::Header, header.encode().freeze()));

    let transactions = tx::encode_all_no_witness(&block.txdata);
    if transactions.root() != Some(header.tx) {
        warn!(
            block = %header.cid(),
            "transaction tree root does not match header"
        );
    }
    let mut tx_blocks = 0;
    for encoded in transactions.into_blocks() {
        if push(encoded) {
            tx_blocks += 1;
        }
    }

    let mut witness_blocks = 0;
    let mut commitment = false;
    if declares_segwit(coinbase) {
        let witnesses = tx::encode_all(&block.txdata);
        let root = witnesses.root();
        if root.is_none() && block.txdata.len() > 1 {
            return Err(Error::MissingWitnessMerkleRoot);
        }
        for encoded in witnesses.into_blocks() {
            if push(encoded) {
                witness_blocks += 1;
            }
        }
        if let Some(encoded) = derive_and_verify(&block.txdata, root.map(|cid| cid.digest()))? {
            commitment = push(encoded);
        }
    }
    debug!(
        block = %header.cid(),
        txs = block.txdata.len(),
        tx_blocks,
        witness_blocks,
        commitment,
        "encoded block"
    );
    Ok(blocks)
}
