//! Synthetic blocks for tests and benchmarks.
//!
//! Blocks are deterministic, have a valid transaction merkle root and, when built with a nonce,
//! a valid witness commitment. No proof-of-work or script validity is implied.
//!
//! [TESTNET4_BLOCK_140] is a real mined block for checks against bytes no builder here produced.

use crate::witness_commitment::WITNESS_COMMITMENT_MARKER;
use bitcoin::{
    absolute::LockTime,
    block::{Header, Version},
    hashes::Hash as _,
    transaction, Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
};
use ipld_bitcoin_cryptography::dsha256;

/// Testnet4 block 140 (`000000005545a55e72415fcd91d83bda15903e2fecc6d3f7392e2934ce340d3c`).
///
/// A segwit block mined after activation: its coinbase pays to a P2WPKH output, commits to an
/// empty witness tree and carries an all-zero witness nonce.
pub const TESTNET4_BLOCK_140: &str = concat!(
    "000000207663d3bb84157a1cbee9ad4d01c70230684325785ff32a26f6fde51e000000009db28139792c252ac8",
    "9807ba837cb9056edb3f9af877d547e8925274e2b3984327e53866ffff001d64a2ce0c01010000000001010000",
    "000000000000000000000000000000000000000000000000000000000000ffffffff0a028c00062f4077697a2f",
    "ffffffff0200f2052a01000000160014a54e2a1ec06389203887661535ed118b7d053889000000000000000026",
    "6a24aa21a9ede2f61c3f71d1defd3fa999dfa36953755c690689799962b48bebd836974e8cf901200000000000",
    "00000000000000000000000000000000000000000000000000000000000000",
);

/// A timestamp after segwit activated on mainnet.
pub const SEGWIT_TIME: u32 = 1_600_000_000;

/// A timestamp before segwit activated on mainnet.
pub const LEGACY_TIME: u32 = 1_400_000_000;

fn seeded(label: &str, seed: u64) -> [u8; 32] {
    let mut message = label.as_bytes().to_vec();
    message.extend_from_slice(&seed.to_le_bytes());
    dsha256::hash(&message).to_bytes()
}

/// A transaction spending a single pseudo-random output, with witness data if `segwit`.
pub fn transaction(seed: u64, segwit: bool) -> Transaction {
    let (script_sig, witness) = if segwit {
        let mut witness = Witness::new();
        let mut signature = seeded("signature", seed).to_vec();
        signature.extend_from_slice(&seeded("signature-tail", seed));
        witness.push(signature);
        let mut pubkey = vec![0x02];
        pubkey.extend_from_slice(&seeded("pubkey", seed));
        witness.push(pubkey);
        (ScriptBuf::new(), witness)
    } else {
        let mut script = vec![0x20];
        script.extend_from_slice(&seeded("script", seed));
        (ScriptBuf::from_bytes(script), Witness::new())
    };
    let mut script_pubkey = vec![0x00, 0x14];
    script_pubkey.extend_from_slice(&seeded("output", seed)[..20]);
    Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array(seeded("txid", seed)),
                vout: (seed % 4) as u32,
            },
            script_sig,
            sequence: Sequence::MAX,
            witness,
        }],
        output: vec![TxOut {
            value: Amount::from_sat(1_000 + seed),
            script_pubkey: ScriptBuf::from_bytes(script_pubkey),
        }],
    }
}

/// A coinbase for block `height`, committing to `commitment` if provided and carrying `nonce`
/// as its witness if provided.
pub fn coinbase(
    height: u32,
    nonce: Option<[u8; 32]>,
    commitment: Option<[u8; 32]>,
) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height.to_le_bytes());
    let mut witness = Witness::new();
    if let Some(nonce) = nonce {
        witness.push(nonce);
    }

    let mut reward = vec![0x76, 0xa9, 0x14];
    reward.extend_from_slice(&seeded("reward", height as u64)[..20]);
    reward.extend_from_slice(&[0x88, 0xac]);
    let mut output = vec![TxOut {
        value: Amount::from_sat(625_000_000),
        script_pubkey: ScriptBuf::from_bytes(reward),
    }];
    if let Some(commitment) = commitment {
        let mut script = WITNESS_COMMITMENT_MARKER.to_vec();
        script.extend_from_slice(&commitment);
        output.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::from_bytes(script),
        });
    }
    Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(script_sig),
            sequence: Sequence::MAX,
            witness,
        }],
        output,
    }
}

/// A block of `txs` transactions (including the coinbase) with the given header `time`.
///
/// If `nonce` is provided the block is a segwit block: every odd transaction carries witness
/// data and the coinbase commits to the witness root with `nonce`. Otherwise no transaction
/// carries witness data.
pub fn block(txs: usize, nonce: Option<[u8; 32]>, time: u32) -> Block {
    let height = txs as u32;
    let mut txdata = Vec::with_capacity(txs);
    txdata.push(coinbase(height, None, None));
    for i in 1..txs {
        let seed = ((height as u64) << 32) | i as u64;
        txdata.push(transaction(seed, nonce.is_some() && i % 2 == 1));
    }

    let header = Header {
        version: Version::from_consensus(0x2000_0000),
        prev_blockhash: BlockHash::from_byte_array(seeded("parent", height as u64)),
        merkle_root: TxMerkleNode::all_zeros(),
        time,
        bits: CompactTarget::from_consensus(0x1d00_ffff),
        nonce: height,
    };
    let mut block = Block { header, txdata };

    // The witness root ignores the coinbase, so it can be computed before the coinbase is final
    if let Some(nonce) = nonce {
        if let Some(root) = block.witness_root() {
            let commitment = Block::compute_witness_commitment(&root, &nonce);
            block.txdata[0] = coinbase(height, Some(nonce), Some(commitment.to_byte_array()));
        }
    }
    if let Some(root) = block.compute_merkle_root() {
        block.header.merkle_root = root;
    }
    block
}
