//! Codec for the 64-byte witness commitment block of a segwit block.
//!
//! A segwit coinbase commits to `dsha256(witness merkle root || nonce)` in one of its outputs and
//! carries the nonce as the sole element of its input witness. The witness commitment block is
//! exactly the preimage of that hash, so its identifier is the committed value.

use crate::{Cid, Codec, Encoded, Error};
use bitcoin::Witness;
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use ipld_bitcoin_cryptography::dsha256::{Digest, DIGEST_LENGTH};

/// Length of a serialized [WitnessCommitment].
pub const WITNESS_COMMITMENT_LENGTH: usize = 2 * DIGEST_LENGTH;

/// Prefix of a commitment output script: `OP_RETURN`, a 36-byte push and the commitment header.
pub const WITNESS_COMMITMENT_MARKER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// The preimage of a coinbase's witness commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WitnessCommitment {
    witness_merkle_root: Option<Cid>,
    nonce: [u8; DIGEST_LENGTH],
}

impl WitnessCommitment {
    /// Create a commitment. A `None` root stands for a block containing only a coinbase.
    pub fn new(
        witness_merkle_root: Option<Cid>,
        nonce: [u8; DIGEST_LENGTH],
    ) -> Result<Self, Error> {
        if let Some(root) = witness_merkle_root {
            if root.codec() != Codec::Transaction {
                return Err(Error::TypeMismatch(
                    "witness merkle root must be a transaction link",
                ));
            }
        }
        Ok(Self {
            witness_merkle_root,
            nonce,
        })
    }

    /// Link to the root of the witness tree.
    pub fn witness_merkle_root(&self) -> Option<Cid> {
        self.witness_merkle_root
    }

    pub fn nonce(&self) -> [u8; DIGEST_LENGTH] {
        self.nonce
    }

    /// The identifier of this commitment (the value committed to by the coinbase).
    pub fn cid(&self) -> Cid {
        Cid::for_bytes(Codec::WitnessCommitment, &self.encode())
    }
}

impl Write for WitnessCommitment {
    fn write(&self, buf: &mut impl BufMut) {
        self.witness_merkle_root
            .map_or(Digest::ZERO, |cid| cid.digest())
            .write(buf);
        self.nonce.write(buf);
    }
}

impl Read for WitnessCommitment {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let root = Digest::read(buf)?;
        let nonce = <[u8; DIGEST_LENGTH]>::read(buf)?;
        let witness_merkle_root =
            (!root.is_zero()).then_some(Cid::new(Codec::Transaction, root));
        Ok(Self {
            witness_merkle_root,
            nonce,
        })
    }
}

impl FixedSize for WitnessCommitment {
    const SIZE: usize = WITNESS_COMMITMENT_LENGTH;
}

/// Extract the commitment advertised by a coinbase's outputs.
///
/// The last output whose script is a commitment is used. Any 38-byte script starting with
/// [WITNESS_COMMITMENT_MARKER] matches, including ones in coinbases that predate segwit.
pub fn commitment_in(coinbase: &bitcoin::Transaction) -> Option<Digest> {
    coinbase.output.iter().rev().find_map(|output| {
        let script = output.script_pubkey.as_bytes();
        let payload = script.strip_prefix(&WITNESS_COMMITMENT_MARKER[..])?;

        // Only a 32-byte payload (a 38-byte script) is a commitment
        Digest::try_from(payload).ok()
    })
}

/// Extract the nonce (witness reserved value) from a coinbase's input witness.
pub fn nonce_in(coinbase: &bitcoin::Transaction) -> Option<[u8; DIGEST_LENGTH]> {
    let element = coinbase.input.first()?.witness.iter().next()?;
    element.try_into().ok()
}

/// Returns true if the transaction carries witness data.
pub fn declares_segwit(tx: &bitcoin::Transaction) -> bool {
    tx.input.iter().any(|input| !input.witness.is_empty())
}

/// Return a copy of `coinbase` whose input witness is exactly `nonce`.
///
/// Coinbases are loaded from the transaction tree without witness data; re-injecting the nonce
/// restores the witness serialization (and therefore the wtxid) of the original.
pub fn inject_nonce(
    coinbase: &bitcoin::Transaction,
    nonce: [u8; DIGEST_LENGTH],
) -> bitcoin::Transaction {
    let mut patched = coinbase.clone();
    if let Some(input) = patched.input.first_mut() {
        let mut witness = Witness::new();
        witness.push(nonce);
        input.witness = witness;
    }
    patched
}

/// Recompute the witness commitment of a block and check it against the coinbase.
///
/// `witness_merkle_root` is the root of the block's witness tree (`None` for a block containing
/// only a coinbase). Returns `Ok(None)` if the coinbase carries no witness data.
pub fn derive_and_verify(
    txs: &[bitcoin::Transaction],
    witness_merkle_root: Option<Digest>,
) -> Result<Option<Encoded>, Error> {
    let coinbase = txs.first().ok_or(Error::EmptyBlock)?;
    if !coinbase.is_coinbase() {
        return Err(Error::MissingCoinbase);
    }
    if !declares_segwit(coinbase) {
        return Ok(None);
    }
    let expected = commitment_in(coinbase).ok_or(Error::MissingWitnessCommitment)?;
    let nonce = nonce_in(coinbase).ok_or(Error::MissingWitnessNonce)?;

    let root = witness_merkle_root
        .filter(|digest| !digest.is_zero())
        .map(|digest| Cid::new(Codec::Transaction, digest));
    let commitment = WitnessCommitment::new(root, nonce)?;
    let block = Encoded::new(Codec::WitnessCommitment, commitment.encode().freeze());
    let computed = block.cid.digest();
    if computed != expected {
        return Err(Error::WitnessCommitmentMismatch { expected, computed });
    }
    Ok(Some(block))
}
