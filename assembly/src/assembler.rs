//! Rebuild a block by walking its hash-linked graph.
//!
//! # Traversal
//!
//! The coinbase is found first by following the left-most spine of the transaction tree. If the
//! header postdates segwit activation and the coinbase advertises a witness commitment, the
//! commitment is loaded, its nonce is injected back into the coinbase witness, and the remaining
//! transactions are collected from the witness tree (whose leaves carry witness data) instead of
//! the transaction tree.
//!
//! Trees are walked depth-first, left to right, with an explicit stack:
//!
//! - A node without a left link is the witness tree's coinbase placeholder: only the right child
//!   is visited.
//! - A node whose children are identical duplicates its only child: it is visited once.
//!
//! Every loaded node is cached for the duration of a single [Assembler::assemble] call.

use crate::{Config, Error, Loader};
use bytes::Bytes;
use ipld_bitcoin_codec::{
    block,
    header::Header,
    tx::{Node, Transaction},
    witness_commitment::{inject_nonce, WitnessCommitment},
    Cid,
};
use commonware_codec::DecodeExt;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace, warn};

/// A reassembled block.
#[derive(Clone, Debug)]
pub struct Assembled {
    /// The decoded header (with its derived links).
    pub header: Header,
    /// The block, as decoded from `bytes`.
    pub block: bitcoin::Block,
    /// The serialized block.
    pub bytes: Vec<u8>,
}

type Cache = HashMap<Cid, Arc<Node>>;

/// Reassembles blocks from a [Loader].
pub struct Assembler<L: Loader> {
    loader: L,
    cfg: Config,
}

impl<L: Loader> Assembler<L> {
    pub fn new(loader: L, cfg: Config) -> Self {
        Self { loader, cfg }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Rebuild the block whose header is named by `cid`.
    pub async fn assemble(&self, cid: &Cid) -> Result<Assembled, Error> {
        let mut cache = Cache::new();
        let header =
            Header::decode(self.fetch(cid).await?).map_err(ipld_bitcoin_codec::Error::from)?;

        // Find the coinbase
        let (coinbase, depth) = self.coinbase(&header.tx, &mut cache).await?;
        debug!(block = %cid, depth, "resolved coinbase");

        // Classify the block
        let commitment = match coinbase.witness_commitment {
            Some(link) if header.time() >= self.cfg.segwit_activation_time => Some(link),
            Some(link) => {
                warn!(
                    block = %cid,
                    commitment = %link,
                    time = header.time(),
                    "ignoring witness commitment before activation"
                );
                None
            }
            None => None,
        };
        debug!(block = %cid, segwit = commitment.is_some(), "classified block");

        // Restore the coinbase witness and pick the tree to walk
        let mut txs = Vec::new();
        let mut root = Some(header.tx);
        if let Some(link) = commitment {
            let commitment = WitnessCommitment::decode(self.fetch(&link).await?)
                .map_err(ipld_bitcoin_codec::Error::from)?;
            let patched = inject_nonce(&coinbase.tx, commitment.nonce());
            txs.push(patched);
            root = commitment.witness_merkle_root();
            if root.is_none() && depth > 0 {
                return Err(Error::MissingWitnessMerkleRoot);
            }
        }
        if let Some(root) = root {
            self.collect(root, &mut cache, &mut txs).await?;
        }
        debug!(block = %cid, txs = txs.len(), loaded = cache.len(), "collected transactions");

        // Round trip through the wire codec
        let bytes = block::serialize(&bitcoin::Block {
            header: header.header,
            txdata: txs,
        });
        let block = block::deserialize(&bytes)?;
        Ok(Assembled {
            header,
            block,
            bytes,
        })
    }

    /// Load the bytes named by `cid`.
    async fn fetch(&self, cid: &Cid) -> Result<Bytes, Error> {
        let bytes = self
            .loader
            .load(cid)
            .await
            .map_err(|err| Error::Loader(Box::new(err)))?
            .ok_or(Error::BlockNotFound(*cid))?;
        if self.cfg.verify_digests && Cid::for_bytes(cid.codec(), &bytes) != *cid {
            return Err(Error::DigestMismatch(*cid));
        }
        Ok(bytes)
    }

    /// Load and decode the transaction tree node named by `cid`, consulting `cache` first.
    async fn node(&self, cid: &Cid, cache: &mut Cache) -> Result<Arc<Node>, Error> {
        if let Some(node) = cache.get(cid) {
            trace!(%cid, cached = true, "loaded node");
            return Ok(node.clone());
        }
        let bytes = self.fetch(cid).await?;
        let node = Arc::new(Node::decode(&bytes)?);
        trace!(%cid, cached = false, len = bytes.len(), "loaded node");
        cache.insert(*cid, node.clone());
        Ok(node)
    }

    /// Follow left links from `root` to the first transaction, returning it with its depth.
    ///
    /// Fails if that transaction is not a coinbase or a node on the way has no left link.
    async fn coinbase(
        &self,
        root: &Cid,
        cache: &mut Cache,
    ) -> Result<(Transaction, usize), Error> {
        let mut cid = *root;
        let mut depth = 0;
        loop {
            let node = self.node(&cid, cache).await?;
            match node.as_ref() {
                Node::Transaction(tx) if tx.tx.is_coinbase() => return Ok((tx.clone(), depth)),
                Node::Transaction(_) => return Err(Error::MissingCoinbase(cid)),
                Node::Merkle(merkle) => {
                    cid = merkle.left().ok_or(Error::MissingCoinbase(cid))?;
                    depth += 1;
                }
            }
        }
    }

    /// Append the leaves under `root` to `txs`, in order.
    async fn collect(
        &self,
        root: Cid,
        cache: &mut Cache,
        txs: &mut Vec<bitcoin::Transaction>,
    ) -> Result<(), Error> {
        let mut stack = vec![root];
        while let Some(cid) = stack.pop() {
            let node = self.node(&cid, cache).await?;
            match node.as_ref() {
                Node::Transaction(tx) => txs.push(tx.tx.clone()),
                Node::Merkle(merkle) => match merkle.left() {
                    None => stack.push(merkle.right()),
                    Some(left) if left == merkle.right() => stack.push(left),
                    Some(left) => {
                        stack.push(merkle.right());
                        stack.push(left);
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Memory, SEGWIT_ACTIVATION_TIME};
    use bitcoin::{constants::genesis_block, hashes::Hash as _, Network, TxMerkleNode};
    use commonware_codec::Encode;
    use futures::executor::block_on;
    use ipld_bitcoin_codec::{mocks, tx, Codec, Encoded};
    use std::{
        future::{ready, Future},
        io,
        sync::Mutex,
    };
    use test_case::test_case;

    fn store(block: &bitcoin::Block) -> (Cid, Vec<Encoded>, Memory) {
        let encoded = block::encode(block).unwrap();
        let header = encoded[0].cid;
        let memory = encoded.iter().cloned().collect();
        (header, encoded, memory)
    }

    fn assemble(memory: Memory, cfg: Config, header: &Cid) -> Result<Assembled, Error> {
        block_on(Assembler::new(memory, cfg).assemble(header))
    }

    fn check(block: &bitcoin::Block) {
        let (header, _, memory) = store(block);
        let assembled = assemble(memory, Config::default(), &header).unwrap();
        assert_eq!(&assembled.block, block);
        assert_eq!(assembled.bytes, block::serialize(block));
        assert_eq!(assembled.header.cid(), header);
    }

    #[test]
    fn test_genesis() {
        check(&genesis_block(Network::Bitcoin));
    }

    #[test_case(1; "one")]
    #[test_case(2; "two")]
    #[test_case(3; "three")]
    #[test_case(5; "five")]
    #[test_case(7; "seven")]
    #[test_case(16; "sixteen")]
    fn test_legacy(n: usize) {
        check(&mocks::block(n, None, mocks::LEGACY_TIME));
    }

    #[test_case(1, [0u8; 32]; "one null nonce")]
    #[test_case(2, [0u8; 32]; "two null nonce")]
    #[test_case(3, [0u8; 32]; "three null nonce")]
    #[test_case(4, [0u8; 32]; "four null nonce")]
    #[test_case(5, [0u8; 32]; "five null nonce")]
    #[test_case(6, [0u8; 32]; "six null nonce")]
    #[test_case(7, [0u8; 32]; "seven null nonce")]
    #[test_case(8, [0u8; 32]; "eight null nonce")]
    #[test_case(9, [0u8; 32]; "nine null nonce")]
    #[test_case(1, [0x5a; 32]; "one nonce")]
    #[test_case(2, [0x5a; 32]; "two nonce")]
    #[test_case(3, [0x5a; 32]; "three nonce")]
    #[test_case(9, [0x5a; 32]; "nine nonce")]
    fn test_segwit(n: usize, nonce: [u8; 32]) {
        check(&mocks::block(n, Some(nonce), mocks::SEGWIT_TIME));
    }

    #[test]
    fn test_activation_boundary() {
        check(&mocks::block(4, Some([1u8; 32]), SEGWIT_ACTIVATION_TIME));
    }

    #[test]
    fn test_commitment_before_activation() {
        // Witness data is only restored once the header postdates activation
        let block = mocks::block(4, Some([1u8; 32]), mocks::LEGACY_TIME);
        let (header, _, memory) = store(&block);
        let assembled = assemble(memory.clone(), Config::default(), &header).unwrap();
        assert_eq!(assembled.block.header, block.header);
        assert_eq!(assembled.block.txdata.len(), block.txdata.len());
        for (assembled, original) in assembled.block.txdata.iter().zip(&block.txdata) {
            assert_eq!(assembled.compute_txid(), original.compute_txid());
            assert!(assembled.input.iter().all(|input| input.witness.is_empty()));
        }

        // Lowering the activation time restores them
        let cfg = Config {
            segwit_activation_time: mocks::LEGACY_TIME,
            ..Config::default()
        };
        let assembled = assemble(memory, cfg, &header).unwrap();
        assert_eq!(assembled.block, block);
    }

    #[test]
    fn test_header_not_found() {
        let block = mocks::block(3, None, mocks::LEGACY_TIME);
        let (header, _, _) = store(&block);
        match assemble(Memory::new(), Config::default(), &header) {
            Err(Error::BlockNotFound(cid)) => assert_eq!(cid, header),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_transaction_not_found() {
        let block = mocks::block(4, Some([0u8; 32]), mocks::SEGWIT_TIME);
        let (header, encoded, mut memory) = store(&block);

        // Drop the last leaf of the witness tree
        let last = tx::Transaction::new(block.txdata[3].clone()).witness_cid();
        assert!(encoded.iter().any(|encoded| encoded.cid == last));
        memory.remove(&last);
        match assemble(memory, Config::default(), &header) {
            Err(Error::BlockNotFound(cid)) => assert_eq!(cid, last),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_commitment_not_found() {
        let block = mocks::block(3, Some([0u8; 32]), mocks::SEGWIT_TIME);
        let (header, encoded, mut memory) = store(&block);
        let commitment = encoded.last().unwrap().cid;
        assert_eq!(commitment.codec(), Codec::WitnessCommitment);
        memory.remove(&commitment);
        match assemble(memory, Config::default(), &header) {
            Err(Error::BlockNotFound(cid)) => assert_eq!(cid, commitment),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Flip one byte in the right half of the second interior node of a 4-transaction tree.
    fn tamper(memory: &mut Memory, block: &bitcoin::Block) -> Cid {
        let tree = tx::encode_all_no_witness(&block.txdata);
        let target = &tree.blocks()[5];
        let mut bytes = target.bytes.to_vec();
        bytes[40] ^= 0xff;
        memory.insert(target.cid, Bytes::from(bytes));
        target.cid
    }

    #[test]
    fn test_digest_mismatch() {
        let block = mocks::block(4, None, mocks::LEGACY_TIME);
        let (header, _, mut memory) = store(&block);
        let tampered = tamper(&mut memory, &block);
        match assemble(memory, Config::default(), &header) {
            Err(Error::DigestMismatch(cid)) => assert_eq!(cid, tampered),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_tamper_without_verification() {
        // The tampered node links to a transaction that does not exist
        let block = mocks::block(4, None, mocks::LEGACY_TIME);
        let (header, encoded, mut memory) = store(&block);
        tamper(&mut memory, &block);
        let cfg = Config {
            verify_digests: false,
            ..Config::default()
        };
        match assemble(memory, cfg, &header) {
            Err(Error::BlockNotFound(cid)) => {
                assert!(encoded.iter().all(|encoded| encoded.cid != cid))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_witness_merkle_root() {
        let block = mocks::block(3, Some([0u8; 32]), mocks::SEGWIT_TIME);
        let (header, encoded, mut memory) = store(&block);

        // Replace the commitment with one that has no witness root
        let commitment = encoded.last().unwrap().cid;
        let replacement = WitnessCommitment::new(None, [0u8; 32]).unwrap();
        memory.insert(commitment, replacement.encode().freeze());

        let cfg = Config {
            verify_digests: false,
            ..Config::default()
        };
        assert!(matches!(
            assemble(memory, cfg, &header),
            Err(Error::MissingWitnessMerkleRoot)
        ));
    }

    #[test]
    fn test_first_leaf_not_coinbase() {
        let mut block = mocks::block(4, None, mocks::LEGACY_TIME);
        block.txdata.remove(0);
        block.header.merkle_root = block.compute_merkle_root().unwrap();
        let (header, _, memory) = store(&block);
        let first = tx::Transaction::new(block.txdata[0].clone()).cid();
        match assemble(memory, Config::default(), &header) {
            Err(Error::MissingCoinbase(cid)) => assert_eq!(cid, first),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_spine_without_left_link() {
        // Point the header at a witness tree, whose left-most node skips the coinbase
        let mut block = mocks::block(2, Some([0u8; 32]), mocks::SEGWIT_TIME);
        let witnesses = tx::encode_all(&block.txdata);
        let root = witnesses.root().unwrap();
        block.header.merkle_root = TxMerkleNode::from_byte_array(root.digest().to_bytes());

        let header = Header::new(block.header);
        let mut memory: Memory = witnesses.into_blocks().into_iter().collect();
        memory.put(Encoded::new(Codec::Header, header.encode().freeze()));
        match assemble(memory, Config::default(), &header.cid()) {
            Err(Error::MissingCoinbase(cid)) => assert_eq!(cid, root),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_testnet4_block() {
        let raw = hex::decode(mocks::TESTNET4_BLOCK_140).unwrap();
        let block = block::deserialize(&raw).unwrap();
        let (header, encoded, memory) = store(&block);
        assert_eq!(
            header.to_string(),
            "bagyacvrahqgtjtrufexdt56ty3wc6puqcxndxwerzvpuc4s6uvcvkaaaaaaa"
        );
        assert!(encoded
            .iter()
            .any(|encoded| encoded.cid.codec() == Codec::WitnessCommitment));

        let assembled = assemble(memory, Config::default(), &header).unwrap();
        assert_eq!(assembled.bytes, raw);
        assert_eq!(assembled.block, block);
        assert_eq!(
            assembled.header.tx.to_string(),
            "bagyqcvratwzicolzfqssvseya65ig7fzavxnwp427b35kr7isjjhjyvttbbq"
        );
    }

    #[test]
    fn test_not_a_header() {
        let block = mocks::block(2, None, mocks::LEGACY_TIME);
        let (_, encoded, memory) = store(&block);
        assert!(matches!(
            assemble(memory, Config::default(), &encoded[1].cid),
            Err(Error::Codec(_))
        ));
    }

    /// Counts how often each identifier is requested.
    struct Counting {
        inner: Memory,
        loads: Mutex<HashMap<Cid, usize>>,
    }

    impl Loader for Counting {
        type Error = io::Error;

        fn load(&self, cid: &Cid) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> {
            *self.loads.lock().unwrap().entry(*cid).or_default() += 1;
            ready(Ok(self.inner.get(cid).cloned()))
        }
    }

    #[test_case(7, None; "legacy")]
    #[test_case(7, Some([3u8; 32]); "segwit")]
    fn test_loads_once(n: usize, nonce: Option<[u8; 32]>) {
        let block = mocks::block(n, nonce, mocks::SEGWIT_TIME);
        let (header, _, inner) = store(&block);
        let loader = Counting {
            inner,
            loads: Mutex::new(HashMap::new()),
        };
        let assembler = Assembler::new(loader, Config::default());
        let assembled = block_on(assembler.assemble(&header)).unwrap();
        assert_eq!(assembled.block, block);

        let loads = assembler.loader().loads.lock().unwrap();
        assert!(loads.values().all(|count| *count == 1));
    }

    struct Offline;

    impl Loader for Offline {
        type Error = io::Error;

        fn load(&self, _: &Cid) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> {
            ready(Err(io::Error::other("offline")))
        }
    }

    #[test]
    fn test_loader_error() {
        let block = mocks::block(2, None, mocks::LEGACY_TIME);
        let (header, _, _) = store(&block);
        let result = block_on(Assembler::new(Offline, Config::default()).assemble(&header));
        match result {
            Err(Error::Loader(err)) => assert_eq!(err.to_string(), "offline"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
