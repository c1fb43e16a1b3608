//! A [Loader] backed by an in-memory map.

use crate::Loader;
use bytes::Bytes;
use ipld_bitcoin_codec::{Cid, Encoded};
use std::{
    collections::HashMap,
    convert::Infallible,
    future::{ready, Future},
};

/// Blocks held in memory, keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    blocks: HashMap<Cid, Bytes>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an encoded block under its identifier.
    pub fn put(&mut self, encoded: Encoded) {
        self.blocks.insert(encoded.cid, encoded.bytes);
    }

    /// Store `bytes` under `cid` without checking that they match, returning the previous bytes.
    pub fn insert(&mut self, cid: Cid, bytes: Bytes) -> Option<Bytes> {
        self.blocks.insert(cid, bytes)
    }

    pub fn remove(&mut self, cid: &Cid) -> Option<Bytes> {
        self.blocks.remove(cid)
    }

    pub fn get(&self, cid: &Cid) -> Option<&Bytes> {
        self.blocks.get(cid)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Extend<Encoded> for Memory {
    fn extend<T: IntoIterator<Item = Encoded>>(&mut self, iter: T) {
        for encoded in iter {
            self.put(encoded);
        }
    }
}

impl FromIterator<Encoded> for Memory {
    fn from_iter<T: IntoIterator<Item = Encoded>>(iter: T) -> Self {
        let mut memory = Self::new();
        memory.extend(iter);
        memory
    }
}

impl Loader for Memory {
    type Error = Infallible;

    fn load(&self, cid: &Cid) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> {
        ready(Ok(self.blocks.get(cid).cloned()))
    }
}
