use crate::domain::{Hash, TrieError};
use std::sync::Arc;

/// Content-addressed node store abstraction.
///
/// Every write performed by the trie satisfies `hash == Keccak256(rlp)`.
/// The store is append-only from the trie's point of view; orphaned nodes
/// are never deleted here.
pub trait NodeStore: Send + Sync {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, TrieError>;
    fn put_node(&self, hash: Hash, rlp: Vec<u8>) -> Result<(), TrieError>;
    fn batch_put(&self, nodes: Vec<(Hash, Vec<u8>)>) -> Result<(), TrieError>;
}

impl<S: NodeStore + ?Sized> NodeStore for Arc<S> {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, TrieError> {
        (**self).get_node(hash)
    }

    fn put_node(&self, hash: Hash, rlp: Vec<u8>) -> Result<(), TrieError> {
        (**self).put_node(hash, rlp)
    }

    fn batch_put(&self, nodes: Vec<(Hash, Vec<u8>)>) -> Result<(), TrieError> {
        (**self).batch_put(nodes)
    }
}
