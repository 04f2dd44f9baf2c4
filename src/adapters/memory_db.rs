use crate::domain::{Hash, TrieError};
use crate::ports::NodeStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of NodeStore for testing and embedding.
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().map(|nodes| nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, TrieError> {
        let nodes = self.nodes.read().map_err(|_| TrieError::LockPoisoned)?;
        Ok(nodes.get(hash).cloned())
    }

    fn put_node(&self, hash: Hash, rlp: Vec<u8>) -> Result<(), TrieError> {
        let mut nodes = self.nodes.write().map_err(|_| TrieError::LockPoisoned)?;
        nodes.insert(hash, rlp);
        Ok(())
    }

    fn batch_put(&self, batch: Vec<(Hash, Vec<u8>)>) -> Result<(), TrieError> {
        let mut nodes = self.nodes.write().map_err(|_| TrieError::LockPoisoned)?;
        for (hash, rlp) in batch {
            nodes.insert(hash, rlp);
        }
        Ok(())
    }
}
