//! # Commit Protocol
//!
//! Flushes the dirty subtree to the backing store and publishes the new
//! root hash.
//!
//! ## Algorithm
//!
//! 1. Depth-first, post-order walk of the dirty subtree.
//! 2. Each visited node is encoded; its reference (hash or inline RLP) is
//!    computed and cached, and its dirty flag cleared.
//! 3. Every node referred to by hash is recorded as a `(hash, rlp)` pair;
//!    the root is recorded unconditionally.
//! 4. All recorded pairs are written to the store in one batch, then the
//!    root hash is published.
//!
//! ## Parallel fan-out
//!
//! When the root is a branch with enough dirty children, the child
//! subtrees are committed on rayon workers. The subtrees own disjoint
//! nodes, so the workers never contend; their batches are concatenated in
//! slot order to keep the write set deterministic. Worker failures are
//! aggregated rather than short-circuited.

use super::errors::TrieError;
use super::node::{Node, NodeKind, NodeRef};
use super::rlp;
use super::trie::Trie;
use super::{Hash, EMPTY_TRIE_ROOT};
use crate::ports::NodeStore;
use rayon::prelude::*;

/// Parallel threshold - commit sequentially below this many dirty subtrees.
pub const PARALLEL_COMMIT_THRESHOLD: usize = 4;

impl<S: NodeStore> Trie<S> {
    /// Persist every dirty node and publish the new root hash.
    ///
    /// A clean trie is a no-op. The root node is always written under its
    /// Keccak256 hash, even when its encoding is short enough to be
    /// embedded anywhere else.
    pub fn commit(&mut self) -> Result<Hash, TrieError> {
        let Some(root) = self.root.as_mut() else {
            self.root_hash = EMPTY_TRIE_ROOT;
            return Ok(EMPTY_TRIE_ROOT);
        };
        if !root.is_dirty() {
            return Ok(self.root_hash);
        }

        let mut batch: Vec<(Hash, Vec<u8>)> = Vec::new();

        if let NodeKind::Branch { children, .. } = &mut root.kind {
            let dirty_subtrees = children.iter().flatten().filter(|c| c.is_dirty()).count();
            if dirty_subtrees >= PARALLEL_COMMIT_THRESHOLD {
                let results: Vec<Result<Vec<(Hash, Vec<u8>)>, TrieError>> = children
                    .as_mut_slice()
                    .par_iter_mut()
                    .map(|slot| {
                        let mut partial = Vec::new();
                        if let Some(child) = slot {
                            if child.is_dirty() {
                                commit_subtree(child, &mut partial)?;
                            }
                        }
                        Ok(partial)
                    })
                    .collect();

                let mut failures = Vec::new();
                for result in results {
                    match result {
                        Ok(partial) => batch.extend(partial),
                        Err(error) => failures.push(error),
                    }
                }
                if !failures.is_empty() {
                    return Err(TrieError::CommitFailed(failures));
                }
            }
        }

        // Children cleaned by the parallel pass are skipped here.
        commit_subtree(root, &mut batch)?;

        // Hash-referenced roots are already in the batch; a short root whose
        // reference came out inline still gets hashed and recorded here.
        let root_hash = match root.node_key()?.as_hash() {
            Some(hash) => hash,
            None => {
                let encoded = root.encode()?;
                let hash = rlp::keccak256(&encoded);
                batch.push((hash, encoded));
                hash
            }
        };

        tracing::debug!(
            "committing {} trie nodes, root {}",
            batch.len(),
            hex::encode(root_hash)
        );

        // Write-through: committed nodes land in the decoded-node cache.
        for (hash, encoded) in &batch {
            let kind = Node::decode(encoded)?;
            self.node_cache.put(
                *hash,
                Node {
                    kind,
                    reference: Some(NodeRef::Hash(*hash)),
                    dirty: false,
                },
            );
        }

        self.store.batch_put(batch)?;
        // The working set is ephemeral: once persisted it is dropped and the
        // root becomes a lazy reference into the store.
        self.root = Some(Node::unknown(NodeRef::Hash(root_hash)));
        self.root_hash = root_hash;
        Ok(root_hash)
    }

    /// Recompute and publish the root hash without touching the store.
    ///
    /// Dirty flags are left in place so a later `commit` still flushes
    /// everything. Used by callers that batch persistence separately.
    pub fn update_root_hash(&mut self) -> Result<Hash, TrieError> {
        match self.root.as_mut() {
            None => self.root_hash = EMPTY_TRIE_ROOT,
            // A clean root already has its hash published.
            Some(root) if !root.is_dirty() => {}
            Some(root) => {
                let encoded = root.encode()?;
                self.root_hash = rlp::keccak256(&encoded);
            }
        }
        Ok(self.root_hash)
    }
}

/// Post-order commit of one subtree: children first, then the node's own
/// reference. Hash-referenced nodes are appended to the write batch.
fn commit_subtree(node: &mut Node, batch: &mut Vec<(Hash, Vec<u8>)>) -> Result<(), TrieError> {
    match &mut node.kind {
        NodeKind::Leaf { .. } | NodeKind::Unknown(_) => {}
        NodeKind::Extension { child, .. } => {
            if child.is_dirty() {
                commit_subtree(child, batch)?;
            }
        }
        NodeKind::Branch { children, .. } => {
            for child in children.iter_mut().flatten() {
                if child.is_dirty() {
                    commit_subtree(child, batch)?;
                }
            }
        }
    }

    node.dirty = false;
    let encoded = node.encode()?;
    let key = match &node.reference {
        Some(reference) => reference.clone(),
        None => {
            let reference = if encoded.len() < 32 {
                NodeRef::Inline(encoded.clone())
            } else {
                NodeRef::Hash(rlp::keccak256(&encoded))
            };
            node.reference = Some(reference.clone());
            reference
        }
    };
    if let NodeRef::Hash(hash) = key {
        batch.push((hash, encoded));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryNodeStore;
    use std::sync::Arc;

    #[test]
    fn test_commit_persists_and_reopens() {
        let store = Arc::new(InMemoryNodeStore::new());
        let mut trie = Trie::new(store.clone());
        trie.set(b"do", b"verb").unwrap();
        trie.set(b"dog", b"puppy").unwrap();
        trie.set(b"doge", b"coin").unwrap();
        trie.set(b"horse", b"stallion").unwrap();
        let root = trie.commit().unwrap();
        assert!(!store.is_empty());

        let mut reopened = Trie::with_root(store, root);
        assert_eq!(reopened.get(b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(reopened.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(reopened.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(reopened.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(reopened.get(b"absent").unwrap(), None);
    }

    #[test]
    fn test_parallel_commit_fanout() {
        // One key per first nibble gives the root branch 16 dirty subtrees,
        // well past the fan-out threshold.
        let store = Arc::new(InMemoryNodeStore::new());
        let mut trie = Trie::new(store.clone());
        for nibble in 0u8..16 {
            let key = [nibble << 4 | nibble, nibble, 0xAA];
            trie.set(&key, &[0xBB; 40]).unwrap();
        }
        let root = trie.commit().unwrap();

        let mut reopened = Trie::with_root(store, root);
        for nibble in 0u8..16 {
            let key = [nibble << 4 | nibble, nibble, 0xAA];
            assert_eq!(reopened.get(&key).unwrap(), Some(vec![0xBB; 40]));
        }
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut trie = Trie::new(InMemoryNodeStore::new());
        trie.set(b"key", b"value").unwrap();
        let first = trie.commit().unwrap();
        let stored = trie.store.len();

        let second = trie.commit().unwrap();
        assert_eq!(first, second);
        assert_eq!(trie.store.len(), stored);
    }

    #[test]
    fn test_update_root_hash_matches_commit() {
        let mut trie = Trie::new(InMemoryNodeStore::new());
        trie.set(b"do", b"verb").unwrap();
        trie.set(b"dog", b"puppy").unwrap();

        let computed = trie.update_root_hash().unwrap();
        assert!(trie.store.is_empty());
        assert_eq!(trie.commit().unwrap(), computed);
        assert!(!trie.store.is_empty());
    }

    #[test]
    fn test_incremental_update_after_commit() {
        let store = Arc::new(InMemoryNodeStore::new());
        let mut trie = Trie::new(store.clone());
        trie.set(b"do", b"verb").unwrap();
        trie.set(b"dog", b"puppy").unwrap();
        trie.commit().unwrap();

        // Mutating a committed trie resolves stored nodes on the way down.
        trie.set(b"doge", b"coin").unwrap();
        trie.delete(b"do").unwrap();
        let root = trie.commit().unwrap();

        let mut reopened = Trie::with_root(store, root);
        assert_eq!(reopened.get(b"do").unwrap(), None);
        assert_eq!(reopened.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(reopened.get(b"doge").unwrap(), Some(b"coin".to_vec()));
    }

    #[test]
    fn test_small_root_stored_by_hash() {
        // A lone short leaf encodes under 32 bytes, but the root is still
        // persisted under its hash so the trie can be reopened.
        let store = Arc::new(InMemoryNodeStore::new());
        let mut trie = Trie::new(store.clone());
        trie.set(b"do", b"verb").unwrap();
        let root = trie.commit().unwrap();

        assert!(store.get_node(&root).unwrap().is_some());
        let mut reopened = Trie::with_root(store, root);
        assert_eq!(reopened.get(b"do").unwrap(), Some(b"verb".to_vec()));
    }

    #[test]
    fn test_commit_after_full_deletion() {
        let mut trie = Trie::new(InMemoryNodeStore::new());
        trie.set(b"a", b"1").unwrap();
        trie.set(b"b", b"2").unwrap();
        trie.commit().unwrap();

        trie.delete(b"a").unwrap();
        trie.delete(b"b").unwrap();
        assert_eq!(trie.commit().unwrap(), EMPTY_TRIE_ROOT);
        assert_eq!(trie.root_hash(), EMPTY_TRIE_ROOT);
    }
}
