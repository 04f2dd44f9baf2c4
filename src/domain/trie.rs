//! # Merkle Patricia Trie
//!
//! An authenticated, persistent key/value map whose 32-byte root commits
//! to the entire contents. Keys and values are arbitrary byte strings;
//! nodes live in a content-addressed backing store and are materialized
//! lazily during traversal.
//!
//! ## Architecture
//!
//! - Reads walk the in-memory tree from the root, resolving unknown nodes
//!   from the store as they are touched.
//! - Writes descend the same way while recording the chain of ancestors,
//!   then rebuild that chain bottom-up, collapsing redundant structure so
//!   the tree stays minimal after every mutation.
//! - `commit` (see `commit.rs`) hashes the dirty subtree bottom-up and
//!   flushes it to the store.
//!
//! ## Invariants
//!
//! - Two tries with the same contents have the same root hash, regardless
//!   of insertion order.
//! - An extension never has an empty path and never points at a leaf or
//!   another extension; such shapes are merged eagerly on rewrite.
//! - A non-root branch always carries at least two of {children, value}.
//! - The empty trie root is the Keccak256 of the RLP empty string.

use super::cache::{CacheStats, NodeCache, ValueCache};
use super::errors::TrieError;
use super::nibbles::Nibbles;
use super::node::{Node, NodeKind, NodeRef};
use super::{Hash, EMPTY_TRIE_ROOT};
use crate::ports::NodeStore;

// =============================================================================
// TRIE
// =============================================================================

/// Merkle Patricia Trie over a content-addressed node store.
///
/// A single trie instance supports one mutation at a time; every call runs
/// to completion synchronously. `root_hash()` reflects the last committed
/// or explicitly recomputed root, not uncommitted in-memory changes.
pub struct Trie<S: NodeStore> {
    pub(crate) store: S,
    pub(crate) root: Option<Node>,
    pub(crate) root_hash: Hash,
    pub(crate) node_cache: NodeCache,
    pub(crate) value_cache: ValueCache,
}

impl<S: NodeStore> Trie<S> {
    /// Create a new empty trie.
    pub fn new(store: S) -> Self {
        Self {
            store,
            root: None,
            root_hash: EMPTY_TRIE_ROOT,
            node_cache: NodeCache::new(),
            value_cache: ValueCache::new(),
        }
    }

    /// Open a trie at an existing root.
    pub fn with_root(store: S, root_hash: Hash) -> Self {
        let mut trie = Self::new(store);
        trie.set_root_hash(root_hash);
        trie
    }

    /// The last published root hash.
    pub fn root_hash(&self) -> Hash {
        self.root_hash
    }

    /// Replace the trie contents with whatever is reachable from the given
    /// root through the store. Uncommitted in-memory changes are discarded.
    pub fn set_root_hash(&mut self, root_hash: Hash) {
        self.root = if root_hash == EMPTY_TRIE_ROOT {
            None
        } else {
            Some(Node::unknown(NodeRef::Hash(root_hash)))
        };
        self.root_hash = root_hash;
        // Contents changed; the node cache stays valid because it is
        // content-addressed.
        self.value_cache.clear();
    }

    /// Accelerator cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats::snapshot(&self.node_cache, &self.value_cache)
    }

    // =========================================================================
    // POINT OPERATIONS
    // =========================================================================

    /// Look up the value stored under `key`.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        if let Some(value) = self.value_cache.get(key) {
            return Ok(Some(value.clone()));
        }
        let path = Nibbles::from_bytes(key);
        let found = self.lookup(&path)?;
        if let Some(value) = &found {
            self.value_cache.put(key.to_vec(), value.clone());
        }
        Ok(found)
    }

    /// Store `value` under `key`. An empty value deletes the key.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        self.value_cache.pop(key);
        let path = Nibbles::from_bytes(key);
        if value.is_empty() {
            self.run_update(path, None, true)
        } else {
            self.run_update(path, Some(value.to_vec()), true)
        }
    }

    /// Remove `key`. Absent keys are ignored.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        self.value_cache.pop(key);
        self.run_update(Nibbles::from_bytes(key), None, true)
    }

    /// Remove `key`, failing with `MissingDeleteKey` if it is not present.
    /// The trie is left untouched on failure.
    pub fn delete_strict(&mut self, key: &[u8]) -> Result<(), TrieError> {
        self.value_cache.pop(key);
        self.run_update(Nibbles::from_bytes(key), None, false)
    }

    // =========================================================================
    // READ TRAVERSAL
    // =========================================================================

    /// Walk the tree along `path`, materializing nodes on the way. Reads
    /// leave the structure untouched apart from resolved placeholders.
    fn lookup(&mut self, path: &Nibbles) -> Result<Option<Vec<u8>>, TrieError> {
        let Self {
            store,
            root,
            node_cache,
            ..
        } = self;
        let Some(mut node) = root.as_mut() else {
            return Ok(None);
        };

        let mut cursor = 0usize;
        loop {
            node.resolve(&*store, node_cache)?;
            match &mut node.kind {
                NodeKind::Leaf {
                    path: leaf_path,
                    value,
                } => {
                    return Ok(if path.0[cursor..] == leaf_path.0[..] {
                        Some(value.clone())
                    } else {
                        None
                    });
                }

                NodeKind::Branch { children, value } => {
                    if cursor == path.len() {
                        return Ok(value.clone());
                    }
                    let index = path.at(cursor) as usize;
                    cursor += 1;
                    match children[index].as_mut() {
                        Some(child) => node = child,
                        None => return Ok(None),
                    }
                }

                NodeKind::Extension {
                    path: prefix,
                    child,
                } => {
                    let matched = path.0[cursor..]
                        .iter()
                        .zip(prefix.0.iter())
                        .take_while(|(a, b)| a == b)
                        .count();
                    if matched < prefix.len() {
                        return Ok(None);
                    }
                    cursor += matched;
                    node = &mut **child;
                }

                NodeKind::Unknown(_) => {
                    return Err(TrieError::InvariantViolation(
                        "node left unresolved during traversal",
                    ))
                }
            }
        }
    }

    // =========================================================================
    // WRITE TRAVERSAL
    // =========================================================================

    /// Unified mutation core: descend along `path` recording ancestors,
    /// then rebuild the recorded chain around the new deepest node.
    ///
    /// `new_value == None` deletes; `ignore_missing_delete` selects between
    /// a silent no-op and `MissingDeleteKey` when the key is absent.
    fn run_update(
        &mut self,
        path: Nibbles,
        new_value: Option<Vec<u8>>,
        ignore_missing_delete: bool,
    ) -> Result<(), TrieError> {
        let Self {
            store,
            root,
            node_cache,
            ..
        } = self;

        let Some(start) = root.take() else {
            return match new_value {
                Some(value) => {
                    *root = Some(Node::leaf(path, value));
                    Ok(())
                }
                None if ignore_missing_delete => Ok(()),
                None => Err(TrieError::MissingDeleteKey(path)),
            };
        };

        let mut stack: Vec<StackEntry> = Vec::new();
        let mut current = start;
        let mut cursor = 0usize;

        // Descend until the operation resolves into a replacement for the
        // deepest touched node (`Some` on insert/update, `None` on delete),
        // or turns out not to change the tree at all.
        let next: Option<Node> = loop {
            current.resolve(&*store, node_cache)?;
            let Node {
                kind,
                reference,
                dirty,
            } = current;

            match kind {
                // ---- branch ----
                NodeKind::Branch {
                    mut children,
                    value,
                } => {
                    if cursor == path.len() {
                        // The key terminates at this branch.
                        if new_value.is_some() && value == new_value {
                            let node = rebuild_branch(children, value, reference, dirty);
                            *root = Some(unwind_unchanged(stack, node));
                            return Ok(());
                        }
                        if new_value.is_some() {
                            break Some(Node::branch(children, new_value));
                        }
                        if value.is_none() {
                            let node = rebuild_branch(children, value, reference, dirty);
                            *root = Some(unwind_unchanged(stack, node));
                            return missing_delete(path, ignore_missing_delete);
                        }
                        // Drop the value; keep the branch only while it
                        // still holds enough structure.
                        let live = children.iter().filter(|c| c.is_some()).count();
                        break if live >= 2 {
                            Some(Node::branch(children, None))
                        } else if live == 1 {
                            let (index, child) = take_sole_child(&mut children)?;
                            Some(merge_single_child(&*store, node_cache, index, child)?)
                        } else {
                            None
                        };
                    }

                    let index = path.at(cursor) as usize;
                    cursor += 1;
                    match children[index].take() {
                        Some(child) => {
                            stack.push(StackEntry::Branch {
                                children,
                                value,
                                index,
                                reference,
                                dirty,
                            });
                            current = child;
                        }
                        None => {
                            let Some(insert_value) = new_value else {
                                let node = rebuild_branch(children, value, reference, dirty);
                                *root = Some(unwind_unchanged(stack, node));
                                return missing_delete(path, ignore_missing_delete);
                            };
                            let leaf = Node::leaf(path.slice(cursor), insert_value);
                            stack.push(StackEntry::Branch {
                                children,
                                value,
                                index,
                                reference,
                                dirty,
                            });
                            break Some(leaf);
                        }
                    }
                }

                // ---- extension ----
                NodeKind::Extension {
                    path: prefix,
                    child,
                } => {
                    let remaining = path.slice(cursor);
                    let matched = remaining.common_prefix_len(&prefix);

                    if matched == prefix.len() {
                        cursor += matched;
                        stack.push(StackEntry::Extension {
                            path: prefix,
                            reference,
                            dirty,
                        });
                        current = *child;
                        continue;
                    }

                    // The key diverges inside the shared prefix.
                    let Some(insert_value) = new_value else {
                        let node = Node {
                            kind: NodeKind::Extension {
                                path: prefix,
                                child,
                            },
                            reference,
                            dirty,
                        };
                        *root = Some(unwind_unchanged(stack, node));
                        return missing_delete(path, ignore_missing_delete);
                    };

                    if matched > 0 {
                        stack.push(StackEntry::Extension {
                            path: remaining.slice_range(0, matched),
                            reference: None,
                            dirty: true,
                        });
                    }

                    let mut children = Node::empty_children();
                    // Old side: the surviving tail of the split prefix.
                    let old_slot = prefix.at(matched) as usize;
                    children[old_slot] = Some(if prefix.len() - matched > 1 {
                        Node::extension(prefix.slice(matched + 1), *child)
                    } else {
                        *child
                    });
                    // New side: the inserted key's tail, or the branch value
                    // when the key ends exactly at the split.
                    let mut branch_value = None;
                    if matched == remaining.len() {
                        branch_value = Some(insert_value);
                    } else {
                        let new_slot = remaining.at(matched) as usize;
                        children[new_slot] =
                            Some(Node::leaf(remaining.slice(matched + 1), insert_value));
                    }
                    break Some(Node::branch(children, branch_value));
                }

                // ---- leaf ----
                NodeKind::Leaf {
                    path: leaf_path,
                    value: leaf_value,
                } => {
                    let remaining = path.slice(cursor);
                    let matched = remaining.common_prefix_len(&leaf_path);

                    if matched == remaining.len() && matched == leaf_path.len() {
                        // The key points exactly at this leaf.
                        match new_value {
                            None => break None,
                            Some(value) if value == leaf_value => {
                                let node = Node {
                                    kind: NodeKind::Leaf {
                                        path: leaf_path,
                                        value: leaf_value,
                                    },
                                    reference,
                                    dirty,
                                };
                                *root = Some(unwind_unchanged(stack, node));
                                return Ok(());
                            }
                            Some(value) => break Some(Node::leaf(leaf_path, value)),
                        }
                    }

                    // The key diverges from this leaf.
                    let Some(insert_value) = new_value else {
                        let node = Node {
                            kind: NodeKind::Leaf {
                                path: leaf_path,
                                value: leaf_value,
                            },
                            reference,
                            dirty,
                        };
                        *root = Some(unwind_unchanged(stack, node));
                        return missing_delete(path, ignore_missing_delete);
                    };

                    if matched > 0 {
                        stack.push(StackEntry::Extension {
                            path: remaining.slice_range(0, matched),
                            reference: None,
                            dirty: true,
                        });
                    }

                    // The shorter side either becomes the branch value (when
                    // it ends at the split) or a short leaf; the longer side
                    // is always a leaf, connected through the ancestor stack.
                    let (shorter, shorter_value, longer, longer_value) =
                        if remaining.len() < leaf_path.len() {
                            (remaining, insert_value, leaf_path, leaf_value)
                        } else {
                            (leaf_path, leaf_value, remaining, insert_value)
                        };

                    let mut children = Node::empty_children();
                    let mut branch_value = None;
                    if shorter.len() == matched {
                        branch_value = Some(shorter_value);
                    } else {
                        let slot = shorter.at(matched) as usize;
                        children[slot] =
                            Some(Node::leaf(shorter.slice(matched + 1), shorter_value));
                    }

                    let index = longer.at(matched) as usize;
                    stack.push(StackEntry::Branch {
                        children,
                        value: branch_value,
                        index,
                        reference: None,
                        dirty: true,
                    });
                    break Some(Node::leaf(longer.slice(matched + 1), longer_value));
                }

                NodeKind::Unknown(_) => {
                    return Err(TrieError::InvariantViolation(
                        "node left unresolved during traversal",
                    ))
                }
            }
        };

        *root = connect_nodes(&*store, node_cache, stack, next)?;
        Ok(())
    }
}

// =============================================================================
// ANCESTOR STACK
// =============================================================================

/// One recorded ancestor of the node being rewritten. Branch entries have
/// the descended slot already vacated; extension entries never need their
/// old child back, because every rewrite replaces it.
///
/// Leaves cannot appear here: they have no children to descend into.
enum StackEntry {
    Branch {
        children: Box<[Option<Node>; 16]>,
        value: Option<Vec<u8>>,
        index: usize,
        reference: Option<NodeRef>,
        dirty: bool,
    },
    Extension {
        path: Nibbles,
        reference: Option<NodeRef>,
        dirty: bool,
    },
}

/// Reassemble a branch node exactly as it was found.
fn rebuild_branch(
    children: Box<[Option<Node>; 16]>,
    value: Option<Vec<u8>>,
    reference: Option<NodeRef>,
    dirty: bool,
) -> Node {
    Node {
        kind: NodeKind::Branch { children, value },
        reference,
        dirty,
    }
}

/// Outcome of a delete that found nothing to remove.
fn missing_delete(path: Nibbles, ignore_missing_delete: bool) -> Result<(), TrieError> {
    if ignore_missing_delete {
        Ok(())
    } else {
        Err(TrieError::MissingDeleteKey(path))
    }
}

/// Reattach a descended chain without any modification, preserving every
/// ancestor's reference and dirty state.
fn unwind_unchanged(stack: Vec<StackEntry>, mut current: Node) -> Node {
    for entry in stack.into_iter().rev() {
        current = match entry {
            StackEntry::Branch {
                mut children,
                value,
                index,
                reference,
                dirty,
            } => {
                children[index] = Some(current);
                rebuild_branch(children, value, reference, dirty)
            }
            StackEntry::Extension {
                path,
                reference,
                dirty,
            } => Node {
                kind: NodeKind::Extension {
                    path,
                    child: Box::new(current),
                },
                reference,
                dirty,
            },
        };
    }
    current
}

// =============================================================================
// STRUCTURAL REWRITE
// =============================================================================

/// Walk the ancestor stack from the deepest entry back to the root,
/// substituting `next` into each ancestor and collapsing structure that a
/// deletion has made redundant. Returns the new root.
fn connect_nodes<S: NodeStore>(
    store: &S,
    cache: &mut NodeCache,
    stack: Vec<StackEntry>,
    mut next: Option<Node>,
) -> Result<Option<Node>, TrieError> {
    for entry in stack.into_iter().rev() {
        next = match entry {
            StackEntry::Branch {
                mut children,
                value,
                index,
                ..
            } => match next {
                Some(node) => {
                    children[index] = Some(node);
                    Some(Node::branch(children, value))
                }
                None => {
                    // The descended slot is already empty; decide whether the
                    // branch survives the removal.
                    let live = children.iter().filter(|c| c.is_some()).count();
                    if live >= 2 || (live >= 1 && value.is_some()) {
                        Some(Node::branch(children, value))
                    } else if let Some(value) = value {
                        Some(Node::leaf(Nibbles::empty(), value))
                    } else if live == 1 {
                        let (index, child) = take_sole_child(&mut children)?;
                        Some(merge_single_child(store, cache, index, child)?)
                    } else {
                        None
                    }
                }
            },

            StackEntry::Extension { path, .. } => {
                let node = next.ok_or(TrieError::InvariantViolation(
                    "extension left without a child",
                ))?;
                let Node {
                    kind,
                    reference,
                    dirty,
                } = node;
                Some(match kind {
                    NodeKind::Leaf {
                        path: tail,
                        value,
                    } => Node::leaf(path.join(&tail), value),
                    NodeKind::Extension { path: tail, child } => {
                        Node::extension(path.join(&tail), *child)
                    }
                    branch @ NodeKind::Branch { .. } => Node::extension(
                        path,
                        Node {
                            kind: branch,
                            reference,
                            dirty,
                        },
                    ),
                    NodeKind::Unknown(_) => {
                        return Err(TrieError::InvariantViolation(
                            "unresolved node attached to an extension",
                        ))
                    }
                })
            }
        };
    }
    Ok(next)
}

/// Pull the single remaining child out of a collapsing branch.
fn take_sole_child(children: &mut [Option<Node>; 16]) -> Result<(u8, Node), TrieError> {
    for (index, slot) in children.iter_mut().enumerate() {
        if let Some(child) = slot.take() {
            return Ok((index as u8, child));
        }
    }
    Err(TrieError::InvariantViolation(
        "branch collapse with no remaining child",
    ))
}

/// Fold a branch's lone surviving child into its parent slot: branches gain
/// a one-nibble extension above them, extensions and leaves absorb the
/// nibble into their own path.
fn merge_single_child<S: NodeStore>(
    store: &S,
    cache: &mut NodeCache,
    index: u8,
    mut child: Node,
) -> Result<Node, TrieError> {
    child.resolve(store, cache)?;
    if matches!(child.kind, NodeKind::Branch { .. }) {
        return Ok(Node::extension(Nibbles::single(index), child));
    }
    let Node { kind, .. } = child;
    match kind {
        NodeKind::Extension { path, child } => Ok(Node::extension(
            Nibbles::single(index).join(&path),
            *child,
        )),
        NodeKind::Leaf { path, value } => {
            Ok(Node::leaf(Nibbles::single(index).join(&path), value))
        }
        NodeKind::Branch { .. } | NodeKind::Unknown(_) => Err(TrieError::InvariantViolation(
            "unresolved node during branch collapse",
        )),
    }
}

// =============================================================================
// TESTS
// =============================================================================
