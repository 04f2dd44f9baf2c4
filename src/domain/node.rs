//! # Trie Node Model
//!
//! In-memory representation of the three node kinds plus the lazy
//! placeholder for nodes known only by reference.
//!
//! ## Node Kinds
//!
//! - **Leaf**: remaining key path + value
//! - **Extension**: shared non-empty prefix + single child (always a branch)
//! - **Branch**: 16-way radix node + optional value
//! - **Unknown**: a reference waiting to be materialized from the store
//!
//! ## References
//!
//! A node is referred to by its Keccak256 hash when its RLP encoding is
//! 32 bytes or longer, and by the raw RLP itself when shorter. The inline
//! case is spliced verbatim into the parent encoding; both cases must be
//! preserved bit-exactly.

use super::cache::NodeCache;
use super::errors::TrieError;
use super::nibbles::Nibbles;
use super::rlp::{self, Item};
use super::Hash;
use crate::ports::NodeStore;

// =============================================================================
// NODE REFERENCE: hash or inline RLP
// =============================================================================

/// Reference to a node: its 32-byte hash, or its whole RLP encoding when
/// that encoding is shorter than 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// Keccak256 of the node's RLP encoding.
    Hash(Hash),
    /// The node's RLP encoding itself, embedded in the parent.
    Inline(Vec<u8>),
}

impl NodeRef {
    /// The hash form of this reference, if it has one.
    pub fn as_hash(&self) -> Option<Hash> {
        match self {
            NodeRef::Hash(hash) => Some(*hash),
            NodeRef::Inline(_) => None,
        }
    }

    /// Append this reference to a parent's RLP payload.
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            NodeRef::Hash(hash) => out.extend(rlp::encode_bytes(hash)),
            NodeRef::Inline(raw) => out.extend_from_slice(raw),
        }
    }
}

// =============================================================================
// NODE KINDS
// =============================================================================

/// The shape of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Terminal node: remaining key path and the stored value.
    /// RLP: [hex_prefix(path, leaf), value]
    Leaf {
        /// Remaining path from this node's position to the key's end.
        path: Nibbles,
        /// The stored value, never empty.
        value: Vec<u8>,
    },

    /// Shared prefix of every key passing through; the child is a branch.
    /// RLP: [hex_prefix(path, extension), child_ref]
    Extension {
        /// Shared prefix path, never empty.
        path: Nibbles,
        /// The branch (or unresolved reference to one) below the prefix.
        child: Box<Node>,
    },

    /// 16-way branch, one slot per nibble value.
    /// RLP: [child_ref[0], ..., child_ref[15], value]
    Branch {
        /// Child slots; `None` encodes as the empty byte string.
        children: Box<[Option<Node>; 16]>,
        /// Set when a key terminates exactly at this node.
        value: Option<Vec<u8>>,
    },

    /// A node known only by its reference until resolved.
    Unknown(NodeRef),
}

/// A trie node with its cached reference and mutation state.
///
/// Nodes built by the rewrite engine start dirty with no reference; nodes
/// materialized from the store are clean and keep the reference they were
/// reached through. A reference, once computed, stays valid because node
/// contents are never edited in place — mutation always builds fresh nodes.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) reference: Option<NodeRef>,
    pub(crate) dirty: bool,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Node {}

impl Node {
    /// A fresh dirty leaf.
    pub fn leaf(path: Nibbles, value: Vec<u8>) -> Self {
        Self {
            kind: NodeKind::Leaf { path, value },
            reference: None,
            dirty: true,
        }
    }

    /// A fresh dirty extension.
    pub fn extension(path: Nibbles, child: Node) -> Self {
        Self {
            kind: NodeKind::Extension {
                path,
                child: Box::new(child),
            },
            reference: None,
            dirty: true,
        }
    }

    /// A fresh dirty branch.
    pub fn branch(children: Box<[Option<Node>; 16]>, value: Option<Vec<u8>>) -> Self {
        Self {
            kind: NodeKind::Branch { children, value },
            reference: None,
            dirty: true,
        }
    }

    /// A clean placeholder for a node known only by reference.
    pub fn unknown(reference: NodeRef) -> Self {
        Self {
            kind: NodeKind::Unknown(reference.clone()),
            reference: Some(reference),
            dirty: false,
        }
    }

    /// An all-empty branch child array.
    pub fn empty_children() -> Box<[Option<Node>; 16]> {
        Box::new(std::array::from_fn(|_| None))
    }

    /// The node's shape.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node has been produced by mutation and not yet committed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // =========================================================================
    // LAZY RESOLUTION
    // =========================================================================

    /// Materialize an `Unknown` node from the store, leaving concrete nodes
    /// untouched.
    pub fn resolve<S: NodeStore>(
        &mut self,
        store: &S,
        cache: &mut NodeCache,
    ) -> Result<(), TrieError> {
        let NodeKind::Unknown(reference) = &self.kind else {
            return Ok(());
        };

        let kind = match reference {
            NodeRef::Inline(raw) => Node::decode(raw)?,
            NodeRef::Hash(hash) => {
                if let Some(cached) = cache.get(hash) {
                    cached.kind.clone()
                } else {
                    tracing::trace!("resolving trie node {} from store", hex::encode(hash));
                    let encoded = store
                        .get_node(hash)?
                        .ok_or(TrieError::MissingNode(*hash))?;
                    let kind = Node::decode(&encoded)?;
                    cache.put(
                        *hash,
                        Node {
                            kind: kind.clone(),
                            reference: Some(NodeRef::Hash(*hash)),
                            dirty: false,
                        },
                    );
                    kind
                }
            }
        };

        self.kind = kind;
        Ok(())
    }

    // =========================================================================
    // SERIALIZATION
    // =========================================================================

    /// RLP-encode this node. Child references are computed (and cached)
    /// on the way.
    pub(crate) fn encode(&mut self) -> Result<Vec<u8>, TrieError> {
        let payload = match &mut self.kind {
            NodeKind::Leaf { path, value } => {
                let mut payload = rlp::encode_bytes(&path.encode_hex_prefix(true));
                payload.extend(rlp::encode_bytes(value));
                payload
            }

            NodeKind::Extension { path, child } => {
                let mut payload = rlp::encode_bytes(&path.encode_hex_prefix(false));
                child.node_key()?.write_to(&mut payload);
                payload
            }

            NodeKind::Branch { children, value } => {
                let mut payload = Vec::with_capacity(17 * 33);
                for child in children.iter_mut() {
                    match child {
                        Some(child) => child.node_key()?.write_to(&mut payload),
                        None => payload.push(rlp::EMPTY_STRING_CODE),
                    }
                }
                payload.extend(rlp::encode_bytes(value.as_deref().unwrap_or(&[])));
                payload
            }

            NodeKind::Unknown(NodeRef::Inline(raw)) => return Ok(raw.clone()),
            NodeKind::Unknown(NodeRef::Hash(_)) => {
                return Err(TrieError::InvariantViolation(
                    "encoding an unresolved node",
                ))
            }
        };
        Ok(rlp::wrap_list(payload))
    }

    /// Compute and cache this node's reference: the raw RLP when shorter
    /// than 32 bytes, its Keccak256 hash otherwise. Idempotent.
    pub fn node_key(&mut self) -> Result<NodeRef, TrieError> {
        if let Some(reference) = &self.reference {
            return Ok(reference.clone());
        }
        let encoded = self.encode()?;
        let reference = if encoded.len() < 32 {
            NodeRef::Inline(encoded)
        } else {
            NodeRef::Hash(rlp::keccak256(&encoded))
        };
        self.reference = Some(reference.clone());
        Ok(reference)
    }

    /// Decode a node from its RLP encoding.
    ///
    /// A 17-item list is a branch; a 2-item list is a leaf or extension,
    /// discriminated by the hex-prefix flag. Anything else is malformed.
    pub fn decode(bytes: &[u8]) -> Result<NodeKind, TrieError> {
        let items = rlp::decode_list(bytes)?;
        match items.len() {
            17 => {
                let mut children = Node::empty_children();
                for (slot, item) in children.iter_mut().zip(&items[..16]) {
                    *slot = decode_child(item)?;
                }
                let value = match items[16] {
                    Item::Str(value) if value.is_empty() => None,
                    Item::Str(value) => Some(value.to_vec()),
                    Item::List(_) => {
                        return Err(TrieError::MalformedNode(
                            "branch value must be a byte string".to_string(),
                        ))
                    }
                };
                Ok(NodeKind::Branch { children, value })
            }

            2 => {
                let Item::Str(encoded_path) = items[0] else {
                    return Err(TrieError::MalformedNode(
                        "node path must be a byte string".to_string(),
                    ));
                };
                let (path, is_leaf) = Nibbles::decode_hex_prefix(encoded_path)?;
                if is_leaf {
                    let Item::Str(value) = items[1] else {
                        return Err(TrieError::MalformedNode(
                            "leaf value must be a byte string".to_string(),
                        ));
                    };
                    Ok(NodeKind::Leaf {
                        path,
                        value: value.to_vec(),
                    })
                } else {
                    if path.is_empty() {
                        return Err(TrieError::MalformedNode(
                            "extension with empty path".to_string(),
                        ));
                    }
                    let child = decode_child(&items[1])?.ok_or_else(|| {
                        TrieError::MalformedNode("extension without a child".to_string())
                    })?;
                    Ok(NodeKind::Extension {
                        path,
                        child: Box::new(child),
                    })
                }
            }

            count => Err(TrieError::MalformedNode(format!(
                "expected 2 or 17 list items, got {count}"
            ))),
        }
    }
}

/// Decode one child reference slot.
fn decode_child(item: &Item<'_>) -> Result<Option<Node>, TrieError> {
    match *item {
        Item::Str(bytes) if bytes.is_empty() => Ok(None),
        Item::Str(bytes) if bytes.len() == 32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(bytes);
            Ok(Some(Node::unknown(NodeRef::Hash(hash))))
        }
        Item::Str(_) => Err(TrieError::MalformedNode(
            "child reference must be empty, a 32-byte hash, or an embedded node".to_string(),
        )),
        Item::List(raw) if raw.len() < 32 => {
            Ok(Some(Node::unknown(NodeRef::Inline(raw.to_vec()))))
        }
        Item::List(_) => Err(TrieError::MalformedNode(
            "embedded node must be shorter than 32 bytes".to_string(),
        )),
    }
}
