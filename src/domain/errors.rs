//! # Trie Error Types
//!
//! Defines all error conditions for trie operations.
//!
//! Traversal aborts on the first error without touching committed state.
//! In-memory dirty state may be left partially rewritten after a failure;
//! callers should reset the trie to a known root rather than continue
//! mutating it.

use super::nibbles::Nibbles;
use super::Hash;
use thiserror::Error;

/// Trie operation errors.
#[derive(Debug, Error)]
pub enum TrieError {
    /// The store returned nothing for a referenced node hash.
    /// Unrecoverable within the current operation.
    #[error("missing trie node {}", hex::encode(.0))]
    MissingNode(Hash),

    /// RLP or path decoding failed while materializing a node.
    /// Indicates store corruption or a foreign encoding.
    #[error("malformed trie node: {0}")]
    MalformedNode(String),

    /// A checked delete targeted a key that is not present.
    /// The trie is left exactly as it was found.
    #[error("delete of missing key at nibble path {0:?}")]
    MissingDeleteKey(Nibbles),

    /// Internal structural bug, e.g. a leaf surfacing as an ancestor.
    /// Fatal; the in-memory tree can no longer be trusted.
    #[error("trie structure violated: {0}")]
    InvariantViolation(&'static str),

    /// One or more parallel commit workers failed.
    /// Wraps every worker error for inspection.
    #[error("commit failed in {} parallel worker(s)", .0.len())]
    CommitFailed(Vec<TrieError>),

    /// Persistence layer error from the backing store.
    #[error("database error: {0}")]
    Database(String),

    /// A store lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}
