//! # merkle-patricia-trie
//!
//! A persistent Merkle Patricia Trie: an authenticated key/value map whose
//! 32-byte root hash commits to the entire contents.
//!
//! ## Role
//!
//! - **Authenticated map**: arbitrary byte-string keys and values, with a
//!   Keccak256 root commitment over the canonical node encoding
//! - **Pluggable persistence**: nodes live in any `NodeStore`, keyed by
//!   their hash; an in-memory adapter ships for tests and embedding
//! - **Incremental mutation**: point inserts, lookups, and deletes rebuild
//!   only the touched path; `commit` flushes exactly the dirty nodes
//!
//! ## Node Types
//!
//! Per the hex-radix trie layout:
//!
//! - **Leaf**: remaining key path + value
//! - **Extension**: shared prefix, always above a branch
//! - **Branch**: 16-way fan-out + optional value
//!
//! ## Example
//!
//! ```
//! use merkle_patricia_trie::{InMemoryNodeStore, Trie};
//!
//! let mut trie = Trie::new(InMemoryNodeStore::new());
//! trie.set(b"do", b"verb").unwrap();
//! trie.set(b"dog", b"puppy").unwrap();
//! let root = trie.commit().unwrap();
//!
//! let mut trie = Trie::new(InMemoryNodeStore::new());
//! trie.set(b"dog", b"puppy").unwrap();
//! trie.set(b"do", b"verb").unwrap();
//! assert_eq!(trie.commit().unwrap(), root);
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
