//! # Adapters Layer
//!
//! Concrete backends for the ports the trie consumes.

pub mod memory_db;

pub use memory_db::*;
