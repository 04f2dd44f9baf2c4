//! # Domain Layer
//!
//! Pure trie logic, independent of any concrete storage backend.
//!
//! ## Modules
//!
//! - `nibbles`: half-byte paths and the hex-prefix codec
//! - `rlp`: canonical serialization primitives and Keccak256
//! - `node`: the node model with lazy store resolution
//! - `trie`: traversal and the bottom-up structural rewrite
//! - `commit`: persistence protocol with optional parallel fan-out
//! - `cache`: bounded LRU accelerators
//! - `errors`: domain error types

pub mod cache;
pub mod commit;
pub mod errors;
pub mod nibbles;
pub mod node;
pub mod rlp;
pub mod trie;

pub use cache::*;
pub use commit::*;
pub use errors::*;
pub use nibbles::*;
pub use node::*;
pub use trie::*;

/// 32-byte Keccak256 digest.
pub type Hash = [u8; 32];

/// Keccak256 hash of the RLP-encoded empty byte string.
/// This is the canonical root of an empty trie.
/// Value: keccak256(RLP("")) = 0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421
pub const EMPTY_TRIE_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];
