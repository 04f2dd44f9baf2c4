use super::errors::TrieError;
use super::Hash;
use sha3::{Digest, Keccak256};

// =============================================================================
// RLP ENCODING HELPERS
// =============================================================================

/// RLP code for the empty byte string, also the encoding of an empty
/// child slot in a branch.
pub const EMPTY_STRING_CODE: u8 = 0x80;

/// RLP-encode a byte slice.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() < 56 {
        let mut result = vec![0x80 + data.len() as u8];
        result.extend_from_slice(data);
        result
    } else {
        let len_bytes = encode_length(data.len());
        let mut result = vec![0xb7 + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(data);
        result
    }
}

/// Wrap an already-encoded payload of list items in a list header.
pub fn wrap_list(payload: Vec<u8>) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + 9);
    if payload.len() < 56 {
        result.push(0xc0 + payload.len() as u8);
    } else {
        let len_bytes = encode_length(payload.len());
        result.push(0xf7 + len_bytes.len() as u8);
        result.extend_from_slice(&len_bytes);
    }
    result.extend(payload);
    result
}

/// Encode a length as minimal big-endian bytes.
fn encode_length(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let start = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[start..].to_vec()
}

/// Compute Keccak256 hash.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// =============================================================================
// RLP DECODING HELPERS
// =============================================================================

/// One decoded item of an RLP list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Item<'a> {
    /// A byte-string payload.
    Str(&'a [u8]),
    /// A nested list, kept as its full raw encoding (header included) so
    /// embedded nodes can be re-decoded or spliced verbatim.
    List(&'a [u8]),
}

/// Decode a top-level RLP list into its items.
///
/// The input must be exactly one list with no trailing bytes.
pub fn decode_list(bytes: &[u8]) -> Result<Vec<Item<'_>>, TrieError> {
    let Some(&first) = bytes.first() else {
        return Err(TrieError::MalformedNode("empty node encoding".to_string()));
    };
    let (header_len, payload_len) = match first {
        0xc0..=0xf7 => (1, (first - 0xc0) as usize),
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let payload_len = read_length(bytes.get(1..1 + len_of_len))?;
            (1 + len_of_len, payload_len)
        }
        _ => {
            return Err(TrieError::MalformedNode(
                "node encoding is not a list".to_string(),
            ))
        }
    };
    if bytes.len() != header_len + payload_len {
        return Err(TrieError::MalformedNode(
            "list length does not match payload".to_string(),
        ));
    }

    let mut items = Vec::new();
    let mut rest = &bytes[header_len..];
    while !rest.is_empty() {
        let (item, consumed) = split_item(rest)?;
        items.push(item);
        rest = &rest[consumed..];
    }
    Ok(items)
}

/// Split the next item off the front of a list payload.
fn split_item(bytes: &[u8]) -> Result<(Item<'_>, usize), TrieError> {
    let first = bytes[0];
    match first {
        0x00..=0x7f => Ok((Item::Str(&bytes[..1]), 1)),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            let payload = bytes
                .get(1..1 + len)
                .ok_or_else(|| TrieError::MalformedNode("truncated byte string".to_string()))?;
            Ok((Item::Str(payload), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            let len = read_length(bytes.get(1..1 + len_of_len))?;
            let payload = bytes
                .get(1 + len_of_len..1 + len_of_len + len)
                .ok_or_else(|| TrieError::MalformedNode("truncated byte string".to_string()))?;
            Ok((Item::Str(payload), 1 + len_of_len + len))
        }
        0xc0..=0xf7 => {
            let total = 1 + (first - 0xc0) as usize;
            let raw = bytes
                .get(..total)
                .ok_or_else(|| TrieError::MalformedNode("truncated nested list".to_string()))?;
            Ok((Item::List(raw), total))
        }
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let len = read_length(bytes.get(1..1 + len_of_len))?;
            let total = 1 + len_of_len + len;
            let raw = bytes
                .get(..total)
                .ok_or_else(|| TrieError::MalformedNode("truncated nested list".to_string()))?;
            Ok((Item::List(raw), total))
        }
    }
}

/// Read a big-endian length field.
fn read_length(bytes: Option<&[u8]>) -> Result<usize, TrieError> {
    let bytes =
        bytes.ok_or_else(|| TrieError::MalformedNode("truncated length field".to_string()))?;
    if bytes.is_empty() || bytes.len() > std::mem::size_of::<usize>() {
        return Err(TrieError::MalformedNode(
            "invalid length field".to_string(),
        ));
    }
    let mut len = 0usize;
    for &byte in bytes {
        len = (len << 8) | byte as usize;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EMPTY_TRIE_ROOT;

    #[test]
    fn test_encode_bytes_forms() {
        assert_eq!(encode_bytes(&[]), vec![0x80]);
        assert_eq!(encode_bytes(&[0x31]), vec![0x31]);
        assert_eq!(encode_bytes(&[0x80]), vec![0x81, 0x80]);
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);

        let long = vec![0xAA; 60];
        let encoded = encode_bytes(&long);
        assert_eq!(encoded[0], 0xb8);
        assert_eq!(encoded[1], 60);
        assert_eq!(&encoded[2..], &long[..]);
    }

    #[test]
    fn test_wrap_list_forms() {
        let payload = vec![0x83, b'c', b'a', b't'];
        let encoded = wrap_list(payload.clone());
        assert_eq!(encoded[0], 0xc4);
        assert_eq!(&encoded[1..], &payload[..]);

        let long_payload = vec![0x00; 60];
        let encoded = wrap_list(long_payload);
        assert_eq!(encoded[0], 0xf8);
        assert_eq!(encoded[1], 60);
    }

    #[test]
    fn test_empty_string_hash_is_empty_trie_root() {
        assert_eq!(keccak256(&[EMPTY_STRING_CODE]), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn test_decode_list_roundtrip() {
        let mut payload = encode_bytes(b"cat");
        payload.extend(encode_bytes(b"dog"));
        payload.push(EMPTY_STRING_CODE);
        let encoded = wrap_list(payload);

        let items = decode_list(&encoded).unwrap();
        assert_eq!(
            items,
            vec![
                Item::Str(b"cat"),
                Item::Str(b"dog"),
                Item::Str(&[]),
            ]
        );
    }

    #[test]
    fn test_decode_nested_list_kept_raw() {
        let inner = wrap_list(encode_bytes(b"x"));
        let mut payload = inner.clone();
        payload.extend(encode_bytes(b"y"));
        let encoded = wrap_list(payload);

        let items = decode_list(&encoded).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Item::List(&inner));
        assert_eq!(items[1], Item::Str(b"y"));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        // Not a list
        assert!(decode_list(&[0x83, b'c', b'a', b't']).is_err());
        // Empty input
        assert!(decode_list(&[]).is_err());
        // Header longer than payload
        assert!(decode_list(&[0xc5, 0x80]).is_err());
        // Trailing bytes after the declared payload
        assert!(decode_list(&[0xc1, 0x80, 0x80]).is_err());
        // Truncated item inside the payload
        assert!(decode_list(&[0xc2, 0x83, b'c']).is_err());
    }
}
