//! Canonical, content-derived identity of expression nodes.
//!
//! `hash(node) = H(tag || payload || hash(child)...)`. Variables hash the
//! content of the base dataset they reference rather than the local ref, so a
//! subexpression keeps its identity across tokens whose registries order the
//! same datasets differently.

use super::node::ExprNode;
use crate::store::BaseDataset;
use std::fmt;

/// Bumped whenever the preimage layout below changes.
pub const CANONICAL_FORMAT: u8 = 1;

/// A 256-bit structural hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHash([u8; 32]);

impl NodeHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self { Self(bytes) }
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash(#{})", self.short_hex())
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.short_hex())
    }
}

/// Digest used to turn a canonical preimage into a [`NodeHash`].
///
/// Pluggable in the same spirit as the dataset `hash_type`: an arena fixes one
/// hasher for its lifetime.
pub trait NodeHasher: Send + Sync + fmt::Debug {
    fn digest(&self, preimage: &[u8]) -> NodeHash;
}

/// BLAKE3-256, the default node hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn digest(&self, preimage: &[u8]) -> NodeHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[CANONICAL_FORMAT]);
        hasher.update(preimage);
        NodeHash(*hasher.finalize().as_bytes())
    }
}

/// Builds the canonical preimage of `node`.
///
/// `dataset` must be the dataset a variable refers to; `child_hash` resolves
/// the already-computed hash of a child id.
pub fn preimage(
    node: &ExprNode,
    dataset: Option<&BaseDataset>,
    child_hash: impl Fn(usize) -> NodeHash,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(72);
    out.push(node.opcode());
    match node {
        ExprNode::Variable { component, .. } => {
            if let Some(d) = dataset {
                out.extend_from_slice(&d.hash_type.to_be_bytes());
                out.push(d.hash_bytes.len() as u8);
                out.extend_from_slice(&d.hash_bytes);
            }
            out.push(component.0);
        }
        ExprNode::Constant(value) => {
            let bytes = value.to_bytes();
            out.push(value.value_type() as u8);
            out.push(bytes.len() as u8);
            out.extend_from_slice(&bytes);
        }
        ExprNode::Unary { child, .. } => {
            out.extend_from_slice(child_hash(child.index()).as_bytes());
        }
        ExprNode::Binary { lhs, rhs, .. } => {
            out.extend_from_slice(child_hash(lhs.index()).as_bytes());
            out.extend_from_slice(child_hash(rhs.index()).as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hex_is_first_six_bytes() {
        let mut bytes = [0u8; 32];
        bytes[..6].copy_from_slice(&[0x00, 0x1f, 0xa0, 0xff, 0x42, 0x07]);
        let hash = NodeHash::from_bytes(bytes);
        assert_eq!(hash.short_hex(), "001fa0ff4207");
        assert_eq!(hash.to_string(), "#001fa0ff4207");
    }

    #[test]
    fn test_blake3_digest_is_versioned() {
        let digest = Blake3Hasher.digest(b"preimage");
        let mut expected = blake3::Hasher::new();
        expected.update(&[CANONICAL_FORMAT]);
        expected.update(b"preimage");
        assert_eq!(digest.as_bytes(), expected.finalize().as_bytes());
    }
}
