//! SHA-256 Merkle tree over the eligibility set.
//!
//! Uses domain-separated hashing to prevent second-preimage attacks:
//! - Leaf hash: `SHA256(0x00 || tier_be32 || identifier)`
//! - Internal node: `SHA256(0x01 || left || right)`
//!
//! Leaves are placed in canonical (byte-wise ascending) order before the
//! tree is built, so the root depends only on the eligibility *set*, not on
//! the order the list was assembled in. Odd-length levels are padded by
//! duplicating the last element. Every tree has at least one pairing level,
//! so a single-member set still yields a one-step proof.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::MerkleError;
use crate::types::{Hash256, Tier};

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// Compute the leaf hash for an eligibility entry.
///
/// The tier is part of the preimage, so a proof for `(identifier, 2)` can
/// never be replayed as a proof for `(identifier, 0)`.
pub fn leaf_hash(identifier: &[u8], tier: Tier) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(tier.to_be_bytes());
    hasher.update(identifier);
    Hash256(hasher.finalize().into())
}

/// Compute a domain-separated internal node hash: `SHA256(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Sort leaves canonically and reject empty or repeated input.
fn canonical_leaves(leaves: &[Hash256]) -> Result<Vec<Hash256>, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyInput);
    }
    let mut sorted = leaves.to_vec();
    sorted.sort_unstable();
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(MerkleError::DuplicateLeaf(pair[0].to_hex()));
    }
    Ok(sorted)
}

/// Compute the next layer of the tree from the current one.
///
/// Pairs adjacent hashes with [`node_hash`]. Duplicates the last element
/// when the layer has an odd number of entries.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Compute the root of a leaf set without keeping intermediate levels.
pub fn merkle_root(leaves: &[Hash256]) -> Result<Hash256, MerkleError> {
    let mut current = canonical_leaves(leaves)?;
    loop {
        current = next_layer(&current);
        if current.len() == 1 {
            return Ok(current[0]);
        }
    }
}

/// Full Merkle tree supporting root computation and proof generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` = sorted leaf hashes, `levels[last]` = `[root]`.
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    ///
    /// # Errors
    ///
    /// - [`MerkleError::EmptyInput`] if `leaves` is empty
    /// - [`MerkleError::DuplicateLeaf`] if a leaf hash appears twice
    pub fn build(leaves: &[Hash256]) -> Result<Self, MerkleError> {
        let mut levels = vec![canonical_leaves(leaves)?];
        loop {
            let next = next_layer(&levels[levels.len() - 1]);
            let done = next.len() == 1;
            levels.push(next);
            if done {
                break;
            }
        }
        Ok(Self { levels })
    }

    /// The Merkle root.
    pub fn root(&self) -> Hash256 {
        // build() guarantees a non-empty final level.
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels below the root, i.e. the length of every proof.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// All levels, leaves first.
    pub fn levels(&self) -> &[Vec<Hash256>] {
        &self.levels
    }

    /// Leaf hashes in canonical order.
    pub fn leaves(&self) -> &[Hash256] {
        &self.levels[0]
    }

    /// Whether `leaf` is a member of the tree.
    pub fn contains(&self, leaf: &Hash256) -> bool {
        self.levels[0].binary_search(leaf).is_ok()
    }

    /// Generate a membership proof for `leaf`.
    ///
    /// Returns [`MerkleError::NotFound`] if the leaf is not in level 0.
    pub fn prove_membership(&self, leaf: &Hash256) -> Result<MerkleProof, MerkleError> {
        let mut pos = self.levels[0]
            .binary_search(leaf)
            .map_err(|_| MerkleError::NotFound)?;

        let mut path = Vec::with_capacity(self.depth());
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_pos = pos ^ 1;
            let sibling = if sibling_pos < level.len() {
                level[sibling_pos]
            } else {
                // Odd level: last element's sibling is itself (duplication)
                level[pos]
            };

            let side = if pos % 2 == 0 {
                Side::Right
            } else {
                Side::Left
            };

            path.push(ProofStep {
                hash: sibling,
                side,
            });
            pos /= 2;
        }

        Ok(MerkleProof { path })
    }
}

/// Which side a sibling hash is on relative to the current node.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is on the left (we are on the right).
    Left,
    /// Sibling is on the right (we are on the left).
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown proof direction: {other:?}")),
        }
    }
}

/// A single step in a Merkle inclusion proof.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ProofStep {
    /// The sibling hash at this level of the tree.
    pub hash: Hash256,
    /// Which side the sibling is on.
    pub side: Side,
}

/// Merkle membership proof: sibling hashes from the leaf level up to the root.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleProof {
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root implied by this proof for `leaf`.
    ///
    /// Returns `None` for an empty proof.
    pub fn compute_root(&self, leaf: &Hash256) -> Option<Hash256> {
        if self.path.is_empty() {
            return None;
        }
        let mut current = *leaf;
        for step in &self.path {
            current = match step.side {
                Side::Left => node_hash(&step.hash, &current),
                Side::Right => node_hash(&current, &step.hash),
            };
        }
        Some(current)
    }

    /// Verify this proof for `leaf` against an expected root.
    pub fn verify(&self, leaf: &Hash256, root: &Hash256) -> bool {
        verify(self, leaf, root)
    }
}

/// Fold `proof` from `leaf` and compare the result to `root`.
///
/// An empty proof never verifies.
pub fn verify(proof: &MerkleProof, leaf: &Hash256, root: &Hash256) -> bool {
    proof.compute_root(leaf).is_some_and(|computed| computed == *root)
}
