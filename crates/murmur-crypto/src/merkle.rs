//! Incremental fixed-depth Merkle tree over Poseidon.
//!
//! Leaves are addressed by insertion index in a fixed-capacity arena;
//! unfilled slots are backed by a precomputed zero ladder. The root is
//! cached and updated along the insertion path only, so `insert` is
//! O(depth) and `root` is O(1).
//!
//! Invariant: for every inserted index `i`,
//! `path(i).compute_root(leaf[i]) == root()` at any point between
//! insertions.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, poseidon_hash1_field, poseidon_hash2_fields};
use ark_bn254::Fr;
use murmur_types::{MerkleRoot, MurmurError, MurmurResult};

/// Default tree depth: capacity 2^20 members per group.
pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Authentication path for one leaf: `depth` sibling hashes plus the
/// leaf index whose bit decomposition selects the hashing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    pub siblings: Vec<Fr>,
    pub index: usize,
}

impl MerklePath {
    /// Direction bits, least-significant first: `true` means the
    /// current node is the right child at that level.
    pub fn index_bits(&self) -> Vec<bool> {
        (0..self.siblings.len())
            .map(|level| (self.index >> level) & 1 == 1)
            .collect()
    }

    /// Recombine a leaf with this path. Pure; equals the tree root the
    /// path was extracted from.
    pub fn compute_root(&self, leaf: Fr) -> MerkleRoot {
        let mut current = leaf;
        let mut idx = self.index;

        for sibling in &self.siblings {
            current = if idx & 1 == 1 {
                poseidon_hash2_fields(*sibling, current)
            } else {
                poseidon_hash2_fields(current, *sibling)
            };
            idx >>= 1;
        }

        MerkleRoot::from_bytes(fr_to_bytes(&current))
    }
}

/// Incremental Merkle tree of fixed depth `D`, capacity `2^D` leaves.
#[derive(Clone)]
pub struct MerkleTree {
    depth: usize,
    /// Filled prefix of every level; `nodes[0]` is the leaf arena.
    nodes: Vec<Vec<Fr>>,
    /// `zero_values[level]` is the hash of an all-empty subtree of
    /// that height. `zero_values[0] = Poseidon(0)`.
    zero_values: Vec<Fr>,
    root: Fr,
}

impl MerkleTree {
    pub fn new(depth: usize) -> Self {
        let mut zero_values = Vec::with_capacity(depth + 1);
        let mut current = poseidon_hash1_field(Fr::from(0u64));
        zero_values.push(current);
        for _ in 0..depth {
            current = poseidon_hash2_fields(current, current);
            zero_values.push(current);
        }

        Self {
            depth,
            nodes: vec![Vec::new(); depth],
            root: zero_values[depth],
            zero_values,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> usize {
        1usize << self.depth
    }

    pub fn len(&self) -> usize {
        self.nodes[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].is_empty()
    }

    pub fn leaves(&self) -> &[Fr] {
        &self.nodes[0]
    }

    /// Index of the first leaf equal to `leaf`, if present.
    pub fn index_of(&self, leaf: Fr) -> Option<usize> {
        self.nodes[0].iter().position(|l| *l == leaf)
    }

    pub fn index_of_bytes(&self, leaf: &[u8; 32]) -> Option<usize> {
        self.index_of(bytes_to_fr(leaf))
    }

    /// Current root. O(1); always consistent with the full `2^D` slot
    /// combination (filled leaves plus zero filler).
    pub fn root(&self) -> MerkleRoot {
        MerkleRoot::from_bytes(fr_to_bytes(&self.root))
    }

    pub fn root_field(&self) -> Fr {
        self.root
    }

    /// Append a leaf at the next free slot and recompute the root along
    /// the slot-to-root path. Fails with `CapacityExceeded` when the
    /// tree is full; state is untouched on failure.
    pub fn insert(&mut self, leaf: Fr) -> MurmurResult<usize> {
        if self.len() == self.capacity() {
            return Err(MurmurError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        let index = self.nodes[0].len();
        self.nodes[0].push(leaf);

        let mut current = leaf;
        let mut idx = index;

        for level in 0..self.depth {
            let parent = if idx & 1 == 1 {
                poseidon_hash2_fields(self.nodes[level][idx - 1], current)
            } else {
                // Right sibling slot is still empty at insertion time.
                poseidon_hash2_fields(current, self.zero_values[level])
            };

            let parent_idx = idx / 2;
            if level + 1 < self.depth {
                if parent_idx < self.nodes[level + 1].len() {
                    self.nodes[level + 1][parent_idx] = parent;
                } else {
                    self.nodes[level + 1].push(parent);
                }
            }

            current = parent;
            idx = parent_idx;
        }

        self.root = current;
        Ok(index)
    }

    pub fn insert_bytes(&mut self, leaf: &[u8; 32]) -> MurmurResult<usize> {
        self.insert(bytes_to_fr(leaf))
    }

    /// Authentication path for the leaf at `index`.
    pub fn path(&self, index: usize) -> MurmurResult<MerklePath> {
        if index >= self.len() {
            return Err(MurmurError::Internal(format!(
                "Leaf index {} out of range ({} leaves)",
                index,
                self.len()
            )));
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut idx = index;

        for level in 0..self.depth {
            let sibling_idx = idx ^ 1;
            let sibling = self.nodes[level]
                .get(sibling_idx)
                .copied()
                .unwrap_or(self.zero_values[level]);
            siblings.push(sibling);
            idx /= 2;
        }

        Ok(MerklePath { siblings, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(n: u64) -> Fr {
        Fr::from(n)
    }

    #[test]
    fn test_empty_root_deterministic() {
        let a = MerkleTree::new(4);
        let b = MerkleTree::new(4);
        assert_eq!(a.root(), b.root());
        assert_ne!(a.root().as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_insert_assigns_sequential_indices() {
        let mut tree = MerkleTree::new(4);
        assert_eq!(tree.insert(leaf(1)).unwrap(), 0);
        assert_eq!(tree.insert(leaf(2)).unwrap(), 1);
        assert_eq!(tree.insert(leaf(3)).unwrap(), 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_path_consistency_every_index() {
        let mut tree = MerkleTree::new(4);
        for n in 0..11u64 {
            tree.insert(leaf(n)).unwrap();
            // Every previously inserted leaf must still recombine to
            // the current root.
            for i in 0..tree.len() {
                let path = tree.path(i).unwrap();
                assert_eq!(path.compute_root(tree.leaves()[i]), tree.root());
            }
        }
    }

    #[test]
    fn test_capacity_exceeded_leaves_tree_unchanged() {
        let mut tree = MerkleTree::new(2);
        for n in 0..4u64 {
            tree.insert(leaf(n)).unwrap();
        }
        let root_before = tree.root();

        let err = tree.insert(leaf(99)).unwrap_err();
        assert!(matches!(
            err,
            MurmurError::CapacityExceeded { capacity: 4 }
        ));
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.root(), root_before);
    }

    #[test]
    fn test_depth2_scenario() {
        // Insert L0, L1 -> R1. Insert L2 -> R2 != R1. path(1) after 3
        // insertions recombines with L1 to R2.
        let mut tree = MerkleTree::new(2);
        tree.insert(leaf(10)).unwrap();
        tree.insert(leaf(11)).unwrap();
        let r1 = tree.root();

        tree.insert(leaf(12)).unwrap();
        let r2 = tree.root();
        assert_ne!(r1, r2);

        let path = tree.path(1).unwrap();
        assert_eq!(path.compute_root(leaf(11)), r2);
    }

    #[test]
    fn test_old_path_consistent_with_old_root_only() {
        let mut tree = MerkleTree::new(3);
        tree.insert(leaf(1)).unwrap();
        let old_path = tree.path(0).unwrap();
        let old_root = tree.root();
        assert_eq!(old_path.compute_root(leaf(1)), old_root);

        tree.insert(leaf(2)).unwrap();
        // The old pair stays internally consistent but no longer
        // matches the new root.
        assert_eq!(old_path.compute_root(leaf(1)), old_root);
        assert_ne!(old_path.compute_root(leaf(1)), tree.root());
    }

    #[test]
    fn test_index_bits() {
        let path = MerklePath {
            siblings: vec![Fr::from(0u64); 4],
            index: 0b0110,
        };
        assert_eq!(path.index_bits(), vec![false, true, true, false]);
    }

    #[test]
    fn test_path_out_of_range() {
        let tree = MerkleTree::new(3);
        assert!(tree.path(0).is_err());
    }

    #[test]
    fn test_matches_naive_full_recompute() {
        // Cross-check the incremental root against a straightforward
        // bottom-up recompute over all 2^D slots.
        let depth = 3;
        let mut tree = MerkleTree::new(depth);
        let leaves: Vec<Fr> = (0..5u64).map(leaf).collect();
        for l in &leaves {
            tree.insert(*l).unwrap();
        }

        let zero0 = poseidon_hash1_field(Fr::from(0u64));
        let mut level: Vec<Fr> = leaves.clone();
        level.resize(1 << depth, zero0);
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| poseidon_hash2_fields(pair[0], pair[1]))
                .collect();
        }

        assert_eq!(tree.root_field(), level[0]);
    }

    proptest! {
        #[test]
        fn prop_root_deterministic(values in prop::collection::vec(0u64..1_000_000, 0..16)) {
            let mut a = MerkleTree::new(5);
            let mut b = MerkleTree::new(5);
            for v in &values {
                a.insert(leaf(*v)).unwrap();
                b.insert(leaf(*v)).unwrap();
            }
            prop_assert_eq!(a.root(), b.root());
        }

        #[test]
        fn prop_paths_consistent(values in prop::collection::vec(0u64..1_000_000, 1..16)) {
            let mut tree = MerkleTree::new(5);
            for v in &values {
                tree.insert(leaf(*v)).unwrap();
            }
            for i in 0..tree.len() {
                let path = tree.path(i).unwrap();
                prop_assert_eq!(path.compute_root(tree.leaves()[i]), tree.root());
            }
        }
    }
}
