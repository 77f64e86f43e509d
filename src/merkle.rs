//! Binary Merkle root over ordered transaction identifiers.
//!
//! - A parent is `hash160(left || right)`.
//! - A level with an odd number of nodes pairs its last node with itself,
//!   including a lone leaf, so no leaf is ever its own root.
//! - The root of an empty sequence is `hash160` of the empty input.
//!
//! Duplicate-last lets `[a, b, c]` and `[a, b, c, c]` share a root; callers
//! that accept id lists from peers must reject repeated ids.
use crate::core::{hash160, hash160_pair};
use crate::types::Uint160;

/// Root of a block without transactions.
pub fn empty_root() -> Uint160 {
    hash160(&[])
}

pub fn merkle_root(leaves: &[Uint160]) -> Uint160 {
    if leaves.is_empty() {
        return empty_root();
    }
    let mut level = leaves.to_vec();
    loop {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash160_pair(left, right)
            })
            .collect();
        if level.len() == 1 {
            return level[0];
        }
    }
}
