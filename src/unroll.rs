//! Equivalence-class expansion ("unroll").
//!
//! From one seed circuit, enumerate everything reachable by mirror, cyclic
//! rotation, wire permutation, and adjacent commuting-gate swaps. All four
//! transforms preserve the identity property (rotation because the seed is
//! an identity, mirror because gates are self-inverse, permutation because
//! it is wire relabeling, swap because only commuting neighbors exchange).
//!
//! Every yielded variant carries a bitfield of the transforms that produced
//! it. The swap BFS dedups its frontier by canonical hash; the final variant
//! list dedups by exact gate sequence, since relabeled variants are distinct
//! circuits (the store collapses them again by canonical hash).

use std::collections::VecDeque;

use hashbrown::HashSet;
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::error::Result;

pub const OP_MIRROR: u32 = 1 << 0;
pub const OP_PERMUTE: u32 = 1 << 1;
pub const OP_ROTATE: u32 = 1 << 2;
pub const OP_SWAP: u32 = 1 << 3;

/// Render an ops bitfield for logs and reports.
pub fn ops_to_string(ops: u32) -> String {
    let mut parts = Vec::new();
    if ops & OP_MIRROR != 0 {
        parts.push("mirror");
    }
    if ops & OP_PERMUTE != 0 {
        parts.push("permute");
    }
    if ops & OP_ROTATE != 0 {
        parts.push("rotate");
    }
    if ops & OP_SWAP != 0 {
        parts.push("swap");
    }
    if parts.is_empty() {
        "seed".to_string()
    } else {
        parts.join("+")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnrollConfig {
    pub mirror: bool,
    pub rotate: bool,
    pub permute: bool,
    pub swap_bfs: bool,
    /// Node budget for the commuting-swap BFS, per variant.
    pub swap_bfs_budget: usize,
    /// Wire permutations are truncated to the first N in lexicographic
    /// order; relevant for large widths where w! explodes.
    pub max_permutations: usize,
}

impl Default for UnrollConfig {
    fn default() -> Self {
        Self {
            mirror: true,
            rotate: true,
            permute: true,
            swap_bfs: true,
            swap_bfs_budget: 1000,
            max_permutations: 24,
        }
    }
}

/// BFS over the graph whose nodes are gate orderings and whose edges swap
/// adjacent commuting gates. Halts when the swap relation closes or the
/// node budget is spent.
fn swap_space_bfs(start: &Circuit, budget: usize) -> Result<Vec<Circuit>> {
    let mut visited: HashSet<[u8; 32]> = HashSet::new();
    visited.insert(start.canonical_hash()?);
    let mut queue = VecDeque::from([start.clone()]);
    let mut reached = Vec::new();

    while let Some(current) = queue.pop_front() {
        if reached.len() >= budget {
            break;
        }
        for index in 0..current.gate_count().saturating_sub(1) {
            if !current.swappable(index) {
                continue;
            }
            let swapped = current.swap(index);
            let hash = swapped.canonical_hash()?;
            if visited.insert(hash) {
                queue.push_back(swapped);
            }
        }
        reached.push(current);
    }
    Ok(reached)
}

/// Expand a seed into its variant set. Yields `(variant, ops)` pairs with
/// the seed itself first, carrying `ops == 0` (or `OP_SWAP` when the BFS
/// pass is enabled, since the unchanged ordering also flows through it).
pub fn unroll(seed: &Circuit, config: &UnrollConfig) -> Result<Vec<(Circuit, u32)>> {
    let n = seed.gate_count();
    let mut base: Vec<(Circuit, u32)> = vec![(seed.clone(), 0)];

    if config.mirror {
        base.push((seed.mirror(), OP_MIRROR));
    }

    if config.rotate && n > 1 {
        for shift in 1..n {
            let rotated = seed.rotate(shift);
            base.push((rotated.clone(), OP_ROTATE));
            if config.mirror {
                base.push((rotated.mirror(), OP_ROTATE | OP_MIRROR));
            }
        }
    }

    if config.permute {
        let width = seed.width() as u8;
        let identity: Vec<u8> = (0..width).collect();
        let mut permuted = Vec::new();
        for perm in (0..width)
            .permutations(width as usize)
            .take(config.max_permutations)
        {
            if perm == identity {
                continue;
            }
            for (variant, ops) in &base {
                permuted.push((variant.permute(&perm)?, ops | OP_PERMUTE));
            }
        }
        base.append(&mut permuted);
    }

    let expanded: Vec<(Circuit, u32)> = if config.swap_bfs {
        let budget = config.swap_bfs_budget;
        let per_variant: Vec<Vec<(Circuit, u32)>> = base
            .par_iter()
            .map(|(variant, ops)| {
                swap_space_bfs(variant, budget)
                    .map(|list| list.into_iter().map(|c| (c, ops | OP_SWAP)).collect())
            })
            .collect::<Result<_>>()?;
        per_variant.into_iter().flatten().collect()
    } else {
        base
    };

    // final dedup is by exact gate sequence: relabeled variants share a
    // canonical hash but are distinct circuits, and the enumeration loop
    // needs every concrete sequence for its exclusion clauses
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut unique = Vec::new();
    for (variant, ops) in expanded {
        if seen.insert(crate::basis::encode_gates(variant.gates())) {
            unique.push((variant, ops));
        }
    }
    Ok(unique)
}
