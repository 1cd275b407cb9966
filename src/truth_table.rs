//! Bit-permutation model of a reversible circuit.
//!
//! A [`TruthTable`] holds one row per input word; applying gates permutes
//! the row contents. It is the target spec for the SAT encoders and the
//! verifier for discovered circuits.

use bitvec::prelude::*;

use crate::basis::Gate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthTable {
    width: usize,
    rows: Vec<BitVec>,
}

impl TruthTable {
    /// Identity table: row `i` encodes the integer `i`, LSB first.
    pub fn new(width: usize) -> Self {
        let rows = (0..1usize << width)
            .map(|value| Self::value_to_row(value, width))
            .collect();
        Self { width, rows }
    }

    fn value_to_row(value: usize, width: usize) -> BitVec {
        let mut row = BitVec::with_capacity(width);
        for w in 0..width {
            row.push(value >> w & 1 == 1);
        }
        row
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The bit on wire `wire` for input word `row`.
    pub fn bit(&self, row: usize, wire: usize) -> bool {
        self.rows[row][wire]
    }

    /// The output word for input word `row`, LSB first.
    pub fn value(&self, row: usize) -> usize {
        self.rows[row]
            .iter()
            .enumerate()
            .fold(0, |acc, (w, b)| acc | (usize::from(*b) << w))
    }

    /// NOT on `target`.
    pub fn x(&mut self, target: usize) -> &mut Self {
        for row in &mut self.rows {
            let flipped = !row[target];
            row.set(target, flipped);
        }
        self
    }

    /// CNOT: flip `target` where `control` is set.
    pub fn cx(&mut self, control: usize, target: usize) -> &mut Self {
        for row in &mut self.rows {
            if row[control] {
                let flipped = !row[target];
                row.set(target, flipped);
            }
        }
        self
    }

    /// Multi-control Toffoli: flip `target` where all controls are set.
    pub fn mcx(&mut self, controls: &[u8], target: usize) -> &mut Self {
        for row in &mut self.rows {
            if controls.iter().all(|&c| row[c as usize]) {
                let flipped = !row[target];
                row.set(target, flipped);
            }
        }
        self
    }

    /// ECA57: flip `target` where `ctrl1 OR NOT ctrl2` holds.
    pub fn eca57(&mut self, target: usize, ctrl1: usize, ctrl2: usize) -> &mut Self {
        for row in &mut self.rows {
            if row[ctrl1] || !row[ctrl2] {
                let flipped = !row[target];
                row.set(target, flipped);
            }
        }
        self
    }

    pub fn apply_gate(&mut self, gate: &Gate) -> &mut Self {
        match gate {
            Gate::Eca57(g) => self.eca57(g.target as usize, g.ctrl1 as usize, g.ctrl2 as usize),
            Gate::Mct(g) => self.mcx(g.controls(), g.target() as usize),
        }
    }

    /// Relabel wires: `perm[old] = new`. Rewrites both the bit columns and
    /// the row order, so the table represents the same permutation with
    /// wire `w` renamed to `perm[w]` (conjugation by the bit relabeling,
    /// not a plain column move).
    pub fn permute(&self, perm: &[u8]) -> TruthTable {
        assert_eq!(perm.len(), self.width, "permutation length != width");
        let mut sorted: Vec<u8> = perm.to_vec();
        sorted.sort_unstable();
        assert!(
            sorted.iter().enumerate().all(|(w, &p)| p as usize == w),
            "{perm:?} is not a permutation of 0..{}",
            self.width
        );
        let remap = |value: usize| -> usize {
            (0..self.width).fold(0, |acc, w| acc | ((value >> w & 1) << perm[w] as usize))
        };
        let mut rows = vec![BitVec::new(); self.rows.len()];
        for i in 0..self.rows.len() {
            rows[remap(i)] = Self::value_to_row(remap(self.value(i)), self.width);
        }
        TruthTable {
            width: self.width,
            rows,
        }
    }

    /// The inverse permutation: wherever this table sends `i` to `v`, the
    /// result sends `v` back to `i`.
    pub fn inverse(&self) -> TruthTable {
        let mut rows = vec![BitVec::new(); self.rows.len()];
        for i in 0..self.rows.len() {
            rows[self.value(i)] = Self::value_to_row(i, self.width);
        }
        TruthTable {
            width: self.width,
            rows,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rows
            .iter()
            .enumerate()
            .all(|(i, row)| *row == Self::value_to_row(i, self.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_is_identity() {
        let tt = TruthTable::new(3);
        assert_eq!(tt.num_rows(), 8);
        assert!(tt.is_identity());
        for i in 0..8 {
            assert_eq!(tt.value(i), i);
        }
    }

    #[test]
    fn x_is_self_inverse() {
        let mut tt = TruthTable::new(2);
        tt.x(0);
        assert!(!tt.is_identity());
        tt.x(0);
        assert!(tt.is_identity());
    }

    #[test]
    fn cx_matches_xor_semantics() {
        let mut tt = TruthTable::new(2);
        tt.cx(0, 1);
        for i in 0..4 {
            let c = i & 1;
            let t = i >> 1 & 1;
            assert_eq!(tt.value(i), c | ((t ^ c) << 1));
        }
    }

    #[test]
    fn mcx_flips_only_on_all_controls() {
        let mut tt = TruthTable::new(3);
        tt.mcx(&[0, 1], 2);
        for i in 0..8 {
            let expected = if i & 0b011 == 0b011 { i ^ 0b100 } else { i };
            assert_eq!(tt.value(i), expected);
        }
    }

    #[test]
    fn eca57_control_condition() {
        let mut tt = TruthTable::new(3);
        tt.eca57(0, 1, 2);
        for i in 0..8 {
            let c1 = i >> 1 & 1;
            let c2 = i >> 2 & 1;
            let expected = if c1 == 1 || c2 == 0 { i ^ 1 } else { i };
            assert_eq!(tt.value(i), expected);
        }
    }

    #[test]
    fn inverse_undoes_the_permutation() {
        let mut tt = TruthTable::new(3);
        // x then cx is not an involution, so the inverse is a real test
        tt.x(0).cx(0, 1);
        let inv = tt.inverse();
        for i in 0..8 {
            assert_eq!(inv.value(tt.value(i)), i);
        }
        assert_eq!(inv.inverse(), tt);
        assert!(TruthTable::new(3).inverse().is_identity());
    }

    #[test]
    fn permute_matches_relabeled_gates() {
        // relabeling the table's wires must agree with applying the gate
        // on relabeled wires
        let perm = [2u8, 0, 1];
        let mut tt = TruthTable::new(3);
        tt.eca57(0, 1, 2);
        let permuted = tt.permute(&perm);

        let mut relabeled = TruthTable::new(3);
        relabeled.eca57(perm[0] as usize, perm[1] as usize, perm[2] as usize);
        assert_eq!(permuted, relabeled);

        // identity permutation is a no-op
        assert_eq!(tt.permute(&[0, 1, 2]), tt);
        // relabeling the identity keeps it the identity
        assert!(TruthTable::new(3).permute(&perm).is_identity());
    }

    #[test]
    fn every_gate_is_self_inverse() {
        for gate in crate::basis::eca57::all_gates(4) {
            let gate = Gate::Eca57(gate);
            let mut tt = TruthTable::new(4);
            tt.apply_gate(&gate).apply_gate(&gate);
            assert!(tt.is_identity(), "{gate:?} squared is not the identity");
        }
        for gate in crate::basis::mct::all_gates(3) {
            let gate = Gate::Mct(gate);
            let mut tt = TruthTable::new(3);
            tt.apply_gate(&gate).apply_gate(&gate);
            assert!(tt.is_identity(), "{gate:?} squared is not the identity");
        }
    }
}
