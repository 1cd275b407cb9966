//! A circuit is an ordered gate sequence over a fixed number of wires.
//!
//! Besides construction and evaluation this carries the identity-preserving
//! transforms the unroll engine is built from: rotation, mirror, wire
//! permutation, and adjacent commuting swaps.

use snafu::ensure;

use crate::basis::{self, BasisKind, Gate};
use crate::error::{BadGateSnafu, BadInputSnafu, Result};
use crate::truth_table::TruthTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Circuit {
    basis: BasisKind,
    width: usize,
    gates: Vec<Gate>,
}

impl Circuit {
    pub fn new(basis: BasisKind, width: usize) -> Result<Self> {
        ensure!(
            width >= basis.min_width(),
            BadInputSnafu {
                message: format!(
                    "{} circuits need at least {} wires, got {width}",
                    basis.name(),
                    basis.min_width()
                ),
            }
        );
        ensure!(
            width <= 255,
            BadInputSnafu {
                message: format!("width {width} exceeds the 255-wire encoding limit"),
            }
        );
        Ok(Self {
            basis,
            width,
            gates: Vec::new(),
        })
    }

    pub fn from_gates(basis: BasisKind, width: usize, gates: Vec<Gate>) -> Result<Self> {
        let mut circuit = Self::new(basis, width)?;
        for gate in gates {
            circuit.push(gate)?;
        }
        Ok(circuit)
    }

    pub fn push(&mut self, gate: Gate) -> Result<()> {
        ensure!(
            gate.basis() == self.basis,
            BadGateSnafu {
                message: format!(
                    "{} gate pushed into a {} circuit",
                    gate.basis().name(),
                    self.basis.name()
                ),
            }
        );
        gate.check_width(self.width)?;
        self.gates.push(gate);
        Ok(())
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn truth_table(&self) -> TruthTable {
        let mut tt = TruthTable::new(self.width);
        for gate in &self.gates {
            tt.apply_gate(gate);
        }
        tt
    }

    pub fn is_identity(&self) -> bool {
        self.truth_table().is_identity()
    }

    pub fn canonicalize(&self) -> Result<(Circuit, [u8; 32])> {
        let (gates, hash) = basis::canonicalize(self.basis, &self.gates, self.width)?;
        Ok((
            Circuit {
                basis: self.basis,
                width: self.width,
                gates,
            },
            hash,
        ))
    }

    pub fn canonical_hash(&self) -> Result<[u8; 32]> {
        basis::canonical_hash(self.basis, &self.gates, self.width)
    }

    /// Cyclic rotation: `rotate(1)` moves the first gate to the end.
    /// Preserves the identity property of identity circuits.
    pub fn rotate(&self, shift: usize) -> Circuit {
        if self.gates.is_empty() {
            return self.clone();
        }
        let shift = shift % self.gates.len();
        let mut gates = Vec::with_capacity(self.gates.len());
        gates.extend_from_slice(&self.gates[shift..]);
        gates.extend_from_slice(&self.gates[..shift]);
        Circuit {
            basis: self.basis,
            width: self.width,
            gates,
        }
    }

    /// Mirror: reversed order with every gate inverted. Since both bases
    /// are self-inverse this is plain reversal.
    pub fn mirror(&self) -> Circuit {
        let gates = self.gates.iter().rev().map(Gate::invert).collect();
        Circuit {
            basis: self.basis,
            width: self.width,
            gates,
        }
    }

    /// Relabel wires: `perm[old] = new`. The permutation must cover the full
    /// width exactly once.
    pub fn permute(&self, perm: &[u8]) -> Result<Circuit> {
        ensure!(
            perm.len() == self.width,
            BadInputSnafu {
                message: format!(
                    "permutation of length {} applied to width {}",
                    perm.len(),
                    self.width
                ),
            }
        );
        let mut seen = vec![false; self.width];
        for &p in perm {
            let p = p as usize;
            ensure!(
                p < self.width && !seen[p],
                BadInputSnafu {
                    message: format!("{perm:?} is not a permutation of 0..{}", self.width),
                }
            );
            seen[p] = true;
        }
        let gates = self
            .gates
            .iter()
            .map(|g| g.relabel(|w| perm[w as usize]))
            .collect();
        Ok(Circuit {
            basis: self.basis,
            width: self.width,
            gates,
        })
    }

    /// Whether the gates at `index` and `index + 1` commute (and are not
    /// identical, in which case swapping is a no-op).
    pub fn swappable(&self, index: usize) -> bool {
        if index + 1 >= self.gates.len() {
            return false;
        }
        let (a, b) = (&self.gates[index], &self.gates[index + 1]);
        a != b && a.commutes(b)
    }

    /// Swap adjacent gates at `index`; callers check [`Self::swappable`].
    pub fn swap(&self, index: usize) -> Circuit {
        let mut gates = self.gates.clone();
        gates.swap(index, index + 1);
        Circuit {
            basis: self.basis,
            width: self.width,
            gates,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Circuit {
        Circuit {
            basis: self.basis,
            width: self.width,
            gates: self.gates[start..end].to_vec(),
        }
    }

    /// The prefix slice used as a witness: `gc / 2 + 1` gates, the minimum
    /// sufficient to recognize the template embedded in a longer circuit.
    pub fn witness_prefix(&self) -> Circuit {
        self.slice(0, self.gates.len() / 2 + 1)
    }

    /// Contiguous-subsequence containment at equal width.
    pub fn contains(&self, sub: &Circuit) -> bool {
        if sub.basis != self.basis || sub.width != self.width {
            return false;
        }
        if sub.gates.is_empty() {
            return true;
        }
        self.gates
            .windows(sub.gates.len())
            .any(|window| window == sub.gates.as_slice())
    }

    /// Insert an untouched wire at `line`; wires at or above it shift up.
    pub fn add_empty_line(&self, line: usize) -> Result<Circuit> {
        ensure!(
            line <= self.width,
            BadInputSnafu {
                message: format!("line {line} out of range for width {}", self.width),
            }
        );
        let mut circuit = Circuit::new(self.basis, self.width + 1)?;
        for gate in &self.gates {
            circuit.push(gate.relabel(|w| if (w as usize) < line { w } else { w + 1 }))?;
        }
        Ok(circuit)
    }

    /// Every way of adding spectator wires to reach `target_width`.
    pub fn empty_line_extensions(&self, target_width: usize) -> Result<Vec<Circuit>> {
        use itertools::Itertools;

        ensure!(
            target_width >= self.width,
            BadInputSnafu {
                message: format!(
                    "target width {target_width} below current width {}",
                    self.width
                ),
            }
        );
        let to_insert = target_width - self.width;
        let mut extensions = Vec::new();
        for lines in (0..target_width).combinations(to_insert) {
            let mut extended = self.clone();
            // ascending insertion keeps the chosen absolute positions valid
            for line in lines {
                extended = extended.add_empty_line(line)?;
            }
            extensions.push(extended);
        }
        Ok(extensions)
    }
}

/// Convenience constructor for ECA57 circuits from `(target, ctrl1, ctrl2)`
/// triples.
pub fn eca57_circuit(width: usize, triples: &[(u8, u8, u8)]) -> Result<Circuit> {
    let mut circuit = Circuit::new(BasisKind::Eca57, width)?;
    for &(t, c1, c2) in triples {
        circuit.push(Gate::Eca57(basis::Eca57Gate::new(t, c1, c2)?))?;
    }
    Ok(circuit)
}
