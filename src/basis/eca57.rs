use serde::{Deserialize, Serialize};

use crate::error::{BadGateSnafu, Result};
use snafu::ensure;

/// ECA Rule 57 gate: `target ^= ctrl1 OR NOT ctrl2`.
///
/// `ctrl1` is an active-high control, `ctrl2` an active-low one; the target
/// flips whenever `ctrl1 | !ctrl2` holds. The gate is self-inverse.
///
/// Control condition:
/// ```text
/// c1 c2 | c1 OR NOT c2
///  0  0 | 1
///  0  1 | 0
///  1  0 | 1
///  1  1 | 1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eca57Gate {
    pub target: u8,
    pub ctrl1: u8,
    pub ctrl2: u8,
}

impl Eca57Gate {
    /// Build a gate, rejecting duplicate wires.
    pub fn new(target: u8, ctrl1: u8, ctrl2: u8) -> Result<Self> {
        ensure!(
            target != ctrl1 && target != ctrl2 && ctrl1 != ctrl2,
            BadGateSnafu {
                message: format!("eca57 wires must be distinct: ({target}, {ctrl1}, {ctrl2})"),
            }
        );
        Ok(Self {
            target,
            ctrl1,
            ctrl2,
        })
    }

    pub(crate) fn check_width(&self, width: usize) -> Result<()> {
        let w = width as u16;
        for wire in [self.target, self.ctrl1, self.ctrl2] {
            ensure!(
                u16::from(wire) < w,
                BadGateSnafu {
                    message: format!("eca57 wire {wire} out of range for width {width}"),
                }
            );
        }
        Ok(())
    }

    /// Wires in the order canonicalization visits them.
    pub fn wires(&self) -> [u8; 3] {
        [self.target, self.ctrl1, self.ctrl2]
    }

    /// Two ECA57 gates commute iff their wire sets are disjoint.
    pub fn commutes(&self, other: &Eca57Gate) -> bool {
        let theirs = other.wires();
        self.wires().iter().all(|w| !theirs.contains(w))
    }

    pub(crate) fn relabel(&self, map: impl Fn(u8) -> u8) -> Eca57Gate {
        Eca57Gate {
            target: map(self.target),
            ctrl1: map(self.ctrl1),
            ctrl2: map(self.ctrl2),
        }
    }

    pub(crate) fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.target, self.ctrl1, self.ctrl2]);
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<(Eca57Gate, usize)> {
        ensure!(
            bytes.len() >= 3,
            BadGateSnafu {
                message: format!("truncated eca57 gate: {} bytes left", bytes.len()),
            }
        );
        let gate = Eca57Gate::new(bytes[0], bytes[1], bytes[2])?;
        Ok((gate, 3))
    }
}

/// Enumerate every ECA57 gate on `width` wires, `width * (width-1) * (width-2)`
/// in total.
pub fn all_gates(width: usize) -> Vec<Eca57Gate> {
    let mut gates = Vec::new();
    for target in 0..width as u8 {
        for ctrl1 in 0..width as u8 {
            if ctrl1 == target {
                continue;
            }
            for ctrl2 in 0..width as u8 {
                if ctrl2 == target || ctrl2 == ctrl1 {
                    continue;
                }
                gates.push(Eca57Gate {
                    target,
                    ctrl1,
                    ctrl2,
                });
            }
        }
    }
    gates
}
