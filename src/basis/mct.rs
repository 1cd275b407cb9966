use serde::{Deserialize, Serialize};

use crate::error::{BadGateSnafu, Result};
use snafu::ensure;

/// Multi-control Toffoli gate: `target ^= AND(controls)`.
///
/// Zero controls degenerates to X, one control to CNOT. Controls are kept
/// sorted so serialization is canonical. Self-inverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MctGate {
    controls: Vec<u8>,
    target: u8,
}

impl MctGate {
    pub fn new(mut controls: Vec<u8>, target: u8) -> Result<Self> {
        controls.sort_unstable();
        ensure!(
            controls.windows(2).all(|w| w[0] != w[1]),
            BadGateSnafu {
                message: format!("mct controls contain duplicates: {controls:?}"),
            }
        );
        ensure!(
            !controls.contains(&target),
            BadGateSnafu {
                message: format!("mct target {target} is also a control"),
            }
        );
        Ok(Self { controls, target })
    }

    pub fn controls(&self) -> &[u8] {
        &self.controls
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub(crate) fn check_width(&self, width: usize) -> Result<()> {
        let w = width as u16;
        for &wire in self.controls.iter().chain(core::iter::once(&self.target)) {
            ensure!(
                u16::from(wire) < w,
                BadGateSnafu {
                    message: format!("mct wire {wire} out of range for width {width}"),
                }
            );
        }
        Ok(())
    }

    /// Wires in the order canonicalization visits them: sorted controls,
    /// then the target.
    pub fn wires(&self) -> Vec<u8> {
        let mut wires = self.controls.clone();
        wires.push(self.target);
        wires
    }

    /// Two MCT gates commute iff neither gate's target is a control of the
    /// other. (Shared targets and shared controls are both fine.)
    pub fn commutes(&self, other: &MctGate) -> bool {
        !other.controls.contains(&self.target) && !self.controls.contains(&other.target)
    }

    pub(crate) fn relabel(&self, map: impl Fn(u8) -> u8) -> MctGate {
        let mut controls: Vec<u8> = self.controls.iter().map(|&c| map(c)).collect();
        controls.sort_unstable();
        MctGate {
            controls,
            target: map(self.target),
        }
    }

    pub(crate) fn serialize_into(&self, out: &mut Vec<u8>) {
        out.push(self.controls.len() as u8);
        out.extend_from_slice(&self.controls);
        out.push(self.target);
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<(MctGate, usize)> {
        ensure!(
            !bytes.is_empty(),
            BadGateSnafu {
                message: "truncated mct gate: empty input".to_string(),
            }
        );
        let n = bytes[0] as usize;
        let need = 1 + n + 1;
        ensure!(
            bytes.len() >= need,
            BadGateSnafu {
                message: format!("truncated mct gate: want {need} bytes, have {}", bytes.len()),
            }
        );
        let controls = bytes[1..1 + n].to_vec();
        let target = bytes[1 + n];
        let gate = MctGate::new(controls, target)?;
        Ok((gate, need))
    }
}

/// Enumerate every MCT gate on `width` wires: each target combined with
/// every subset of the remaining wires as controls.
pub fn all_gates(width: usize) -> Vec<MctGate> {
    let mut gates = Vec::new();
    for target in 0..width as u8 {
        let others: Vec<u8> = (0..width as u8).filter(|&w| w != target).collect();
        for mask in 0..(1u32 << others.len()) {
            let controls: Vec<u8> = others
                .iter()
                .enumerate()
                .filter(|(i, _)| mask >> i & 1 == 1)
                .map(|(_, &w)| w)
                .collect();
            gates.push(MctGate { controls, target });
        }
    }
    gates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_are_sorted_and_deduped() {
        let g = MctGate::new(vec![2, 0], 1).unwrap();
        assert_eq!(g.controls(), &[0, 2]);
        assert!(MctGate::new(vec![0, 0], 1).is_err());
        assert!(MctGate::new(vec![1], 1).is_err());
    }

    #[test]
    fn gate_count_matches_formula() {
        for width in 1..=5 {
            let expected = width * (1 << (width - 1));
            assert_eq!(all_gates(width).len(), expected);
        }
    }

    #[test]
    fn commutation() {
        let cx01 = MctGate::new(vec![0], 1).unwrap();
        let cx02 = MctGate::new(vec![0], 2).unwrap();
        let cx10 = MctGate::new(vec![1], 0).unwrap();
        let x0 = MctGate::new(vec![], 0).unwrap();
        // shared control only
        assert!(cx01.commutes(&cx02));
        // each targets the other's control
        assert!(!cx01.commutes(&cx10));
        // x0 targets cx01's control
        assert!(!x0.commutes(&cx01));
        // same target, no cross control
        assert!(cx01.commutes(&MctGate::new(vec![2], 1).unwrap()));
    }
}
