//! In-memory containers for enumeration results.
//!
//! A [`DimGroup`] holds the circuits of one `(width, gate_count)` cell; a
//! [`Collection`] owns a dense 2D table of groups. These back the `synth`
//! and `collection` commands and the JSON / compact text export formats.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::basis::{self, BasisKind, Gate};
use crate::circuit::Circuit;
use crate::error::{BadInputSnafu, Error, Result};

#[derive(Debug, Clone)]
pub struct DimGroup {
    basis: BasisKind,
    width: usize,
    gate_count: usize,
    circuits: Vec<Circuit>,
}

impl DimGroup {
    pub fn new(basis: BasisKind, width: usize, gate_count: usize) -> Self {
        Self {
            basis,
            width,
            gate_count,
            circuits: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn gate_count(&self) -> usize {
        self.gate_count
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    pub fn circuits(&self) -> &[Circuit] {
        &self.circuits
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Circuit> {
        self.circuits.iter()
    }

    pub fn push(&mut self, circuit: Circuit) -> Result<()> {
        ensure!(
            circuit.basis() == self.basis
                && circuit.width() == self.width
                && circuit.gate_count() == self.gate_count,
            BadInputSnafu {
                message: format!(
                    "circuit ({}, {}, {}) does not fit group ({}, {}, {})",
                    circuit.basis().name(),
                    circuit.width(),
                    circuit.gate_count(),
                    self.basis.name(),
                    self.width,
                    self.gate_count
                ),
            }
        );
        self.circuits.push(circuit);
        Ok(())
    }

    pub fn extend(&mut self, circuits: impl IntoIterator<Item = Circuit>) -> Result<()> {
        for circuit in circuits {
            self.push(circuit)?;
        }
        Ok(())
    }

    pub fn join(&mut self, other: DimGroup) -> Result<()> {
        self.extend(other.circuits)
    }

    /// Drop exact duplicate gate sequences.
    pub fn remove_duplicates(&mut self) {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        self.circuits
            .retain(|c| seen.insert(basis::encode_gates(c.gates())));
    }

    /// Drop circuits that contain any reductor as a contiguous subcircuit;
    /// returns how many were removed.
    pub fn remove_reducibles(&mut self, reductors: &DimGroup) -> Result<usize> {
        ensure!(
            reductors.width == self.width && reductors.gate_count <= self.gate_count,
            BadInputSnafu {
                message: format!(
                    "reductors ({}, {}) cannot reduce group ({}, {})",
                    reductors.width, reductors.gate_count, self.width, self.gate_count
                ),
            }
        );
        let before = self.circuits.len();
        self.circuits
            .retain(|c| !reductors.iter().any(|r| c.contains(r)));
        Ok(before - self.circuits.len())
    }
}

impl<'a> IntoIterator for &'a DimGroup {
    type Item = &'a Circuit;
    type IntoIter = core::slice::Iter<'a, Circuit>;

    fn into_iter(self) -> Self::IntoIter {
        self.circuits.iter()
    }
}

/// Dense 2D table of dim groups, `width x gate_count`.
#[derive(Debug, Clone)]
pub struct Collection {
    basis: BasisKind,
    max_width: usize,
    max_gate_count: usize,
    groups: Vec<Vec<DimGroup>>,
}

impl Collection {
    pub fn new(basis: BasisKind, max_width: usize, max_gate_count: usize) -> Result<Self> {
        let min_width = basis.min_width();
        ensure!(
            max_width >= min_width && max_gate_count >= 2,
            BadInputSnafu {
                message: format!(
                    "collection bounds ({max_width}, {max_gate_count}) below minimum ({min_width}, 2)"
                ),
            }
        );
        let groups = (min_width..=max_width)
            .map(|w| {
                (2..=max_gate_count)
                    .map(|gc| DimGroup::new(basis, w, gc))
                    .collect()
            })
            .collect();
        Ok(Self {
            basis,
            max_width,
            max_gate_count,
            groups,
        })
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }

    pub fn max_gate_count(&self) -> usize {
        self.max_gate_count
    }

    pub fn group(&self, width: usize, gate_count: usize) -> Option<&DimGroup> {
        let w = width.checked_sub(self.basis.min_width())?;
        let gc = gate_count.checked_sub(2)?;
        self.groups.get(w)?.get(gc)
    }

    pub fn group_mut(&mut self, width: usize, gate_count: usize) -> Option<&mut DimGroup> {
        let w = width.checked_sub(self.basis.min_width())?;
        let gc = gate_count.checked_sub(2)?;
        self.groups.get_mut(w)?.get_mut(gc)
    }

    pub fn groups(&self) -> impl Iterator<Item = &DimGroup> {
        self.groups.iter().flatten()
    }

    pub fn total_circuits(&self) -> usize {
        self.groups().map(DimGroup::len).sum()
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} collection (max_width={}, max_gate_count={})",
            self.basis.name(),
            self.max_width,
            self.max_gate_count
        )];
        for group in self.groups() {
            if !group.is_empty() {
                lines.push(format!(
                    "  [{},{}]: {} circuits",
                    group.width(),
                    group.gate_count(),
                    group.len()
                ));
            }
        }
        lines.push(format!("Total: {} circuits", self.total_circuits()));
        lines.join("\n")
    }

    /// JSON export:
    /// `{max_width, max_gate_count, groups: {"W_GC": {width, gate_count,
    /// circuits: [[[t,c1,c2], ...], ...]}}}`. The triple form is the ECA57
    /// interchange format.
    pub fn to_json(&self) -> Result<String> {
        ensure!(
            self.basis == BasisKind::Eca57,
            BadInputSnafu {
                message: "JSON export is defined for the eca57 basis".to_string(),
            }
        );
        let mut groups = BTreeMap::new();
        for group in self.groups() {
            if group.is_empty() {
                continue;
            }
            let circuits = group
                .iter()
                .map(|circuit| {
                    circuit
                        .gates()
                        .iter()
                        .map(|gate| match gate {
                            Gate::Eca57(g) => vec![g.target, g.ctrl1, g.ctrl2],
                            Gate::Mct(_) => unreachable!("basis checked above"),
                        })
                        .collect()
                })
                .collect();
            groups.insert(
                format!("{}_{}", group.width(), group.gate_count()),
                GroupJson {
                    width: group.width(),
                    gate_count: group.gate_count(),
                    circuits,
                },
            );
        }
        let doc = CollectionJson {
            max_width: self.max_width,
            max_gate_count: self.max_gate_count,
            groups,
        };
        serde_json::to_string_pretty(&doc).map_err(|source| Error::Json { source })
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let doc: CollectionJson =
            serde_json::from_str(text).map_err(|source| Error::Json { source })?;
        let mut collection = Collection::new(BasisKind::Eca57, doc.max_width, doc.max_gate_count)?;
        for group_json in doc.groups.into_values() {
            let group = collection
                .group_mut(group_json.width, group_json.gate_count)
                .ok_or_else(|| Error::BadInput {
                    message: format!(
                        "group ({}, {}) outside collection bounds",
                        group_json.width, group_json.gate_count
                    ),
                })?;
            for triples in group_json.circuits {
                let mut circuit = Circuit::new(BasisKind::Eca57, group_json.width)?;
                for triple in triples {
                    ensure!(
                        triple.len() == 3,
                        BadInputSnafu {
                            message: format!("gate triple has {} entries", triple.len()),
                        }
                    );
                    circuit.push(Gate::Eca57(basis::Eca57Gate::new(
                        triple[0], triple[1], triple[2],
                    )?))?;
                }
                group.push(circuit)?;
            }
        }
        Ok(collection)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Compact text dump: a `#` header, then one `W,GC:t,c1,c2;...` line
    /// per circuit.
    pub fn to_compact(&self) -> String {
        let mut out = format!(
            "# {} identity collection max_width={} max_gate_count={}\n",
            self.basis.name(),
            self.max_width,
            self.max_gate_count
        );
        for group in self.groups() {
            for circuit in group {
                let gates = circuit
                    .gates()
                    .iter()
                    .map(|gate| {
                        gate.touched_wires()
                            .iter()
                            .map(u8::to_string)
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                out.push_str(&format!(
                    "{},{}:{}\n",
                    group.width(),
                    group.gate_count(),
                    gates
                ));
            }
        }
        out
    }

    pub fn save_compact(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_compact()).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct CollectionJson {
    max_width: usize,
    max_gate_count: usize,
    groups: BTreeMap<String, GroupJson>,
}

#[derive(Serialize, Deserialize)]
struct GroupJson {
    width: usize,
    gate_count: usize,
    circuits: Vec<Vec<Vec<u8>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::eca57_circuit;

    #[test]
    fn dim_group_validates_dimensions() {
        let mut dg = DimGroup::new(BasisKind::Eca57, 3, 2);
        dg.push(eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap())
            .unwrap();
        assert!(dg
            .push(eca57_circuit(3, &[(0, 1, 2)]).unwrap())
            .is_err());
        assert_eq!(dg.len(), 1);
    }

    #[test]
    fn remove_duplicates_keeps_first() {
        let mut dg = DimGroup::new(BasisKind::Eca57, 3, 2);
        let c = eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap();
        dg.push(c.clone()).unwrap();
        dg.push(c).unwrap();
        dg.push(eca57_circuit(3, &[(1, 0, 2), (1, 0, 2)]).unwrap())
            .unwrap();
        dg.remove_duplicates();
        assert_eq!(dg.len(), 2);
    }

    #[test]
    fn remove_reducibles_filters_containing_circuits() {
        let mut group = DimGroup::new(BasisKind::Eca57, 3, 4);
        // contains the g;g reductor
        group
            .push(eca57_circuit(3, &[(0, 1, 2), (0, 1, 2), (1, 2, 0), (1, 2, 0)]).unwrap())
            .unwrap();
        // interleaved: does not contain it contiguously
        group
            .push(eca57_circuit(3, &[(0, 1, 2), (1, 2, 0), (0, 1, 2), (1, 2, 0)]).unwrap())
            .unwrap();
        let mut reductors = DimGroup::new(BasisKind::Eca57, 3, 2);
        reductors
            .push(eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap())
            .unwrap();
        let removed = group.remove_reducibles(&reductors).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn json_round_trip() {
        let mut collection = Collection::new(BasisKind::Eca57, 3, 2).unwrap();
        collection
            .group_mut(3, 2)
            .unwrap()
            .push(eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap())
            .unwrap();
        let json = collection.to_json().unwrap();
        assert!(json.contains("\"3_2\""));
        let back = Collection::from_json(&json).unwrap();
        assert_eq!(back.total_circuits(), 1);
        assert_eq!(
            back.group(3, 2).unwrap().circuits()[0].gates(),
            collection.group(3, 2).unwrap().circuits()[0].gates()
        );
    }

    #[test]
    fn compact_dump_format() {
        let mut collection = Collection::new(BasisKind::Eca57, 3, 2).unwrap();
        collection
            .group_mut(3, 2)
            .unwrap()
            .push(eca57_circuit(3, &[(0, 1, 2), (2, 1, 0)]).unwrap())
            .unwrap();
        let text = collection.to_compact();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with('#'));
        assert_eq!(lines.next().unwrap(), "3,2:0,1,2;2,1,0");
    }
}
