//! SAT encoding for multi-control Toffoli circuits.
//!
//! Per gate position: a one-hot target row `t_{w}_{g}` and a free controls
//! bitmask `c_{w}_{g}` over the remaining wires. The flip condition is the
//! conjunction of control values, modeled through per-line "this line does
//! not veto" bits.

use hashbrown::HashSet;
use snafu::ensure;

use crate::basis::{BasisKind, Gate, MctGate};
use crate::circuit::Circuit;
use crate::error::{BadInputSnafu, Error, Result};
use crate::sat::cnf::{Cnf, Literal};
use crate::truth_table::TruthTable;

pub struct MctEncoder {
    width: usize,
    gate_count: usize,
    cnf: Cnf,
    controls: Vec<Vec<Literal>>,
    targets: Vec<Vec<Literal>>,
}

impl MctEncoder {
    pub fn identity(width: usize, gate_count: usize) -> Result<Self> {
        Self::new(&TruthTable::new(width), gate_count)
    }

    pub fn new(output: &TruthTable, gate_count: usize) -> Result<Self> {
        let width = output.width();
        ensure!(
            width >= 1,
            BadInputSnafu {
                message: "mct synthesis needs at least one wire".to_string(),
            }
        );
        let words = output.num_rows();
        let mut cnf = Cnf::new();

        let controls: Vec<Vec<Literal>> = (0..gate_count)
            .map(|g| {
                (0..width)
                    .map(|w| cnf.reserve(&format!("c_{w}_{g}")))
                    .collect()
            })
            .collect::<Result<_>>()?;
        let targets: Vec<Vec<Literal>> = (0..gate_count)
            .map(|g| {
                (0..width)
                    .map(|w| cnf.reserve(&format!("t_{w}_{g}")))
                    .collect()
            })
            .collect::<Result<_>>()?;

        let mut data = Vec::with_capacity(words);
        for i in 0..words {
            let mut per_gate = Vec::with_capacity(gate_count + 1);
            for g in 0..=gate_count {
                let row: Vec<Literal> = (0..width)
                    .map(|w| cnf.reserve(&format!("d_{w}_{g}_{i}")))
                    .collect::<Result<_>>()?;
                per_gate.push(row);
            }
            data.push(per_gate);
        }

        for g in 0..gate_count {
            cnf.exactly(&targets[g], 1);
            // the target wire cannot also be a control
            for w in 0..width {
                cnf.nand(targets[g][w], controls[g][w]);
            }
        }

        for i in 0..words {
            for w in 0..width {
                cnf.set_value(data[i][0][w], i >> w & 1 == 1);
            }

            for g in 0..gate_count {
                // no_veto[w] = d[w] OR NOT c[w]; the gate fires when every
                // line agrees, i.e. all selected controls carry a 1
                let mut no_veto = Vec::with_capacity(width);
                for w in 0..width {
                    let bit = cnf.reserve_internal(&format!("O_{w}_{g}_{i}"))?;
                    cnf.equals_or(bit, &[data[i][g][w], -controls[g][w]]);
                    no_veto.push(bit);
                }
                let fire = cnf.reserve_internal(&format!("F_{g}_{i}"))?;
                cnf.equals_and(fire, &no_veto);

                for w in 0..width {
                    let switch = cnf.reserve_internal(&format!("S_{w}_{g}_{i}"))?;
                    cnf.equals_and(switch, &[fire, targets[g][w]]);
                    cnf.xor(&[-data[i][g + 1][w], data[i][g][w], switch]);
                }
            }

            for w in 0..width {
                cnf.set_value(data[i][gate_count][w], output.bit(i, w));
            }
        }

        Ok(Self {
            width,
            gate_count,
            cnf,
            controls,
            targets,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn gate_count(&self) -> usize {
        self.gate_count
    }

    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    /// Hardening: every wire carries a target or control role somewhere.
    pub fn forbid_spectator_lines(&mut self) {
        for w in 0..self.width {
            let mut roles = Vec::with_capacity(2 * self.gate_count);
            for g in 0..self.gate_count {
                roles.push(self.targets[g][w]);
                roles.push(self.controls[g][w]);
            }
            self.cnf.atleast(&roles, 1);
        }
    }

    /// Hardening: no wire is a control of every gate.
    pub fn forbid_full_control_lines(&mut self) {
        for w in 0..self.width {
            let negated: Vec<Literal> = (0..self.gate_count)
                .map(|g| -self.controls[g][w])
                .collect();
            self.cnf.atleast(&negated, 1);
        }
    }

    /// Hardening: exact number of control roles across the whole circuit.
    pub fn fix_control_count(&mut self, count: usize) -> Result<()> {
        let max = (self.width.saturating_sub(1)) * self.gate_count;
        ensure!(
            count <= max,
            BadInputSnafu {
                message: format!("control count {count} exceeds maximum {max}"),
            }
        );
        let all: Vec<Literal> = self.controls.iter().flatten().copied().collect();
        self.cnf.exactly(&all, count);
        Ok(())
    }

    pub fn decode(&self, model: &[i32]) -> Result<Circuit> {
        let positives: HashSet<i32> = model.iter().copied().filter(|&v| v > 0).collect();
        let mut circuit = Circuit::new(BasisKind::Mct, self.width)?;
        for g in 0..self.gate_count {
            let mut target = None;
            let mut controls = Vec::new();
            for w in 0..self.width {
                if positives.contains(&self.targets[g][w].value()) {
                    if target.is_some() {
                        return Err(Error::SolverFailure {
                            solver: "model".to_string(),
                            message: format!("gate {g}: two wires claim the target"),
                        });
                    }
                    target = Some(w as u8);
                }
                if positives.contains(&self.controls[g][w].value()) {
                    controls.push(w as u8);
                }
            }
            let target = target.ok_or_else(|| Error::SolverFailure {
                solver: "model".to_string(),
                message: format!("gate {g}: no wire claims the target"),
            })?;
            circuit.push(Gate::Mct(MctGate::new(controls, target)?))?;
        }
        Ok(circuit)
    }

    fn gate_role_values(&self, layer: usize, gate: &MctGate) -> Vec<i32> {
        let mut values = Vec::with_capacity(2 * self.width);
        for w in 0..self.width {
            let w8 = w as u8;
            let c = self.controls[layer][w];
            values.push(if gate.controls().contains(&w8) {
                c.value()
            } else {
                -c.value()
            });
            let t = self.targets[layer][w];
            values.push(if gate.target() == w8 {
                t.value()
            } else {
                -t.value()
            });
        }
        values
    }

    fn circuit_role_values(&self, circuit: &Circuit, shift: usize) -> Result<Vec<i32>> {
        ensure!(
            circuit.width() == self.width,
            BadInputSnafu {
                message: format!(
                    "exclusion width {} against encoder width {}",
                    circuit.width(),
                    self.width
                ),
            }
        );
        let mut values = Vec::new();
        for (layer, gate) in circuit.gates().iter().enumerate() {
            let Gate::Mct(gate) = gate else {
                return Err(Error::BadInput {
                    message: "eca57 gate excluded from an mct encoder".to_string(),
                });
            };
            values.extend(self.gate_role_values(layer + shift, gate));
        }
        Ok(values)
    }

    pub fn exclude_circuit(&mut self, circuit: &Circuit) -> Result<()> {
        ensure!(
            circuit.gate_count() == self.gate_count,
            BadInputSnafu {
                message: format!(
                    "exclusion length {} against encoder length {}",
                    circuit.gate_count(),
                    self.gate_count
                ),
            }
        );
        let values = self.circuit_role_values(circuit, 0)?;
        self.cnf.exclude_values(&values);
        Ok(())
    }

    pub fn exclude_subcircuit(&mut self, circuit: &Circuit) -> Result<()> {
        ensure!(
            circuit.gate_count() <= self.gate_count && !circuit.is_empty(),
            BadInputSnafu {
                message: format!(
                    "subcircuit of length {} against encoder length {}",
                    circuit.gate_count(),
                    self.gate_count
                ),
            }
        );
        for shift in 0..=self.gate_count - circuit.gate_count() {
            let values = self.circuit_role_values(circuit, shift)?;
            self.cnf.exclude_values(&values);
        }
        Ok(())
    }
}
