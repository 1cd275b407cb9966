//! Exhaustive per-cell enumeration: encode, solve, unroll, exclude, repeat.

pub mod eca57;
pub mod mct;

use crate::basis::BasisKind;
use crate::circuit::Circuit;
use crate::collection::DimGroup;
use crate::error::Result;
use crate::sat::cnf::Cnf;
use crate::sat::{SolverRacer, Verdict};
use crate::unroll::{unroll, UnrollConfig};

pub use eca57::Eca57Encoder;
pub use mct::MctEncoder;

/// Basis-dispatched identity encoder.
pub enum Encoder {
    Eca57(Eca57Encoder),
    Mct(MctEncoder),
}

impl Encoder {
    pub fn identity(basis: BasisKind, width: usize, gate_count: usize) -> Result<Self> {
        Ok(match basis {
            BasisKind::Eca57 => Encoder::Eca57(Eca57Encoder::identity(width, gate_count)?),
            BasisKind::Mct => Encoder::Mct(MctEncoder::identity(width, gate_count)?),
        })
    }

    pub fn cnf(&self) -> &Cnf {
        match self {
            Encoder::Eca57(e) => e.cnf(),
            Encoder::Mct(e) => e.cnf(),
        }
    }

    pub fn forbid_spectator_lines(&mut self) {
        match self {
            Encoder::Eca57(e) => e.forbid_spectator_lines(),
            Encoder::Mct(e) => e.forbid_spectator_lines(),
        }
    }

    pub fn decode(&self, model: &[i32]) -> Result<Circuit> {
        match self {
            Encoder::Eca57(e) => e.decode(model),
            Encoder::Mct(e) => e.decode(model),
        }
    }

    pub fn exclude_circuit(&mut self, circuit: &Circuit) -> Result<()> {
        match self {
            Encoder::Eca57(e) => e.exclude_circuit(circuit),
            Encoder::Mct(e) => e.exclude_circuit(circuit),
        }
    }

    pub fn exclude_subcircuit(&mut self, circuit: &Circuit) -> Result<()> {
        match self {
            Encoder::Eca57(e) => e.exclude_subcircuit(circuit),
            Encoder::Mct(e) => e.exclude_subcircuit(circuit),
        }
    }
}

/// Exhaustive synthesizer for one `(width, gate_count)` cell.
///
/// One CNF serves the whole cell: each found circuit and its unrolled
/// variants are appended as exclusion clauses, so every solve either yields
/// a genuinely new circuit or closes the cell with UNSAT.
pub struct DimGroupSynthesizer {
    basis: BasisKind,
    width: usize,
    gate_count: usize,
    /// Spectator-line hardening; on for ECA57 (its smallest cells touch
    /// every wire), off for MCT where X;X legitimately idles a wire.
    pub harden_spectators: bool,
    pub unroll_config: UnrollConfig,
}

impl DimGroupSynthesizer {
    pub fn new(basis: BasisKind, width: usize, gate_count: usize) -> Self {
        Self {
            basis,
            width,
            gate_count,
            harden_spectators: basis == BasisKind::Eca57,
            unroll_config: UnrollConfig::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn gate_count(&self) -> usize {
        self.gate_count
    }

    /// Enumerate the cell. `on_progress(iteration, circuits_so_far)` fires
    /// after every successful solve.
    pub fn synthesize_with_progress(
        &self,
        racer: &SolverRacer,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<DimGroup> {
        let mut encoder = Encoder::identity(self.basis, self.width, self.gate_count)?;
        if self.harden_spectators {
            encoder.forbid_spectator_lines();
        }
        let mut group = DimGroup::new(self.basis, self.width, self.gate_count);
        let mut iteration = 0;
        loop {
            iteration += 1;
            match racer.solve(encoder.cnf())? {
                Verdict::Unsat => break,
                Verdict::Sat(model) => {
                    let circuit = encoder.decode(&model)?;
                    let variants = unroll(&circuit, &self.unroll_config)?;
                    for (variant, _) in &variants {
                        encoder.exclude_circuit(variant)?;
                    }
                    group.extend(variants.into_iter().map(|(c, _)| c))?;
                    on_progress(iteration, group.len());
                }
            }
        }
        // truncated permutation sets can rediscover overlapping classes
        group.remove_duplicates();
        log::info!(
            "cell ({}, {}) closed after {} iterations with {} circuits",
            self.width,
            self.gate_count,
            iteration,
            group.len()
        );
        Ok(group)
    }

    pub fn synthesize(&self, racer: &SolverRacer) -> Result<DimGroup> {
        self.synthesize_with_progress(racer, |_, _| {})
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub solver: String,
    pub seconds: f64,
    /// `Some(true)` found a circuit, `Some(false)` proved the cell empty.
    pub found: Option<bool>,
    pub error: Option<String>,
}

/// Run every registered backend on one cell's CNF and report wall times,
/// fastest first; failed backends sort last.
pub fn benchmark_solvers(
    basis: BasisKind,
    width: usize,
    gate_count: usize,
) -> Result<Vec<BenchmarkResult>> {
    use crate::sat::{available_solvers, Solver};
    use std::time::Instant;

    let encoder = Encoder::identity(basis, width, gate_count)?;
    let mut results = Vec::new();
    for name in available_solvers() {
        let solver = Solver::from_name(&name)?;
        let start = Instant::now();
        let outcome = solver.solve(encoder.cnf());
        let seconds = start.elapsed().as_secs_f64();
        match outcome {
            Ok(verdict) => results.push(BenchmarkResult {
                solver: name,
                seconds,
                found: Some(verdict.is_sat()),
                error: None,
            }),
            Err(e) => results.push(BenchmarkResult {
                solver: name,
                seconds,
                found: None,
                error: Some(e.to_string()),
            }),
        }
    }
    results.sort_by(|a, b| {
        (a.error.is_some(), a.seconds)
            .partial_cmp(&(b.error.is_some(), b.seconds))
            .unwrap_or(core::cmp::Ordering::Equal)
    });
    Ok(results)
}
