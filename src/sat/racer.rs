//! Race several SAT backends on one CNF and take the first definitive
//! answer.
//!
//! Each backend runs on its own thread against a shared copy of the clause
//! data. The first `SAT`/`UNSAT` wins; external losers are killed through
//! their kill slots (exit codes ignored). A backend failure only drops that
//! racer; the race fails when every backend does.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::error::{Error, Result};
use crate::sat::cnf::Cnf;
use crate::sat::solver::{KillSlot, Solver, Verdict};

pub struct SolverRacer {
    solvers: Vec<Solver>,
}

impl SolverRacer {
    pub fn new(solvers: Vec<Solver>) -> Result<Self> {
        if solvers.is_empty() {
            return Err(Error::BadInput {
                message: "racer needs at least one solver".to_string(),
            });
        }
        Ok(Self { solvers })
    }

    pub fn from_spec(spec: &str) -> Result<Self> {
        Self::new(crate::sat::solver::parse_solver_spec(spec)?)
    }

    pub fn names(&self) -> Vec<&str> {
        self.solvers.iter().map(Solver::name).collect()
    }

    pub fn solve(&self, cnf: &Cnf) -> Result<Verdict> {
        if self.solvers.len() == 1 {
            return self.solvers[0].solve(cnf);
        }

        // Owned copies so loser threads can outlive this call; an in-process
        // loser cannot be killed and runs to completion detached.
        let clauses: Arc<Vec<Vec<i32>>> = Arc::new(cnf.clauses().to_vec());
        let num_vars = cnf.var_count();

        let slots: Vec<Arc<KillSlot>> = self
            .solvers
            .iter()
            .map(|_| Arc::new(KillSlot::new()))
            .collect();
        let (tx, rx) = mpsc::channel::<(String, Result<Verdict>)>();

        for (solver, slot) in self.solvers.iter().zip(&slots) {
            let solver = solver.clone();
            let slot = Arc::clone(slot);
            let clauses = Arc::clone(&clauses);
            let tx = tx.clone();
            thread::spawn(move || {
                let result = solver.solve_clauses(&clauses, num_vars, &slot);
                let _ = tx.send((solver.name().to_string(), result));
            });
        }
        drop(tx);

        let mut failures: Vec<String> = Vec::new();
        let mut winner: Option<(String, Verdict)> = None;
        while let Ok((name, result)) = rx.recv() {
            match result {
                Ok(verdict) => {
                    winner = Some((name, verdict));
                    break;
                }
                Err(e) => {
                    log::warn!("racer: {e}");
                    failures.push(e.to_string());
                    if failures.len() == self.solvers.len() {
                        break;
                    }
                }
            }
        }

        for slot in &slots {
            slot.kill();
        }

        let Some((winner_name, verdict)) = winner else {
            return Err(Error::SolverFailure {
                solver: self.names().join("+"),
                message: format!("all racers failed: {}", failures.join("; ")),
            });
        };

        // Late results that already arrived: a disagreement would mean a
        // backend bug; log it and keep the first answer.
        while let Ok((name, result)) = rx.try_recv() {
            if let Ok(other) = result {
                if other.is_sat() != verdict.is_sat() {
                    log::error!(
                        "solver disagreement: {winner_name} says {}, {name} says {}",
                        if verdict.is_sat() { "SAT" } else { "UNSAT" },
                        if other.is_sat() { "SAT" } else { "UNSAT" },
                    );
                }
            }
        }

        log::debug!("race won by {winner_name}");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_of_one_delegates() {
        let racer = SolverRacer::from_spec("kissat").unwrap();
        let mut cnf = Cnf::new();
        let a = cnf.reserve("a").unwrap();
        cnf.set(a);
        assert!(racer.solve(&cnf).unwrap().is_sat());
    }

    #[test]
    fn race_survives_a_missing_binary() {
        // kissat-sc2024 is almost certainly not installed; the builtin
        // racer must still deliver the verdict.
        let racer = SolverRacer::from_spec("kissat+kissat-sc2024").unwrap();
        let mut cnf = Cnf::new();
        let a = cnf.reserve("a").unwrap();
        let b = cnf.reserve("b").unwrap();
        cnf.equals(a, b);
        cnf.set(a);
        cnf.set_value(b, false);
        assert_eq!(racer.solve(&cnf).unwrap(), Verdict::Unsat);
    }

    #[test]
    fn empty_racer_rejected() {
        assert!(SolverRacer::new(Vec::new()).is_err());
    }
}
