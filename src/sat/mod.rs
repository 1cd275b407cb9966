//! SAT plumbing: formula building, backends, and the multi-backend race.

pub mod cnf;
pub mod racer;
pub mod solver;

pub use cnf::{Cnf, Literal};
pub use racer::SolverRacer;
pub use solver::{available_solvers, parse_solver_spec, Solver, Verdict};
