//! Uniform `solve` over in-process and external SAT backends.
//!
//! The in-process backend links kissat through `rustsat`; external backends
//! are spawned as subprocesses, fed DIMACS on stdin by a producer thread
//! (chunked, with pipe backpressure) while the caller collects stdout.

use std::io::{BufWriter, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;

use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Clause, TernaryVal, Var};

use crate::error::{Error, Result};
use crate::sat::cnf::Cnf;

/// Outcome of one solve call. The model is the IPASIR-style signed literal
/// list; the set of positive literals identifies the chosen one-hots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Sat(Vec<i32>),
    Unsat,
}

impl Verdict {
    pub fn is_sat(&self) -> bool {
        matches!(self, Verdict::Sat(_))
    }

    pub fn model(&self) -> Option<&[i32]> {
        match self {
            Verdict::Sat(model) => Some(model),
            Verdict::Unsat => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    /// Linked kissat, always available.
    Builtin,
    /// Subprocess speaking DIMACS on stdin/stdout.
    External { program: String, args: Vec<String> },
}

/// External solver table, mirroring the names the cluster scripts use.
const EXTERNAL_SOLVERS: &[(&str, &str, &[&str])] = &[
    ("kissat-ext", "kissat", &["-q"]),
    ("kissat-sc2024", "kissat-sc2024", &["-q"]),
    ("cadical", "cadical", &["--quiet"]),
];

pub const BUILTIN_SOLVER: &str = "kissat";

#[derive(Debug, Clone)]
pub struct Solver {
    name: String,
    backend: Backend,
}

impl Solver {
    /// Look a solver up by name. `kissat` is the linked default; anything in
    /// the external table spawns the named binary.
    pub fn from_name(name: &str) -> Result<Solver> {
        if name == BUILTIN_SOLVER {
            return Ok(Solver {
                name: name.to_string(),
                backend: Backend::Builtin,
            });
        }
        for (alias, program, args) in EXTERNAL_SOLVERS {
            if *alias == name {
                return Ok(Solver {
                    name: name.to_string(),
                    backend: Backend::External {
                        program: (*program).to_string(),
                        args: args.iter().map(|s| (*s).to_string()).collect(),
                    },
                });
            }
        }
        Err(Error::BadInput {
            message: format!(
                "unknown solver '{name}' (available: {})",
                available_solvers().join(", ")
            ),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn solve(&self, cnf: &Cnf) -> Result<Verdict> {
        let slot = KillSlot::new();
        self.solve_clauses(cnf.clauses(), cnf.var_count(), &slot)
    }

    /// Solve raw clause data. `slot` lets a racer kill an external
    /// subprocess mid-flight; builtin solves run to completion.
    pub(crate) fn solve_clauses(
        &self,
        clauses: &[Vec<i32>],
        num_vars: usize,
        slot: &KillSlot,
    ) -> Result<Verdict> {
        match &self.backend {
            Backend::Builtin => self.solve_builtin(clauses, num_vars),
            Backend::External { program, args } => {
                self.solve_external(program, args, clauses, num_vars, slot)
            }
        }
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::SolverFailure {
            solver: self.name.clone(),
            message: message.into(),
        }
    }

    fn solve_builtin(&self, clauses: &[Vec<i32>], num_vars: usize) -> Result<Verdict> {
        let mut solver = rustsat_kissat::Kissat::default();
        for clause in clauses {
            let converted: Clause = clause
                .iter()
                .map(|&v| {
                    let var = Var::new(v.unsigned_abs() - 1);
                    if v > 0 {
                        var.pos_lit()
                    } else {
                        var.neg_lit()
                    }
                })
                .collect();
            solver
                .add_clause(converted)
                .map_err(|e| self.fail(format!("add_clause: {e}")))?;
        }
        match solver.solve().map_err(|e| self.fail(format!("{e}")))? {
            SolverResult::Unsat => Ok(Verdict::Unsat),
            SolverResult::Interrupted => Err(self.fail("interrupted")),
            SolverResult::Sat => {
                let mut model = Vec::with_capacity(num_vars);
                for i in 0..num_vars {
                    let var = Var::new(i as u32);
                    let value = solver
                        .lit_val(var.pos_lit())
                        .map_err(|e| self.fail(format!("lit_val: {e}")))?;
                    match value {
                        TernaryVal::True => model.push(i as i32 + 1),
                        TernaryVal::False => model.push(-(i as i32 + 1)),
                        TernaryVal::DontCare => {}
                    }
                }
                Ok(Verdict::Sat(model))
            }
        }
    }

    fn solve_external(
        &self,
        program: &str,
        args: &[String],
        clauses: &[Vec<i32>],
        num_vars: usize,
        slot: &KillSlot,
    ) -> Result<Verdict> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.fail(format!("spawn {program}: {e}")))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let mut stdout = child.stdout.take().expect("stdout was piped");
        slot.register(child);

        let mut output = String::new();
        let read_result = thread::scope(|scope| {
            scope.spawn(move || {
                // Producer: feed DIMACS in clause chunks; a dead consumer
                // surfaces as a broken pipe, which the reader side reports.
                let mut writer = BufWriter::with_capacity(1 << 20, stdin);
                let _ = writeln!(writer, "p cnf {} {}", num_vars, clauses.len());
                for chunk in clauses.chunks(20_000) {
                    for clause in chunk {
                        for v in clause {
                            if write!(writer, "{v} ").is_err() {
                                return;
                            }
                        }
                        if writer.write_all(b"0\n").is_err() {
                            return;
                        }
                    }
                }
                let _ = writer.flush();
                // dropping the writer closes stdin and signals end of input
            });
            stdout.read_to_string(&mut output)
        });
        read_result.map_err(|e| self.fail(format!("read output: {e}")))?;

        slot.finish();
        if slot.was_killed() {
            return Err(self.fail("cancelled"));
        }
        self.parse_output(&output)
    }

    /// Parse `s SATISFIABLE | s UNSATISFIABLE` plus `v` value lines.
    fn parse_output(&self, output: &str) -> Result<Verdict> {
        let mut sat = None;
        let mut model = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if let Some(status) = line.strip_prefix("s ") {
                if status.contains("UNSATISFIABLE") {
                    sat = Some(false);
                } else if status.contains("SATISFIABLE") {
                    sat = Some(true);
                }
            } else if let Some(values) = line.strip_prefix("v ") {
                for token in values.split_ascii_whitespace() {
                    match token.parse::<i32>() {
                        Ok(0) => {}
                        Ok(v) => model.push(v),
                        Err(_) => return Err(self.fail(format!("bad value token '{token}'"))),
                    }
                }
            }
        }
        match sat {
            Some(true) => Ok(Verdict::Sat(model)),
            Some(false) => Ok(Verdict::Unsat),
            None => Err(self.fail("no solution line in output")),
        }
    }
}

pub fn available_solvers() -> Vec<String> {
    let mut names = vec![BUILTIN_SOLVER.to_string()];
    names.extend(EXTERNAL_SOLVERS.iter().map(|(alias, _, _)| (*alias).to_string()));
    names
}

/// Parse a comma- or plus-separated solver list into instances.
pub fn parse_solver_spec(spec: &str) -> Result<Vec<Solver>> {
    let names: Vec<&str> = spec
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Err(Error::BadInput {
            message: "empty solver spec".to_string(),
        });
    }
    names.iter().map(|name| Solver::from_name(name)).collect()
}

/// Shared handle a racer uses to cancel an external subprocess.
pub(crate) struct KillSlot {
    state: Mutex<KillState>,
}

enum KillState {
    Pending,
    Running(Child),
    Killed,
    Finished,
}

impl KillSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(KillState::Pending),
        }
    }

    fn register(&self, mut child: Child) {
        let mut state = self.state.lock().expect("kill slot poisoned");
        match &*state {
            KillState::Killed => {
                // raced with a cancellation that arrived before the spawn
                let _ = child.kill();
                let _ = child.wait();
            }
            _ => *state = KillState::Running(child),
        }
    }

    /// Cancel the subprocess if one is running; exit code is ignored.
    pub(crate) fn kill(&self) {
        let mut state = self.state.lock().expect("kill slot poisoned");
        if let KillState::Running(child) = &mut *state {
            let _ = child.kill();
            let _ = child.wait();
        }
        if !matches!(*state, KillState::Finished) {
            *state = KillState::Killed;
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock().expect("kill slot poisoned");
        if let KillState::Running(child) = &mut *state {
            let _ = child.wait();
            *state = KillState::Finished;
        }
    }

    fn was_killed(&self) -> bool {
        matches!(
            *self.state.lock().expect("kill slot poisoned"),
            KillState::Killed
        )
    }
}
