//! Staggered exploration driver.
//!
//! Walks the `(width, gate_count)` frontier in a prescribed order; per cell,
//! runs the SAT enumerate/unroll/exclude loop against the template store,
//! then populates witnesses. Unroll work runs on a worker pool fed pure
//! values; a failing cell is reported and the frontier moves on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use rayon::ThreadPool;

use crate::basis::BasisKind;
use crate::error::{Error, Result};
use crate::sat::SolverRacer;
use crate::sat::Verdict;
use crate::store::{InsertOutcome, Origin, TemplateDb};
use crate::synth::Encoder;
use crate::unroll::{unroll, UnrollConfig};

/// Per-width gate-count ceiling for the staggered frontier.
pub fn max_gc_for_width(width: usize) -> usize {
    match width {
        3 => 12,
        4 => 10,
        5 => 8,
        6 => 7,
        _ => 6,
    }
}

#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub basis: BasisKind,
    pub min_width: usize,
    pub max_width: usize,
    /// Restrict every width to one gate count; used to shard cells across
    /// cluster jobs.
    pub single_gc: Option<usize>,
    pub skip_witnesses: bool,
    /// Worker threads for unroll expansion; `None` means cores minus one.
    pub workers: Option<usize>,
    pub parallel: bool,
    pub unroll: UnrollConfig,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            basis: BasisKind::Eca57,
            min_width: 3,
            max_width: 9,
            single_gc: None,
            skip_witnesses: false,
            workers: None,
            parallel: true,
            unroll: UnrollConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellReport {
    pub width: usize,
    pub gate_count: usize,
    pub closed: bool,
    pub failure: Option<String>,
    pub seeds: u64,
    pub variants: u64,
    pub duplicates: u64,
    pub witnesses: u64,
    pub seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ExploreSummary {
    pub cells: Vec<CellReport>,
}

impl ExploreSummary {
    pub fn closed_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.closed).count()
    }

    pub fn failed_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.failure.is_some()).count()
    }

    pub fn total_inserted(&self) -> u64 {
        self.cells.iter().map(|c| c.seeds + c.variants).sum()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for cell in &self.cells {
            let status = match &cell.failure {
                Some(err) => format!("FAILED: {err}"),
                None => format!(
                    "{} seeds + {} variants ({} duplicates, {} witnesses) in {:.1}s",
                    cell.seeds, cell.variants, cell.duplicates, cell.witnesses, cell.seconds
                ),
            };
            lines.push(format!("[{},{}] {status}", cell.width, cell.gate_count));
        }
        lines.push(format!(
            "{} cells closed, {} failed, {} templates inserted",
            self.closed_cells(),
            self.failed_cells(),
            self.total_inserted()
        ));
        lines.join("\n")
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn build_pool(opts: &ExploreOptions) -> Result<ThreadPool> {
    let threads = if opts.parallel {
        opts.workers.unwrap_or_else(default_workers)
    } else {
        1
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| Error::ResourceExhausted {
            message: format!("cannot build worker pool: {e}"),
        })
}

/// Run the staggered frontier. Cell failures are contained: the report
/// carries them and the walk continues.
pub fn explore(
    db: &TemplateDb,
    racer: &SolverRacer,
    opts: &ExploreOptions,
) -> Result<ExploreSummary> {
    let pool = build_pool(opts)?;
    let mut summary = ExploreSummary::default();

    for width in opts.min_width..=opts.max_width {
        let ceiling = max_gc_for_width(width);
        let cells: Vec<usize> = match opts.single_gc {
            Some(gc) if (2..=ceiling).contains(&gc) => vec![gc],
            Some(_) => Vec::new(),
            None => (2..=ceiling).collect(),
        };
        for gate_count in cells {
            let started = Instant::now();
            log::info!("exploring cell ({width}, {gate_count})");
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                run_cell(db, racer, opts, &pool, width, gate_count)
            }));
            let mut report = match outcome {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    log::error!("cell ({width}, {gate_count}) failed: {e}");
                    CellReport {
                        width,
                        gate_count,
                        failure: Some(e.to_string()),
                        ..CellReport::default()
                    }
                }
                Err(_) => {
                    log::error!("cell ({width}, {gate_count}) worker panicked");
                    CellReport {
                        width,
                        gate_count,
                        failure: Some("worker panicked".to_string()),
                        ..CellReport::default()
                    }
                }
            };
            report.seconds = started.elapsed().as_secs_f64();
            summary.cells.push(report);
        }
    }
    db.flush()?;
    Ok(summary)
}

fn run_cell(
    db: &TemplateDb,
    racer: &SolverRacer,
    opts: &ExploreOptions,
    pool: &ThreadPool,
    width: usize,
    gate_count: usize,
) -> Result<CellReport> {
    let mut report = CellReport {
        width,
        gate_count,
        ..CellReport::default()
    };

    let mut encoder = Encoder::identity(opts.basis, width, gate_count)?;
    if opts.basis == BasisKind::Eca57 {
        encoder.forbid_spectator_lines();
    }

    // everything already known at this cell is off the table before the
    // first solve
    for record in db.templates_by_dims(width as u8, gate_count as u16)? {
        encoder.exclude_circuit(&record.circuit()?)?;
    }

    loop {
        match racer.solve(encoder.cnf())? {
            Verdict::Unsat => {
                report.closed = true;
                break;
            }
            Verdict::Sat(model) => {
                let circuit = encoder.decode(&model)?;
                let seed = match db.insert_template(&circuit, Origin::Sat, 0, 0, None)? {
                    InsertOutcome::Inserted(record) => record,
                    InsertOutcome::Duplicate => {
                        // a concrete relabeling of a known template; exclude
                        // it and keep going
                        report.duplicates += 1;
                        encoder.exclude_circuit(&circuit)?;
                        continue;
                    }
                };
                report.seeds += 1;

                // workers receive pure values and hold no store handle
                let config = opts.unroll.clone();
                let variants = pool.install(|| unroll(&circuit, &config))?;
                log::debug!(
                    "seed {} unrolled into {} variants",
                    seed.template_id,
                    variants.len()
                );
                for (variant, ops) in &variants {
                    match db.insert_template(
                        variant,
                        Origin::Unroll,
                        seed.template_id,
                        *ops,
                        Some(seed.family_hash),
                    )? {
                        InsertOutcome::Inserted(_) => report.variants += 1,
                        InsertOutcome::Duplicate => report.duplicates += 1,
                    }
                    if variant.width() == width && variant.gate_count() == gate_count {
                        encoder.exclude_circuit(variant)?;
                    }
                }
            }
        }
    }

    if !opts.skip_witnesses {
        for record in db.templates_by_dims(width as u8, gate_count as u16)? {
            if db.insert_witness_for(&record)?.is_inserted() {
                report.witnesses += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;

    fn small_store(dir: &tempfile::TempDir, basis: BasisKind) -> TemplateDb {
        let config = StoreConfig {
            map_size: 16 * 1024 * 1024,
            kgram_sizes: vec![2, 3],
        };
        TemplateDb::open(dir.path(), basis, &config).unwrap()
    }

    #[test]
    fn frontier_table_matches_defaults() {
        assert_eq!(max_gc_for_width(3), 12);
        assert_eq!(max_gc_for_width(4), 10);
        assert_eq!(max_gc_for_width(5), 8);
        assert_eq!(max_gc_for_width(6), 7);
        assert_eq!(max_gc_for_width(7), 6);
        assert_eq!(max_gc_for_width(12), 6);
    }

    #[test]
    fn explore_one_cell_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let db = small_store(&dir, BasisKind::Eca57);
        let racer = SolverRacer::from_spec("kissat").unwrap();
        let opts = ExploreOptions {
            min_width: 3,
            max_width: 3,
            single_gc: Some(2),
            workers: Some(2),
            ..ExploreOptions::default()
        };
        let summary = explore(&db, &racer, &opts).unwrap();
        assert_eq!(summary.cells.len(), 1);
        let cell = &summary.cells[0];
        assert!(cell.closed, "cell should close with UNSAT");
        assert!(cell.failure.is_none());

        // all six g;g circuits share one canonical template
        assert_eq!(db.template_count().unwrap(), 1);
        let templates = db.templates_by_dims(3, 2).unwrap();
        assert_eq!(templates.len(), 1);
        assert!(templates[0].circuit().unwrap().is_identity());

        // witnesses were cut for the cell
        assert_eq!(db.witness_count().unwrap(), cell.witnesses);
        assert!(cell.witnesses > 0);
    }

    #[test]
    fn explore_is_idempotent_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let racer = SolverRacer::from_spec("kissat").unwrap();
        let opts = ExploreOptions {
            min_width: 3,
            max_width: 3,
            single_gc: Some(2),
            skip_witnesses: true,
            workers: Some(1),
            ..ExploreOptions::default()
        };
        {
            let db = small_store(&dir, BasisKind::Eca57);
            explore(&db, &racer, &opts).unwrap();
            assert_eq!(db.template_count().unwrap(), 1);
        }
        // second run over the same store: everything excluded up front
        let db = small_store(&dir, BasisKind::Eca57);
        let summary = explore(&db, &racer, &opts).unwrap();
        assert_eq!(db.template_count().unwrap(), 1);
        assert_eq!(summary.cells[0].seeds + summary.cells[0].variants, 0);
    }

    #[test]
    fn mct_cell_matches_published_count() {
        let dir = tempfile::tempdir().unwrap();
        let db = small_store(&dir, BasisKind::Mct);
        let racer = SolverRacer::from_spec("kissat").unwrap();
        let opts = ExploreOptions {
            basis: BasisKind::Mct,
            min_width: 2,
            max_width: 2,
            single_gc: Some(2),
            skip_witnesses: true,
            workers: Some(1),
            ..ExploreOptions::default()
        };
        let summary = explore(&db, &racer, &opts).unwrap();
        assert!(summary.cells[0].closed);
        // X;X and CX;CX, one template each
        assert_eq!(db.template_count().unwrap(), 2);
    }
}
