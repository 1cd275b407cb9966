//! Command-line entry point.
//!
//! One binary, subcommands per workflow stage. Cluster schedulers can
//! override the usual knobs through `WIDTH`, `GC`, `SOLVER`, `WORKERS` and
//! `SKIP_WITNESSES` without touching the argument list.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use revsynth::basis::BasisKind;
use revsynth::collection::Collection;
use revsynth::error::{Error, Result};
use revsynth::explore::{explore, ExploreOptions};
use revsynth::merge::merge_stores;
use revsynth::sat::SolverRacer;
use revsynth::store::{InsertOutcome, Origin, StoreConfig, TemplateDb};
use revsynth::synth::{benchmark_solvers, DimGroupSynthesizer};
use revsynth::unroll::{unroll, UnrollConfig};

#[derive(Parser)]
#[command(
    name = "revsynth",
    about = "Enumerate reversible identity circuits and maintain the template database",
    version
)]
struct Cli {
    /// Gate basis: eca57 or mct.
    #[arg(long, global = true, default_value = "eca57")]
    basis: BasisKind,

    /// Store map size in bytes.
    #[arg(long, global = true, default_value_t = 10 * 1024 * 1024 * 1024)]
    map_size: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enumerate all identities for one (width, gate_count) cell.
    Synth {
        #[arg(value_name = "W")]
        width: usize,
        #[arg(value_name = "GC")]
        gate_count: usize,
        /// Comma-separated solver names; more than one races them.
        #[arg(short, long, env = "SOLVER", default_value = "kissat")]
        solvers: String,
        /// Write the cell as collection JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Enumerate the full grid up to the given bounds.
    Collection {
        #[arg(value_name = "MAX_W")]
        max_width: usize,
        #[arg(value_name = "MAX_GC")]
        max_gate_count: usize,
        #[arg(short, long, env = "SOLVER", default_value = "kissat")]
        solvers: String,
        /// Write JSON here (and a compact text dump next to it).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Enumerate and write templates straight into a store.
    BuildDb {
        #[arg(long)]
        max_width: usize,
        #[arg(long)]
        max_gc: usize,
        #[arg(short, long, env = "SOLVER", default_value = "kissat")]
        solvers: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Expand one cell's stored seeds through the unroll transforms.
    Unroll {
        #[arg(long)]
        db: PathBuf,
        /// Cell to expand, e.g. 4x6.
        #[arg(long, value_name = "WxGC")]
        seed_dims: String,
        /// Node budget for the commuting-swap search.
        #[arg(long, default_value_t = 1000)]
        dfs_budget: usize,
    },
    /// Populate witness tables and the k-gram prefilter.
    BuildWitnesses {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        max_width: usize,
        #[arg(long)]
        max_gc: usize,
    },
    /// Staggered frontier driver: synthesize, unroll, store, witness.
    Explore {
        #[arg(long, default_value = "data/collection.db")]
        db: PathBuf,
        #[arg(long, env = "WIDTH", default_value_t = 3)]
        min_width: usize,
        #[arg(long, env = "WIDTH", default_value_t = 9)]
        max_width: usize,
        /// Explore only this gate count per width (cluster sharding).
        #[arg(long, env = "GC")]
        single_gc: Option<usize>,
        #[arg(long, env = "SOLVER", default_value = "kissat")]
        solver: String,
        #[arg(long, env = "SKIP_WITNESSES")]
        skip_witnesses: bool,
        /// Unroll worker threads; defaults to cores minus one.
        #[arg(long, env = "WORKERS")]
        workers: Option<usize>,
        #[arg(long)]
        no_parallel: bool,
    },
    /// Fold per-job stores into one.
    Merge {
        #[arg(long)]
        jobs_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Race all configured backends on one cell and print timings.
    Benchmark {
        #[arg(long, default_value_t = 3)]
        width: usize,
        #[arg(long, default_value_t = 4)]
        gc: usize,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn store_config(cli_map_size: u64) -> StoreConfig {
    StoreConfig {
        map_size: cli_map_size,
        ..StoreConfig::default()
    }
}

fn run(cli: Cli) -> Result<()> {
    let basis = cli.basis;
    let map_size = cli.map_size;
    match cli.command {
        Command::Synth {
            width,
            gate_count,
            solvers,
            output,
        } => cmd_synth(basis, width, gate_count, &solvers, output),
        Command::Collection {
            max_width,
            max_gate_count,
            solvers,
            output,
        } => cmd_collection(basis, max_width, max_gate_count, &solvers, output),
        Command::BuildDb {
            max_width,
            max_gc,
            solvers,
            output,
        } => cmd_build_db(basis, map_size, max_width, max_gc, &solvers, &output),
        Command::Unroll {
            db,
            seed_dims,
            dfs_budget,
        } => cmd_unroll(basis, map_size, &db, &seed_dims, dfs_budget),
        Command::BuildWitnesses {
            db,
            max_width,
            max_gc,
        } => cmd_build_witnesses(basis, map_size, &db, max_width, max_gc),
        Command::Explore {
            db,
            min_width,
            max_width,
            single_gc,
            solver,
            skip_witnesses,
            workers,
            no_parallel,
        } => {
            let store = TemplateDb::open(&db, basis, &store_config(map_size))?;
            let racer = SolverRacer::from_spec(&solver)?;
            let opts = ExploreOptions {
                basis,
                min_width,
                max_width,
                single_gc,
                skip_witnesses,
                workers,
                parallel: !no_parallel,
                unroll: UnrollConfig::default(),
            };
            let summary = explore(&store, &racer, &opts)?;
            println!("{}", summary.render());
            let stats = store.stats()?;
            println!(
                "store: {} templates, {} witnesses ({})",
                stats.template_count, stats.witness_count, stats.basis
            );
            Ok(())
        }
        Command::Merge {
            jobs_dir,
            output,
            dry_run,
        } => {
            let report =
                merge_stores(&jobs_dir, &output, basis, &store_config(map_size), dry_run)?;
            println!("{}", report.render());
            Ok(())
        }
        Command::Benchmark { width, gc } => {
            println!("benchmarking solvers on width={width}, gc={gc}");
            let results = benchmark_solvers(basis, width, gc)?;
            println!("{:<16} {:>10} {:>8}", "solver", "time (s)", "result");
            for result in &results {
                match &result.error {
                    Some(err) => println!("{:<16} {:>10.4} {err}", result.solver, result.seconds),
                    None => println!(
                        "{:<16} {:>10.4} {:>8}",
                        result.solver,
                        result.seconds,
                        match result.found {
                            Some(true) => "FOUND",
                            Some(false) => "UNSAT",
                            None => "-",
                        }
                    ),
                }
            }
            if let Some(best) = results.iter().find(|r| r.error.is_none()) {
                println!("recommended solver: {}", best.solver);
            }
            Ok(())
        }
    }
}

fn cmd_synth(
    basis: BasisKind,
    width: usize,
    gate_count: usize,
    solvers: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let racer = SolverRacer::from_spec(solvers)?;
    println!(
        "synthesizing {} identities: width={width}, gc={gate_count} (solvers: {})",
        basis.name(),
        racer.names().join(", ")
    );
    let synthesizer = DimGroupSynthesizer::new(basis, width, gate_count);
    let group = synthesizer.synthesize_with_progress(&racer, |iteration, count| {
        println!("  iteration {iteration}: {count} circuits");
    })?;

    let broken = group.iter().filter(|c| !c.is_identity()).count();
    if broken > 0 {
        return Err(Error::Corruption {
            message: format!("{broken} synthesized circuits are not identities"),
        });
    }
    println!("found {} identity circuits, all verified", group.len());

    if let Some(path) = output {
        let mut collection = Collection::new(basis, width, gate_count)?;
        collection
            .group_mut(width, gate_count)
            .expect("cell inside freshly sized collection")
            .join(group)?;
        collection.save_json(&path)?;
        println!("saved {}", path.display());
    }
    Ok(())
}

fn cmd_collection(
    basis: BasisKind,
    max_width: usize,
    max_gate_count: usize,
    solvers: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let racer = SolverRacer::from_spec(solvers)?;
    let mut collection = Collection::new(basis, max_width, max_gate_count)?;
    for width in basis.min_width()..=max_width {
        for gate_count in 2..=max_gate_count {
            let group = DimGroupSynthesizer::new(basis, width, gate_count).synthesize(&racer)?;
            println!("  [{width},{gate_count}]: {} circuits", group.len());
            collection
                .group_mut(width, gate_count)
                .expect("cell inside collection bounds")
                .join(group)?;
            // checkpoint after every cell so long runs can be inspected
            if let Some(path) = &output {
                collection.save_json(path)?;
            }
        }
    }
    println!("{}", collection.summary());
    if let Some(path) = output {
        collection.save_json(&path)?;
        let compact = path.with_extension("txt");
        collection.save_compact(&compact)?;
        println!("saved {} and {}", path.display(), compact.display());
    }
    Ok(())
}

fn cmd_build_db(
    basis: BasisKind,
    map_size: u64,
    max_width: usize,
    max_gc: usize,
    solvers: &str,
    output: &PathBuf,
) -> Result<()> {
    let db = TemplateDb::open(output, basis, &store_config(map_size))?;
    let racer = SolverRacer::from_spec(solvers)?;
    let mut inserted = 0u64;
    let mut duplicates = 0u64;
    for width in basis.min_width()..=max_width {
        for gate_count in 2..=max_gc {
            let group = DimGroupSynthesizer::new(basis, width, gate_count).synthesize(&racer)?;
            let mut cell_inserted = 0u64;
            for circuit in &group {
                match db.insert_template(circuit, Origin::Sat, 0, 0, None)? {
                    InsertOutcome::Inserted(_) => cell_inserted += 1,
                    InsertOutcome::Duplicate => duplicates += 1,
                }
            }
            inserted += cell_inserted;
            println!("  [{width},{gate_count}]: inserted {cell_inserted} (total {inserted})");
        }
    }
    db.flush()?;
    println!("inserted {inserted}, duplicates {duplicates}");
    println!("store stats: {:?}", db.stats()?);
    Ok(())
}

fn parse_seed_dims(spec: &str) -> Result<(usize, usize)> {
    let parts: Vec<&str> = spec.split('x').collect();
    if parts.len() == 2 {
        if let (Ok(w), Ok(gc)) = (parts[0].parse(), parts[1].parse()) {
            return Ok((w, gc));
        }
    }
    Err(Error::BadInput {
        message: format!("seed dims '{spec}' is not WxGC"),
    })
}

fn cmd_unroll(
    basis: BasisKind,
    map_size: u64,
    db_path: &PathBuf,
    seed_dims: &str,
    dfs_budget: usize,
) -> Result<()> {
    let (width, gate_count) = parse_seed_dims(seed_dims)?;
    let db = TemplateDb::open(db_path, basis, &store_config(map_size))?;
    let config = UnrollConfig {
        swap_bfs_budget: dfs_budget,
        ..UnrollConfig::default()
    };

    let seeds = db.templates_by_dims(width as u8, gate_count as u16)?;
    println!(
        "unrolling {} seeds from [{width},{gate_count}] (budget {dfs_budget})",
        seeds.len()
    );
    let mut inserted = 0u64;
    let mut duplicates = 0u64;
    for (index, record) in seeds.iter().enumerate() {
        let circuit = record.circuit()?;
        for (variant, ops) in unroll(&circuit, &config)? {
            match db.insert_template(
                &variant,
                Origin::Unroll,
                record.template_id,
                ops,
                Some(record.family_hash),
            )? {
                InsertOutcome::Inserted(_) => inserted += 1,
                InsertOutcome::Duplicate => duplicates += 1,
            }
        }
        if (index + 1) % 10 == 0 {
            println!("  processed {} seeds, inserted {inserted}...", index + 1);
        }
    }
    db.flush()?;
    println!("processed {} seeds: {inserted} inserted, {duplicates} duplicates", seeds.len());
    Ok(())
}

fn cmd_build_witnesses(
    basis: BasisKind,
    map_size: u64,
    db_path: &PathBuf,
    max_width: usize,
    max_gc: usize,
) -> Result<()> {
    let db = TemplateDb::open(db_path, basis, &store_config(map_size))?;
    let mut inserted = 0u64;
    let mut duplicates = 0u64;
    for width in basis.min_width()..=max_width {
        for gate_count in 2..=max_gc {
            let mut cell_inserted = 0u64;
            for record in db.templates_by_dims(width as u8, gate_count as u16)? {
                match db.insert_witness_for(&record)? {
                    InsertOutcome::Inserted(_) => cell_inserted += 1,
                    InsertOutcome::Duplicate => duplicates += 1,
                }
            }
            if cell_inserted > 0 {
                println!("  [{width},{gate_count}]: {cell_inserted} witnesses");
            }
            inserted += cell_inserted;
        }
    }
    db.flush()?;
    println!("total witnesses: {inserted} ({duplicates} duplicates skipped)");
    Ok(())
}
