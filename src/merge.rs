//! Fold per-job stores into a single collection store.
//!
//! Sources are scanned in `templates_by_dims` order and re-inserted into the
//! target, deduplicating by canonical hash. Template ids are local to each
//! store, so `origin_template_id` links are dropped; origin kind, unroll ops
//! and family hash survive the move.

use std::fs;
use std::path::{Path, PathBuf};

use crate::basis::BasisKind;
use crate::error::{Error, Result};
use crate::store::{InsertOutcome, StoreConfig, TemplateDb};

#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub path: PathBuf,
    pub inserted: u64,
    pub duplicates: u64,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub sources: Vec<SourceReport>,
    pub dry_run: bool,
}

impl MergeReport {
    pub fn total_inserted(&self) -> u64 {
        self.sources.iter().map(|s| s.inserted).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.sources.iter().map(|s| s.duplicates).sum()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for source in &self.sources {
            let name = source.path.display();
            match &source.failure {
                Some(err) => lines.push(format!("  {name}: ERROR: {err}")),
                None if self.dry_run => lines.push(format!("  {name}: would merge")),
                None => lines.push(format!(
                    "  {name}: {} new, {} duplicates",
                    source.inserted, source.duplicates
                )),
            }
        }
        lines.push(format!(
            "merged {} sources: {} inserted, {} duplicates",
            self.sources.len(),
            self.total_inserted(),
            self.total_duplicates()
        ));
        lines.join("\n")
    }
}

fn job_dirs(jobs_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(jobs_dir).map_err(|source| Error::Io {
        path: jobs_dir.display().to_string(),
        source,
    })?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: jobs_dir.display().to_string(),
            source,
        })?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Merge every store directory under `jobs_dir` into `output`. A source
/// that fails to open or scan is reported and skipped; it does not abort
/// the others.
pub fn merge_stores(
    jobs_dir: &Path,
    output: &Path,
    basis: BasisKind,
    config: &StoreConfig,
    dry_run: bool,
) -> Result<MergeReport> {
    let sources = job_dirs(jobs_dir)?;
    if sources.is_empty() {
        return Err(Error::BadInput {
            message: format!("no job stores found under {}", jobs_dir.display()),
        });
    }

    let mut report = MergeReport {
        dry_run,
        ..MergeReport::default()
    };
    if dry_run {
        report.sources = sources
            .into_iter()
            .map(|path| SourceReport {
                path,
                ..SourceReport::default()
            })
            .collect();
        return Ok(report);
    }

    let target = TemplateDb::open(output, basis, config)?;
    for path in sources {
        let mut source_report = SourceReport {
            path: path.clone(),
            ..SourceReport::default()
        };
        match merge_one(&target, &path, basis, config) {
            Ok((inserted, duplicates)) => {
                source_report.inserted = inserted;
                source_report.duplicates = duplicates;
            }
            Err(e) => {
                log::error!("merge source {}: {e}", path.display());
                source_report.failure = Some(e.to_string());
            }
        }
        report.sources.push(source_report);
    }
    target.flush()?;
    Ok(report)
}

fn merge_one(
    target: &TemplateDb,
    source_path: &Path,
    basis: BasisKind,
    config: &StoreConfig,
) -> Result<(u64, u64)> {
    let source = TemplateDb::open(source_path, basis, config)?;
    let mut inserted = 0;
    let mut duplicates = 0;
    for record in source.all_templates()? {
        let circuit = record.circuit()?;
        let outcome = target.insert_template(
            &circuit,
            record.origin,
            // ids are local to each store; links do not survive a merge
            0,
            record.unroll_ops,
            Some(record.family_hash),
        )?;
        match outcome {
            InsertOutcome::Inserted(_) => inserted += 1,
            InsertOutcome::Duplicate => duplicates += 1,
        }
    }
    Ok((inserted, duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::eca57_circuit;
    use crate::store::Origin;

    fn config() -> StoreConfig {
        StoreConfig {
            map_size: 16 * 1024 * 1024,
            kgram_sizes: vec![2, 3],
        }
    }

    #[test]
    fn merge_unions_distinct_hashes() {
        let root = tempfile::tempdir().unwrap();
        let jobs = root.path().join("jobs");
        fs::create_dir_all(jobs.join("w3_gc2")).unwrap();
        fs::create_dir_all(jobs.join("w3_gc4")).unwrap();

        let shared = eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap();
        {
            let a = TemplateDb::open(jobs.join("w3_gc2"), BasisKind::Eca57, &config()).unwrap();
            a.insert_template(&shared, Origin::Sat, 0, 0, None).unwrap();
            a.flush().unwrap();
        }
        {
            let b = TemplateDb::open(jobs.join("w3_gc4"), BasisKind::Eca57, &config()).unwrap();
            // same template again, plus one the first job does not have
            b.insert_template(&shared, Origin::Sat, 0, 0, None).unwrap();
            let other =
                eca57_circuit(3, &[(0, 1, 2), (1, 2, 0), (0, 1, 2), (1, 2, 0)]).unwrap();
            b.insert_template(&other, Origin::Sat, 0, 0, None).unwrap();
            b.flush().unwrap();
        }

        let out = root.path().join("merged");
        let report =
            merge_stores(&jobs, &out, BasisKind::Eca57, &config(), false).unwrap();
        assert_eq!(report.total_inserted(), 2);
        assert_eq!(report.total_duplicates(), 1);

        let merged = TemplateDb::open(&out, BasisKind::Eca57, &config()).unwrap();
        assert_eq!(merged.template_count().unwrap(), 2);
    }

    #[test]
    fn dry_run_lists_without_writing() {
        let root = tempfile::tempdir().unwrap();
        let jobs = root.path().join("jobs");
        fs::create_dir_all(jobs.join("w3_gc2")).unwrap();
        {
            TemplateDb::open(jobs.join("w3_gc2"), BasisKind::Eca57, &config()).unwrap();
        }
        let out = root.path().join("merged");
        let report = merge_stores(&jobs, &out, BasisKind::Eca57, &config(), true).unwrap();
        assert_eq!(report.sources.len(), 1);
        assert!(!out.exists());
    }

    #[test]
    fn empty_jobs_dir_is_bad_input() {
        let root = tempfile::tempdir().unwrap();
        let jobs = root.path().join("jobs");
        fs::create_dir_all(&jobs).unwrap();
        assert!(matches!(
            merge_stores(&jobs, &root.path().join("out"), BasisKind::Eca57, &config(), false),
            Err(Error::BadInput { .. })
        ));
    }
}
