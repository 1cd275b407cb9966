//! Enumeration of reversible identity circuits and their template database.
//!
//! The pipeline: a SAT encoder states "k gates over w wires compose to the
//! identity permutation", an enumeration loop solves and excludes until the
//! cell is exhausted, the unroll engine expands every find into its
//! equivalence class, and a content-addressed store keeps each distinct
//! template with secondary indices for dimension scans, family grouping and
//! witness prefiltering.

#![deny(elided_lifetimes_in_paths)]

pub mod basis;
pub mod circuit;
pub mod collection;
pub mod error;
pub mod explore;
pub mod merge;
pub mod sat;
pub mod store;
pub mod synth;
pub mod truth_table;
pub mod unroll;

pub use basis::{BasisKind, Gate};
pub use circuit::Circuit;
pub use collection::{Collection, DimGroup};
pub use error::{Error, Result};
pub use store::{InsertOutcome, Origin, StoreConfig, TemplateDb};
pub use truth_table::TruthTable;
pub use unroll::UnrollConfig;
