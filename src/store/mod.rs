//! Template & witness store on an embedded ordered key-value engine.
//!
//! One directory per store. Six named trees share the engine:
//!
//! | tree | key | value |
//! |---|---|---|
//! | `meta` | short UTF-8 strings | little-endian scalars / strings |
//! | `templates_by_hash` | basis, width, gc, canonical hash | [`TemplateRecord`] |
//! | `templates_by_dims` | basis, width, gc, template id | canonical hash |
//! | `template_families` | basis, family hash | concat of u64 ids |
//! | `witnesses_by_hash` | basis, width, len, witness hash | [`WitnessRecord`] |
//! | `witness_prefilter` | basis, width, k-gram token | concat of u64 ids |
//!
//! Inserts are one write transaction each; template ids are strictly
//! monotonic and never reused. Readers refuse stores written under a
//! different schema or canonicalization version.

pub mod records;

use std::path::Path;

use sled::transaction::{abort, TransactionError};
use sled::Transactional;

use crate::basis::{self, BasisKind};
use crate::circuit::Circuit;
use crate::error::{Error, Result};
pub use records::{Origin, TemplateRecord, WitnessRecord};

pub const SCHEMA_VERSION: u32 = 1;
/// Bumped iff on-disk canonical hashes would change.
pub const CANONICALIZATION_VERSION: u32 = 1;

const TREE_META: &str = "meta";
const TREE_TEMPLATES_BY_HASH: &str = "templates_by_hash";
const TREE_TEMPLATES_BY_DIMS: &str = "templates_by_dims";
const TREE_TEMPLATE_FAMILIES: &str = "template_families";
const TREE_WITNESSES_BY_HASH: &str = "witnesses_by_hash";
const TREE_WITNESS_PREFILTER: &str = "witness_prefilter";

const META_SCHEMA_VERSION: &str = "schema_version";
const META_CANON_VERSION: &str = "canonicalization_version";
const META_BASIS: &str = "basis";
const META_TEMPLATE_COUNT: &str = "template_count";
const META_WITNESS_COUNT: &str = "witness_count";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Engine cache budget in bytes; keeps the original's "map size" knob.
    pub map_size: u64,
    /// k-gram window sizes feeding the witness prefilter. Tunable, not a
    /// format contract.
    pub kgram_sizes: Vec<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            map_size: 10 * 1024 * 1024 * 1024,
            kgram_sizes: vec![2, 3],
        }
    }
}

/// Result of an insert: `Duplicate` is the "already known" signal, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<R> {
    Inserted(R),
    Duplicate,
}

impl<R> InsertOutcome<R> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn into_record(self) -> Option<R> {
        match self {
            InsertOutcome::Inserted(record) => Some(record),
            InsertOutcome::Duplicate => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStats {
    pub schema_version: u32,
    pub canonicalization_version: u32,
    pub basis: String,
    pub template_count: u64,
    pub witness_count: u64,
}

pub struct TemplateDb {
    db: sled::Db,
    basis: BasisKind,
    kgram_sizes: Vec<usize>,
    meta: sled::Tree,
    templates_by_hash: sled::Tree,
    templates_by_dims: sled::Tree,
    template_families: sled::Tree,
    witnesses_by_hash: sled::Tree,
    witness_prefilter: sled::Tree,
}

fn meta_u32(bytes: &[u8], what: &str) -> Result<u32> {
    bytes
        .try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| Error::Corruption {
            message: format!("meta key '{what}' has length {}", bytes.len()),
        })
}

fn meta_u64(bytes: &[u8], what: &str) -> Result<u64> {
    bytes
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(|_| Error::Corruption {
            message: format!("meta key '{what}' has length {}", bytes.len()),
        })
}

impl TemplateDb {
    pub fn open(path: impl AsRef<Path>, basis: BasisKind, config: &StoreConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .cache_capacity(config.map_size)
            .open()?;
        let store = Self {
            basis,
            kgram_sizes: config.kgram_sizes.clone(),
            meta: db.open_tree(TREE_META)?,
            templates_by_hash: db.open_tree(TREE_TEMPLATES_BY_HASH)?,
            templates_by_dims: db.open_tree(TREE_TEMPLATES_BY_DIMS)?,
            template_families: db.open_tree(TREE_TEMPLATE_FAMILIES)?,
            witnesses_by_hash: db.open_tree(TREE_WITNESSES_BY_HASH)?,
            witness_prefilter: db.open_tree(TREE_WITNESS_PREFILTER)?,
            db,
        };
        store.init_or_verify_meta()?;
        Ok(store)
    }

    fn init_or_verify_meta(&self) -> Result<()> {
        match self.meta.get(META_SCHEMA_VERSION)? {
            None => {
                self.meta
                    .insert(META_SCHEMA_VERSION, SCHEMA_VERSION.to_le_bytes().to_vec())?;
                self.meta
                    .insert(META_CANON_VERSION, CANONICALIZATION_VERSION.to_le_bytes().to_vec())?;
                self.meta
                    .insert(META_BASIS, self.basis.name().as_bytes().to_vec())?;
                self.meta
                    .insert(META_TEMPLATE_COUNT, 0u64.to_le_bytes().to_vec())?;
                self.meta.insert(META_WITNESS_COUNT, 0u64.to_le_bytes().to_vec())?;
                self.meta.flush()?;
                Ok(())
            }
            Some(raw) => {
                let found = meta_u32(&raw, META_SCHEMA_VERSION)?;
                if found != SCHEMA_VERSION {
                    return Err(Error::VersionMismatch {
                        what: "schema",
                        found,
                        supported: SCHEMA_VERSION,
                    });
                }
                let raw = self.meta.get(META_CANON_VERSION)?.ok_or(Error::Corruption {
                    message: "meta is missing the canonicalization version".to_string(),
                })?;
                let found = meta_u32(&raw, META_CANON_VERSION)?;
                if found != CANONICALIZATION_VERSION {
                    return Err(Error::VersionMismatch {
                        what: "canonicalization",
                        found,
                        supported: CANONICALIZATION_VERSION,
                    });
                }
                let raw = self.meta.get(META_BASIS)?.ok_or(Error::Corruption {
                    message: "meta is missing the basis name".to_string(),
                })?;
                let stored = String::from_utf8_lossy(&raw).to_string();
                if stored != self.basis.name() {
                    return Err(Error::BadInput {
                        message: format!(
                            "store holds basis '{stored}', opened as '{}'",
                            self.basis.name()
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn template_count(&self) -> Result<u64> {
        match self.meta.get(META_TEMPLATE_COUNT)? {
            Some(raw) => meta_u64(&raw, META_TEMPLATE_COUNT),
            None => Ok(0),
        }
    }

    pub fn witness_count(&self) -> Result<u64> {
        match self.meta.get(META_WITNESS_COUNT)? {
            Some(raw) => meta_u64(&raw, META_WITNESS_COUNT),
            None => Ok(0),
        }
    }

    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            schema_version: SCHEMA_VERSION,
            canonicalization_version: CANONICALIZATION_VERSION,
            basis: self.basis.name().to_string(),
            template_count: self.template_count()?,
            witness_count: self.witness_count()?,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Insert a template: canonicalize, dedup on the primary key, allocate
    /// the next monotonic id, and write the primary record, the dims
    /// back-reference and the family entry in one transaction.
    ///
    /// `family_hash = None` starts a new family keyed by the circuit's own
    /// canonical hash.
    pub fn insert_template(
        &self,
        circuit: &Circuit,
        origin: Origin,
        origin_template_id: u64,
        unroll_ops: u32,
        family_hash: Option<[u8; 32]>,
    ) -> Result<InsertOutcome<TemplateRecord>> {
        if circuit.basis() != self.basis {
            return Err(Error::BadInput {
                message: format!(
                    "{} circuit inserted into a {} store",
                    circuit.basis().name(),
                    self.basis.name()
                ),
            });
        }
        let (canonical, canonical_hash) = circuit.canonicalize()?;
        let width = circuit.width() as u8;
        let gate_count = circuit.gate_count() as u16;
        let gates_encoded = basis::encode_gates(canonical.gates());
        if gates_encoded.len() > u16::MAX as usize {
            return Err(Error::BadInput {
                message: format!("encoded gates exceed {} bytes", u16::MAX),
            });
        }
        let family_hash = family_hash.unwrap_or(canonical_hash);
        let basis_id = self.basis.id();

        let primary_key = records::template_key(basis_id, width, gate_count, &canonical_hash);
        let fam_key = records::family_key(basis_id, &family_hash);

        let result = (
            &self.meta,
            &self.templates_by_hash,
            &self.templates_by_dims,
            &self.template_families,
        )
            .transaction(|(meta, by_hash, by_dims, families)| {
                if by_hash.get(&primary_key)?.is_some() {
                    return Ok(None);
                }
                let count = match meta.get(META_TEMPLATE_COUNT)? {
                    Some(raw) => match meta_u64(&raw, META_TEMPLATE_COUNT) {
                        Ok(count) => count,
                        Err(e) => return abort(e),
                    },
                    None => 0,
                };
                let template_id = count + 1;
                meta.insert(META_TEMPLATE_COUNT, template_id.to_le_bytes().to_vec())?;

                let record = TemplateRecord {
                    template_id,
                    basis_id,
                    width,
                    gate_count,
                    canonical_hash,
                    family_hash,
                    origin,
                    origin_template_id,
                    unroll_ops,
                    gates_encoded: gates_encoded.clone(),
                };
                by_hash.insert(primary_key.as_slice(), record.encode())?;
                by_dims.insert(
                    records::dims_key(basis_id, width, gate_count, template_id),
                    canonical_hash.to_vec(),
                )?;
                let mut members = match families.get(&fam_key)? {
                    Some(existing) => existing.to_vec(),
                    None => Vec::new(),
                };
                members.extend_from_slice(&template_id.to_le_bytes());
                families.insert(fam_key.as_slice(), members)?;
                Ok(Some(record))
            });

        match result {
            Ok(Some(record)) => Ok(InsertOutcome::Inserted(record)),
            Ok(None) => Ok(InsertOutcome::Duplicate),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Point lookup by canonical hash.
    pub fn get_template(
        &self,
        width: u8,
        gate_count: u16,
        canonical_hash: &[u8; 32],
    ) -> Result<Option<TemplateRecord>> {
        let key = records::template_key(self.basis.id(), width, gate_count, canonical_hash);
        match self.templates_by_hash.get(key)? {
            Some(raw) => Ok(Some(TemplateRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// All templates at one `(width, gate_count)` cell, in dims-index order.
    pub fn templates_by_dims(&self, width: u8, gate_count: u16) -> Result<Vec<TemplateRecord>> {
        let prefix = records::dims_prefix(self.basis.id(), width, gate_count);
        let mut out = Vec::new();
        for entry in self.templates_by_dims.scan_prefix(prefix) {
            let (key, value) = entry?;
            let hash: [u8; 32] = value.as_ref().try_into().map_err(|_| Error::Corruption {
                message: format!("dims entry value has length {}", value.len()),
            })?;
            let record = self
                .get_template(width, gate_count, &hash)?
                .ok_or_else(|| Error::Corruption {
                    message: format!("dims key {key:?} has no primary record"),
                })?;
            out.push(record);
        }
        Ok(out)
    }

    /// Every template in the store, in `templates_by_dims` byte order.
    pub fn all_templates(&self) -> Result<Vec<TemplateRecord>> {
        let mut out = Vec::new();
        for entry in self.templates_by_dims.iter() {
            let (key, value) = entry?;
            if key.len() != 12 {
                return Err(Error::Corruption {
                    message: format!("dims key has length {}", key.len()),
                });
            }
            let width = key[1];
            let gate_count = u16::from_le_bytes([key[2], key[3]]);
            let hash: [u8; 32] = value.as_ref().try_into().map_err(|_| Error::Corruption {
                message: format!("dims entry value has length {}", value.len()),
            })?;
            let record = self
                .get_template(width, gate_count, &hash)?
                .ok_or_else(|| Error::Corruption {
                    message: "dims entry has no primary record".to_string(),
                })?;
            out.push(record);
        }
        Ok(out)
    }

    /// Template ids of one family, in insertion order.
    pub fn family_members(&self, family_hash: &[u8; 32]) -> Result<Vec<u64>> {
        let key = records::family_key(self.basis.id(), family_hash);
        match self.template_families.get(key)? {
            Some(raw) => records::decode_id_list(&raw),
            None => Ok(Vec::new()),
        }
    }

    /// Build and insert the witness for a template: the canonical prefix of
    /// `gc/2 + 1` gates, plus its k-gram tokens into the inverted prefilter.
    pub fn insert_witness_for(
        &self,
        template: &TemplateRecord,
    ) -> Result<InsertOutcome<WitnessRecord>> {
        let gates = template.gates()?;
        let width = template.width;
        let prefix_len = (gates.len() / 2 + 1).min(gates.len());
        let prefix = &gates[..prefix_len];
        let (canonical, witness_hash) =
            basis::canonicalize(self.basis, prefix, width as usize)?;
        let gates_encoded = basis::encode_gates(&canonical);
        let witness_len = prefix_len as u16;

        let mut tokens: Vec<u64> = Vec::new();
        for &k in &self.kgram_sizes {
            if canonical.len() < k {
                continue;
            }
            for window in canonical.windows(k) {
                tokens.push(kgram_token(self.basis, window, width as usize)?);
            }
        }
        tokens.sort_unstable();
        tokens.dedup();

        let basis_id = self.basis.id();
        let witness_key = records::witness_key(basis_id, width, witness_len, &witness_hash);
        let source_template_id = template.template_id;

        let result = (&self.meta, &self.witnesses_by_hash, &self.witness_prefilter)
            .transaction(|(meta, by_hash, prefilter)| {
                if by_hash.get(&witness_key)?.is_some() {
                    return Ok(None);
                }
                let count = match meta.get(META_WITNESS_COUNT)? {
                    Some(raw) => match meta_u64(&raw, META_WITNESS_COUNT) {
                        Ok(count) => count,
                        Err(e) => return abort(e),
                    },
                    None => 0,
                };
                let witness_id = count + 1;
                meta.insert(META_WITNESS_COUNT, witness_id.to_le_bytes().to_vec())?;

                let record = WitnessRecord {
                    witness_id,
                    basis_id,
                    width,
                    witness_len,
                    witness_hash,
                    source_template_id,
                    gates_encoded: gates_encoded.clone(),
                };
                by_hash.insert(witness_key.as_slice(), record.encode())?;

                for &token in &tokens {
                    let key = records::prefilter_key(basis_id, width, token);
                    let mut bucket = match prefilter.get(&key)? {
                        Some(existing) => existing.to_vec(),
                        None => Vec::new(),
                    };
                    bucket.extend_from_slice(&witness_id.to_le_bytes());
                    prefilter.insert(key, bucket)?;
                }
                Ok(Some(record))
            });

        match result {
            Ok(Some(record)) => Ok(InsertOutcome::Inserted(record)),
            Ok(None) => Ok(InsertOutcome::Duplicate),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    pub fn get_witness(
        &self,
        width: u8,
        witness_len: u16,
        witness_hash: &[u8; 32],
    ) -> Result<Option<WitnessRecord>> {
        let key = records::witness_key(self.basis.id(), width, witness_len, witness_hash);
        match self.witnesses_by_hash.get(key)? {
            Some(raw) => Ok(Some(WitnessRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Witness ids whose token bucket matches.
    pub fn prefilter_lookup(&self, width: u8, token: u64) -> Result<Vec<u64>> {
        let key = records::prefilter_key(self.basis.id(), width, token);
        match self.witness_prefilter.get(key)? {
            Some(raw) => records::decode_id_list(&raw),
            None => Ok(Vec::new()),
        }
    }
}

/// First 8 bytes, little-endian, of the canonical hash of a gate window.
pub fn kgram_token(basis: BasisKind, window: &[basis::Gate], width: usize) -> Result<u64> {
    let hash = basis::canonical_hash(basis, window, width)?;
    Ok(u64::from_le_bytes(
        hash[..8].try_into().expect("hash has 32 bytes"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::eca57_circuit;

    fn temp_store() -> (tempfile::TempDir, TemplateDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = TemplateDb::open(dir.path(), BasisKind::Eca57, &test_config()).unwrap();
        (dir, db)
    }

    fn test_config() -> StoreConfig {
        StoreConfig {
            // keep the page cache tiny in tests
            map_size: 16 * 1024 * 1024,
            kgram_sizes: vec![2, 3],
        }
    }

    #[test]
    fn insert_dedup_and_monotonic_ids() {
        let (_dir, db) = temp_store();
        let a = eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap();
        // structurally different, so its canonical form is a new template
        let b = eca57_circuit(3, &[(0, 1, 2), (1, 2, 0)]).unwrap();

        let first = db
            .insert_template(&a, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(first.template_id, 1);

        // relabeling of `a` shares its canonical hash
        let relabeled = a.permute(&[1, 0, 2]).unwrap();
        assert_eq!(
            db.insert_template(&relabeled, Origin::Sat, 0, 0, None)
                .unwrap(),
            InsertOutcome::Duplicate
        );

        let second = db
            .insert_template(&b, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(second.template_id, 2);
        assert_eq!(db.template_count().unwrap(), 2);
    }

    #[test]
    fn dims_index_and_point_lookup_agree() {
        let (_dir, db) = temp_store();
        let c = eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap();
        let record = db
            .insert_template(&c, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();

        let by_dims = db.templates_by_dims(3, 2).unwrap();
        assert_eq!(by_dims, vec![record.clone()]);
        assert!(db.templates_by_dims(4, 2).unwrap().is_empty());

        let found = db
            .get_template(3, 2, &record.canonical_hash)
            .unwrap()
            .unwrap();
        assert_eq!(found, record);
    }

    #[test]
    fn families_share_hash_and_list_each_member_once() {
        let (_dir, db) = temp_store();
        let seed =
            eca57_circuit(3, &[(0, 1, 2), (0, 1, 2), (1, 2, 0), (1, 2, 0)]).unwrap();
        let seed_record = db
            .insert_template(&seed, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();

        // rotations have a different canonical form but stay in the family
        let variant = seed.rotate(1);
        let variant_record = db
            .insert_template(
                &variant,
                Origin::Unroll,
                seed_record.template_id,
                crate::unroll::OP_ROTATE,
                Some(seed_record.family_hash),
            )
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(variant_record.family_hash, seed_record.family_hash);
        assert_eq!(variant_record.origin_template_id, seed_record.template_id);

        let members = db.family_members(&seed_record.family_hash).unwrap();
        assert_eq!(
            members,
            vec![seed_record.template_id, variant_record.template_id]
        );
    }

    #[test]
    fn witness_and_prefilter_round_trip() {
        let (_dir, db) = temp_store();
        let c = eca57_circuit(3, &[(0, 1, 2), (1, 2, 0), (1, 2, 0), (0, 1, 2)]).unwrap();
        let template = db
            .insert_template(&c, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();

        let witness = db
            .insert_witness_for(&template)
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(witness.witness_len, 3);
        assert_eq!(witness.source_template_id, template.template_id);

        // again from the same template: same prefix hash, duplicate
        assert_eq!(
            db.insert_witness_for(&template).unwrap(),
            InsertOutcome::Duplicate
        );

        // the token of the first length-2 window finds the witness
        let gates = witness.gates().unwrap();
        let token = kgram_token(BasisKind::Eca57, &gates[..2], 3).unwrap();
        let bucket = db.prefilter_lookup(3, token).unwrap();
        assert!(bucket.contains(&witness.witness_id));

        let found = db
            .get_witness(3, witness.witness_len, &witness.witness_hash)
            .unwrap()
            .unwrap();
        assert_eq!(found, witness);
    }

    #[test]
    fn version_mismatch_refuses_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = TemplateDb::open(dir.path(), BasisKind::Eca57, &test_config()).unwrap();
            db.flush().unwrap();
        }
        // rewrite the canonicalization version behind the store's back
        {
            let raw = sled::open(dir.path()).unwrap();
            let meta = raw.open_tree(TREE_META).unwrap();
            meta.insert(META_CANON_VERSION, 2u32.to_le_bytes().to_vec()).unwrap();
            meta.flush().unwrap();
        }
        match TemplateDb::open(dir.path(), BasisKind::Eca57, &test_config()) {
            Err(Error::VersionMismatch { found, .. }) => assert_eq!(found, 2),
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn wrong_basis_refuses_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            TemplateDb::open(dir.path(), BasisKind::Eca57, &test_config()).unwrap();
        }
        assert!(matches!(
            TemplateDb::open(dir.path(), BasisKind::Mct, &test_config()),
            Err(Error::BadInput { .. })
        ));
    }
}
