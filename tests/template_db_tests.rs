//! Store-level scenarios: families, witnesses, prefilter retrieval, merge.

use revsynth::circuit::eca57_circuit;
use revsynth::merge::merge_stores;
use revsynth::store::{kgram_token, InsertOutcome, Origin, StoreConfig, TemplateDb};
use revsynth::unroll::{unroll, UnrollConfig};
use revsynth::{BasisKind, Circuit};

fn config() -> StoreConfig {
    StoreConfig {
        map_size: 16 * 1024 * 1024,
        kgram_sizes: vec![2, 3],
    }
}

fn open(dir: &std::path::Path) -> TemplateDb {
    TemplateDb::open(dir, BasisKind::Eca57, &config()).unwrap()
}

#[test]
fn unrolled_family_shares_hash_and_links_to_seed() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    let seed_circuit = eca57_circuit(3, &[(0, 1, 2), (1, 2, 0)]).unwrap();
    let seed = db
        .insert_template(&seed_circuit, Origin::Sat, 0, 0, None)
        .unwrap()
        .into_record()
        .unwrap();

    let unroll_config = UnrollConfig {
        swap_bfs_budget: 10,
        ..UnrollConfig::default()
    };
    let variants = unroll(&seed_circuit, &unroll_config).unwrap();
    assert!(variants.len() > 1);

    let mut inserted = 0;
    for (variant, ops) in &variants {
        let outcome = db
            .insert_template(
                variant,
                Origin::Unroll,
                seed.template_id,
                *ops,
                Some(seed.family_hash),
            )
            .unwrap();
        if outcome.is_inserted() {
            inserted += 1;
        }
    }
    assert!(inserted >= 1, "expected at least one new family member");

    // family closure: every member exists, shares the family hash, appears
    // exactly once in the member list
    let members = db.family_members(&seed.family_hash).unwrap();
    assert!(members.contains(&seed.template_id));
    let mut sorted = members.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), members.len(), "member listed twice");

    for record in db.templates_by_dims(3, 2).unwrap() {
        assert_eq!(record.family_hash, seed.family_hash);
        assert_eq!(record.basis_id, BasisKind::Eca57.id());
        assert_eq!(record.width, 3);
        // every variant's canonical hash is reachable by lookup
        let found = db
            .get_template(3, 2, &record.canonical_hash)
            .unwrap()
            .unwrap();
        assert_eq!(found.template_id, record.template_id);
    }
}

#[test]
fn witness_prefilter_retrieves_the_template() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    // two distinct gc-2 templates
    let circuits = [
        eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap(),
        eca57_circuit(3, &[(0, 1, 2), (1, 2, 0)]).unwrap(),
    ];
    for circuit in &circuits {
        let record = db
            .insert_template(circuit, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();
        let witness = db.insert_witness_for(&record).unwrap().into_record().unwrap();
        // witness of a gc-2 template is 2 gates long
        assert_eq!(witness.witness_len, 2);
    }
    assert_eq!(db.witness_count().unwrap(), 2);

    // each template is retrievable through the token of its first
    // length-2 window
    for circuit in &circuits {
        let (canonical, _) = circuit.canonicalize().unwrap();
        let token = kgram_token(BasisKind::Eca57, &canonical.gates()[..2], 3).unwrap();
        let bucket = db.prefilter_lookup(3, token).unwrap();
        assert!(!bucket.is_empty(), "prefilter bucket must not be empty");
    }
}

#[test]
fn duplicate_count_equals_distinct_canonical_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    let seed = eca57_circuit(4, &[(0, 1, 2), (0, 1, 2), (3, 0, 1), (3, 0, 1)]).unwrap();
    let variants = unroll(&seed, &UnrollConfig::default()).unwrap();

    let mut distinct = std::collections::BTreeSet::new();
    for (variant, _) in &variants {
        distinct.insert(variant.canonical_hash().unwrap());
        let _ = db
            .insert_template(variant, Origin::Sat, 0, 0, None)
            .unwrap();
    }
    assert_eq!(db.template_count().unwrap(), distinct.len() as u64);
}

#[test]
fn merge_after_disjoint_jobs_holds_the_union() {
    let root = tempfile::tempdir().unwrap();
    let jobs = root.path().join("jobs");

    // two "cluster jobs", one cell each
    let cells: [(&str, Circuit); 2] = [
        (
            "w3_gc2",
            eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap(),
        ),
        (
            "w3_gc4",
            eca57_circuit(3, &[(0, 1, 2), (1, 2, 0), (1, 2, 0), (0, 1, 2)]).unwrap(),
        ),
    ];
    let mut all_hashes = std::collections::BTreeSet::new();
    for (name, seed) in &cells {
        let path = jobs.join(name);
        std::fs::create_dir_all(&path).unwrap();
        let db = open(&path);
        let record = db
            .insert_template(seed, Origin::Sat, 0, 0, None)
            .unwrap()
            .into_record()
            .unwrap();
        all_hashes.insert(record.canonical_hash);
        for (variant, ops) in unroll(seed, &UnrollConfig::default()).unwrap() {
            all_hashes.insert(variant.canonical_hash().unwrap());
            let _ = db
                .insert_template(
                    &variant,
                    Origin::Unroll,
                    record.template_id,
                    ops,
                    Some(record.family_hash),
                )
                .unwrap();
        }
        db.flush().unwrap();
    }

    let out = root.path().join("merged");
    let report = merge_stores(&jobs, &out, BasisKind::Eca57, &config(), false).unwrap();
    assert_eq!(report.total_inserted(), all_hashes.len() as u64);

    let merged = open(&out);
    assert_eq!(merged.template_count().unwrap(), all_hashes.len() as u64);
    for hash in &all_hashes {
        let found = merged.get_template(3, 2, hash).unwrap().is_some()
            || merged.get_template(3, 4, hash).unwrap().is_some();
        assert!(found, "merged store is missing a template");
    }
}

#[test]
fn reopened_store_remembers_counts() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open(dir.path());
        let c = eca57_circuit(3, &[(0, 1, 2), (0, 1, 2)]).unwrap();
        db.insert_template(&c, Origin::Sat, 0, 0, None).unwrap();
        db.flush().unwrap();
    }
    let db = open(dir.path());
    assert_eq!(db.template_count().unwrap(), 1);
    let again = eca57_circuit(3, &[(1, 0, 2), (1, 0, 2)]).unwrap();
    assert_eq!(
        db.insert_template(&again, Origin::Sat, 0, 0, None).unwrap(),
        InsertOutcome::Duplicate
    );
}
