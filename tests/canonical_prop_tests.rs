//! Randomized checks of the canonicalization and transform laws.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use revsynth::basis::eca57::all_gates;
use revsynth::basis::Gate;
use revsynth::circuit::Circuit;
use revsynth::BasisKind;

fn random_circuit(rng: &mut StdRng, width: usize, gate_count: usize) -> Circuit {
    let pool = all_gates(width);
    let mut circuit = Circuit::new(BasisKind::Eca57, width).unwrap();
    for _ in 0..gate_count {
        let gate = pool[rng.gen_range(0..pool.len())];
        circuit.push(Gate::Eca57(gate)).unwrap();
    }
    circuit
}

#[test]
fn canonicalization_is_stable_on_random_circuits() {
    let mut rng = StdRng::seed_from_u64(424242);
    for _ in 0..200 {
        let width = rng.gen_range(3..=6);
        let gate_count = rng.gen_range(1..=8);
        let circuit = random_circuit(&mut rng, width, gate_count);
        let (canonical, hash) = circuit.canonicalize().unwrap();
        let (again, hash2) = canonical.canonicalize().unwrap();
        assert_eq!(canonical.gates(), again.gates());
        assert_eq!(hash, hash2);
    }
}

#[test]
fn random_relabelings_share_the_canonical_hash() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let width = rng.gen_range(3..=6);
        let gate_count = rng.gen_range(1..=8);
        let circuit = random_circuit(&mut rng, width, gate_count);

        let mut perm: Vec<u8> = (0..width as u8).collect();
        perm.shuffle(&mut rng);
        let relabeled = circuit.permute(&perm).unwrap();

        assert_eq!(
            circuit.canonical_hash().unwrap(),
            relabeled.canonical_hash().unwrap()
        );
    }
}

#[test]
fn a_circuit_followed_by_its_mirror_is_the_identity() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..100 {
        let width = rng.gen_range(3..=5);
        let gate_count = rng.gen_range(1..=6);
        let circuit = random_circuit(&mut rng, width, gate_count);

        let mut doubled = Circuit::new(BasisKind::Eca57, width).unwrap();
        for gate in circuit.gates() {
            doubled.push(gate.clone()).unwrap();
        }
        for gate in circuit.mirror().gates() {
            doubled.push(gate.clone()).unwrap();
        }
        assert!(doubled.is_identity());
    }
}

#[test]
fn mirror_is_an_involution() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..50 {
        let circuit = random_circuit(&mut rng, 4, 6);
        assert_eq!(circuit.mirror().mirror().gates(), circuit.gates());
    }
}
