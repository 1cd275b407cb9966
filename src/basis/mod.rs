//! Gate bases: the gate algebra each circuit family lives in.
//!
//! A basis bundles commutation, inversion, serialization and
//! canonicalization for one gate family. The two concrete bases are
//! [`Eca57Gate`] and [`MctGate`], dispatched through the [`Gate`] and
//! [`BasisKind`] sum types.

pub mod eca57;
pub mod mct;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{BadGateSnafu, Error, Result};
use snafu::ensure;

pub use eca57::Eca57Gate;
pub use mct::MctGate;

/// Stable basis discriminants; these go on disk.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum BasisKind {
    Eca57 = 1,
    Mct = 2,
}

impl BasisKind {
    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from(id).map_err(|_| Error::UnknownBasis { id })
    }

    pub fn id(self) -> u8 {
        self.into()
    }

    /// Name used in hash headers and the store's `basis` meta key.
    pub fn name(self) -> &'static str {
        match self {
            BasisKind::Eca57 => "eca57",
            BasisKind::Mct => "mct",
        }
    }

    /// Smallest width the basis is defined on.
    pub fn min_width(self) -> usize {
        match self {
            BasisKind::Eca57 => 3,
            BasisKind::Mct => 1,
        }
    }
}

impl core::str::FromStr for BasisKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eca57" => Ok(BasisKind::Eca57),
            "mct" => Ok(BasisKind::Mct),
            other => Err(Error::BadInput {
                message: format!("unknown basis '{other}'"),
            }),
        }
    }
}

/// A gate from either basis. Circuits never mix bases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    Eca57(Eca57Gate),
    Mct(MctGate),
}

impl Gate {
    pub fn basis(&self) -> BasisKind {
        match self {
            Gate::Eca57(_) => BasisKind::Eca57,
            Gate::Mct(_) => BasisKind::Mct,
        }
    }

    /// Wires the gate touches, in the order canonicalization visits them.
    pub fn touched_wires(&self) -> Vec<u8> {
        match self {
            Gate::Eca57(g) => g.wires().to_vec(),
            Gate::Mct(g) => g.wires(),
        }
    }

    /// Both bases are self-inverse.
    pub fn invert(&self) -> Gate {
        self.clone()
    }

    /// Whether swapping two adjacent gates leaves the composed permutation
    /// unchanged. Gates from different bases never commute (they never meet
    /// in a well-formed circuit either).
    pub fn commutes(&self, other: &Gate) -> bool {
        match (self, other) {
            (Gate::Eca57(a), Gate::Eca57(b)) => a.commutes(b),
            (Gate::Mct(a), Gate::Mct(b)) => a.commutes(b),
            _ => false,
        }
    }

    pub fn check_width(&self, width: usize) -> Result<()> {
        match self {
            Gate::Eca57(g) => g.check_width(width),
            Gate::Mct(g) => g.check_width(width),
        }
    }

    pub(crate) fn relabel(&self, map: impl Fn(u8) -> u8) -> Gate {
        match self {
            Gate::Eca57(g) => Gate::Eca57(g.relabel(map)),
            Gate::Mct(g) => Gate::Mct(g.relabel(map)),
        }
    }

    pub(crate) fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Gate::Eca57(g) => g.serialize_into(out),
            Gate::Mct(g) => g.serialize_into(out),
        }
    }
}

/// Pack a gate list into the stable byte form used for hashing and storage.
pub fn encode_gates(gates: &[Gate]) -> Vec<u8> {
    let mut out = Vec::with_capacity(gates.len() * 3);
    for gate in gates {
        gate.serialize_into(&mut out);
    }
    out
}

/// Decode a packed gate list. Every decoded gate is validated; trailing
/// bytes are rejected.
pub fn decode_gates(basis: BasisKind, mut data: &[u8]) -> Result<Vec<Gate>> {
    let mut gates = Vec::new();
    while !data.is_empty() {
        let (gate, used) = match basis {
            BasisKind::Eca57 => {
                let (g, n) = Eca57Gate::deserialize(data)?;
                (Gate::Eca57(g), n)
            }
            BasisKind::Mct => {
                let (g, n) = MctGate::deserialize(data)?;
                (Gate::Mct(g), n)
            }
        };
        gates.push(gate);
        data = &data[used..];
    }
    Ok(gates)
}

/// Canonicalize a gate list: renumber wires in order of first occurrence
/// (first touched wire becomes 0, next new wire 1, ...) and hash the result.
///
/// The hash is the cross-process equality oracle:
/// `BLAKE3("<name>:<width>:<gc>:" || serialized canonical gates)`, with the
/// empty circuit hashing `"<name>:0:"`.
pub fn canonicalize(
    basis: BasisKind,
    gates: &[Gate],
    width: usize,
) -> Result<(Vec<Gate>, [u8; 32])> {
    ensure!(
        width <= 255,
        BadGateSnafu {
            message: format!("width {width} exceeds the 255-wire encoding limit"),
        }
    );
    if gates.is_empty() {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("{}:0:", basis.name()).as_bytes());
        return Ok((Vec::new(), *hasher.finalize().as_bytes()));
    }

    let mut map = [u8::MAX; 256];
    let mut next: u8 = 0;
    for gate in gates {
        ensure!(
            gate.basis() == basis,
            BadGateSnafu {
                message: format!("{} gate in a {} circuit", gate.basis().name(), basis.name()),
            }
        );
        gate.check_width(width)?;
        for wire in gate.touched_wires() {
            if map[wire as usize] == u8::MAX {
                map[wire as usize] = next;
                next += 1;
            }
        }
    }

    let canonical: Vec<Gate> = gates
        .iter()
        .map(|g| g.relabel(|w| map[w as usize]))
        .collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("{}:{}:{}:", basis.name(), width, gates.len()).as_bytes());
    hasher.update(&encode_gates(&canonical));
    Ok((canonical, *hasher.finalize().as_bytes()))
}

/// Shorthand when only the hash is needed.
pub fn canonical_hash(basis: BasisKind, gates: &[Gate], width: usize) -> Result<[u8; 32]> {
    Ok(canonicalize(basis, gates, width)?.1)
}
