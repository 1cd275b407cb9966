//! Packed on-disk record layouts.
//!
//! All integers little-endian; layouts are byte-stable across
//! implementations and covered by the round-trip tests. Changing them means
//! bumping the schema version.

use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::basis::{self, BasisKind, Gate};
use crate::circuit::Circuit;
use crate::error::{Error, Result};

/// How a template entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Origin {
    Sat = 1,
    Unroll = 2,
}

/// Fixed header: id(8) basis(1) width(1) gc(2) canonical(32) family(32)
/// origin(1) origin_id(8) unroll_ops(4) gates_len(2).
const TEMPLATE_HEADER_LEN: usize = 91;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub template_id: u64,
    pub basis_id: u8,
    pub width: u8,
    pub gate_count: u16,
    pub canonical_hash: [u8; 32],
    pub family_hash: [u8; 32],
    pub origin: Origin,
    /// Seed template for unrolled records; 0 means none.
    pub origin_template_id: u64,
    pub unroll_ops: u32,
    pub gates_encoded: Vec<u8>,
}

impl TemplateRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TEMPLATE_HEADER_LEN + self.gates_encoded.len());
        buf.put_u64_le(self.template_id);
        buf.put_u8(self.basis_id);
        buf.put_u8(self.width);
        buf.put_u16_le(self.gate_count);
        buf.put_slice(&self.canonical_hash);
        buf.put_slice(&self.family_hash);
        buf.put_u8(self.origin.into());
        buf.put_u64_le(self.origin_template_id);
        buf.put_u32_le(self.unroll_ops);
        buf.put_u16_le(self.gates_encoded.len() as u16);
        buf.put_slice(&self.gates_encoded);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < TEMPLATE_HEADER_LEN {
            return Err(Error::Corruption {
                message: format!(
                    "template record too short: {} < {TEMPLATE_HEADER_LEN}",
                    data.len()
                ),
            });
        }
        let mut buf = data;
        let template_id = buf.get_u64_le();
        let basis_id = buf.get_u8();
        let width = buf.get_u8();
        let gate_count = buf.get_u16_le();
        let mut canonical_hash = [0u8; 32];
        buf.copy_to_slice(&mut canonical_hash);
        let mut family_hash = [0u8; 32];
        buf.copy_to_slice(&mut family_hash);
        let origin = Origin::try_from(buf.get_u8()).map_err(|e| Error::Corruption {
            message: format!("template {template_id}: bad origin ({e})"),
        })?;
        let origin_template_id = buf.get_u64_le();
        let unroll_ops = buf.get_u32_le();
        let gates_len = buf.get_u16_le() as usize;
        if buf.remaining() != gates_len {
            return Err(Error::Corruption {
                message: format!(
                    "template {template_id}: gates length {gates_len} but {} bytes remain",
                    buf.remaining()
                ),
            });
        }
        Ok(Self {
            template_id,
            basis_id,
            width,
            gate_count,
            canonical_hash,
            family_hash,
            origin,
            origin_template_id,
            unroll_ops,
            gates_encoded: buf.to_vec(),
        })
    }

    pub fn basis(&self) -> Result<BasisKind> {
        BasisKind::from_id(self.basis_id)
    }

    /// Decode the stored gate list; malformed bytes are store corruption.
    pub fn gates(&self) -> Result<Vec<Gate>> {
        let basis = self.basis()?;
        basis::decode_gates(basis, &self.gates_encoded).map_err(|e| Error::Corruption {
            message: format!("template {}: {e}", self.template_id),
        })
    }

    pub fn circuit(&self) -> Result<Circuit> {
        Circuit::from_gates(self.basis()?, self.width as usize, self.gates()?)
    }
}

/// Fixed header: id(8) basis(1) width(1) len(2) hash(32) source(8)
/// gates_len(2).
const WITNESS_HEADER_LEN: usize = 54;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRecord {
    pub witness_id: u64,
    pub basis_id: u8,
    pub width: u8,
    pub witness_len: u16,
    pub witness_hash: [u8; 32],
    /// One representative template the witness was cut from.
    pub source_template_id: u64,
    pub gates_encoded: Vec<u8>,
}

impl WitnessRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WITNESS_HEADER_LEN + self.gates_encoded.len());
        buf.put_u64_le(self.witness_id);
        buf.put_u8(self.basis_id);
        buf.put_u8(self.width);
        buf.put_u16_le(self.witness_len);
        buf.put_slice(&self.witness_hash);
        buf.put_u64_le(self.source_template_id);
        buf.put_u16_le(self.gates_encoded.len() as u16);
        buf.put_slice(&self.gates_encoded);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < WITNESS_HEADER_LEN {
            return Err(Error::Corruption {
                message: format!(
                    "witness record too short: {} < {WITNESS_HEADER_LEN}",
                    data.len()
                ),
            });
        }
        let mut buf = data;
        let witness_id = buf.get_u64_le();
        let basis_id = buf.get_u8();
        let width = buf.get_u8();
        let witness_len = buf.get_u16_le();
        let mut witness_hash = [0u8; 32];
        buf.copy_to_slice(&mut witness_hash);
        let source_template_id = buf.get_u64_le();
        let gates_len = buf.get_u16_le() as usize;
        if buf.remaining() != gates_len {
            return Err(Error::Corruption {
                message: format!(
                    "witness {witness_id}: gates length {gates_len} but {} bytes remain",
                    buf.remaining()
                ),
            });
        }
        Ok(Self {
            witness_id,
            basis_id,
            width,
            witness_len,
            witness_hash,
            source_template_id,
            gates_encoded: buf.to_vec(),
        })
    }

    pub fn gates(&self) -> Result<Vec<Gate>> {
        let basis = BasisKind::from_id(self.basis_id)?;
        basis::decode_gates(basis, &self.gates_encoded).map_err(|e| Error::Corruption {
            message: format!("witness {}: {e}", self.witness_id),
        })
    }
}

// --- key layouts -----------------------------------------------------------

pub(crate) fn template_key(basis: u8, width: u8, gc: u16, hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.put_u8(basis);
    key.put_u8(width);
    key.put_u16_le(gc);
    key.put_slice(hash);
    key
}

pub(crate) fn dims_prefix(basis: u8, width: u8, gc: u16) -> Vec<u8> {
    let mut key = Vec::with_capacity(4);
    key.put_u8(basis);
    key.put_u8(width);
    key.put_u16_le(gc);
    key
}

pub(crate) fn dims_key(basis: u8, width: u8, gc: u16, template_id: u64) -> Vec<u8> {
    let mut key = dims_prefix(basis, width, gc);
    key.put_u64_le(template_id);
    key
}

pub(crate) fn family_key(basis: u8, family_hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.put_u8(basis);
    key.put_slice(family_hash);
    key
}

pub(crate) fn witness_key(basis: u8, width: u8, witness_len: u16, hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.put_u8(basis);
    key.put_u8(width);
    key.put_u16_le(witness_len);
    key.put_slice(hash);
    key
}

pub(crate) fn prefilter_key(basis: u8, width: u8, token: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.put_u8(basis);
    key.put_u8(width);
    key.put_u64_le(token);
    key
}

/// Decode an append-only list of little-endian u64 ids.
pub(crate) fn decode_id_list(data: &[u8]) -> Result<Vec<u64>> {
    if data.len() % 8 != 0 {
        return Err(Error::Corruption {
            message: format!("id list length {} is not a multiple of 8", data.len()),
        });
    }
    Ok(data
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("chunk of 8")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::encode_gates;
    use crate::circuit::eca57_circuit;

    fn sample_template() -> TemplateRecord {
        let circuit = eca57_circuit(3, &[(0, 1, 2), (1, 2, 0)]).unwrap();
        let (canonical, hash) = circuit.canonicalize().unwrap();
        TemplateRecord {
            template_id: 7,
            basis_id: BasisKind::Eca57.id(),
            width: 3,
            gate_count: 2,
            canonical_hash: hash,
            family_hash: hash,
            origin: Origin::Sat,
            origin_template_id: 0,
            unroll_ops: 0,
            gates_encoded: encode_gates(canonical.gates()),
        }
    }

    #[test]
    fn template_round_trip() {
        let record = sample_template();
        let bytes = record.encode();
        assert_eq!(bytes.len(), 91 + 6);
        let back = TemplateRecord::decode(&bytes).unwrap();
        assert_eq!(record, back);
        // decoded gates re-canonicalize to the stored hash
        let circuit = back.circuit().unwrap();
        assert_eq!(circuit.canonical_hash().unwrap(), back.canonical_hash);
    }

    #[test]
    fn template_decode_rejects_bad_lengths() {
        let record = sample_template();
        let bytes = record.encode();
        assert!(matches!(
            TemplateRecord::decode(&bytes[..40]),
            Err(Error::Corruption { .. })
        ));
        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            TemplateRecord::decode(&trailing),
            Err(Error::Corruption { .. })
        ));
    }

    #[test]
    fn witness_round_trip() {
        let circuit = eca57_circuit(3, &[(0, 1, 2)]).unwrap();
        let (canonical, hash) = circuit.canonicalize().unwrap();
        let record = WitnessRecord {
            witness_id: 3,
            basis_id: BasisKind::Eca57.id(),
            width: 3,
            witness_len: 1,
            witness_hash: hash,
            source_template_id: 7,
            gates_encoded: encode_gates(canonical.gates()),
        };
        let bytes = record.encode();
        assert_eq!(bytes.len(), 54 + 3);
        assert_eq!(WitnessRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn id_list_decoding() {
        let mut data = Vec::new();
        data.put_u64_le(1);
        data.put_u64_le(99);
        assert_eq!(decode_id_list(&data).unwrap(), vec![1, 99]);
        assert!(decode_id_list(&data[..7]).is_err());
    }

    #[test]
    fn key_lengths() {
        let hash = [0u8; 32];
        assert_eq!(template_key(1, 3, 2, &hash).len(), 36);
        assert_eq!(dims_key(1, 3, 2, 1).len(), 12);
        assert_eq!(family_key(1, &hash).len(), 33);
        assert_eq!(witness_key(1, 3, 2, &hash).len(), 36);
        assert_eq!(prefilter_key(1, 3, 0xdead).len(), 10);
    }
}
