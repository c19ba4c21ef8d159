//! Typed headers of the circom/snarkjs binary artifacts.
//!
//! These are the only parts of the binary encodings the pipeline interprets:
//! enough to detect cross-circuit contamination, skipped ceremony steps and
//! stale keys before handing artifacts to the proving tool.

use std::path::Path;

use num_bigint::BigUint;

use crate::binfile::{BinFile, SectionCursor};
use crate::errors::{PipelineError, PipelineResult};
use crate::field::{from_le_bytes, Curve};

const R1CS_HEADER: u32 = 1;
const WTNS_HEADER: u32 = 1;
const WTNS_DATA: u32 = 2;
const ZKEY_HEADER: u32 = 1;
const ZKEY_GROTH16_HEADER: u32 = 2;
const ZKEY_MPC_PARAMS: u32 = 10;
const PTAU_HEADER: u32 = 1;
const PTAU_CONTRIBUTIONS: u32 = 7;
/// Sections written by `powersoftau prepare phase2`.
const PTAU_PHASE2_SECTIONS: [u32; 4] = [12, 13, 14, 15];

/// Protocol id snarkjs stores for Groth16 keys.
pub const GROTH16_PROTOCOL: u32 = 1;

/// Header of a compiled constraint system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R1csHeader {
    pub prime: BigUint,
    pub n_wires: u32,
    pub n_pub_out: u32,
    pub n_pub_in: u32,
    pub n_prv_in: u32,
    pub n_labels: u64,
    pub n_constraints: u32,
}

impl R1csHeader {
    pub fn read(path: &Path) -> PipelineResult<Self> {
        let mut file = BinFile::open(path, b"r1cs", "constraint system")?;
        parse(path, "constraint system", || {
            let body = file.read_section(R1CS_HEADER, None)?;
            let mut cur = SectionCursor::new(&body);
            let n8 = cur.u32()? as usize;
            let prime = from_le_bytes(cur.bytes(n8)?);
            Ok(Self {
                prime,
                n_wires: cur.u32()?,
                n_pub_out: cur.u32()?,
                n_pub_in: cur.u32()?,
                n_prv_in: cur.u32()?,
                n_labels: cur.u64()?,
                n_constraints: cur.u32()?,
            })
        })
    }

    pub fn curve(&self) -> Option<Curve> {
        Curve::from_scalar_modulus(&self.prime)
    }

    /// Public signals: outputs first, then public inputs.
    pub fn n_public(&self) -> u32 {
        self.n_pub_out + self.n_pub_in
    }

    /// Wire indices that hold main-component inputs (public, then private).
    pub fn input_wires(&self) -> std::ops::Range<u32> {
        let start = 1 + self.n_pub_out;
        start..start + self.n_pub_in + self.n_prv_in
    }
}

/// A computed witness. Wire 0 is the constant `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessFile {
    pub prime: BigUint,
    pub values: Vec<BigUint>,
}

impl WitnessFile {
    pub fn read(path: &Path) -> PipelineResult<Self> {
        let mut file = BinFile::open(path, b"wtns", "witness")?;
        parse(path, "witness", || {
            let header = file.read_section(WTNS_HEADER, None)?;
            let mut cur = SectionCursor::new(&header);
            let n8 = cur.u32()? as usize;
            if n8 == 0 {
                return Err("zero-width field elements".to_string());
            }
            let prime = from_le_bytes(cur.bytes(n8)?);
            let n_witness = cur.u32()? as usize;

            let expected = n_witness as u64 * n8 as u64;
            if file.section_size(WTNS_DATA) != Some(expected) {
                return Err(format!(
                    "data section holds {:?} bytes, header announces {} values of {} bytes",
                    file.section_size(WTNS_DATA),
                    n_witness,
                    n8
                ));
            }
            let data = file.read_section(WTNS_DATA, None)?;
            let values = data.chunks(n8).map(from_le_bytes).collect();
            Ok(Self { prime, values })
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values of wires `1..=n_public`, the order snarkjs writes `public.json` in.
    pub fn public_signals(&self, n_public: usize) -> Option<&[BigUint]> {
        self.values.get(1..1 + n_public)
    }
}

/// Header of a Groth16 proving key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkeyHeader {
    pub protocol: u32,
    pub q: BigUint,
    pub r: BigUint,
    pub n_vars: u32,
    pub n_public: u32,
    pub domain_size: u32,
    /// Hash binding the key to its constraint system, hex encoded.
    pub circuit_hash: String,
    pub contributions: u32,
}

impl ZkeyHeader {
    pub fn read(path: &Path) -> PipelineResult<Self> {
        let mut file = BinFile::open(path, b"zkey", "proving key")?;
        parse(path, "proving key", || {
            let header = file.read_section(ZKEY_HEADER, None)?;
            let protocol = SectionCursor::new(&header).u32()?;
            if protocol != GROTH16_PROTOCOL {
                return Err(format!("protocol {} is not groth16", protocol));
            }

            let groth = file.read_section(ZKEY_GROTH16_HEADER, None)?;
            let mut cur = SectionCursor::new(&groth);
            let n8q = cur.u32()? as usize;
            let q = from_le_bytes(cur.bytes(n8q)?);
            let n8r = cur.u32()? as usize;
            let r = from_le_bytes(cur.bytes(n8r)?);
            let n_vars = cur.u32()?;
            let n_public = cur.u32()?;
            let domain_size = cur.u32()?;

            let mpc = file.read_section(ZKEY_MPC_PARAMS, Some(68))?;
            let mut cur = SectionCursor::new(&mpc);
            let circuit_hash = hex::encode(cur.bytes(64)?);
            let contributions = cur.u32()?;

            Ok(Self {
                protocol,
                q,
                r,
                n_vars,
                n_public,
                domain_size,
                circuit_hash,
                contributions,
            })
        })
    }

    pub fn curve(&self) -> Option<Curve> {
        Curve::from_base_modulus(&self.q)
    }
}

/// Header of a powers-of-tau accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtauHeader {
    pub q: BigUint,
    pub power: u32,
    pub ceremony_power: u32,
    pub contributions: u32,
    /// Whether `prepare phase2` has been applied.
    pub prepared: bool,
}

impl PtauHeader {
    pub fn read(path: &Path) -> PipelineResult<Self> {
        let mut file = BinFile::open(path, b"ptau", "powers of tau")?;
        parse(path, "powers of tau", || {
            let header = file.read_section(PTAU_HEADER, None)?;
            let mut cur = SectionCursor::new(&header);
            let n8 = cur.u32()? as usize;
            let q = from_le_bytes(cur.bytes(n8)?);
            let power = cur.u32()?;
            let ceremony_power = cur.u32()?;

            let contributions = if file.has_section(PTAU_CONTRIBUTIONS) {
                let body = file.read_section(PTAU_CONTRIBUTIONS, Some(4))?;
                SectionCursor::new(&body).u32()?
            } else {
                0
            };
            let prepared = PTAU_PHASE2_SECTIONS.iter().all(|&s| file.has_section(s));

            Ok(Self {
                q,
                power,
                ceremony_power,
                contributions,
                prepared,
            })
        })
    }

    pub fn curve(&self) -> Option<Curve> {
        Curve::from_base_modulus(&self.q)
    }

    /// Size of the largest evaluation domain this accumulator can serve.
    pub fn domain_capacity(&self) -> u64 {
        1u64 << self.power.min(63)
    }
}

fn parse<T>(
    path: &Path,
    artifact: &'static str,
    f: impl FnOnce() -> Result<T, String>,
) -> PipelineResult<T> {
    f().map_err(|reason| PipelineError::format(artifact, path, reason))
}

/// Builders for well-formed artifacts, used by fixtures and fakes.
pub mod fixtures {
    use num_bigint::BigUint;

    use crate::binfile::write_binfile;

    use super::*;

    fn field_bytes(value: &BigUint, n8: usize) -> Vec<u8> {
        let mut bytes = value.to_bytes_le();
        bytes.resize(n8, 0);
        bytes
    }

    pub fn r1cs_bytes(header: &R1csHeader) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&32u32.to_le_bytes());
        body.extend(field_bytes(&header.prime, 32));
        for v in [header.n_wires, header.n_pub_out, header.n_pub_in, header.n_prv_in] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        body.extend_from_slice(&header.n_labels.to_le_bytes());
        body.extend_from_slice(&header.n_constraints.to_le_bytes());
        write_binfile(b"r1cs", 1, &[(R1CS_HEADER, body), (2, Vec::new())])
    }

    pub fn wtns_bytes(witness: &WitnessFile) -> Vec<u8> {
        let mut header = Vec::new();
        header.extend_from_slice(&32u32.to_le_bytes());
        header.extend(field_bytes(&witness.prime, 32));
        header.extend_from_slice(&(witness.values.len() as u32).to_le_bytes());
        let data = witness
            .values
            .iter()
            .flat_map(|v| field_bytes(v, 32))
            .collect();
        write_binfile(b"wtns", 2, &[(WTNS_HEADER, header), (WTNS_DATA, data)])
    }

    pub fn zkey_bytes(header: &ZkeyHeader) -> Vec<u8> {
        let mut groth = Vec::new();
        groth.extend_from_slice(&32u32.to_le_bytes());
        groth.extend(field_bytes(&header.q, 32));
        groth.extend_from_slice(&32u32.to_le_bytes());
        groth.extend(field_bytes(&header.r, 32));
        for v in [header.n_vars, header.n_public, header.domain_size] {
            groth.extend_from_slice(&v.to_le_bytes());
        }
        let mut mpc = hex::decode(&header.circuit_hash).unwrap_or_default();
        mpc.resize(64, 0);
        mpc.extend_from_slice(&header.contributions.to_le_bytes());
        write_binfile(
            b"zkey",
            1,
            &[
                (ZKEY_HEADER, header.protocol.to_le_bytes().to_vec()),
                (ZKEY_GROTH16_HEADER, groth),
                (ZKEY_MPC_PARAMS, mpc),
            ],
        )
    }

    pub fn ptau_bytes(header: &PtauHeader) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&32u32.to_le_bytes());
        body.extend(field_bytes(&header.q, 32));
        body.extend_from_slice(&header.power.to_le_bytes());
        body.extend_from_slice(&header.ceremony_power.to_le_bytes());
        let mut sections = vec![
            (PTAU_HEADER, body),
            (PTAU_CONTRIBUTIONS, header.contributions.to_le_bytes().to_vec()),
        ];
        if header.prepared {
            sections.extend(PTAU_PHASE2_SECTIONS.iter().map(|&s| (s, Vec::new())));
        }
        write_binfile(b"ptau", 1, &sections)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn write(dir: &Path, name: &str, bytes: Vec<u8>) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn multiplier_r1cs() -> R1csHeader {
        R1csHeader {
            prime: Curve::Bn128.scalar_modulus(),
            n_wires: 4,
            n_pub_out: 1,
            n_pub_in: 0,
            n_prv_in: 2,
            n_labels: 4,
            n_constraints: 1,
        }
    }

    #[test]
    fn r1cs_header_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let header = multiplier_r1cs();
        let path = write(dir.path(), "m.r1cs", r1cs_bytes(&header));
        let read = R1csHeader::read(&path).unwrap();
        assert_eq!(read, header);
        assert_eq!(read.curve(), Some(Curve::Bn128));
        assert_eq!(read.input_wires(), 2..4);
        assert_eq!(read.n_public(), 1);
    }

    #[test]
    fn witness_public_signals_follow_constant_wire() {
        let dir = tempfile::tempdir().unwrap();
        let witness = WitnessFile {
            prime: Curve::Bn128.scalar_modulus(),
            values: [1u32, 12, 3, 4].iter().map(|&v| BigUint::from(v)).collect(),
        };
        let path = write(dir.path(), "witness.wtns", wtns_bytes(&witness));
        let read = WitnessFile::read(&path).unwrap();
        assert_eq!(read.len(), 4);
        assert_eq!(read.public_signals(1).unwrap(), &[BigUint::from(12u32)]);
    }

    #[test]
    fn unprepared_ptau_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut header = PtauHeader {
            q: Curve::Bn128.base_modulus(),
            power: 12,
            ceremony_power: 12,
            contributions: 1,
            prepared: false,
        };
        let raw = write(dir.path(), "raw.ptau", ptau_bytes(&header));
        assert!(!PtauHeader::read(&raw).unwrap().prepared);

        header.prepared = true;
        let prepared = write(dir.path(), "final.ptau", ptau_bytes(&header));
        let read = PtauHeader::read(&prepared).unwrap();
        assert!(read.prepared);
        assert_eq!(read.curve(), Some(Curve::Bn128));
        assert_eq!(read.domain_capacity(), 4096);
    }

    #[test]
    fn zkey_header_exposes_binding_and_contributions() {
        let dir = tempfile::tempdir().unwrap();
        let header = ZkeyHeader {
            protocol: GROTH16_PROTOCOL,
            q: Curve::Bn128.base_modulus(),
            r: Curve::Bn128.scalar_modulus(),
            n_vars: 4,
            n_public: 1,
            domain_size: 4,
            circuit_hash: "ab".repeat(64),
            contributions: 2,
        };
        let path = write(dir.path(), "m_0002.zkey", zkey_bytes(&header));
        assert_eq!(ZkeyHeader::read(&path).unwrap(), header);
    }

    #[test]
    fn missing_and_foreign_files_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let err = ZkeyHeader::read(&dir.path().join("absent.zkey")).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));

        let path = write(dir.path(), "not.zkey", ptau_bytes(&PtauHeader {
            q: Curve::Bn128.base_modulus(),
            power: 12,
            ceremony_power: 12,
            contributions: 0,
            prepared: false,
        }));
        let err = ZkeyHeader::read(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }
}
