use std::path::Path;

use log::{info, warn};
use num_bigint::BigUint;

use crate::artifacts::{produce, require, ArtifactLayout};
use crate::errors::{PipelineError, PipelineResult};
use crate::headers::{WitnessFile, ZkeyHeader, GROTH16_PROTOCOL};
use crate::proof::{load_proof, load_public_signals, Groth16Proof};
use crate::stages::ceremony::CeremonyManifest;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone)]
pub struct ProveOutcome {
    pub proof: Groth16Proof,
    pub public_signals: Vec<BigUint>,
}

/// Proves the current witness with the ceremony's final key.
pub fn run<T: Toolchain>(toolchain: &T, layout: &ArtifactLayout) -> PipelineResult<ProveOutcome> {
    let manifest = CeremonyManifest::load(layout)?;
    let zkey_path = manifest.final_zkey_path(layout)?;
    let wtns_path = layout.witness();
    require("proving key", &zkey_path)?;
    require("witness", &wtns_path)?;

    let zkey = ZkeyHeader::read(&zkey_path)?;
    if zkey.protocol != GROTH16_PROTOCOL {
        return Err(PipelineError::format(
            "proving key",
            &zkey_path,
            format!("protocol {} is not groth16", zkey.protocol),
        ));
    }
    let curve = zkey
        .curve()
        .ok_or_else(|| PipelineError::format("proving key", &zkey_path, "unknown curve modulus"))?;
    let witness = WitnessFile::read(&wtns_path)?;
    check_dimensions(&zkey, &witness)?;
    manifest.check_bindings(layout)?;

    let proof_path = layout.proof();
    let public_path = layout.public();
    produce("proof", &proof_path, |proof_tmp| {
        produce("public signals", &public_path, |public_tmp| {
            toolchain.prove(&zkey_path, &wtns_path, proof_tmp, public_tmp)
        })
    })?;

    let proof = load_proof(&proof_path)?;
    let public_signals = load_public_signals(&public_path)?;
    if public_signals.len() != zkey.n_public as usize {
        return Err(PipelineError::dimension(
            "public signal count",
            zkey.n_public as u64,
            public_signals.len() as u64,
        ));
    }
    check_public_signals(&witness, &public_signals, &public_path)?;

    info!(
        "Proof for {} over {} written with public signals {:?}",
        layout.name(),
        curve,
        public_signals.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    );
    Ok(ProveOutcome {
        proof,
        public_signals,
    })
}

/// `public.json` must repeat witness wires `1..=n_public` in order.
pub fn check_public_signals(witness: &WitnessFile, public: &[BigUint], path: &Path) -> PipelineResult<()> {
    let expected = witness.public_signals(public.len()).ok_or_else(|| {
        PipelineError::dimension("witness length", public.len() as u64 + 1, witness.len() as u64)
    })?;
    if let Some(i) = expected.iter().zip(public).position(|(w, p)| w != p) {
        warn!("public.json disagrees with the witness at signal {}", i);
        return Err(PipelineError::format(
            "public signals",
            path,
            format!(
                "signal {} is {} but witness wire {} holds {}",
                i,
                public[i],
                i + 1,
                expected[i]
            ),
        ));
    }
    Ok(())
}

/// A witness fits a key only if both come from the same constraint system.
pub fn check_dimensions(zkey: &ZkeyHeader, witness: &WitnessFile) -> PipelineResult<()> {
    if witness.prime != zkey.r {
        return Err(PipelineError::dimension(
            "witness field size in bits",
            zkey.r.bits(),
            witness.prime.bits(),
        ));
    }
    if witness.len() != zkey.n_vars as usize {
        return Err(PipelineError::dimension(
            "witness length",
            zkey.n_vars as u64,
            witness.len() as u64,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Curve;

    fn zkey(n_vars: u32) -> ZkeyHeader {
        ZkeyHeader {
            protocol: GROTH16_PROTOCOL,
            q: Curve::Bn128.base_modulus(),
            r: Curve::Bn128.scalar_modulus(),
            n_vars,
            n_public: 1,
            domain_size: 4,
            circuit_hash: "00".repeat(64),
            contributions: 1,
        }
    }

    fn witness(len: usize, curve: Curve) -> WitnessFile {
        WitnessFile {
            prime: curve.scalar_modulus(),
            values: vec![BigUint::from(1u32); len],
        }
    }

    #[test]
    fn witness_from_another_circuit_is_a_dimension_error() {
        check_dimensions(&zkey(4), &witness(4, Curve::Bn128)).unwrap();
        let err = check_dimensions(&zkey(4), &witness(6, Curve::Bn128)).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { expected: 4, actual: 6, .. }));
        let err = check_dimensions(&zkey(4), &witness(4, Curve::Bls12_381)).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn public_signals_must_come_from_the_witness() {
        let path = Path::new("public.json");
        let good = WitnessFile {
            prime: Curve::Bn128.scalar_modulus(),
            values: [1u32, 12, 3, 4].map(BigUint::from).to_vec(),
        };
        check_public_signals(&good, &[BigUint::from(12u32)], path).unwrap();

        let err = check_public_signals(&good, &[BigUint::from(13u32)], path).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }), "{:?}", err);

        let short = witness(2, Curve::Bn128);
        let public = vec![BigUint::from(1u32); 3];
        let err = check_public_signals(&short, &public, path).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { expected: 4, actual: 2, .. }), "{:?}", err);
    }
}
