//! In-process Groth16 verification over BN254.
//!
//! Points and signals that cannot be represented on the curve make the proof
//! invalid rather than the call an error, which is also how the verifier
//! contract treats them.

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::Zero;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use ark_snark::SNARK;
use log::debug;
use num_bigint::BigUint;

use crate::errors::{PipelineError, PipelineResult};
use crate::field::{field_from_biguint, field_to_biguint};
use crate::proof::{G1Point, G2Point, Groth16Proof, VerificationKey};

/// A verification key prepared once and reused for many proofs.
#[derive(Clone)]
pub struct NativeVerifier {
    n_public: usize,
    prepared: PreparedVerifyingKey<Bn254>,
}

impl NativeVerifier {
    pub fn new(vk: &VerificationKey) -> Result<Self, String> {
        let vk = verifying_key_to_ark(vk)?;
        let prepared = Groth16::<Bn254>::process_vk(&vk).map_err(|e| e.to_string())?;
        Ok(Self {
            n_public: vk.gamma_abc_g1.len() - 1,
            prepared,
        })
    }

    pub fn n_public(&self) -> usize {
        self.n_public
    }

    /// Pairing check. Fails only when the signal count does not fit the key.
    pub fn verify(&self, public: &[BigUint], proof: &Groth16Proof) -> PipelineResult<bool> {
        if public.len() != self.n_public {
            return Err(PipelineError::dimension(
                "public signal count",
                self.n_public as u64,
                public.len() as u64,
            ));
        }
        let inputs = match public
            .iter()
            .map(field_from_biguint::<Fr>)
            .collect::<Option<Vec<_>>>()
        {
            Some(inputs) => inputs,
            None => {
                debug!("Public signal outside the scalar field");
                return Ok(false);
            }
        };
        let proof = match proof_to_ark(proof) {
            Some(proof) => proof,
            None => {
                debug!("Proof point is not on the curve");
                return Ok(false);
            }
        };
        Groth16::<Bn254>::verify_with_processed_vk(&self.prepared, &inputs, &proof).map_err(|_| {
            PipelineError::dimension(
                "public signal count",
                self.n_public as u64,
                public.len() as u64,
            )
        })
    }
}

/// One-shot verification of a triple.
pub fn verify_groth16(
    vk: &VerificationKey,
    public: &[BigUint],
    proof: &Groth16Proof,
) -> PipelineResult<bool> {
    let verifier = NativeVerifier::new(vk).map_err(PipelineError::VerificationKeyMismatch)?;
    verifier.verify(public, proof)
}

/// `(0, 0)` encodes the point at infinity.
pub fn g1_to_ark(p: &G1Point) -> Option<G1Affine> {
    if p.x.bits() == 0 && p.y.bits() == 0 {
        return Some(G1Affine::zero());
    }
    let point = G1Affine::new(field_from_biguint::<Fq>(&p.x)?, field_from_biguint::<Fq>(&p.y)?, false);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then(|| point)
}

pub fn g2_to_ark(p: &G2Point) -> Option<G2Affine> {
    let all_zero = p.x.iter().chain(p.y.iter()).all(|c| c.bits() == 0);
    if all_zero {
        return Some(G2Affine::zero());
    }
    let x = Fq2::new(field_from_biguint(&p.x[0])?, field_from_biguint(&p.x[1])?);
    let y = Fq2::new(field_from_biguint(&p.y[0])?, field_from_biguint(&p.y[1])?);
    let point = G2Affine::new(x, y, false);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then(|| point)
}

pub fn g1_from_ark(p: &G1Affine) -> G1Point {
    if p.infinity {
        return G1Point {
            x: BigUint::default(),
            y: BigUint::default(),
        };
    }
    G1Point {
        x: field_to_biguint(p.x),
        y: field_to_biguint(p.y),
    }
}

pub fn g2_from_ark(p: &G2Affine) -> G2Point {
    if p.infinity {
        return G2Point {
            x: Default::default(),
            y: Default::default(),
        };
    }
    G2Point {
        x: [field_to_biguint(p.x.c0), field_to_biguint(p.x.c1)],
        y: [field_to_biguint(p.y.c0), field_to_biguint(p.y.c1)],
    }
}

pub fn proof_to_ark(proof: &Groth16Proof) -> Option<Proof<Bn254>> {
    Some(Proof {
        a: g1_to_ark(&proof.a)?,
        b: g2_to_ark(&proof.b)?,
        c: g1_to_ark(&proof.c)?,
    })
}

pub fn proof_from_ark(proof: &Proof<Bn254>) -> Groth16Proof {
    Groth16Proof {
        a: g1_from_ark(&proof.a),
        b: g2_from_ark(&proof.b),
        c: g1_from_ark(&proof.c),
    }
}

pub fn verifying_key_to_ark(vk: &VerificationKey) -> Result<VerifyingKey<Bn254>, String> {
    let g1 = |name: &str, p: &G1Point| g1_to_ark(p).ok_or_else(|| format!("{} is not a valid G1 point", name));
    let g2 = |name: &str, p: &G2Point| g2_to_ark(p).ok_or_else(|| format!("{} is not a valid G2 point", name));
    if vk.ic.is_empty() {
        return Err("IC is empty".to_string());
    }
    Ok(VerifyingKey {
        alpha_g1: g1("alpha", &vk.alpha)?,
        beta_g2: g2("beta", &vk.beta)?,
        gamma_g2: g2("gamma", &vk.gamma)?,
        delta_g2: g2("delta", &vk.delta)?,
        gamma_abc_g1: vk
            .ic
            .iter()
            .enumerate()
            .map(|(i, p)| g1(&format!("IC[{}]", i), p))
            .collect::<Result<_, _>>()?,
    })
}

pub fn verification_key_from_ark(vk: &VerifyingKey<Bn254>) -> VerificationKey {
    VerificationKey {
        alpha: g1_from_ark(&vk.alpha_g1),
        beta: g2_from_ark(&vk.beta_g2),
        gamma: g2_from_ark(&vk.gamma_g2),
        delta: g2_from_ark(&vk.delta_g2),
        ic: vk.gamma_abc_g1.iter().map(g1_from_ark).collect(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use ark_r1cs_std::alloc::AllocVar;
    use ark_r1cs_std::eq::EqGadget;
    use ark_r1cs_std::fields::fp::FpVar;
    use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
    use ark_snark::CircuitSpecificSetupSNARK as _;
    use ark_std::test_rng;

    /// `c = a * b` with `c` public.
    #[derive(Clone)]
    pub struct Multiplier {
        pub a: u64,
        pub b: u64,
    }

    impl ConstraintSynthesizer<Fr> for Multiplier {
        fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
            let c = FpVar::new_input(cs.clone(), || Ok(Fr::from(self.a * self.b)))?;
            let a = FpVar::new_witness(cs.clone(), || Ok(Fr::from(self.a)))?;
            let b = FpVar::new_witness(cs, || Ok(Fr::from(self.b)))?;
            (a * b).enforce_equal(&c)
        }
    }

    pub fn multiplier_proof(a: u64, b: u64) -> (VerificationKey, Groth16Proof) {
        let mut rng = test_rng();
        let circuit = Multiplier { a, b };
        let (pk, vk) = Groth16::<Bn254>::setup(circuit.clone(), &mut rng).unwrap();
        let proof = Groth16::<Bn254>::prove(&pk, circuit, &mut rng).unwrap();
        (verification_key_from_ark(&vk), proof_from_ark(&proof))
    }
}
