//! A toolchain that emulates circom and snarkjs in-process with arkworks.
//!
//! Circuits are picked from the compiled source text: a source mentioning
//! `Triple` becomes `d = a * b * c`, one mentioning `Multiplier` becomes
//! `c = a * b`. Binary artifacts carry real headers and the proving keys live
//! in memory, keyed by the circuit hash written into each zkey.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_snark::{CircuitSpecificSetupSNARK as _, SNARK};
use num_bigint::BigUint;
use rand::{thread_rng, RngCore};
use serde_json::Value;

use zkpipe::artifacts::ArtifactLayout;
use zkpipe::calldata::SolidityCalldata;
use zkpipe::config::{ContributionConfig, PipelineConfig};
use zkpipe::errors::{InputError, PipelineError, PipelineResult};
use zkpipe::field::{field_from_biguint, parse_literal, Curve};
use zkpipe::headers::fixtures::{ptau_bytes, r1cs_bytes, wtns_bytes, zkey_bytes};
use zkpipe::headers::{PtauHeader, R1csHeader, WitnessFile, ZkeyHeader, GROTH16_PROTOCOL};
use zkpipe::native::{proof_from_ark, verification_key_from_ark, verify_groth16};
use zkpipe::proof::{
    load_proof, load_public_signals, load_verification_key, public_signals_to_json, ProofJson,
    VerificationKeyJson,
};
use zkpipe::solidity::render_verifier;
use zkpipe::toolchain::{Contribution, Toolchain};

pub const MULTIPLIER_SOURCE: &str = "pragma circom 2.0.0;

template Multiplier2() {
    signal input a;
    signal input b;
    signal output c;
    c <== a * b;
}

component main = Multiplier2();
";

pub const TRIPLE_SOURCE: &str = "pragma circom 2.0.0;

template Triple() {
    signal input a;
    signal input b;
    signal input c;
    signal output d;
    signal ab;
    ab <== a * b;
    d <== ab * c;
}

component main = Triple();
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Wires `[1, c, a, b]`.
    Multiplier,
    /// Wires `[1, d, a, b, c, ab]`.
    Triple,
}

impl Kind {
    fn from_source(source: &str) -> Option<Self> {
        if source.contains("Triple") {
            Some(Kind::Triple)
        } else if source.contains("Multiplier") {
            Some(Kind::Multiplier)
        } else {
            None
        }
    }

    fn from_header(header: &R1csHeader) -> Option<Self> {
        match header.n_wires {
            4 => Some(Kind::Multiplier),
            6 => Some(Kind::Triple),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Kind::Multiplier => "multiplier",
            Kind::Triple => "triple",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "multiplier" => Some(Kind::Multiplier),
            "triple" => Some(Kind::Triple),
            _ => None,
        }
    }

    fn inputs(self) -> &'static [&'static str] {
        match self {
            Kind::Multiplier => &["a", "b"],
            Kind::Triple => &["a", "b", "c"],
        }
    }

    pub fn header(self) -> R1csHeader {
        let (n_wires, n_prv_in, n_constraints) = match self {
            Kind::Multiplier => (4, 2, 1),
            Kind::Triple => (6, 3, 2),
        };
        R1csHeader {
            prime: Curve::Bn128.scalar_modulus(),
            n_wires,
            n_pub_out: 1,
            n_pub_in: 0,
            n_prv_in,
            n_labels: n_wires as u64,
            n_constraints,
        }
    }

    fn sym(self) -> &'static str {
        match self {
            Kind::Multiplier => "1,1,0,main.c\n2,2,0,main.a\n3,3,0,main.b\n",
            Kind::Triple => {
                "1,1,0,main.d\n2,2,0,main.a\n3,3,0,main.b\n4,4,0,main.c\n5,5,0,main.ab\n"
            }
        }
    }

    /// Full wire assignment for the given inputs, reduced mod r.
    pub fn witness(self, inputs: &[BigUint]) -> Vec<BigUint> {
        let r = Curve::Bn128.scalar_modulus();
        let one = BigUint::from(1u32);
        match self {
            Kind::Multiplier => {
                let c = (&inputs[0] * &inputs[1]) % &r;
                vec![one, c, inputs[0].clone(), inputs[1].clone()]
            }
            Kind::Triple => {
                let ab = (&inputs[0] * &inputs[1]) % &r;
                let d = (&ab * &inputs[2]) % &r;
                vec![one, d, inputs[0].clone(), inputs[1].clone(), inputs[2].clone(), ab]
            }
        }
    }

    fn satisfied(self, wires: &[BigUint]) -> bool {
        wires.len() == self.header().n_wires as usize && self.witness(&wires[2..2 + self.inputs().len()]) == wires
    }
}

/// A circuit with its wire values; `None` during setup.
#[derive(Clone)]
pub struct FakeCircuit {
    pub kind: Kind,
    pub wires: Option<Vec<Fr>>,
}

impl FakeCircuit {
    fn wire(&self, i: usize) -> Result<Fr, SynthesisError> {
        match &self.wires {
            Some(w) => w.get(i).copied().ok_or(SynthesisError::AssignmentMissing),
            None => Ok(Fr::from(0u64)),
        }
    }
}

impl ConstraintSynthesizer<Fr> for FakeCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let out = FpVar::new_input(cs.clone(), || self.wire(1))?;
        let a = FpVar::new_witness(cs.clone(), || self.wire(2))?;
        let b = FpVar::new_witness(cs.clone(), || self.wire(3))?;
        match self.kind {
            Kind::Multiplier => (a * b).enforce_equal(&out),
            Kind::Triple => {
                let c = FpVar::new_witness(cs, || self.wire(4))?;
                (a * b * c).enforce_equal(&out)
            }
        }
    }
}

struct Keys {
    kind: Kind,
    pk: ProvingKey<Bn254>,
    vk: VerifyingKey<Bn254>,
}

#[derive(Default)]
pub struct ArkworksToolchain {
    keys: Mutex<HashMap<String, Keys>>,
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<&'static str>>,
    skip_prepare: Mutex<bool>,
    transpose_b: Mutex<bool>,
    miscompute_output: Mutex<bool>,
}

fn tool_error(tool: &str, diagnostic: impl Into<String>) -> PipelineError {
    PipelineError::ExternalTool {
        tool: tool.to_string(),
        status: Some(1),
        diagnostic: diagnostic.into(),
    }
}

fn write(path: &Path, bytes: impl AsRef<[u8]>) -> PipelineResult<()> {
    fs::write(path, bytes).map_err(|e| tool_error("snarkjs", e.to_string()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| tool_error("snarkjs", e.to_string()))?;
    write(path, json)
}

impl ArkworksToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named method fail like a crashed tool.
    pub fn fail_on(&self, method: &'static str) {
        *self.fail_on.lock().unwrap() = Some(method);
    }

    /// `prepare_phase2` copies its input without adding the phase-2 sections.
    pub fn skip_prepare(&self) {
        *self.skip_prepare.lock().unwrap() = true;
    }

    /// Prints calldata with the `b` coordinates in `(c0, c1)` order.
    pub fn transpose_b(&self) {
        *self.transpose_b.lock().unwrap() = true;
    }

    /// `calculate_witness` writes an output wire one off from the product.
    pub fn miscompute_output(&self) {
        *self.miscompute_output.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, method: &'static str) -> PipelineResult<()> {
        self.calls.lock().unwrap().push(method.to_string());
        if *self.fail_on.lock().unwrap() == Some(method) {
            return Err(tool_error("snarkjs", format!("{}: injected failure", method)));
        }
        Ok(())
    }

    fn with_keys<R>(&self, zkey: &Path, f: impl FnOnce(&Keys) -> PipelineResult<R>) -> PipelineResult<R> {
        let header = ZkeyHeader::read(zkey)?;
        let keys = self.keys.lock().unwrap();
        let entry = keys
            .get(&header.circuit_hash)
            .ok_or_else(|| tool_error("snarkjs", "zkey was not produced by this setup"))?;
        f(entry)
    }
}

impl Toolchain for ArkworksToolchain {
    fn compile(&self, source: &Path, out_dir: &Path) -> PipelineResult<()> {
        self.enter("compile")?;
        let text = fs::read_to_string(source).map_err(|e| tool_error("circom", e.to_string()))?;
        let kind = Kind::from_source(&text)
            .ok_or_else(|| tool_error("circom", "error[P1012]: parse error"))?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        write(&out_dir.join(format!("{}.r1cs", stem)), r1cs_bytes(&kind.header()))?;
        write(&out_dir.join(format!("{}.sym", stem)), kind.sym())?;
        let js = out_dir.join(format!("{}_js", stem));
        fs::create_dir_all(&js).map_err(|e| tool_error("circom", e.to_string()))?;
        write(&js.join(format!("{}.wasm", stem)), kind.tag())?;
        write(&js.join("generate_witness.js"), "// loader\n")
    }

    fn powers_of_tau_new(&self, curve: Curve, power: u32, out: &Path) -> PipelineResult<()> {
        self.enter("powers_of_tau_new")?;
        write(
            out,
            ptau_bytes(&PtauHeader {
                q: curve.base_modulus(),
                power,
                ceremony_power: power,
                contributions: 0,
                prepared: false,
            }),
        )
    }

    fn powers_of_tau_contribute(
        &self,
        input: &Path,
        out: &Path,
        _contribution: &Contribution,
    ) -> PipelineResult<()> {
        self.enter("powers_of_tau_contribute")?;
        let mut header = PtauHeader::read(input)?;
        header.contributions += 1;
        write(out, ptau_bytes(&header))
    }

    fn prepare_phase2(&self, input: &Path, out: &Path) -> PipelineResult<()> {
        self.enter("prepare_phase2")?;
        let mut header = PtauHeader::read(input)?;
        header.prepared = !*self.skip_prepare.lock().unwrap();
        write(out, ptau_bytes(&header))
    }

    fn groth16_setup(&self, r1cs: &Path, ptau: &Path, zkey_out: &Path) -> PipelineResult<()> {
        self.enter("groth16_setup")?;
        let header = R1csHeader::read(r1cs)?;
        if !PtauHeader::read(ptau)?.prepared {
            return Err(tool_error("snarkjs", "Powers of tau is not prepared."));
        }
        let kind = Kind::from_header(&header)
            .ok_or_else(|| tool_error("snarkjs", "unsupported constraint system"))?;
        let mut rng = thread_rng();
        let (pk, vk) = Groth16::<Bn254>::setup(FakeCircuit { kind, wires: None }, &mut rng)
            .map_err(|e| tool_error("snarkjs", e.to_string()))?;

        let mut hash = [0u8; 64];
        rng.fill_bytes(&mut hash);
        let circuit_hash = hex::encode(hash);
        write(
            zkey_out,
            zkey_bytes(&ZkeyHeader {
                protocol: GROTH16_PROTOCOL,
                q: Curve::Bn128.base_modulus(),
                r: header.prime.clone(),
                n_vars: header.n_wires,
                n_public: header.n_public(),
                domain_size: (header.n_constraints + header.n_public() + 1).next_power_of_two(),
                circuit_hash: circuit_hash.clone(),
                contributions: 0,
            }),
        )?;
        self.keys
            .lock()
            .unwrap()
            .insert(circuit_hash, Keys { kind, pk, vk });
        Ok(())
    }

    fn zkey_contribute(&self, input: &Path, out: &Path, _contribution: &Contribution) -> PipelineResult<()> {
        self.enter("zkey_contribute")?;
        let mut header = ZkeyHeader::read(input)?;
        header.contributions += 1;
        write(out, zkey_bytes(&header))
    }

    fn export_verification_key(&self, zkey: &Path, out: &Path) -> PipelineResult<()> {
        self.enter("export_verification_key")?;
        let vk = self.with_keys(zkey, |keys| Ok(verification_key_from_ark(&keys.vk)))?;
        write_json(out, &VerificationKeyJson::from(&vk))
    }

    fn calculate_witness(&self, wasm: &Path, input_json: &Path, out: &Path) -> PipelineResult<()> {
        self.enter("calculate_witness")?;
        let tag = fs::read_to_string(wasm).map_err(|e| tool_error("snarkjs", e.to_string()))?;
        let kind = Kind::from_tag(&tag).ok_or_else(|| tool_error("snarkjs", "invalid wasm"))?;
        let text = fs::read_to_string(input_json).map_err(|e| tool_error("snarkjs", e.to_string()))?;
        let json: Value = serde_json::from_str(&text).map_err(|e| tool_error("snarkjs", e.to_string()))?;
        let inputs = kind
            .inputs()
            .iter()
            .map(|name| {
                let value = match &json[*name] {
                    Value::String(s) => parse_literal(s),
                    Value::Number(n) => n.as_u64().map(BigUint::from),
                    _ => None,
                };
                value.ok_or_else(|| tool_error("snarkjs", format!("Not all inputs have been set: {}", name)))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let mut values = kind.witness(&inputs);
        if *self.miscompute_output.lock().unwrap() {
            values[1] += 1u32;
        }
        write(
            out,
            wtns_bytes(&WitnessFile {
                prime: Curve::Bn128.scalar_modulus(),
                values,
            }),
        )
    }

    fn check_witness(&self, r1cs: &Path, wtns: &Path) -> PipelineResult<()> {
        self.enter("check_witness")?;
        let header = R1csHeader::read(r1cs)?;
        let kind = Kind::from_header(&header)
            .ok_or_else(|| tool_error("snarkjs", "unsupported constraint system"))?;
        let witness = WitnessFile::read(wtns)?;
        if kind.satisfied(&witness.values) {
            Ok(())
        } else {
            Err(InputError::ConstraintViolated("WITNESS IS NOT CORRECT".to_string()).into())
        }
    }

    fn prove(&self, zkey: &Path, wtns: &Path, proof_out: &Path, public_out: &Path) -> PipelineResult<()> {
        self.enter("prove")?;
        let witness = WitnessFile::read(wtns)?;
        let (proof, n_public) = self.with_keys(zkey, |keys| {
            let wires = witness
                .values
                .iter()
                .map(field_from_biguint::<Fr>)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| tool_error("snarkjs", "witness value out of field"))?;
            let circuit = FakeCircuit {
                kind: keys.kind,
                wires: Some(wires),
            };
            let proof = Groth16::<Bn254>::prove(&keys.pk, circuit, &mut thread_rng())
                .map_err(|e| tool_error("snarkjs", e.to_string()))?;
            Ok((proof_from_ark(&proof), keys.vk.gamma_abc_g1.len() - 1))
        })?;
        write_json(proof_out, &ProofJson::from(&proof))?;
        let public = witness.public_signals(n_public).unwrap_or_default();
        write_json(public_out, &public_signals_to_json(public))
    }

    fn verify(&self, vkey: &Path, public: &Path, proof: &Path) -> PipelineResult<bool> {
        self.enter("verify")?;
        verify_groth16(
            &load_verification_key(vkey)?,
            &load_public_signals(public)?,
            &load_proof(proof)?,
        )
    }

    fn export_calldata(&self, public: &Path, proof: &Path) -> PipelineResult<String> {
        self.enter("export_calldata")?;
        let mut calldata = SolidityCalldata::from_proof(&load_proof(proof)?, &load_public_signals(public)?);
        if *self.transpose_b.lock().unwrap() {
            for coordinate in calldata.b.iter_mut() {
                coordinate.swap(0, 1);
            }
        }
        Ok(calldata.to_calldata_string())
    }

    fn export_verifier(&self, zkey: &Path, out: &Path) -> PipelineResult<()> {
        self.enter("export_verifier")?;
        let vk = self.with_keys(zkey, |keys| Ok(verification_key_from_ark(&keys.vk)))?;
        write(out, render_verifier(&vk, "Groth16Verifier"))
    }
}

/// A scratch workspace with circuit sources and an input assignment.
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub config: PipelineConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("circuits")).unwrap();
        fs::write(root.join("circuits/multiplier2.circom"), MULTIPLIER_SOURCE).unwrap();
        fs::write(root.join("circuits/triple.circom"), TRIPLE_SOURCE).unwrap();

        let mut config = PipelineConfig::default();
        config.circuits_dir = root.join("circuits");
        config.build_dir = root.join("build");
        config.input_path = root.join("input.json");
        config.ceremony.power = 4;
        config.ceremony.phase1 = vec![ContributionConfig {
            name: "First contribution".to_string(),
            entropy: Some("phase one entropy".to_string()),
        }];
        config.ceremony.phase2 = vec![ContributionConfig {
            name: "Second contribution".to_string(),
            entropy: Some("phase two entropy".to_string()),
        }];

        let ws = Self { dir, config };
        ws.write_input(r#"{ "a": "3", "b": "4" }"#);
        ws
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_input(&self, json: &str) {
        fs::write(&self.config.input_path, json).unwrap();
    }

    pub fn layout(&self, circuit: &str) -> ArtifactLayout {
        self.config.layout(circuit).unwrap()
    }
}
