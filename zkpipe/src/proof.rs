//! Proof, public-signal and verification-key artifacts in the snarkjs JSON
//! encoding, plus their typed big-integer forms.
//!
//! snarkjs writes curve points in projective form with `z = 1`:
//!
//! ```text
//! G1: [x, y, "1"]
//! G2: [[x.c0, x.c1], [y.c0, y.c1], ["1", "0"]]
//! ```

use std::path::Path;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::artifacts::read_json;
use crate::errors::{PipelineError, PipelineResult};
use crate::field::parse_decimal;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofJson {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "groth16")]
    pub protocol: String,
    #[serde(default = "bn128")]
    pub curve: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKeyJson {
    #[serde(default = "groth16")]
    pub protocol: String,
    #[serde(default = "bn128")]
    pub curve: String,
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vk_alphabeta_12: Option<serde_json::Value>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

fn groth16() -> String {
    "groth16".to_string()
}

fn bn128() -> String {
    "bn128".to_string()
}

/// Affine G1 point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct G1Point {
    pub x: BigUint,
    pub y: BigUint,
}

/// Affine G2 point; each coordinate is `[c0, c1]` of the quadratic extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct G2Point {
    pub x: [BigUint; 2],
    pub y: [BigUint; 2],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Groth16Proof {
    pub a: G1Point,
    pub b: G2Point,
    pub c: G1Point,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey {
    pub alpha: G1Point,
    pub beta: G2Point,
    pub gamma: G2Point,
    pub delta: G2Point,
    /// `n_public + 1` points.
    pub ic: Vec<G1Point>,
}

impl VerificationKey {
    pub fn n_public(&self) -> usize {
        self.ic.len().saturating_sub(1)
    }
}

fn number(field: &str, s: &str) -> Result<BigUint, String> {
    parse_decimal(s).ok_or_else(|| format!("{}: `{}` is not a decimal integer", field, s))
}

fn g1_from_json(field: &str, coords: &[String]) -> Result<G1Point, String> {
    match coords {
        [x, y, z] if z == "1" => Ok(G1Point {
            x: number(field, x)?,
            y: number(field, y)?,
        }),
        [_, _, z] => Err(format!("{}: expected normalized point, z = {}", field, z)),
        _ => Err(format!("{}: expected 3 coordinates, got {}", field, coords.len())),
    }
}

fn g2_from_json(field: &str, coords: &[Vec<String>]) -> Result<G2Point, String> {
    let pair = |c: &Vec<String>| -> Result<[BigUint; 2], String> {
        match c.as_slice() {
            [c0, c1] => Ok([number(field, c0)?, number(field, c1)?]),
            _ => Err(format!("{}: expected 2 components, got {}", field, c.len())),
        }
    };
    match coords {
        [x, y, z] if z.len() == 2 && z[0] == "1" && z[1] == "0" => Ok(G2Point {
            x: pair(x)?,
            y: pair(y)?,
        }),
        [_, _, _] => Err(format!("{}: expected normalized point", field)),
        _ => Err(format!("{}: expected 3 coordinates, got {}", field, coords.len())),
    }
}

fn g1_to_json(p: &G1Point) -> Vec<String> {
    vec![p.x.to_string(), p.y.to_string(), "1".to_string()]
}

fn g2_to_json(p: &G2Point) -> Vec<Vec<String>> {
    vec![
        vec![p.x[0].to_string(), p.x[1].to_string()],
        vec![p.y[0].to_string(), p.y[1].to_string()],
        vec!["1".to_string(), "0".to_string()],
    ]
}

impl TryFrom<&ProofJson> for Groth16Proof {
    type Error = String;

    fn try_from(json: &ProofJson) -> Result<Self, Self::Error> {
        if json.protocol != "groth16" {
            return Err(format!("protocol `{}` is not groth16", json.protocol));
        }
        Ok(Self {
            a: g1_from_json("pi_a", &json.pi_a)?,
            b: g2_from_json("pi_b", &json.pi_b)?,
            c: g1_from_json("pi_c", &json.pi_c)?,
        })
    }
}

impl From<&Groth16Proof> for ProofJson {
    fn from(proof: &Groth16Proof) -> Self {
        Self {
            pi_a: g1_to_json(&proof.a),
            pi_b: g2_to_json(&proof.b),
            pi_c: g1_to_json(&proof.c),
            protocol: groth16(),
            curve: bn128(),
        }
    }
}

impl TryFrom<&VerificationKeyJson> for VerificationKey {
    type Error = String;

    fn try_from(json: &VerificationKeyJson) -> Result<Self, Self::Error> {
        if json.protocol != "groth16" {
            return Err(format!("protocol `{}` is not groth16", json.protocol));
        }
        if json.ic.len() != json.n_public + 1 {
            return Err(format!(
                "nPublic is {} but IC holds {} points",
                json.n_public,
                json.ic.len()
            ));
        }
        Ok(Self {
            alpha: g1_from_json("vk_alpha_1", &json.vk_alpha_1)?,
            beta: g2_from_json("vk_beta_2", &json.vk_beta_2)?,
            gamma: g2_from_json("vk_gamma_2", &json.vk_gamma_2)?,
            delta: g2_from_json("vk_delta_2", &json.vk_delta_2)?,
            ic: json
                .ic
                .iter()
                .enumerate()
                .map(|(i, p)| g1_from_json(&format!("IC[{}]", i), p))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<&VerificationKey> for VerificationKeyJson {
    fn from(vk: &VerificationKey) -> Self {
        Self {
            protocol: groth16(),
            curve: bn128(),
            n_public: vk.n_public(),
            vk_alpha_1: g1_to_json(&vk.alpha),
            vk_beta_2: g2_to_json(&vk.beta),
            vk_gamma_2: g2_to_json(&vk.gamma),
            vk_delta_2: g2_to_json(&vk.delta),
            vk_alphabeta_12: None,
            ic: vk.ic.iter().map(g1_to_json).collect(),
        }
    }
}

pub fn parse_public_signals(signals: &[String]) -> Result<Vec<BigUint>, String> {
    signals
        .iter()
        .enumerate()
        .map(|(i, s)| number(&format!("public[{}]", i), s))
        .collect()
}

pub fn public_signals_to_json(signals: &[BigUint]) -> Vec<String> {
    signals.iter().map(|s| s.to_string()).collect()
}

pub fn load_proof(path: &Path) -> PipelineResult<Groth16Proof> {
    let json: ProofJson = read_json("proof", path)?;
    Groth16Proof::try_from(&json).map_err(|reason| PipelineError::format("proof", path, reason))
}

pub fn load_verification_key(path: &Path) -> PipelineResult<VerificationKey> {
    let json: VerificationKeyJson = read_json("verification key", path)?;
    VerificationKey::try_from(&json)
        .map_err(|reason| PipelineError::format("verification key", path, reason))
}

pub fn load_public_signals(path: &Path) -> PipelineResult<Vec<BigUint>> {
    let json: Vec<String> = read_json("public signals", path)?;
    parse_public_signals(&json).map_err(|reason| PipelineError::format("public signals", path, reason))
}
