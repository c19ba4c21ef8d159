//! Decomposition of a proof into the verifier contract's call arguments.
//!
//! The contract expects `verifyProof(a, b, c, input)` where `b` lists each
//! G2 coordinate as `(c1, c0)`. The tool prints the same shape as a flat
//! string of hex literals:
//!
//! ```text
//! ["0x..","0x.."],[["0x..","0x.."],["0x..","0x.."]],["0x..","0x.."],["0x.."]
//! ```

use num_bigint::BigUint;

use crate::errors::{PipelineError, PipelineResult};
use crate::field::{parse_literal, to_hex_word};
use crate::proof::{G1Point, G2Point, Groth16Proof};

/// Words taken by `a`, `b` and `c` together.
pub const PROOF_WORDS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolidityCalldata {
    pub a: [BigUint; 2],
    pub b: [[BigUint; 2]; 2],
    pub c: [BigUint; 2],
    pub input: Vec<BigUint>,
}

impl SolidityCalldata {
    pub fn from_proof(proof: &Groth16Proof, public: &[BigUint]) -> Self {
        let [x0, x1] = proof.b.x.clone();
        let [y0, y1] = proof.b.y.clone();
        Self {
            a: [proof.a.x.clone(), proof.a.y.clone()],
            b: [[x1, x0], [y1, y0]],
            c: [proof.c.x.clone(), proof.c.y.clone()],
            input: public.to_vec(),
        }
    }

    /// Inverse of [`Self::from_proof`].
    pub fn to_proof(&self) -> (Groth16Proof, Vec<BigUint>) {
        let [[x1, x0], [y1, y0]] = self.b.clone();
        let proof = Groth16Proof {
            a: G1Point {
                x: self.a[0].clone(),
                y: self.a[1].clone(),
            },
            b: G2Point {
                x: [x0, x1],
                y: [y0, y1],
            },
            c: G1Point {
                x: self.c[0].clone(),
                y: self.c[1].clone(),
            },
        };
        (proof, self.input.clone())
    }

    /// Decodes the tool's calldata string, requiring exactly `8 + n_public` elements.
    pub fn parse(text: &str, n_public: usize) -> PipelineResult<Self> {
        let words = text
            .split(|c: char| c == ',' || c == '[' || c == ']' || c == '"' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .enumerate()
            .map(|(i, w)| {
                parse_literal(w).ok_or_else(|| PipelineError::CalldataMismatch {
                    position: position_name(i),
                    tool: w.to_string(),
                    native: "an integer".to_string(),
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let expected = PROOF_WORDS + n_public;
        if words.len() != expected {
            return Err(PipelineError::dimension(
                "calldata element count",
                expected as u64,
                words.len() as u64,
            ));
        }
        let w = |i: usize| words[i].clone();
        Ok(Self {
            a: [w(0), w(1)],
            b: [[w(2), w(3)], [w(4), w(5)]],
            c: [w(6), w(7)],
            input: words[PROOF_WORDS..].to_vec(),
        })
    }

    /// Flattened words paired with their positional names, in call order.
    pub fn positions(&self) -> Vec<(String, &BigUint)> {
        [&self.a[0], &self.a[1]]
            .into_iter()
            .chain(self.b.iter().flatten())
            .chain(&self.c)
            .chain(&self.input)
            .enumerate()
            .map(|(i, v)| (position_name(i), v))
            .collect()
    }

    pub fn to_calldata_string(&self) -> String {
        let q = |v: &BigUint| format!("\"{}\"", to_hex_word(v));
        let pair = |p: &[BigUint; 2]| format!("[{},{}]", q(&p[0]), q(&p[1]));
        let input: Vec<String> = self.input.iter().map(q).collect();
        format!(
            "{},[{},{}],{},[{}]",
            pair(&self.a),
            pair(&self.b[0]),
            pair(&self.b[1]),
            pair(&self.c),
            input.join(",")
        )
    }

    /// Checks that `tool` (decoded from the tool's string) equals `self`.
    pub fn compare(&self, tool: &SolidityCalldata) -> PipelineResult<()> {
        let ours = self.positions();
        let theirs = tool.positions();
        if ours.len() != theirs.len() {
            return Err(PipelineError::dimension(
                "calldata element count",
                ours.len() as u64,
                theirs.len() as u64,
            ));
        }
        for ((position, native), (_, tool)) in ours.into_iter().zip(theirs) {
            if native != tool {
                return Err(PipelineError::CalldataMismatch {
                    position,
                    tool: tool.to_string(),
                    native: native.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Name of the `i`-th flattened calldata word, e.g. `b[1][0]` or `input[2]`.
fn position_name(i: usize) -> String {
    match i {
        0 | 1 => format!("a[{}]", i),
        2..=5 => format!("b[{}][{}]", (i - 2) / 2, (i - 2) % 2),
        6 | 7 => format!("c[{}]", i - 6),
        _ => format!("input[{}]", i - PROOF_WORDS),
    }
}
