//! Native rendering of the Groth16 verifier contract, and recovery of the
//! verification key constants embedded in any such contract.
//!
//! The contract layout follows the one the setup tool emits, so either
//! generator's output can be read back by [`parse_contract_constants`].

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::field::{parse_literal, Curve};
use crate::proof::{G1Point, G2Point, VerificationKey};

const HEADER: &str = r#"// SPDX-License-Identifier: GPL-3.0
pragma solidity >=0.7.0 <0.9.0;

contract {{NAME}} {
    // Scalar field size
    uint256 constant r    = {{R}};
    // Base field size
    uint256 constant q   = {{Q}};

    // Verification Key data
"#;

const BODY: &str = r#"
    // Memory data
    uint16 constant pVk = 0;
    uint16 constant pPairing = 128;

    uint16 constant pLastMem = 896;

    function verifyProof(uint[2] calldata _pA, uint[2][2] calldata _pB, uint[2] calldata _pC, uint[{{N}}] calldata _pubSignals) public view returns (bool) {
        assembly {
            function checkField(v) {
                if iszero(lt(v, r)) {
                    mstore(0, 0)
                    return(0, 0x20)
                }
            }

            // G1 function to multiply a G1 value(x,y) to value in an address
            function g1_mulAccC(pR, x, y, s) {
                let success
                let mIn := mload(0x40)
                mstore(mIn, x)
                mstore(add(mIn, 32), y)
                mstore(add(mIn, 64), s)

                success := staticcall(sub(gas(), 2000), 7, mIn, 96, mIn, 64)

                if iszero(success) {
                    mstore(0, 0)
                    return(0, 0x20)
                }

                mstore(add(mIn, 64), mload(pR))
                mstore(add(mIn, 96), mload(add(pR, 32)))

                success := staticcall(sub(gas(), 2000), 6, mIn, 128, pR, 64)

                if iszero(success) {
                    mstore(0, 0)
                    return(0, 0x20)
                }
            }

            function checkPairing(pA, pB, pC, pubSignals, pMem) -> isOk {
                let _pPairing := add(pMem, pPairing)
                let _pVk := add(pMem, pVk)

                mstore(_pVk, IC0x)
                mstore(add(_pVk, 32), IC0y)

                // Compute the linear combination vk_x
{{MULACC}}
                // -A
                mstore(_pPairing, calldataload(pA))
                mstore(add(_pPairing, 32), mod(sub(q, calldataload(add(pA, 32))), q))

                // B
                mstore(add(_pPairing, 64), calldataload(pB))
                mstore(add(_pPairing, 96), calldataload(add(pB, 32)))
                mstore(add(_pPairing, 128), calldataload(add(pB, 64)))
                mstore(add(_pPairing, 160), calldataload(add(pB, 96)))

                // alpha1
                mstore(add(_pPairing, 192), alphax)
                mstore(add(_pPairing, 224), alphay)

                // beta2
                mstore(add(_pPairing, 256), betax1)
                mstore(add(_pPairing, 288), betax2)
                mstore(add(_pPairing, 320), betay1)
                mstore(add(_pPairing, 352), betay2)

                // vk_x
                mstore(add(_pPairing, 384), mload(add(pMem, pVk)))
                mstore(add(_pPairing, 416), mload(add(pMem, add(pVk, 32))))

                // gamma2
                mstore(add(_pPairing, 448), gammax1)
                mstore(add(_pPairing, 480), gammax2)
                mstore(add(_pPairing, 512), gammay1)
                mstore(add(_pPairing, 544), gammay2)

                // C
                mstore(add(_pPairing, 576), calldataload(pC))
                mstore(add(_pPairing, 608), calldataload(add(pC, 32)))

                // delta2
                mstore(add(_pPairing, 640), deltax1)
                mstore(add(_pPairing, 672), deltax2)
                mstore(add(_pPairing, 704), deltay1)
                mstore(add(_pPairing, 736), deltay2)

                let success := staticcall(sub(gas(), 2000), 8, _pPairing, 768, _pPairing, 0x20)

                isOk := and(success, mload(_pPairing))
            }

            let pMem := mload(0x40)
            mstore(0x40, add(pMem, pLastMem))

            // Validate that all evaluations are in F
{{CHECKS}}
            // Validate all evaluations
            let isValid := checkPairing(_pA, _pB, _pC, _pubSignals, pMem)

            mstore(0, isValid)
            return(0, 0x20)
        }
    }
}
"#;

/// Renders a verifier contract named `contract_name` for `vk`.
pub fn render_verifier(vk: &VerificationKey, contract_name: &str) -> String {
    let curve = Curve::Bn128;
    let mut out = HEADER
        .replace("{{NAME}}", contract_name)
        .replace("{{R}}", &curve.scalar_modulus().to_string())
        .replace("{{Q}}", &curve.base_modulus().to_string());

    let mut constant = |name: &str, value: &BigUint| {
        out.push_str(&format!("    uint256 constant {:<7} = {};\n", name, value));
    };
    constant("alphax", &vk.alpha.x);
    constant("alphay", &vk.alpha.y);
    for (prefix, point) in [("beta", &vk.beta), ("gamma", &vk.gamma), ("delta", &vk.delta)] {
        constant(&format!("{}x1", prefix), &point.x[1]);
        constant(&format!("{}x2", prefix), &point.x[0]);
        constant(&format!("{}y1", prefix), &point.y[1]);
        constant(&format!("{}y2", prefix), &point.y[0]);
    }
    out.push('\n');
    for (i, p) in vk.ic.iter().enumerate() {
        out.push_str(&format!("    uint256 constant IC{}x = {};\n", i, p.x));
        out.push_str(&format!("    uint256 constant IC{}y = {};\n", i, p.y));
    }

    let n = vk.n_public();
    let mulacc: String = (0..n)
        .map(|i| {
            format!(
                "                g1_mulAccC(_pVk, IC{}x, IC{}y, calldataload(add(pubSignals, {})))\n",
                i + 1,
                i + 1,
                i * 32
            )
        })
        .collect();
    let checks: String = (0..n)
        .map(|i| format!("            checkField(calldataload(add(_pubSignals, {})))\n", i * 32))
        .collect();
    out.push_str(
        &BODY
            .replace("{{N}}", &n.to_string())
            .replace("{{MULACC}}", &mulacc)
            .replace("{{CHECKS}}", &checks),
    );
    out
}

/// Reads the `uint256 constant` declarations back into a verification key.
pub fn parse_contract_constants(source: &str) -> Result<VerificationKey, String> {
    let mut constants = HashMap::new();
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix("uint256 constant ") else {
            continue;
        };
        let Some((name, value)) = rest.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_end_matches(';').trim();
        let value = parse_literal(value)
            .ok_or_else(|| format!("constant {} has non-numeric value `{}`", name.trim(), value))?;
        constants.insert(name.trim().to_string(), value);
    }

    let get = |name: &str| {
        constants
            .get(name)
            .cloned()
            .ok_or_else(|| format!("constant {} not found", name))
    };
    let g2 = |prefix: &str| -> Result<G2Point, String> {
        Ok(G2Point {
            x: [get(&format!("{}x2", prefix))?, get(&format!("{}x1", prefix))?],
            y: [get(&format!("{}y2", prefix))?, get(&format!("{}y1", prefix))?],
        })
    };

    let mut ic = Vec::new();
    while let (Some(x), Some(y)) = (
        constants.get(&format!("IC{}x", ic.len())),
        constants.get(&format!("IC{}y", ic.len())),
    ) {
        ic.push(G1Point {
            x: x.clone(),
            y: y.clone(),
        });
    }
    if ic.is_empty() {
        return Err("constant IC0x not found".to_string());
    }

    Ok(VerificationKey {
        alpha: G1Point {
            x: get("alphax")?,
            y: get("alphay")?,
        },
        beta: g2("beta")?,
        gamma: g2("gamma")?,
        delta: g2("delta")?,
        ic,
    })
}

/// Describes the first difference between two keys, if any.
pub fn key_difference(expected: &VerificationKey, actual: &VerificationKey) -> Option<String> {
    if expected.ic.len() != actual.ic.len() {
        return Some(format!(
            "contract has {} IC points, verification key has {}",
            actual.ic.len(),
            expected.ic.len()
        ));
    }
    let points = [
        ("alpha", expected.alpha == actual.alpha),
        ("beta", expected.beta == actual.beta),
        ("gamma", expected.gamma == actual.gamma),
        ("delta", expected.delta == actual.delta),
    ];
    if let Some((name, _)) = points.iter().find(|(_, same)| !same) {
        return Some(format!("{} differs", name));
    }
    expected
        .ic
        .iter()
        .zip(&actual.ic)
        .position(|(a, b)| a != b)
        .map(|i| format!("IC[{}] differs", i))
}
