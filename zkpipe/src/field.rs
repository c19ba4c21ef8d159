use std::fmt;
use std::str::FromStr;

use ark_ff::{BigInteger, FpParameters, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

const BN128_BASE: &str = "30644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd47";
const BN128_SCALAR: &str = "30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001";
const BLS12_381_BASE: &str = "1a0111ea397fe69a4b1ba7b6434bacd764774b84f38512bf6730d2a0f6b0f6241eabfffeb153ffffb9feffffffffaaab";
const BLS12_381_SCALAR: &str = "73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

/// Pairing curves the ceremony tool understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    #[serde(rename = "bn128")]
    Bn128,
    #[serde(rename = "bls12381")]
    Bls12_381,
}

impl Curve {
    /// Name passed to `snarkjs powersoftau new`.
    pub fn tool_name(self) -> &'static str {
        match self {
            Curve::Bn128 => "bn128",
            Curve::Bls12_381 => "bls12381",
        }
    }

    /// Modulus of the base field (the `q` in ptau and zkey headers).
    pub fn base_modulus(self) -> BigUint {
        match self {
            Curve::Bn128 => hex_constant(BN128_BASE),
            Curve::Bls12_381 => hex_constant(BLS12_381_BASE),
        }
    }

    /// Modulus of the scalar field, which bounds every signal value.
    pub fn scalar_modulus(self) -> BigUint {
        match self {
            Curve::Bn128 => hex_constant(BN128_SCALAR),
            Curve::Bls12_381 => hex_constant(BLS12_381_SCALAR),
        }
    }

    pub fn from_base_modulus(q: &BigUint) -> Option<Self> {
        [Curve::Bn128, Curve::Bls12_381]
            .into_iter()
            .find(|c| &c.base_modulus() == q)
    }

    pub fn from_scalar_modulus(r: &BigUint) -> Option<Self> {
        [Curve::Bn128, Curve::Bls12_381]
            .into_iter()
            .find(|c| &c.scalar_modulus() == r)
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

impl FromStr for Curve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bn128" | "bn254" => Ok(Curve::Bn128),
            "bls12381" | "bls12-381" => Ok(Curve::Bls12_381),
            other => Err(format!("unsupported curve `{}`", other)),
        }
    }
}

fn hex_constant(digits: &str) -> BigUint {
    // The constants above are fixed valid hex.
    BigUint::parse_bytes(digits.as_bytes(), 16).unwrap_or_default()
}

/// Parses a non-negative decimal integer of arbitrary size.
pub fn parse_decimal(s: &str) -> Option<BigUint> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

/// Parses a calldata literal, either `0x`-prefixed hex or decimal.
pub fn parse_literal(s: &str) -> Option<BigUint> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() => BigUint::parse_bytes(hex.as_bytes(), 16),
        Some(_) => None,
        None => parse_decimal(s),
    }
}

/// Formats a value as a 32-byte big-endian hex word, `0x`-prefixed.
pub fn to_hex_word(value: &BigUint) -> String {
    format!("0x{:0>64}", value.to_str_radix(16))
}

/// Reads a little-endian unsigned integer of exactly `bytes.len()` bytes.
pub fn from_le_bytes(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

pub fn field_to_biguint<F: PrimeField>(f: F) -> BigUint {
    BigUint::from_bytes_le(&f.into_repr().to_bytes_le())
}

pub fn field_to_string<F: PrimeField>(f: F) -> String {
    field_to_biguint(f).to_string()
}

/// Converts a value to a field element, refusing anything not below the modulus.
pub fn field_from_biguint<F: PrimeField>(value: &BigUint) -> Option<F> {
    let modulus = BigUint::from_bytes_le(&<F::Params as FpParameters>::MODULUS.to_bytes_le());
    if value >= &modulus {
        return None;
    }
    Some(F::from_le_bytes_mod_order(&value.to_bytes_le()))
}

pub fn field_from_string<F: PrimeField>(s: &str) -> Option<F> {
    field_from_biguint(&parse_decimal(s)?)
}
