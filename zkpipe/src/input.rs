//! Input assignments and their validation against the compiled circuit.
//!
//! The declared inputs come from the symbol file: every `main.<signal>` entry
//! whose wire falls in the R1CS input range. Array signals appear once per
//! element (`main.x[0]`, `main.x[1]`, ...) and are counted per base name.

use std::collections::BTreeMap;
use std::path::Path;

use num_bigint::BigUint;
use serde_json::Value;

use crate::errors::{InputError, PipelineError, PipelineResult};
use crate::field::parse_literal;
use crate::headers::R1csHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSignal {
    pub name: String,
    /// Flattened element count; 1 for scalars.
    pub len: usize,
}

/// Input signals of the main component, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSignals {
    signals: Vec<DeclaredSignal>,
}

impl InputSignals {
    pub fn read(sym: &Path, r1cs: &R1csHeader) -> PipelineResult<Self> {
        crate::artifacts::require("symbol file", sym)?;
        let text = std::fs::read_to_string(sym).map_err(|e| PipelineError::io(sym, e))?;
        let signals = Self::parse(&text, r1cs.input_wires())
            .map_err(|reason| PipelineError::format("symbol file", sym, reason))?;
        let declared: usize = signals.signals.iter().map(|s| s.len).sum();
        let expected = (r1cs.n_pub_in + r1cs.n_prv_in) as usize;
        if declared != expected {
            return Err(PipelineError::dimension(
                "input signals in symbol file",
                expected as u64,
                declared as u64,
            ));
        }
        Ok(signals)
    }

    /// Parses `labelIdx,varIdx,componentIdx,name` lines.
    pub fn parse(text: &str, input_wires: std::ops::Range<u32>) -> Result<Self, String> {
        let mut signals: Vec<DeclaredSignal> = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.splitn(4, ',').collect();
            let [_, var, _, name] = fields.as_slice() else {
                return Err(format!("line {}: expected 4 fields", lineno + 1));
            };
            let var: i64 = var
                .parse()
                .map_err(|_| format!("line {}: bad wire index `{}`", lineno + 1, var))?;
            let Some(signal) = name.strip_prefix("main.") else {
                continue;
            };
            if var < 0 || !input_wires.contains(&(var as u32)) {
                continue;
            }
            let base = signal.split('[').next().unwrap_or(signal);
            if base.contains('.') {
                continue;
            }
            match signals.last_mut() {
                Some(last) if last.name == base => last.len += 1,
                _ => signals.push(DeclaredSignal {
                    name: base.to_string(),
                    len: 1,
                }),
            }
        }
        Ok(Self { signals })
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeclaredSignal> {
        self.signals.iter()
    }

    pub fn get(&self, name: &str) -> Option<&DeclaredSignal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// Values supplied per signal, flattened in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputAssignment {
    values: BTreeMap<String, Vec<BigUint>>,
}

impl InputAssignment {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let json: Value = crate::artifacts::read_json("input assignment", path)?;
        if !json.is_object() {
            return Err(PipelineError::format(
                "input assignment",
                path,
                "top level must be an object of signal names",
            ));
        }
        Ok(Self::from_json(&json)?)
    }

    pub fn from_json(json: &Value) -> Result<Self, InputError> {
        let mut values = BTreeMap::new();
        if let Value::Object(map) = json {
            for (name, value) in map {
                let mut flat = Vec::new();
                flatten(name, value, &mut flat)?;
                values.insert(name.clone(), flat);
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&[BigUint]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Every supplied signal must be declared with the right shape and every
    /// value must lie below `modulus`.
    pub fn validate(&self, declared: &InputSignals, modulus: &BigUint) -> Result<(), InputError> {
        if let Some(unknown) = self.values.keys().find(|k| declared.get(k).is_none()) {
            return Err(InputError::UnknownSignal(unknown.clone()));
        }
        for signal in declared.iter() {
            let values = self
                .values
                .get(&signal.name)
                .ok_or_else(|| InputError::MissingSignal(signal.name.clone()))?;
            if values.len() != signal.len {
                return Err(InputError::Shape {
                    signal: signal.name.clone(),
                    expected: signal.len,
                    actual: values.len(),
                });
            }
            if let Some(v) = values.iter().find(|v| *v >= modulus) {
                return Err(InputError::OutOfField {
                    signal: signal.name.clone(),
                    value: v.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn flatten(signal: &str, value: &Value, out: &mut Vec<BigUint>) -> Result<(), InputError> {
    let malformed = |reason: String| InputError::Malformed {
        signal: signal.to_string(),
        reason,
    };
    match value {
        Value::String(s) => {
            let v = parse_literal(s)
                .ok_or_else(|| malformed(format!("`{}` is not a non-negative integer", s)))?;
            out.push(v);
        }
        Value::Number(n) => {
            let v = n.as_u64().ok_or_else(|| {
                malformed(format!(
                    "{} is not a non-negative integer; pass large values as decimal strings",
                    n
                ))
            })?;
            out.push(BigUint::from(v));
        }
        Value::Array(items) => {
            for item in items {
                flatten(signal, item, out)?;
            }
        }
        other => return Err(malformed(format!("unsupported value {}", other))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SYM: &str = "1,1,0,main.c\n2,2,0,main.a\n3,3,0,main.b\n4,-1,1,main.mul.out\n";

    fn declared() -> InputSignals {
        InputSignals::parse(SYM, 2..4).unwrap()
    }

    fn r() -> BigUint {
        crate::field::Curve::Bn128.scalar_modulus()
    }

    #[test]
    fn symbol_file_yields_main_inputs() {
        let d = declared();
        let names: Vec<_> = d.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let arrays = InputSignals::parse("1,1,0,main.out\n2,2,0,main.x[0]\n3,3,0,main.x[1]\n4,4,0,main.k\n", 2..5).unwrap();
        assert_eq!(arrays.get("x").unwrap().len, 2);
        assert_eq!(arrays.get("k").unwrap().len, 1);
        assert!(arrays.get("out").is_none());
    }

    #[test]
    fn decimal_strings_keep_precision() {
        let big = "21888242871839275222246405745257275088548364400416034343698204186575808495616";
        let input = InputAssignment::from_json(&json!({ "a": big, "b": 4 })).unwrap();
        assert_eq!(input.get("a").unwrap()[0].to_string(), big);
        input.validate(&declared(), &r()).unwrap();
    }

    #[test]
    fn assignment_errors_name_the_signal() {
        let check = |v: Value| InputAssignment::from_json(&v).and_then(|i| i.validate(&declared(), &r()));
        assert!(matches!(check(json!({"a": "3"})), Err(InputError::MissingSignal(s)) if s == "b"));
        assert!(matches!(check(json!({"a": "3", "b": "4", "z": "1"})), Err(InputError::UnknownSignal(s)) if s == "z"));
        assert!(matches!(check(json!({"a": ["3", "5"], "b": "4"})), Err(InputError::Shape { expected: 1, actual: 2, .. })));
        assert!(matches!(check(json!({"a": "-3", "b": "4"})), Err(InputError::Malformed { .. })));
        assert!(matches!(check(json!({"a": 1.5, "b": "4"})), Err(InputError::Malformed { .. })));
        let over = r().to_string();
        assert!(matches!(check(json!({"a": over, "b": "4"})), Err(InputError::OutOfField { signal, .. }) if signal == "a"));
    }

    #[test]
    fn sym_count_must_match_header() {
        let dir = tempfile::tempdir().unwrap();
        let sym = dir.path().join("m.sym");
        std::fs::write(&sym, SYM).unwrap();
        let header = R1csHeader {
            prime: r(),
            n_wires: 4,
            n_pub_out: 1,
            n_pub_in: 0,
            n_prv_in: 3,
            n_labels: 4,
            n_constraints: 1,
        };
        let err = InputSignals::read(&sym, &header).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { expected: 3, actual: 2, .. }));
    }
}
