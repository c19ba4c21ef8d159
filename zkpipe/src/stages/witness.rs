use std::path::Path;

use log::{debug, info};

use crate::artifacts::{produce, require, ArtifactLayout};
use crate::config::WitnessConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::headers::{R1csHeader, WitnessFile};
use crate::input::{InputAssignment, InputSignals};
use crate::toolchain::Toolchain;

/// Evaluates the witness program on `input` and writes `witness.wtns`.
///
/// The assignment is checked against the circuit's declared inputs first, so
/// unknown, missing and out-of-field signals are reported by name rather than
/// as an evaluator crash.
pub fn run<T: Toolchain>(
    toolchain: &T,
    layout: &ArtifactLayout,
    input: &Path,
    config: &WitnessConfig,
) -> PipelineResult<WitnessFile> {
    let wasm = layout.wasm();
    require("witness program", &wasm)?;
    let r1cs_path = layout.r1cs();
    let r1cs = R1csHeader::read(&r1cs_path)?;

    let declared = InputSignals::read(&layout.sym(), &r1cs)?;
    let assignment = InputAssignment::load(input)?;
    assignment.validate(&declared, &r1cs.prime)?;
    debug!("Input assignment {} matches the declared inputs", input.display());

    let out = layout.witness();
    produce("witness", &out, |tmp| {
        toolchain.calculate_witness(&wasm, input, tmp)?;
        let witness = WitnessFile::read(tmp)?;
        if witness.prime != r1cs.prime {
            return Err(PipelineError::dimension(
                "witness field size in bits",
                r1cs.prime.bits(),
                witness.prime.bits(),
            ));
        }
        if witness.len() != r1cs.n_wires as usize {
            return Err(PipelineError::dimension(
                "witness length",
                r1cs.n_wires as u64,
                witness.len() as u64,
            ));
        }
        if config.check {
            toolchain.check_witness(&r1cs_path, tmp)?;
            debug!("Witness satisfies all {} constraints", r1cs.n_constraints);
        }
        Ok(())
    })?;

    let witness = WitnessFile::read(&out)?;
    info!("Witness for {} has {} wires", layout.name(), witness.len());
    Ok(witness)
}
