//! The narrow capability interface to the external circuit tools.
//!
//! The orchestrator and the ceremony only ever talk to a [`Toolchain`], so
//! their sequencing can be exercised against fakes. Every method is a
//! blocking call; outputs are written to the paths it is given.

use std::path::Path;

use crate::errors::PipelineResult;
use crate::field::Curve;

pub mod command;

pub use command::CommandToolchain;

/// A resolved ceremony contribution.
#[derive(Clone)]
pub struct Contribution {
    pub name: String,
    pub entropy: String,
}

impl std::fmt::Debug for Contribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contribution")
            .field("name", &self.name)
            .field("entropy", &"<redacted>")
            .finish()
    }
}

pub trait Toolchain {
    /// Compiles `source` into `<stem>.r1cs`, `<stem>.sym` and `<stem>_js/` inside `out_dir`.
    fn compile(&self, source: &Path, out_dir: &Path) -> PipelineResult<()>;

    fn powers_of_tau_new(&self, curve: Curve, power: u32, out: &Path) -> PipelineResult<()>;

    fn powers_of_tau_contribute(
        &self,
        input: &Path,
        out: &Path,
        contribution: &Contribution,
    ) -> PipelineResult<()>;

    fn prepare_phase2(&self, input: &Path, out: &Path) -> PipelineResult<()>;

    fn groth16_setup(&self, r1cs: &Path, ptau: &Path, zkey_out: &Path) -> PipelineResult<()>;

    fn zkey_contribute(
        &self,
        input: &Path,
        out: &Path,
        contribution: &Contribution,
    ) -> PipelineResult<()>;

    fn export_verification_key(&self, zkey: &Path, out: &Path) -> PipelineResult<()>;

    /// Evaluates the witness program on the assignment in `input_json`.
    fn calculate_witness(&self, wasm: &Path, input_json: &Path, out: &Path) -> PipelineResult<()>;

    /// Checks that `wtns` satisfies every constraint in `r1cs`.
    fn check_witness(&self, r1cs: &Path, wtns: &Path) -> PipelineResult<()>;

    fn prove(
        &self,
        zkey: &Path,
        wtns: &Path,
        proof_out: &Path,
        public_out: &Path,
    ) -> PipelineResult<()>;

    /// Off-chain check. `Ok(false)` means the proof was examined and rejected.
    fn verify(&self, vkey: &Path, public: &Path, proof: &Path) -> PipelineResult<bool>;

    /// The solidity calldata string for a proof, as printed by the tool.
    fn export_calldata(&self, public: &Path, proof: &Path) -> PipelineResult<String>;

    fn export_verifier(&self, zkey: &Path, out: &Path) -> PipelineResult<()>;
}
