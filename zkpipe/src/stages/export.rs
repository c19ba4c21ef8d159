use std::path::PathBuf;

use log::info;

use crate::artifacts::{produce, require, write_atomic, ArtifactLayout};
use crate::config::{ExportConfig, VerifierGenerator};
use crate::errors::{PipelineError, PipelineResult};
use crate::proof::load_verification_key;
use crate::solidity::{key_difference, parse_contract_constants, render_verifier};
use crate::stages::ceremony::CeremonyManifest;
use crate::toolchain::Toolchain;

/// Emits the verifier contract and checks that it embeds the current
/// verification key.
pub fn run<T: Toolchain>(
    toolchain: &T,
    layout: &ArtifactLayout,
    config: &ExportConfig,
) -> PipelineResult<PathBuf> {
    let vkey_path = layout.verification_key();
    require("verification key", &vkey_path)?;
    let vk = load_verification_key(&vkey_path)?;
    let contract = layout.verifier_contract();

    match config.generator {
        VerifierGenerator::Toolchain => {
            let zkey = CeremonyManifest::load(layout)?.final_zkey_path(layout)?;
            require("proving key", &zkey)?;
            produce("verifier contract", &contract, |tmp| {
                toolchain.export_verifier(&zkey, tmp)
            })?;
        }
        VerifierGenerator::Native => {
            write_atomic(&contract, render_verifier(&vk, &config.contract_name).as_bytes())?;
        }
    }

    let source = std::fs::read_to_string(&contract).map_err(|e| PipelineError::io(&contract, e))?;
    let embedded = parse_contract_constants(&source).map_err(PipelineError::VerificationKeyMismatch)?;
    if let Some(difference) = key_difference(&vk, &embedded) {
        return Err(PipelineError::VerificationKeyMismatch(difference));
    }
    info!(
        "Verifier contract for {} written to {} ({} public signals)",
        layout.name(),
        contract.display(),
        vk.n_public()
    );
    Ok(contract)
}
