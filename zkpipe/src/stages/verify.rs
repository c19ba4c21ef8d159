//! Off-chain and on-chain verification of the current proof.
//!
//! The two paths are independent. A proof counts as valid only when both
//! accept it, and when they disagree the pipeline says so instead of
//! reporting a plain rejection.

use log::{info, warn};

use crate::artifacts::{require, write_atomic, ArtifactLayout};
use crate::calldata::SolidityCalldata;
use crate::errors::{PipelineError, PipelineResult};
use crate::native::NativeVerifier;
use crate::onchain::OnChainVerifier;
use crate::proof::{load_proof, load_public_signals, load_verification_key};
use crate::stages::ceremony::CeremonyManifest;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub offchain: bool,
    pub onchain: Option<bool>,
}

fn require_triple(layout: &ArtifactLayout) -> PipelineResult<()> {
    require("verification key", &layout.verification_key())?;
    require("public signals", &layout.public())?;
    require("proof", &layout.proof())?;
    // A key placed by hand without a ceremony has nothing to be checked against.
    if layout.manifest().exists() {
        CeremonyManifest::load(layout)?.check_verification_key(layout)?;
    }
    Ok(())
}

/// The tool's pairing check.
pub fn offchain<T: Toolchain>(toolchain: &T, layout: &ArtifactLayout) -> PipelineResult<bool> {
    require_triple(layout)?;
    let ok = toolchain.verify(&layout.verification_key(), &layout.public(), &layout.proof())?;
    info!("Off-chain verification of {}: {}", layout.name(), ok);
    Ok(ok)
}

/// The same check done in-process.
pub fn offchain_native(layout: &ArtifactLayout) -> PipelineResult<bool> {
    require_triple(layout)?;
    let vkey_path = layout.verification_key();
    let vk = load_verification_key(&vkey_path)?;
    let verifier = NativeVerifier::new(&vk)
        .map_err(|reason| PipelineError::format("verification key", &vkey_path, reason))?;
    let ok = verifier.verify(&load_public_signals(&layout.public())?, &load_proof(&layout.proof())?)?;
    info!("Native off-chain verification of {}: {}", layout.name(), ok);
    Ok(ok)
}

/// Builds the contract call arguments and cross-checks them against the tool's.
///
/// The tool's string is kept as `calldata.txt`.
pub fn calldata<T: Toolchain>(toolchain: &T, layout: &ArtifactLayout) -> PipelineResult<SolidityCalldata> {
    require_triple(layout)?;
    let proof = load_proof(&layout.proof())?;
    let public = load_public_signals(&layout.public())?;
    let n_public = load_verification_key(&layout.verification_key())?.n_public();
    if public.len() != n_public {
        return Err(PipelineError::dimension(
            "public signal count",
            n_public as u64,
            public.len() as u64,
        ));
    }

    let native = SolidityCalldata::from_proof(&proof, &public);
    let text = toolchain.export_calldata(&layout.public(), &layout.proof())?;
    let tool = SolidityCalldata::parse(&text, n_public)?;
    native.compare(&tool)?;
    write_atomic(&layout.calldata(), text.as_bytes())?;
    Ok(native)
}

pub async fn onchain<T: Toolchain, C: OnChainVerifier>(
    toolchain: &T,
    layout: &ArtifactLayout,
    verifier: &C,
) -> PipelineResult<bool> {
    let calldata = calldata(toolchain, layout)?;
    let ok = verifier.verify_calldata(&calldata).await?;
    info!("On-chain verification of {}: {}", layout.name(), ok);
    Ok(ok)
}

/// Runs every configured path and reconciles the answers.
pub async fn run<T: Toolchain, C: OnChainVerifier>(
    toolchain: &T,
    layout: &ArtifactLayout,
    verifier: Option<&C>,
) -> PipelineResult<VerifyOutcome> {
    let offchain = offchain(toolchain, layout)?;
    let onchain = match verifier {
        Some(v) => Some(onchain(toolchain, layout, v).await?),
        None => None,
    };
    reconcile(offchain, onchain)
}

pub fn reconcile(offchain: bool, onchain: Option<bool>) -> PipelineResult<VerifyOutcome> {
    match onchain {
        Some(on) if on != offchain => {
            warn!("Verification paths disagree: off-chain={}, on-chain={}", offchain, on);
            Err(PipelineError::VerificationDisagreement {
                offchain,
                onchain: on,
            })
        }
        _ if !offchain => Err(PipelineError::ProofRejected { path: "off-chain" }),
        _ => Ok(VerifyOutcome { offchain, onchain }),
    }
}
