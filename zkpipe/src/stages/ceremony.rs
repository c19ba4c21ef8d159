//! The two-phase trusted setup.
//!
//! Each ceremony state is consumed by the step that advances it, so a step
//! can only ever run on the output of the one before it:
//!
//! ```text
//! Phase1Accumulator --contribute--> Phase1Accumulator
//!        |
//!   prepare_phase2
//!        v
//! UniversalParameters --setup--> CircuitKey --contribute--> CircuitKey
//!                                     |
//!                          export_verification_key
//!                                     v
//!                              CeremonyOutcome
//! ```
//!
//! Every step records the digest of what it produced. The resulting
//! [`CeremonyManifest`] binds the final key to the constraint system it was
//! built from, and is what later stages check for staleness.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifacts::{file_digest, produce, read_json, require, write_json, ArtifactLayout};
use crate::config::{CeremonyConfig, ContributionConfig};
use crate::errors::{PipelineError, PipelineResult};
use crate::field::Curve;
use crate::headers::{PtauHeader, R1csHeader, ZkeyHeader};
use crate::toolchain::{Contribution, Toolchain};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    PowersOfTauNew,
    PowersOfTauContribute,
    PreparePhase2,
    Groth16Setup,
    ZkeyContribute,
    ExportVerificationKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyStep {
    pub kind: StepKind,
    /// File name inside the circuit's build directory.
    pub artifact: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
    /// SHA-256 of the entropy string. The entropy itself is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_sha256: Option<String>,
    /// Whether the entropy came from the configuration rather than the OS.
    #[serde(default)]
    pub entropy_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyManifest {
    pub circuit: String,
    pub curve: Curve,
    pub power: u32,
    /// Digest of the `.r1cs` the proving key was set up against.
    pub r1cs_sha256: String,
    pub steps: Vec<CeremonyStep>,
}

impl CeremonyManifest {
    pub fn load(layout: &ArtifactLayout) -> PipelineResult<Self> {
        read_json("ceremony manifest", &layout.manifest())
    }

    fn last(&self, kind: StepKind) -> Option<&CeremonyStep> {
        self.steps.iter().rev().find(|s| s.kind == kind)
    }

    /// The last proving key of the phase-2 chain.
    pub fn final_zkey(&self) -> PipelineResult<&CeremonyStep> {
        self.last(StepKind::ZkeyContribute)
            .or_else(|| self.last(StepKind::Groth16Setup))
            .ok_or_else(|| PipelineError::CeremonyChain("manifest records no proving key".to_string()))
    }

    pub fn final_zkey_path(&self, layout: &ArtifactLayout) -> PipelineResult<PathBuf> {
        Ok(layout.dir().join(&self.final_zkey()?.artifact))
    }

    pub fn verification_key(&self) -> Option<&CeremonyStep> {
        self.last(StepKind::ExportVerificationKey)
    }

    /// Fails with `StaleArtifact` unless the constraint system and final key
    /// on disk are the ones this ceremony produced.
    pub fn check_bindings(&self, layout: &ArtifactLayout) -> PipelineResult<()> {
        let r1cs = layout.r1cs();
        require("constraint system", &r1cs)?;
        let actual = file_digest(&r1cs)?;
        if actual != self.r1cs_sha256 {
            return Err(PipelineError::StaleArtifact {
                artifact: "constraint system",
                expected: self.r1cs_sha256.clone(),
                actual,
            });
        }
        let step = self.final_zkey()?;
        let zkey = layout.dir().join(&step.artifact);
        require("proving key", &zkey)?;
        let actual = file_digest(&zkey)?;
        if actual != step.sha256 {
            return Err(PipelineError::StaleArtifact {
                artifact: "proving key",
                expected: step.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Fails with `StaleArtifact` unless `verification_key.json` is the one
    /// this ceremony exported.
    pub fn check_verification_key(&self, layout: &ArtifactLayout) -> PipelineResult<()> {
        let step = self.verification_key().ok_or_else(|| {
            PipelineError::CeremonyChain("manifest records no verification key".to_string())
        })?;
        let path = layout.verification_key();
        require("verification key", &path)?;
        let actual = file_digest(&path)?;
        if actual != step.sha256 {
            return Err(PipelineError::StaleArtifact {
                artifact: "verification key",
                expected: step.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// The toolchain and build directory every ceremony step works against.
pub struct Ceremony<'a, T: Toolchain> {
    toolchain: &'a T,
    layout: &'a ArtifactLayout,
}

impl<'a, T: Toolchain> Ceremony<'a, T> {
    pub fn new(toolchain: &'a T, layout: &'a ArtifactLayout) -> Self {
        Self { toolchain, layout }
    }

    fn record(
        &self,
        kind: StepKind,
        path: &Path,
        contribution: Option<&ResolvedContribution>,
    ) -> PipelineResult<CeremonyStep> {
        let step = CeremonyStep {
            kind,
            artifact: file_name(path),
            sha256: file_digest(path)?,
            contributor: contribution.map(|c| c.contribution.name.clone()),
            entropy_sha256: contribution.map(|c| c.entropy_sha256.clone()),
            entropy_configured: contribution.map_or(false, |c| c.configured),
        };
        info!("Ceremony step {:?} wrote {}", kind, step.artifact);
        Ok(step)
    }
}

/// A phase-1 accumulator, not yet usable for circuit setup.
#[derive(Debug)]
pub struct Phase1Accumulator {
    path: PathBuf,
    index: u32,
    curve: Curve,
    power: u32,
    history: Vec<CeremonyStep>,
}

impl Phase1Accumulator {
    pub fn new<T: Toolchain>(ceremony: &Ceremony<'_, T>, curve: Curve, power: u32) -> PipelineResult<Self> {
        ceremony.layout.ensure_dir()?;
        let path = ceremony.layout.ptau(0);
        produce("powers of tau", &path, |tmp| {
            ceremony.toolchain.powers_of_tau_new(curve, power, tmp)
        })?;
        let step = ceremony.record(StepKind::PowersOfTauNew, &path, None)?;
        Ok(Self {
            path,
            index: 0,
            curve,
            power,
            history: vec![step],
        })
    }

    pub fn contribute<T: Toolchain>(
        mut self,
        ceremony: &Ceremony<'_, T>,
        contribution: &ResolvedContribution,
    ) -> PipelineResult<Self> {
        let index = self.index + 1;
        let path = ceremony.layout.ptau(index);
        produce("powers of tau", &path, |tmp| {
            ceremony
                .toolchain
                .powers_of_tau_contribute(&self.path, tmp, &contribution.contribution)
        })?;
        let step = ceremony.record(StepKind::PowersOfTauContribute, &path, Some(contribution))?;
        self.history.push(step);
        Ok(Self {
            path,
            index,
            ..self
        })
    }

    pub fn prepare_phase2<T: Toolchain>(
        mut self,
        ceremony: &Ceremony<'_, T>,
    ) -> PipelineResult<UniversalParameters> {
        if self.index == 0 {
            return Err(PipelineError::CeremonyChain(
                "phase 1 needs at least one contribution before prepare phase2".to_string(),
            ));
        }
        let path = ceremony.layout.ptau_final();
        produce("powers of tau", &path, |tmp| {
            ceremony.toolchain.prepare_phase2(&self.path, tmp)
        })?;
        let step = ceremony.record(StepKind::PreparePhase2, &path, None)?;
        self.history.push(step);
        let mut params = UniversalParameters::open(&path)?;
        if params.curve != self.curve || params.power != self.power {
            return Err(PipelineError::CeremonyChain(format!(
                "prepared parameters are {} 2^{}, accumulator was {} 2^{}",
                params.curve, params.power, self.curve, self.power
            )));
        }
        params.history = self.history;
        Ok(params)
    }
}

/// Prepared powers of tau: the only input phase-2 setup accepts.
#[derive(Debug)]
pub struct UniversalParameters {
    path: PathBuf,
    curve: Curve,
    power: u32,
    capacity: u64,
    history: Vec<CeremonyStep>,
}

impl UniversalParameters {
    /// Opens an existing ptau, refusing one that has not been through `prepare phase2`.
    pub fn open(path: &Path) -> PipelineResult<Self> {
        let header = PtauHeader::read(path)?;
        if !header.prepared {
            return Err(PipelineError::CeremonyChain(format!(
                "{} has not been prepared for phase 2",
                path.display()
            )));
        }
        let curve = header.curve().ok_or_else(|| {
            PipelineError::format("powers of tau", path, "unknown curve modulus")
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            curve,
            power: header.power,
            capacity: header.domain_capacity(),
            history: Vec::new(),
        })
    }

    /// Binds the parameters to the circuit's constraint system.
    pub fn setup<T: Toolchain>(self, ceremony: &Ceremony<'_, T>) -> PipelineResult<CircuitKey> {
        let r1cs = ceremony.layout.r1cs();
        let header = R1csHeader::read(&r1cs)?;
        if header.curve() != Some(self.curve) {
            return Err(PipelineError::CeremonyChain(format!(
                "constraint system prime is not the {} scalar field",
                self.curve
            )));
        }
        // Constraints plus one row per public input and the constant must fit the domain.
        let required = header.n_constraints as u64 + header.n_public() as u64 + 1;
        if required > self.capacity {
            return Err(PipelineError::dimension(
                format!("powers of tau capacity 2^{}", self.power),
                self.capacity,
                required,
            ));
        }

        let r1cs_sha256 = file_digest(&r1cs)?;
        let path = ceremony.layout.zkey(0);
        produce("proving key", &path, |tmp| {
            ceremony.toolchain.groth16_setup(&r1cs, &self.path, tmp)
        })?;
        let key = ZkeyHeader::read(&path)?;
        if key.n_vars != header.n_wires {
            return Err(PipelineError::dimension(
                "proving key variables",
                header.n_wires as u64,
                key.n_vars as u64,
            ));
        }
        let mut history = self.history;
        history.push(ceremony.record(StepKind::Groth16Setup, &path, None)?);
        Ok(CircuitKey {
            path,
            index: 0,
            curve: self.curve,
            power: self.power,
            r1cs_sha256,
            history,
        })
    }
}

/// A circuit-specific proving key somewhere along the phase-2 chain.
#[derive(Debug)]
pub struct CircuitKey {
    path: PathBuf,
    index: u32,
    curve: Curve,
    power: u32,
    r1cs_sha256: String,
    history: Vec<CeremonyStep>,
}

impl CircuitKey {
    pub fn contribute<T: Toolchain>(
        mut self,
        ceremony: &Ceremony<'_, T>,
        contribution: &ResolvedContribution,
    ) -> PipelineResult<Self> {
        let index = self.index + 1;
        let path = ceremony.layout.zkey(index);
        produce("proving key", &path, |tmp| {
            ceremony
                .toolchain
                .zkey_contribute(&self.path, tmp, &contribution.contribution)
        })?;
        let before = ZkeyHeader::read(&self.path)?;
        let after = ZkeyHeader::read(&path)?;
        if after.circuit_hash != before.circuit_hash {
            return Err(PipelineError::CeremonyChain(format!(
                "{} is bound to a different circuit than {}",
                file_name(&path),
                file_name(&self.path)
            )));
        }
        let step = ceremony.record(StepKind::ZkeyContribute, &path, Some(contribution))?;
        self.history.push(step);
        Ok(Self {
            path,
            index,
            ..self
        })
    }

    /// Ends the ceremony: exports the verification key and writes the manifest.
    pub fn export_verification_key<T: Toolchain>(
        mut self,
        ceremony: &Ceremony<'_, T>,
    ) -> PipelineResult<CeremonyOutcome> {
        if self.index == 0 {
            return Err(PipelineError::CeremonyChain(
                "phase 2 needs at least one contribution before export".to_string(),
            ));
        }
        let vkey = ceremony.layout.verification_key();
        produce("verification key", &vkey, |tmp| {
            ceremony.toolchain.export_verification_key(&self.path, tmp)
        })?;
        self.history
            .push(ceremony.record(StepKind::ExportVerificationKey, &vkey, None)?);

        let manifest = CeremonyManifest {
            circuit: ceremony.layout.name().to_string(),
            curve: self.curve,
            power: self.power,
            r1cs_sha256: self.r1cs_sha256,
            steps: self.history,
        };
        write_json(&ceremony.layout.manifest(), &manifest)?;
        Ok(CeremonyOutcome {
            zkey: self.path,
            verification_key: vkey,
            manifest,
        })
    }
}

#[derive(Debug)]
pub struct CeremonyOutcome {
    pub zkey: PathBuf,
    pub verification_key: PathBuf,
    pub manifest: CeremonyManifest,
}

/// A contribution with its entropy fixed and digested.
#[derive(Debug, Clone)]
pub struct ResolvedContribution {
    pub contribution: Contribution,
    pub entropy_sha256: String,
    pub configured: bool,
}

impl ResolvedContribution {
    pub fn resolve(config: &ContributionConfig) -> Self {
        let (entropy, configured) = match &config.entropy {
            Some(e) => (e.clone(), true),
            None => {
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                (hex::encode(bytes), false)
            }
        };
        Self {
            entropy_sha256: hex::encode(Sha256::digest(entropy.as_bytes())),
            contribution: Contribution {
                name: config.name.clone(),
                entropy,
            },
            configured,
        }
    }
}

/// Resolves both phases' contributions, rejecting entropy used twice in the
/// same ceremony and warning about configured entropy seen in `previous`.
pub fn resolve_contributions(
    config: &CeremonyConfig,
    previous: Option<&CeremonyManifest>,
) -> PipelineResult<(Vec<ResolvedContribution>, Vec<ResolvedContribution>)> {
    let phase1: Vec<_> = config.phase1.iter().map(ResolvedContribution::resolve).collect();
    let phase2: Vec<_> = config.phase2.iter().map(ResolvedContribution::resolve).collect();

    let mut seen = HashSet::new();
    for c in phase1.iter().chain(&phase2) {
        if !seen.insert(c.entropy_sha256.as_str()) {
            return Err(PipelineError::CeremonyChain(format!(
                "contribution `{}` reuses entropy already used in this ceremony",
                c.contribution.name
            )));
        }
    }

    if let Some(previous) = previous {
        let used: HashSet<&str> = previous
            .steps
            .iter()
            .filter_map(|s| s.entropy_sha256.as_deref())
            .collect();
        for c in phase1.iter().chain(&phase2).filter(|c| c.configured) {
            if used.contains(c.entropy_sha256.as_str()) {
                warn!(
                    "Contribution `{}` reuses entropy from the previous ceremony for {}; \
                     reused entropy voids the setup's soundness",
                    c.contribution.name, previous.circuit
                );
            }
        }
    }
    Ok((phase1, phase2))
}

/// Runs the whole ceremony for the circuit compiled into `layout`.
pub fn run<T: Toolchain>(
    toolchain: &T,
    layout: &ArtifactLayout,
    config: &CeremonyConfig,
) -> PipelineResult<CeremonyOutcome> {
    require("constraint system", &layout.r1cs())?;
    let previous = if layout.manifest().exists() {
        match CeremonyManifest::load(layout) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Ignoring unreadable previous ceremony manifest: {}", e);
                None
            }
        }
    } else {
        None
    };
    let (phase1, phase2) = resolve_contributions(config, previous.as_ref())?;

    info!(
        "Starting ceremony for {} on {} with power {}",
        layout.name(),
        config.curve,
        config.power
    );
    let ceremony = Ceremony::new(toolchain, layout);
    let mut accumulator = Phase1Accumulator::new(&ceremony, config.curve, config.power)?;
    for c in &phase1 {
        accumulator = accumulator.contribute(&ceremony, c)?;
    }
    let params = accumulator.prepare_phase2(&ceremony)?;

    let mut key = params.setup(&ceremony)?;
    for c in &phase2 {
        key = key.contribute(&ceremony, c)?;
    }
    let outcome = key.export_verification_key(&ceremony)?;
    info!(
        "Ceremony complete: {} ({} phase-1, {} phase-2 contributions)",
        outcome.zkey.display(),
        phase1.len(),
        phase2.len()
    );
    Ok(outcome)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
