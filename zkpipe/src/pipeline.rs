//! End-to-end orchestration for one circuit.

use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::config::PipelineConfig;
use crate::errors::{PipelineResult, StageFailure};
use crate::onchain::{OnChainVerifier, RpcVerifier};
use crate::stages::verify::VerifyOutcome;
use crate::stages::{self, Stage};
use crate::toolchain::Toolchain;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub circuit: String,
    pub public_signals: Vec<String>,
    pub verification: VerifyOutcome,
    pub verifier_contract: PathBuf,
    pub published: Option<PathBuf>,
}

pub struct Pipeline<T: Toolchain, C: OnChainVerifier = RpcVerifier> {
    config: PipelineConfig,
    layout: ArtifactLayout,
    toolchain: T,
    onchain: Option<C>,
}

impl<T: Toolchain> Pipeline<T, RpcVerifier> {
    pub fn new(config: PipelineConfig, circuit: &str, toolchain: T) -> PipelineResult<Self> {
        let layout = config.layout(circuit)?;
        Ok(Self {
            config,
            layout,
            toolchain,
            onchain: None,
        })
    }
}

impl<T: Toolchain, C: OnChainVerifier> Pipeline<T, C> {
    /// Adds an on-chain verification path to the verify stage.
    pub fn with_onchain<V: OnChainVerifier>(self, verifier: V) -> Pipeline<T, V> {
        Pipeline {
            config: self.config,
            layout: self.layout,
            toolchain: self.toolchain,
            onchain: Some(verifier),
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Runs every stage in order, stopping at the first failure. Artifacts
    /// written by earlier stages are left in place.
    pub async fn run(&self) -> Result<PipelineReport, StageFailure> {
        let start = Instant::now();
        info!("Running pipeline for circuit {}", self.layout.name());
        let tc = &self.toolchain;
        let layout = &self.layout;
        let config = &self.config;

        step(Stage::Compile, || stages::compile::run(tc, layout))?;
        step(Stage::Setup, || stages::ceremony::run(tc, layout, &config.ceremony))?;
        step(Stage::Witness, || {
            stages::witness::run(tc, layout, &config.input_path, &config.witness)
        })?;
        let proved = step(Stage::Prove, || stages::prove::run(tc, layout))?;
        let verification = stages::verify::run(tc, layout, self.onchain.as_ref())
            .await
            .map_err(|e| StageFailure::new(Stage::Verify, e))?;
        let verifier_contract = step(Stage::Export, || {
            stages::export::run(tc, layout, &config.export)
        })?;
        let published = match &config.publish_dir {
            Some(dir) => Some(step(Stage::Publish, || stages::publish::run(layout, dir))?),
            None => None,
        };

        info!(
            "Pipeline for {} finished in {:?}",
            layout.name(),
            start.elapsed()
        );
        Ok(PipelineReport {
            circuit: layout.name().to_string(),
            public_signals: proved.public_signals.iter().map(|s| s.to_string()).collect(),
            verification,
            verifier_contract,
            published,
        })
    }
}

fn step<R>(stage: Stage, f: impl FnOnce() -> PipelineResult<R>) -> Result<R, StageFailure> {
    debug!("Stage {} starting", stage);
    let start = Instant::now();
    let result = f().map_err(|e| StageFailure::new(stage, e))?;
    debug!("Stage {} done in {:?}", stage, start.elapsed());
    Ok(result)
}
