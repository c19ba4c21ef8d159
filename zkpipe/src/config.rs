use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::artifacts::ArtifactLayout;
use crate::errors::{PipelineError, PipelineResult};
use crate::field::Curve;

/// File picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "zkpipe.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding `<name>.circom` sources.
    pub circuits_dir: PathBuf,
    /// Root of the per-circuit build directories.
    pub build_dir: PathBuf,
    /// Input assignment fed to the witness program.
    pub input_path: PathBuf,
    pub circom_bin: String,
    pub snarkjs_bin: String,
    pub ceremony: CeremonyConfig,
    pub witness: WitnessConfig,
    pub export: ExportConfig,
    pub onchain: Option<OnChainConfig>,
    /// When set, browser-facing artifacts are copied to `<publish_dir>/<name>_js/`.
    pub publish_dir: Option<PathBuf>,
    pub server: ServerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    pub curve: Curve,
    pub power: u32,
    pub phase1: Vec<ContributionConfig>,
    pub phase2: Vec<ContributionConfig>,
}

/// One ceremony contribution. Without `entropy`, fresh OS randomness is used.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContributionConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WitnessConfig {
    /// Re-check the computed witness against the constraint system.
    pub check: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierGenerator {
    /// `snarkjs zkey export solidityverifier`.
    Toolchain,
    /// Rendered in-process from `verification_key.json`.
    Native,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub generator: VerifierGenerator,
    pub contract_file: String,
    pub contract_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnChainConfig {
    pub rpc_url: Url,
    /// Address of the deployed verifier contract, `0x`-prefixed.
    pub contract_address: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            circuits_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            input_path: PathBuf::from("input.json"),
            circom_bin: "circom".to_string(),
            snarkjs_bin: "snarkjs".to_string(),
            ceremony: CeremonyConfig::default(),
            witness: WitnessConfig::default(),
            export: ExportConfig::default(),
            onchain: None,
            publish_dir: None,
            server: ServerConfig::default(),
        }
    }
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            curve: Curve::Bn128,
            power: 12,
            phase1: vec![ContributionConfig {
                name: "First contribution".to_string(),
                entropy: None,
            }],
            phase2: vec![ContributionConfig {
                name: "Second contribution".to_string(),
                entropy: None,
            }],
        }
    }
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self { check: true }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            generator: VerifierGenerator::Toolchain,
            contract_file: "Groth16Verifier.sol".to_string(),
            contract_name: "Groth16Verifier".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:65432".to_string(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    /// Loads `path`, or `zkpipe.json` when present, or the defaults.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
            None => {
                debug!("No configuration file, using defaults");
                return Ok(Self::default());
            }
        };
        let json = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        let config: Self = serde_json::from_str(&json).map_err(|e| PipelineError::json(&path, e))?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.ceremony.phase1.is_empty() || self.ceremony.phase2.is_empty() {
            return Err(PipelineError::Usage(
                "each ceremony phase needs at least one contribution".to_string(),
            ));
        }
        if !(1..=28).contains(&self.ceremony.power) {
            return Err(PipelineError::Usage(format!(
                "ceremony power {} outside 1..=28",
                self.ceremony.power
            )));
        }
        if let Some(onchain) = &self.onchain {
            let addr = onchain.contract_address.trim_start_matches("0x");
            if addr.len() != 40 || hex::decode(addr).is_err() {
                return Err(PipelineError::Usage(format!(
                    "contract address `{}` is not a 20-byte hex address",
                    onchain.contract_address
                )));
            }
        }
        Ok(())
    }

    pub fn layout(&self, circuit: &str) -> PipelineResult<ArtifactLayout> {
        ArtifactLayout::new(
            circuit,
            &self.circuits_dir,
            &self.build_dir,
            self.ceremony.power,
            &self.export.contract_file,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_reference_ceremony() {
        let config = PipelineConfig::default();
        assert_eq!(config.ceremony.curve, Curve::Bn128);
        assert_eq!(config.ceremony.power, 12);
        assert_eq!(config.ceremony.phase1.len(), 1);
        assert_eq!(config.ceremony.phase2[0].name, "Second contribution");
        assert!(config.witness.check);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zkpipe.json");
        std::fs::write(
            &path,
            r#"{
                "build_dir": "out",
                "ceremony": { "power": 10, "phase1": [{ "name": "alice", "entropy": "abc" }],
                              "phase2": [{ "name": "bob" }, { "name": "carol" }] },
                "onchain": { "rpc_url": "http://127.0.0.1:8545",
                             "contract_address": "0x5FbDB2315678afecb367f032d93F642f64180aa3" }
            }"#,
        )
        .unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.build_dir, PathBuf::from("out"));
        assert_eq!(config.snarkjs_bin, "snarkjs");
        assert_eq!(config.ceremony.curve, Curve::Bn128);
        assert_eq!(config.ceremony.phase2.len(), 2);
        assert_eq!(config.onchain.unwrap().timeout_secs, 30);
        assert_eq!(config.export.generator, VerifierGenerator::Toolchain);
    }

    #[test]
    fn bad_addresses_and_empty_phases_are_usage_errors() {
        let mut config = PipelineConfig::default();
        config.ceremony.phase2.clear();
        assert!(matches!(config.validate(), Err(PipelineError::Usage(_))));

        let mut config = PipelineConfig::default();
        config.onchain = Some(OnChainConfig {
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            contract_address: "0x1234".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(config.validate(), Err(PipelineError::Usage(_))));
    }
}
