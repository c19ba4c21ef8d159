//! # zkpipe - staged Groth16 circuit pipeline
//!
//! A Rust library for driving a circom circuit through its whole proof
//! lifecycle: compilation, the two-phase trusted setup, witness generation,
//! proving, off-chain and on-chain verification, and verifier-contract export.
//! Every stage reads the artifacts the previous one wrote under
//! `<build_dir>/<circuit>/` and checks that they belong together before
//! handing them to the external tools.
//!
//! ## Quick Start
//!
//! Add the following to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! zkpipe = "0.1.0"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Basic Usage
//!
//! ### 1. Configure the pipeline
//!
//! Configuration is a JSON file; every field has a default matching the
//! usual circom/snarkjs tutorial flow (BN254, `2^12` powers of tau, one
//! contribution per phase):
//!
//! ```json
//! {
//!     "circuits_dir": "circuits",
//!     "build_dir": "build",
//!     "input_path": "input.json",
//!     "ceremony": { "power": 12 }
//! }
//! ```
//!
//! ### 2. Run every stage
//!
//! ```rust,no_run
//! use zkpipe::config::PipelineConfig;
//! use zkpipe::pipeline::Pipeline;
//! use zkpipe::toolchain::CommandToolchain;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load(None)?;
//! let toolchain = CommandToolchain::new(&config.circom_bin, &config.snarkjs_bin);
//! let pipeline = Pipeline::new(config, "multiplier2", toolchain)?;
//!
//! match pipeline.run().await {
//!     Ok(report) => println!("public signals: {:?}", report.public_signals),
//!     Err(failure) => std::process::exit(failure.exit_code()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Verify on-chain
//!
//! With an `onchain` section in the configuration, the verify stage also
//! calls the deployed verifier contract and fails with
//! [`errors::PipelineError::VerificationDisagreement`] if the two paths
//! disagree:
//!
//! ```rust,no_run
//! # use zkpipe::{config::PipelineConfig, pipeline::Pipeline, toolchain::CommandToolchain};
//! use zkpipe::onchain::RpcVerifier;
//!
//! # fn build(config: PipelineConfig) -> zkpipe::errors::PipelineResult<()> {
//! let rpc = RpcVerifier::new(config.onchain.as_ref().expect("onchain section"))?;
//! let pipeline = Pipeline::new(config, "multiplier2", CommandToolchain::default())?
//!     .with_onchain(rpc);
//! # Ok(())
//! # }
//! ```
//!
//! ### 4. Serve verification
//!
//! ```rust,no_run
//! use std::path::Path;
//! use zkpipe::server::ServerApp;
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let server = ServerApp::new("127.0.0.1:65432", Path::new("build/multiplier2/verification_key.json"))?
//!     .with_valid_proof_handler(|signals| {
//!         println!("valid proof for {:?}", signals);
//!         Ok(())
//!     });
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod binfile;
pub mod calldata;
pub mod client;
pub mod config;
pub mod errors;
pub mod field;
pub mod headers;
pub mod input;
pub mod native;
pub mod onchain;
pub mod pipeline;
pub mod proof;
pub mod response;
pub mod server;
pub mod solidity;
pub mod stages;
pub mod toolchain;
