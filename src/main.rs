use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use url::Url;
use zkpipe::artifacts::ArtifactLayout;
use zkpipe::config::{PipelineConfig, VerifierGenerator};
use zkpipe::errors::{PipelineError, PipelineResult, StageFailure};
use zkpipe::onchain::{ContractVerifier, RpcVerifier};
use zkpipe::pipeline::{Pipeline, PipelineReport};
use zkpipe::response::VerificationResponse;
use zkpipe::server::ServerApp;
use zkpipe::stages::{self, Stage};
use zkpipe::toolchain::CommandToolchain;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (defaults to ./zkpipe.json when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured build directory.
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile `<circuit>.circom` into R1CS, symbols and the witness program.
    Compile { circuit: String },
    /// Run both ceremony phases and export the verification key.
    Setup { circuit: String },
    Witness {
        circuit: String,
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    Prove { circuit: String },
    /// Off-chain check, plus the on-chain one when configured.
    Verify {
        circuit: String,
        /// Check in-process instead of calling the tool.
        #[arg(long)]
        native: bool,
    },
    /// Check through the configured node, or against the exported contract.
    VerifyOnchain { circuit: String },
    ExportVerifier {
        circuit: String,
        #[arg(short, long, value_enum)]
        generator: Option<Generator>,
    },
    Publish {
        circuit: String,
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Serve `POST /verify` for the circuit's verification key.
    Serve {
        circuit: String,
        #[arg(short, long)]
        address: Option<String>,
    },
    Submit {
        circuit: String,
        #[arg(short, long, default_value = "http://127.0.0.1:65432")]
        url: Url,
    },
    /// Every stage in order.
    Run { circuit: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Generator {
    Toolchain,
    Native,
}

impl From<Generator> for VerifierGenerator {
    fn from(g: Generator) -> Self {
        match g {
            Generator::Toolchain => VerifierGenerator::Toolchain,
            Generator::Native => VerifierGenerator::Native,
        }
    }
}

fn load_config(cli: &Cli) -> PipelineResult<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.build_dir {
        config.build_dir = dir.clone();
    }
    Ok(config)
}

fn at(stage: Stage) -> impl FnOnce(PipelineError) -> StageFailure {
    move |e| StageFailure::new(stage, e)
}

fn print_report(report: &PipelineReport) {
    info!("Circuit {} proved and verified", report.circuit);
    info!("Public signals: {:?}", report.public_signals);
    if let Some(onchain) = report.verification.onchain {
        info!("On-chain verification: {}", onchain);
    }
    info!("Verifier contract: {}", report.verifier_contract.display());
    if let Some(dir) = &report.published {
        info!("Published to {}", dir.display());
    }
}

async fn verify(
    config: &PipelineConfig,
    toolchain: &CommandToolchain,
    layout: &ArtifactLayout,
    native: bool,
) -> PipelineResult<()> {
    let offchain = if native {
        stages::verify::offchain_native(layout)?
    } else {
        stages::verify::offchain(toolchain, layout)?
    };
    let onchain = match &config.onchain {
        Some(onchain) => {
            let rpc = RpcVerifier::new(onchain)?;
            Some(stages::verify::onchain(toolchain, layout, &rpc).await?)
        }
        None => None,
    };
    let outcome = stages::verify::reconcile(offchain, onchain)?;
    info!("Proof for {} is valid ({:?})", layout.name(), outcome);
    Ok(())
}

async fn verify_onchain(
    config: &PipelineConfig,
    toolchain: &CommandToolchain,
    layout: &ArtifactLayout,
) -> PipelineResult<()> {
    let ok = match &config.onchain {
        Some(onchain) => {
            let rpc = RpcVerifier::new(onchain)?;
            stages::verify::onchain(toolchain, layout, &rpc).await?
        }
        None => {
            info!("No onchain section configured, evaluating the exported contract locally");
            let contract = ContractVerifier::from_contract(&layout.verifier_contract())?;
            stages::verify::onchain(toolchain, layout, &contract).await?
        }
    };
    if ok {
        info!("Verifier contract accepts the proof for {}", layout.name());
        Ok(())
    } else {
        Err(PipelineError::ProofRejected { path: "on-chain" })
    }
}

async fn submit(layout: &ArtifactLayout, url: Url) -> PipelineResult<()> {
    let client = zkpipe::client::SubmitClient::new(url);
    match client.submit_artifacts(layout).await? {
        VerificationResponse::Valid { public_signals } => {
            info!("Proof is valid! Public signals: {:?}", public_signals);
            Ok(())
        }
        VerificationResponse::Invalid { reason } => {
            info!("Invalid proof: {}", reason);
            Err(PipelineError::ProofRejected { path: "service" })
        }
        VerificationResponse::Error { error } => Err(PipelineError::Service(error)),
    }
}

async fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = load_config(&cli)?;
    let toolchain = CommandToolchain::new(&config.circom_bin, &config.snarkjs_bin);

    match cli.command {
        Commands::Compile { circuit } => {
            let layout = config.layout(&circuit)?;
            stages::compile::run(&toolchain, &layout).map_err(at(Stage::Compile))?;
        }
        Commands::Setup { circuit } => {
            let layout = config.layout(&circuit)?;
            stages::ceremony::run(&toolchain, &layout, &config.ceremony).map_err(at(Stage::Setup))?;
        }
        Commands::Witness { circuit, input } => {
            let layout = config.layout(&circuit)?;
            let input = input.unwrap_or_else(|| config.input_path.clone());
            stages::witness::run(&toolchain, &layout, &input, &config.witness)
                .map_err(at(Stage::Witness))?;
        }
        Commands::Prove { circuit } => {
            let layout = config.layout(&circuit)?;
            let outcome = stages::prove::run(&toolchain, &layout).map_err(at(Stage::Prove))?;
            info!("Public signals: {:?}", outcome.public_signals);
        }
        Commands::Verify { circuit, native } => {
            let layout = config.layout(&circuit)?;
            verify(&config, &toolchain, &layout, native)
                .await
                .map_err(at(Stage::Verify))?;
        }
        Commands::VerifyOnchain { circuit } => {
            let layout = config.layout(&circuit)?;
            verify_onchain(&config, &toolchain, &layout)
                .await
                .map_err(at(Stage::Verify))?;
        }
        Commands::ExportVerifier { circuit, generator } => {
            let layout = config.layout(&circuit)?;
            let mut export = config.export.clone();
            if let Some(g) = generator {
                export.generator = g.into();
            }
            let contract = stages::export::run(&toolchain, &layout, &export).map_err(at(Stage::Export))?;
            info!("Verifier contract written to {}", contract.display());
        }
        Commands::Publish { circuit, to } => {
            let layout = config.layout(&circuit)?;
            let target = to.or_else(|| config.publish_dir.clone()).ok_or_else(|| {
                PipelineError::Usage("no publish directory: pass --to or set publish_dir".to_string())
            })?;
            stages::publish::run(&layout, &target).map_err(at(Stage::Publish))?;
        }
        Commands::Serve { circuit, address } => {
            let layout = config.layout(&circuit)?;
            let address = address.unwrap_or_else(|| config.server.listen_address.clone());
            let server = ServerApp::new(address, &layout.verification_key())?
                .with_valid_proof_handler(|signals| {
                    info!("Accepted proof with public signals {:?}", signals);
                    Ok(())
                })
                .with_invalid_proof_handler(|reason| {
                    info!("Rejected proof: {}", reason);
                    Ok(())
                })
                .with_error_handler(|err| {
                    warn!("Could not verify submitted proof: {}", err);
                    Ok(())
                });
            server.run().await?;
        }
        Commands::Submit { circuit, url } => {
            let layout = config.layout(&circuit)?;
            submit(&layout, url).await?;
        }
        Commands::Run { circuit } => {
            let report = match &config.onchain {
                Some(onchain) => {
                    let rpc = RpcVerifier::new(onchain)?;
                    Pipeline::new(config.clone(), &circuit, toolchain)?
                        .with_onchain(rpc)
                        .run()
                        .await?
                }
                None => Pipeline::new(config.clone(), &circuit, toolchain)?.run().await?,
            };
            print_report(&report);
        }
    }

    Ok(())
}

fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(failure) = e.downcast_ref::<StageFailure>() {
        failure.exit_code()
    } else if let Some(error) = e.downcast_ref::<PipelineError>() {
        error.exit_code()
    } else {
        1
    }
}

fn init_logging() {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(exit_code(&e));
    }
}
