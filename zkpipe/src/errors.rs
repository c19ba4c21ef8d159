//! Error types for the pipeline.
//!
//! Every stage fails fast with a [`PipelineError`] and the orchestrator wraps
//! the first one it sees in a [`StageFailure`] naming the stage. Each error
//! category maps to its own process exit code so operators can tell a
//! missing artifact from a tool crash or a verification disagreement.

use std::path::PathBuf;

use thiserror::Error;

use crate::stages::Stage;

/// The main error type for every pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A command-line argument is missing or invalid.
    #[error("usage error: {0}")]
    Usage(String),

    /// An upstream artifact is absent: a stage was skipped or failed silently.
    #[error("missing {artifact} at {}", path.display())]
    ArtifactMissing {
        /// Human readable artifact kind.
        artifact: &'static str,
        /// Where the artifact was expected.
        path: PathBuf,
    },

    /// An external tool could not be started at all.
    #[error("failed to start `{tool}`: {source}")]
    ToolSpawn {
        /// Program name.
        tool: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited non-zero. The message is the tool's own output.
    #[error("`{tool}` exited with {}: {diagnostic}", display_status(*status))]
    ExternalTool {
        /// Program name plus subcommand.
        tool: String,
        /// Exit status, `None` when killed by a signal.
        status: Option<i32>,
        /// Captured stderr/stdout of the tool.
        diagnostic: String,
    },

    /// Witness/circuit or key/circuit sizes do not line up.
    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which quantity disagreed.
        what: String,
        /// Value derived from the reference artifact.
        expected: u64,
        /// Value found in the artifact under test.
        actual: u64,
    },

    /// Off-chain and on-chain checks returned different answers.
    #[error("verification paths disagree: off-chain={offchain}, on-chain={onchain}")]
    VerificationDisagreement {
        /// Result of the off-chain pairing check.
        offchain: bool,
        /// Result of the verifier contract call.
        onchain: bool,
    },

    /// The proof did not verify.
    #[error("proof rejected by the {path} verifier")]
    ProofRejected {
        /// Which verification path rejected it.
        path: &'static str,
    },

    /// The input assignment cannot be fed to the witness program.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    /// A ceremony step was run out of order or on an unusable artifact.
    #[error("ceremony chain broken: {0}")]
    CeremonyChain(String),

    /// An artifact no longer matches the digest recorded when it was bound.
    #[error("stale {artifact}: recorded digest {expected}, found {actual}")]
    StaleArtifact {
        /// Artifact kind.
        artifact: &'static str,
        /// Digest recorded in the ceremony manifest.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },

    /// The tool's calldata string disagrees with the native decomposition.
    #[error("calldata mismatch at {position}: tool={tool}, native={native}")]
    CalldataMismatch {
        /// Positional name of the first differing element (e.g. `b[0][1]`).
        position: String,
        /// Value the tool produced.
        tool: String,
        /// Value the native transform produced.
        native: String,
    },

    /// The exported contract embeds different constants than the verification key.
    #[error("verifier contract does not match verification key: {0}")]
    VerificationKeyMismatch(String),

    /// An artifact exists but does not decode.
    #[error("malformed {artifact} at {}: {reason}", path.display())]
    Format {
        /// Artifact kind.
        artifact: &'static str,
        /// File that failed to decode.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The on-chain call could not be completed.
    #[error("on-chain call failed: {0}")]
    OnChain(String),

    /// The verification service could not be reached or answered garbage.
    #[error("verification service request failed: {0}")]
    Service(String),

    /// Filesystem error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while validating an input assignment.
#[derive(Debug, Error)]
pub enum InputError {
    /// The assignment names a signal the circuit does not declare as input.
    #[error("unknown input signal `{0}`")]
    UnknownSignal(String),

    /// A declared input signal has no value.
    #[error("missing value for input signal `{0}`")]
    MissingSignal(String),

    /// Array input with the wrong number of elements.
    #[error("signal `{signal}` expects {expected} values, got {actual}")]
    Shape {
        /// Signal base name.
        signal: String,
        /// Declared element count.
        expected: usize,
        /// Elements supplied.
        actual: usize,
    },

    /// Value is not below the field modulus.
    #[error("value {value} of signal `{signal}` is outside the scalar field")]
    OutOfField {
        /// Signal base name.
        signal: String,
        /// Offending decimal value.
        value: String,
    },

    /// Value is not a non-negative integer.
    #[error("signal `{signal}`: {reason}")]
    Malformed {
        /// Signal base name.
        signal: String,
        /// What was wrong.
        reason: String,
    },

    /// The evaluator reported an unsatisfied constraint.
    #[error("constraint violated during witness evaluation: {0}")]
    ConstraintViolated(String),
}

/// A [`PipelineError`] tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {error}")]
pub struct StageFailure {
    /// The failing stage.
    pub stage: Stage,
    /// Its first error, unmodified.
    #[source]
    pub error: PipelineError,
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Process exit code for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Usage(_) => 2,
            PipelineError::ArtifactMissing { .. } => 3,
            PipelineError::ToolSpawn { .. } | PipelineError::ExternalTool { .. } => 4,
            PipelineError::DimensionMismatch { .. } => 5,
            PipelineError::VerificationDisagreement { .. } => 6,
            PipelineError::ProofRejected { .. } => 7,
            PipelineError::InvalidInput(_) => 8,
            PipelineError::CeremonyChain(_) | PipelineError::StaleArtifact { .. } => 9,
            PipelineError::CalldataMismatch { .. } | PipelineError::VerificationKeyMismatch(_) => 10,
            PipelineError::OnChain(_) => 11,
            PipelineError::Service(_) => 12,
            PipelineError::Format { .. } | PipelineError::Io { .. } | PipelineError::Json { .. } => 1,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(
        artifact: &'static str,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::Format {
            artifact,
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        PipelineError::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

impl StageFailure {
    /// Wraps `error` as a failure of `stage`.
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }

    /// Exit code of the wrapped error.
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

fn display_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}
