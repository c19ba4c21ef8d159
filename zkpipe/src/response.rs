use serde::{Deserialize, Serialize};

use crate::proof::ProofJson;

pub const VERIFY_PATH: &str = "/verify";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub proof: ProofJson,
    #[serde(rename = "publicSignals")]
    pub public_signals: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationResponse {
    Valid {
        #[serde(rename = "publicSignals")]
        public_signals: Vec<String>,
    },
    Invalid {
        reason: String,
    },
    Error {
        error: String,
    },
}
