//! One module per pipeline stage. Each stage reads its inputs from the
//! circuit's [`ArtifactLayout`](crate::artifacts::ArtifactLayout), checks
//! them, and writes its outputs atomically.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod ceremony;
pub mod compile;
pub mod export;
pub mod prove;
pub mod publish;
pub mod verify;
pub mod witness;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Setup,
    Witness,
    Prove,
    Verify,
    Export,
    Publish,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Setup => "setup",
            Stage::Witness => "witness",
            Stage::Prove => "prove",
            Stage::Verify => "verify",
            Stage::Export => "export",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
