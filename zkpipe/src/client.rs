use std::time::Instant;

use log::{debug, info};
use reqwest::Client;
use url::Url;

use crate::artifacts::{read_json, ArtifactLayout};
use crate::errors::{PipelineError, PipelineResult};
use crate::proof::ProofJson;
use crate::response::{VerificationRequest, VerificationResponse, VERIFY_PATH};

/// Submits a build's proof pair to a running verification service.
pub struct SubmitClient {
    server_url: Url,
    client: Client,
}

impl SubmitClient {
    pub fn new(server_url: Url) -> Self {
        debug!("Creating new SubmitClient for {}", server_url);
        Self {
            server_url,
            client: Client::new(),
        }
    }

    /// Reads `proof.json` and `public.json` of the circuit.
    pub fn load_request(layout: &ArtifactLayout) -> PipelineResult<VerificationRequest> {
        let proof: ProofJson = read_json("proof", &layout.proof())?;
        let public_signals: Vec<String> = read_json("public signals", &layout.public())?;
        Ok(VerificationRequest {
            proof,
            public_signals,
        })
    }

    pub async fn submit(&self, request: &VerificationRequest) -> PipelineResult<VerificationResponse> {
        let url = self
            .server_url
            .join(VERIFY_PATH)
            .map_err(|e| PipelineError::Usage(format!("bad server url: {}", e)))?;
        debug!("Sending proof to server at {}", url);
        let start = Instant::now();

        let resp = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::Service(e.to_string()))?;
        let response = resp
            .json::<VerificationResponse>()
            .await
            .map_err(|e| PipelineError::Service(format!("unreadable response: {}", e)))?;
        info!("Received {:?} in {:?}", response, start.elapsed());
        Ok(response)
    }

    pub async fn submit_artifacts(&self, layout: &ArtifactLayout) -> PipelineResult<VerificationResponse> {
        let request = Self::load_request(layout)?;
        self.submit(&request).await
    }
}
