//! The on-chain verification path.
//!
//! [`RpcVerifier`] makes a read-only `eth_call` of `verifyProof` against a
//! deployed contract. [`ContractVerifier`] evaluates the constants of an
//! exported contract in-process, for runs without a chain client.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info};
use num_bigint::BigUint;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha3::{Digest, Keccak256};
use url::Url;

use crate::calldata::SolidityCalldata;
use crate::config::OnChainConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::native::NativeVerifier;
use crate::solidity::parse_contract_constants;

#[allow(async_fn_in_trait)]
pub trait OnChainVerifier {
    /// The contract's boolean answer for `calldata`.
    async fn verify_calldata(&self, calldata: &SolidityCalldata) -> PipelineResult<bool>;
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn verify_proof_signature(n_public: usize) -> String {
    format!(
        "verifyProof(uint256[2],uint256[2][2],uint256[2],uint256[{}])",
        n_public
    )
}

/// ABI encoding of a `verifyProof` call. Every argument is a static array,
/// so the payload is the selector followed by the words in order.
pub fn encode_verify_call(calldata: &SolidityCalldata) -> PipelineResult<Vec<u8>> {
    let mut out = function_selector(&verify_proof_signature(calldata.input.len())).to_vec();
    for (position, value) in calldata.positions() {
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Err(PipelineError::OnChain(format!(
                "{} does not fit in a uint256",
                position
            )));
        }
        out.extend(std::iter::repeat(0u8).take(32 - bytes.len()));
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

/// Decodes an ABI `bool` return value.
pub fn decode_bool(result: &str) -> PipelineResult<bool> {
    let digits = result.trim_start_matches("0x");
    if digits.is_empty() {
        return Err(PipelineError::OnChain(
            "empty return data, is the contract deployed at this address?".to_string(),
        ));
    }
    let bytes = hex::decode(digits)
        .map_err(|e| PipelineError::OnChain(format!("return data is not hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(PipelineError::OnChain(format!(
            "expected a 32-byte bool, got {} bytes",
            bytes.len()
        )));
    }
    match BigUint::from_bytes_be(&bytes).to_u32_digits().as_slice() {
        [] => Ok(false),
        [1] => Ok(true),
        _ => Err(PipelineError::OnChain(format!("return value 0x{} is not a bool", digits))),
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Calls a deployed verifier through a JSON-RPC endpoint.
pub struct RpcVerifier {
    client: Client,
    rpc_url: Url,
    contract_address: String,
}

impl RpcVerifier {
    pub fn new(config: &OnChainConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::OnChain(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            contract_address: config.contract_address.clone(),
        })
    }
}

impl OnChainVerifier for RpcVerifier {
    async fn verify_calldata(&self, calldata: &SolidityCalldata) -> PipelineResult<bool> {
        let data = format!("0x{}", hex::encode(encode_verify_call(calldata)?));
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.contract_address, "data": data }, "latest"],
        });
        debug!("eth_call {} at {}", self.contract_address, self.rpc_url);
        let start = Instant::now();

        let response = self
            .client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::OnChain(e.to_string()))?;
        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::OnChain(format!("unreadable RPC response: {}", e)))?;
        debug!("eth_call answered in {:?}", start.elapsed());

        if let Some(error) = response.error {
            return Err(PipelineError::OnChain(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }
        let result = response
            .result
            .ok_or_else(|| PipelineError::OnChain("RPC response has no result".to_string()))?;
        let accepted = decode_bool(&result)?;
        info!("Verifier contract returned {}", accepted);
        Ok(accepted)
    }
}

/// Evaluates an exported verifier contract's embedded key natively.
pub struct ContractVerifier {
    verifier: NativeVerifier,
}

impl ContractVerifier {
    pub fn from_source(source: &str) -> Result<Self, String> {
        let vk = parse_contract_constants(source)?;
        Ok(Self {
            verifier: NativeVerifier::new(&vk)?,
        })
    }

    pub fn from_contract(path: &Path) -> PipelineResult<Self> {
        crate::artifacts::require("verifier contract", path)?;
        let source = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_source(&source)
            .map_err(|reason| PipelineError::format("verifier contract", path, reason))
    }
}

impl OnChainVerifier for ContractVerifier {
    async fn verify_calldata(&self, calldata: &SolidityCalldata) -> PipelineResult<bool> {
        let (proof, public) = calldata.to_proof();
        self.verifier.verify(&public, &proof)
    }
}
