//! Source verification against an Etherscan-style explorer API.
//!
//! Verification is advisory: the deployer records and logs failures but
//! never aborts because of them.

use std::time::Duration;

use crowdledger_core::Address;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ExplorerConfig;

pub const STATUS_OK: &str = "1";
pub const STATUS_ERROR: &str = "0";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerificationRequest {
    #[serde(default)]
    pub apikey: Option<String>,
    #[serde(rename = "contractaddress")]
    pub contract_address: Address,
    #[serde(rename = "contractname")]
    pub contract_name: String,
    #[serde(rename = "codehash")]
    pub code_hash: String,
    #[serde(rename = "constructorArguments", default)]
    pub constructor_arguments: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExplorerResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

impl ExplorerResponse {
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            message: "OK".to_string(),
            result: result.into(),
        }
    }

    pub fn error(result: impl Into<Value>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: "NOTOK".to_string(),
            result: result.into(),
        }
    }

    fn mentions_already_verified(&self) -> bool {
        let text = match &self.result {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        text.contains("already verified")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("explorer unreachable: {0}")]
    Http(String),
    #[error("explorer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("explorer rejected verification: {0}")]
    Rejected(String),
    #[error("invalid explorer response: {0}")]
    Decode(String),
}

pub trait Verifier {
    fn verify(&self, request: &VerificationRequest) -> Result<VerifyOutcome, VerifyError>;
}

/// Interpret an explorer reply.
pub fn interpret(response: &ExplorerResponse) -> Result<VerifyOutcome, VerifyError> {
    if response.mentions_already_verified() {
        return Ok(VerifyOutcome::AlreadyVerified);
    }
    if response.status == STATUS_OK {
        return Ok(VerifyOutcome::Verified);
    }
    let detail = match &response.result {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Null => response.message.clone(),
        other => other.to_string(),
    };
    Err(VerifyError::Rejected(detail))
}

pub struct ExplorerVerifier {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    browser_url: Option<String>,
}

impl ExplorerVerifier {
    pub fn new(config: &ExplorerConfig) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VerifyError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            browser_url: config.browser_url.clone(),
        })
    }

    /// Explorer page for `address`, when a browser url is configured.
    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.browser_url
            .as_ref()
            .map(|base| format!("{}/address/{address}#code", base.trim_end_matches('/')))
    }
}

impl Verifier for ExplorerVerifier {
    fn verify(&self, request: &VerificationRequest) -> Result<VerifyOutcome, VerifyError> {
        let mut body = request.clone();
        if body.apikey.is_none() {
            body.apikey = self.api_key.clone();
        }
        debug!(url = %self.api_url, contract = %body.contract_name, "submitting verification");

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("module", "contract"), ("action", "verifysourcecode")])
            .json(&body)
            .send()
            .map_err(|e| VerifyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VerifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let reply: ExplorerResponse = response
            .json()
            .map_err(|e| VerifyError::Decode(e.to_string()))?;
        let outcome = interpret(&reply)?;
        if let Some(url) = self.address_url(&request.contract_address) {
            debug!(%url, "verified source");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_is_verified() {
        assert_eq!(
            interpret(&ExplorerResponse::ok("guid-1")).unwrap(),
            VerifyOutcome::Verified
        );
    }

    #[test]
    fn already_verified_counts_as_success() {
        let reply = ExplorerResponse::error("Contract source code already verified");
        assert_eq!(interpret(&reply).unwrap(), VerifyOutcome::AlreadyVerified);
    }

    #[test]
    fn rejection_carries_detail() {
        let err = interpret(&ExplorerResponse::error("code hash differs")).unwrap_err();
        assert!(matches!(err, VerifyError::Rejected(msg) if msg == "code hash differs"));
    }

    #[test]
    fn request_uses_explorer_field_names() {
        let req = VerificationRequest {
            apikey: None,
            contract_address: Address::ZERO,
            contract_name: "GasLot".into(),
            code_hash: "0x00".into(),
            constructor_arguments: serde_json::json!({ "governor": Address::ZERO }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contractname"], "GasLot");
        assert!(json.get("constructorArguments").is_some());
        assert!(json.get("contractaddress").is_some());
    }

    #[test]
    fn address_url_joins_browser_base() {
        let verifier = ExplorerVerifier::new(&ExplorerConfig {
            api_url: "http://127.0.0.1:1/api".into(),
            browser_url: Some("https://explorer.example/".into()),
            api_key: None,
        })
        .unwrap();
        let url = verifier.address_url(&Address::ZERO).unwrap();
        assert!(url.starts_with("https://explorer.example/address/0x"));
        assert!(url.ends_with("#code"));
    }
}
