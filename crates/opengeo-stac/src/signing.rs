//! Asset URL signers.

use std::time::Duration;

use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::ports::RequestSigner;
use serde::Deserialize;

use crate::client::{http_client, runtime, send_with_retry};

/// Planetary Computer SAS sign endpoint
pub const PC_SIGN_ENDPOINT: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

#[derive(Debug, Deserialize)]
struct SignResponse {
    href: String,
}

/// Signs asset hrefs via the Planetary Computer `/api/sas/v1/sign` endpoint
pub struct PlanetaryComputerSigner {
    endpoint: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    max_retries: u32,
}

impl PlanetaryComputerSigner {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self> {
        Ok(Self {
            endpoint: PC_SIGN_ENDPOINT.to_string(),
            client: http_client(timeout)?,
            runtime: runtime()?,
            max_retries,
        })
    }

    /// Use a different sign endpoint (mirrors, test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn sign_url(&self, href: &str) -> Result<reqwest::Url> {
        reqwest::Url::parse_with_params(&self.endpoint, &[("href", href)]).map_err(|e| {
            OpengeoError::ConfigInvalid {
                key: "sign_endpoint".to_string(),
                reason: format!("Invalid sign endpoint {}: {}", self.endpoint, e),
            }
        })
    }
}

/// Only remote blob URLs need a token
fn needs_token(href: &str) -> bool {
    (href.starts_with("https://") || href.starts_with("http://")) && !is_signed(href)
}

fn is_signed(href: &str) -> bool {
    href.contains("sig=") && href.contains("se=")
}

impl RequestSigner for PlanetaryComputerSigner {
    fn sign(&self, href: &str) -> Result<String> {
        if !needs_token(href) {
            return Ok(href.to_string());
        }

        let url = self.sign_url(href)?;
        let url_str = url.to_string();

        self.runtime.block_on(async {
            let response =
                send_with_retry(&url_str, self.max_retries, || self.client.get(url.clone()))
                    .await?
                    .ok_or_else(|| OpengeoError::UpstreamUnavailable {
                        url: url_str.clone(),
                        reason: "sign endpoint not found (HTTP 404)".to_string(),
                    })?;

            let body: SignResponse =
                response.json().await.map_err(|e| OpengeoError::UpstreamUnavailable {
                    url: url_str.clone(),
                    reason: format!("PC sign response missing 'href' field: {}", e),
                })?;
            Ok(body.href)
        })
    }
}

/// Appends a fixed query-string token (for example a pre-issued SAS token)
#[derive(Debug, Clone)]
pub struct TokenSigner {
    token: String,
}

impl TokenSigner {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into().trim_start_matches(|c: char| c == '?' || c == '&').to_string() }
    }
}

impl RequestSigner for TokenSigner {
    fn sign(&self, href: &str) -> Result<String> {
        if !needs_token(href) {
            return Ok(href.to_string());
        }
        let sep = if href.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", href, sep, self.token))
    }
}
