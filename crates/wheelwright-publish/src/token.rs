//! Trusted-identity token exchange.
//!
//! The runner's ambient OIDC token is traded for a short-lived upload token
//! scoped to the package index. No long-lived credential is stored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use wheelwright_core::ports::{IdentityToken, IdentityTokenSource, PublishToken, TokenExchange};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ProviderError> for wheelwright_core::Error {
    fn from(err: ProviderError) -> Self {
        wheelwright_core::Error::TokenExchange(err.to_string())
    }
}

/// Identity token handed to the process through an environment variable.
pub struct EnvIdentityToken {
    variable: String,
}

impl EnvIdentityToken {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl IdentityTokenSource for EnvIdentityToken {
    async fn fetch(&self, _audience: &str) -> wheelwright_core::Result<IdentityToken> {
        match std::env::var(&self.variable) {
            Ok(value) if !value.trim().is_empty() => Ok(IdentityToken::new(value.trim())),
            _ => Err(ProviderError::InvalidConfig(format!("{} is not set", self.variable)).into()),
        }
    }
}

/// Requests an audience-bound token from a CI identity endpoint
/// (`ACTIONS_ID_TOKEN_REQUEST_URL` / `ACTIONS_ID_TOKEN_REQUEST_TOKEN`).
pub struct ActionsIdentityToken {
    request_url: String,
    request_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    value: String,
}

impl ActionsIdentityToken {
    pub fn new(request_url: impl Into<String>, request_token: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            request_token: request_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `None` when the job was not granted an identity token.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL").ok()?;
        let token = std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN").ok()?;
        Some(Self::new(url, token))
    }
}

#[async_trait]
impl IdentityTokenSource for ActionsIdentityToken {
    async fn fetch(&self, audience: &str) -> wheelwright_core::Result<IdentityToken> {
        debug!(audience, "Requesting identity token");
        let response = self
            .client
            .get(&self.request_url)
            .query(&[("audience", audience)])
            .bearer_auth(&self.request_token)
            .send()
            .await
            .map_err(ProviderError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::TokenExchange(format!(
                "identity endpoint returned {}: {}",
                status, body
            ))
            .into());
        }

        let body: IdentityResponse = response.json().await.map_err(ProviderError::from)?;
        Ok(IdentityToken::new(body.value))
    }
}

/// Exchanges an identity token at the index's `mint-token` endpoint.
pub struct MintTokenExchange {
    mint_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MintRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct MintError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<MintErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct MintErrorDetail {
    code: String,
    description: String,
}

impl MintTokenExchange {
    pub fn new(mint_url: impl Into<String>) -> Self {
        Self {
            mint_url: mint_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn describe(body: &str) -> String {
        match serde_json::from_str::<MintError>(body) {
            Ok(err) if !err.errors.is_empty() => err
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.description))
                .collect::<Vec<_>>()
                .join("; "),
            Ok(MintError {
                message: Some(message),
                ..
            }) => message,
            _ => body.to_string(),
        }
    }
}

#[async_trait]
impl TokenExchange for MintTokenExchange {
    async fn exchange(&self, identity: &IdentityToken) -> wheelwright_core::Result<PublishToken> {
        debug!(url = %self.mint_url, "Exchanging identity token for upload token");
        let response = self
            .client
            .post(&self.mint_url)
            .json(&MintRequest {
                token: identity.expose(),
            })
            .send()
            .await
            .map_err(ProviderError::from)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::TokenExchange(Self::describe(&body)).into());
        }

        let body: MintResponse = response.json().await.map_err(ProviderError::from)?;
        Ok(PublishToken::new(body.token))
    }
}
