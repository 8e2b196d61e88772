//! Credential minting with a local fallback.
//!
//! Minting is a capability interface with two implementations: a remote
//! service caller and a local placeholder generator. The [`MintPolicy`]
//! selects between them, so the fallback path is ordinary code under test,
//! not exception-driven control flow. A lost mint is reconcilable later; a
//! lost pass is not, which is why the policy never lets a minting outage
//! fail a settlement.

use crate::config::MintingConfig;
use crate::error::{Error, Result};
use crate::model::Level;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A minted credential token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedToken {
    /// Unique token identifier.
    pub token_id: String,
    /// Metadata location.
    pub metadata_uri: String,
}

/// Mints a credential for a passing result.
#[async_trait]
pub trait CertificateMinter: Send + Sync {
    /// Mint a token for `wallet` certifying `topic` at `level` with `score`.
    async fn mint(&self, wallet: &str, topic: &str, level: Level, score: u32)
        -> Result<MintedToken>;
}

/// Remote minting service client.
pub struct HttpMinter {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MintRequest<'a> {
    wallet_address: &'a str,
    topic: &'a str,
    level: Level,
    score: u32,
}

impl HttpMinter {
    /// Create a client for the configured minting service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String, config: &MintingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("skillcert-node/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Dependency(format!("failed to build minting client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CertificateMinter for HttpMinter {
    async fn mint(
        &self,
        wallet: &str,
        topic: &str,
        level: Level,
        score: u32,
    ) -> Result<MintedToken> {
        let response = self
            .client
            .post(&self.url)
            .json(&MintRequest {
                wallet_address: wallet,
                topic,
                level,
                score,
            })
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("minting request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Dependency(format!(
                "minting service returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Dependency(format!("failed to parse minting response: {e}")))
    }
}

/// Locally generated stand-in token for when the minting service is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderMinter;

impl PlaceholderMinter {
    /// Generate a placeholder token. Infallible; the identifier is unique
    /// and visibly not a real mint.
    #[must_use]
    pub fn generate(&self) -> MintedToken {
        MintedToken {
            token_id: format!("MOCK-{}", &Uuid::new_v4().simple().to_string()[..8]),
            metadata_uri: format!("https://arweave.net/{}", Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl CertificateMinter for PlaceholderMinter {
    async fn mint(
        &self,
        _wallet: &str,
        _topic: &str,
        _level: Level,
        _score: u32,
    ) -> Result<MintedToken> {
        Ok(self.generate())
    }
}

/// Outcome of a mint attempt under the fallback policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    /// The token to record on the certificate.
    pub token: MintedToken,
    /// True when the primary minter failed and a placeholder was issued.
    pub degraded: bool,
}

/// Fallback policy: try the primary minter, substitute a placeholder on
/// failure. With no primary configured, placeholders are issued directly.
pub struct MintPolicy {
    primary: Option<Arc<dyn CertificateMinter>>,
    fallback: PlaceholderMinter,
}

impl MintPolicy {
    /// Policy with a primary minter and the placeholder fallback.
    #[must_use]
    pub fn with_primary(primary: Arc<dyn CertificateMinter>) -> Self {
        Self {
            primary: Some(primary),
            fallback: PlaceholderMinter,
        }
    }

    /// Placeholder-only policy, for deployments without a minting service.
    #[must_use]
    pub fn placeholder_only() -> Self {
        Self {
            primary: None,
            fallback: PlaceholderMinter,
        }
    }

    /// Mint a token, degrading to a placeholder instead of failing.
    pub async fn mint(&self, wallet: &str, topic: &str, level: Level, score: u32) -> MintOutcome {
        if let Some(ref primary) = self.primary {
            match primary.mint(wallet, topic, level, score).await {
                Ok(token) => {
                    debug!("minted token {} for {wallet}", token.token_id);
                    return MintOutcome {
                        token,
                        degraded: false,
                    };
                }
                Err(e) => {
                    warn!("minting degraded for {wallet} ({topic}): {e}; issuing placeholder");
                }
            }
        }
        MintOutcome {
            token: self.fallback.generate(),
            degraded: self.primary.is_some(),
        }
    }
}
