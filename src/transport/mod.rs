//! Provider transports — OAuth token refresh and message delivery behind a
//! uniform interface, looked up by the account's provider.

pub mod google;
pub mod microsoft;

pub use google::GoogleTransport;
pub use microsoft::MicrosoftTransport;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::OauthAppCredentials;
use crate::error::TransportError;
use crate::models::{Account, Provider};
use crate::render::EmailAttachment;

/// A fresh access/refresh token pair returned by an OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A fully rendered message ready for a provider API.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Provider-specific delivery.
///
/// The dispatcher never branches on provider identity: it resolves the
/// transport from the registry and calls these methods.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which provider this transport serves.
    fn provider(&self) -> Provider;

    /// Refresh the account's OAuth tokens ahead of a send.
    ///
    /// `Ok(Some(pair))` means the caller must persist the pair and send with
    /// it. `Ok(None)` means the stored tokens should be used as-is. `Err`
    /// aborts the send for this lead.
    async fn refresh_credentials(
        &self,
        account: &Account,
    ) -> Result<Option<TokenPair>, TransportError>;

    /// Deliver one message from the account's mailbox.
    async fn send(&self, account: &Account, email: &OutgoingEmail) -> Result<(), TransportError>;
}

/// Lookup table from provider to transport.
pub struct TransportRegistry {
    transports: HashMap<Provider, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Register a transport under the provider it reports.
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        let provider = transport.provider();
        self.transports.insert(provider, transport);
        tracing::debug!(provider = %provider, "Registered transport");
    }

    /// Get the transport for a provider.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn Transport>> {
        self.transports.get(&provider).cloned()
    }

    /// Providers with a registered transport.
    pub fn providers(&self) -> Vec<Provider> {
        self.transports.keys().copied().collect()
    }

    /// Check whether any transport is registered.
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire shape of an OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// POST a `refresh_token` grant and return the new pair.
///
/// Providers that rotate refresh tokens return a replacement; those that
/// don't get the old token carried forward so the stored pair stays whole.
pub(crate) async fn refresh_token_request(
    client: &reqwest::Client,
    provider: Provider,
    endpoint: &str,
    credentials: &OauthAppCredentials,
    refresh_token: &str,
) -> Result<TokenPair, TransportError> {
    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.expose_secret()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let response = client
        .post(endpoint)
        .form(&params)
        .send()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(TransportError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::RefreshFailed {
            provider: provider.to_string(),
            reason: format!("{status}: {body}"),
        });
    }

    let tokens: TokenResponse =
        response
            .json()
            .await
            .map_err(|e| TransportError::RefreshFailed {
                provider: provider.to_string(),
                reason: format!("invalid token response: {e}"),
            })?;

    Ok(TokenPair {
        access_token: tokens.access_token,
        refresh_token: tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string()),
    })
}
