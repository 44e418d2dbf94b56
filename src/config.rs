//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::models::Provider;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory uploaded images and attachments are read from.
    pub upload_dir: PathBuf,
    /// How often the dispatcher wakes up to look for due leads.
    pub poll_interval: Duration,
    /// Maximum leads processed per campaign per tick.
    pub lead_batch_size: usize,
    /// Public base URL used to build unsubscribe links.
    pub public_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("dispatch.db"),
            upload_dir: PathBuf::from("uploads"),
            poll_interval: Duration::from_secs(10),
            lead_batch_size: 10,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("COLDREACH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("dispatch.db"));

        let upload_dir = std::env::var("COLDREACH_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        let poll_interval_secs: u64 = std::env::var("COLDREACH_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let lead_batch_size: usize = std::env::var("COLDREACH_LEAD_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let public_base_url = std::env::var("COLDREACH_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        Self {
            db_path,
            upload_dir,
            poll_interval: Duration::from_secs(poll_interval_secs),
            lead_batch_size,
            public_base_url,
        }
    }
}

/// OAuth app credentials for one provider, read from the environment.
#[derive(Debug, Clone)]
pub struct OauthAppCredentials {
    /// OAuth client ID registered with the provider.
    pub client_id: String,
    /// OAuth client secret registered with the provider.
    pub client_secret: secrecy::SecretString,
}

impl OauthAppCredentials {
    /// Load credentials for a provider. Returns None when the client ID or
    /// secret is not configured, in which case the transport stays unregistered.
    pub fn from_env(provider: Provider) -> Option<Self> {
        let (id_var, secret_var) = match provider {
            Provider::Google => ("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            Provider::Outlook => ("MICROSOFT_CLIENT_ID", "MICROSOFT_CLIENT_SECRET"),
        };

        let client_id = std::env::var(id_var).ok()?;
        let client_secret = std::env::var(secret_var).ok()?;

        Some(Self {
            client_id,
            client_secret: secrecy::SecretString::from(client_secret),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.db_path, PathBuf::from("dispatch.db"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.lead_batch_size, 10);
        assert_eq!(config.public_base_url, "http://localhost:8080");
    }

    #[test]
    fn credentials_from_env_returns_none_when_unset() {
        // Clear the vars if they're set (test isolation)
        // SAFETY: This test runs in isolation; no other thread reads these vars concurrently.
        unsafe {
            std::env::remove_var("GOOGLE_CLIENT_ID");
            std::env::remove_var("GOOGLE_CLIENT_SECRET");
        }
        assert!(OauthAppCredentials::from_env(Provider::Google).is_none());
    }
}
