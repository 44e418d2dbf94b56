use std::sync::Arc;

use coldreach::config::{EngineConfig, OauthAppCredentials};
use coldreach::dispatch::{self, Dispatcher};
use coldreach::models::Provider;
use coldreach::render::AssetStore;
use coldreach::store::{LibSqlStore, Store};
use coldreach::transport::{GoogleTransport, MicrosoftTransport, TransportRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env();

    eprintln!("📨 coldreach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Uploads:  {}", config.upload_dir.display());
    eprintln!("   Tick:     every {}s", config.poll_interval.as_secs());

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── Transports ───────────────────────────────────────────────────────
    let mut registry = TransportRegistry::new();

    if let Some(credentials) = OauthAppCredentials::from_env(Provider::Google) {
        registry.register(Arc::new(GoogleTransport::new(credentials)));
        eprintln!("   Gmail: enabled");
    }
    if let Some(credentials) = OauthAppCredentials::from_env(Provider::Outlook) {
        registry.register(Arc::new(MicrosoftTransport::new(credentials)));
        eprintln!("   Outlook: enabled");
    }
    if registry.is_empty() {
        eprintln!("   Warning: no providers configured, campaigns will be skipped");
        eprintln!("     export GOOGLE_CLIENT_ID=... GOOGLE_CLIENT_SECRET=...");
        eprintln!("     export MICROSOFT_CLIENT_ID=... MICROSOFT_CLIENT_SECRET=...");
    }
    eprintln!();

    // ── Dispatcher ───────────────────────────────────────────────────────
    let assets = AssetStore::new(&config.upload_dir);
    let poll_interval = config.poll_interval;
    let dispatcher = Arc::new(Dispatcher::new(config, store, Arc::new(registry), assets));
    let handle = dispatch::spawn_dispatcher(dispatcher, poll_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down...");
    handle.abort();

    Ok(())
}
