use anyhow::{Context, Result};
use spendsync::adapters::{GoogleAdapter, MetaAdapter, PlatformAdapter, TikTokAdapter};
use spendsync::api::{create_router, ApiState};
use spendsync::cipher::SecretCipher;
use spendsync::config::{self, AppConfig};
use spendsync::export::SpendExporter;
use spendsync::flow::Orchestrator;
use spendsync::platform::Platform;
use spendsync::session::AdminSession;
use spendsync::state_token::StateTokenCodec;
use spendsync::vault::{CredentialVault, KeyringStore};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spendsync=info".into()),
        )
        .init();

    let app_config = AppConfig::from_env();
    info!(data_dir = %app_config.data_dir.display(), "spendsync starting");

    let cipher = SecretCipher::from_key(config::encryption_key().as_deref())
        .context("SPENDSYNC_ENCRYPTION_KEY is invalid")?;
    if !cipher.available() {
        warn!("No encryption key configured; encrypted-file token storage is disabled");
    }

    let codec = StateTokenCodec::new(config::signing_key().as_deref());
    if !codec.signed() {
        warn!("No signing key configured; state tokens are unsigned (dev mode)");
    }

    let vault = Arc::new(CredentialVault::new(
        &app_config.data_dir,
        cipher,
        Box::new(KeyringStore::new("spendsync")),
    ));

    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(MetaAdapter::new(config::platform_credentials(
            Platform::Meta,
        ))),
        Arc::new(GoogleAdapter::new(config::platform_credentials(
            Platform::Google,
        ))),
        Arc::new(TikTokAdapter::new(config::platform_credentials(
            Platform::TikTok,
        ))),
    ];

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&vault),
        codec.clone(),
        SpendExporter::new(&app_config.data_dir),
        adapters,
        app_config.redirect_uri.clone(),
        app_config.allow_state_email_fallback,
    ));

    let sessions = Arc::new(AdminSession::new(&app_config.data_dir, codec));

    let app = create_router(ApiState {
        orchestrator,
        vault,
        sessions,
        admin_email: app_config.admin_email.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", app_config.bind_addr))?;
    info!(addr = %app_config.bind_addr, "Listening");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
