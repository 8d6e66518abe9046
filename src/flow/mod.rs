//! OAuth exchange orchestration.
//!
//! Drives one authorization flow end to end: build the consent URL (minting a
//! state token when the session has an identity), validate the provider
//! callback, exchange the code through the matching platform adapter, persist
//! the durable token in the vault, and trigger a best-effort spend sync.
//!
//! Flow stages:
//!
//! ```text
//! STARTED -> AWAITING_CALLBACK -> CODE_OR_TOKEN_RECEIVED -> EXCHANGED -> STORED -> SYNCED
//!                     \________________________v________________________/
//!                                           ERRORED
//! ```
//!
//! `STORED` is the success threshold: a sync failure afterwards is advisory
//! and never reverts a stored token.

use crate::adapters::{DateRange, PlatformAdapter};
use crate::export::SpendExporter;
use crate::platform::Platform;
use crate::state_token::{StateTokenCodec, FLOW_STATE_TTL_SECS};
use crate::vault::CredentialVault;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Stages a flow instance moves through. `Errored` absorbs from any step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Started,
    AwaitingCallback,
    CodeOrTokenReceived,
    Exchanged,
    Stored,
    Synced,
    Errored,
}

/// Provider callback parameters. `token` is the development/simulated path;
/// real providers send `code`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackRequest {
    pub platform: Option<String>,
    pub code: Option<String>,
    pub token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Per-request/per-session flags, passed explicitly instead of living in
/// process-wide state.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    /// Identity of the signed-in user starting the flow, if known.
    pub user_email: Option<String>,
    /// A flow has been started and its callback not yet handled.
    pub oauth_in_progress: bool,
}

/// Result of starting a flow.
#[derive(Clone, Debug, Serialize)]
pub struct FlowStart {
    pub stage: FlowStage,
    pub authorization_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// True when the platform is unconfigured and the URL points back at the
    /// callback with a simulated token.
    pub simulated: bool,
}

/// Final report for a handled callback.
#[derive(Clone, Debug, Serialize)]
pub struct FlowOutcome {
    pub stage: FlowStage,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_synced: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
    pub message: String,
}

impl FlowOutcome {
    fn errored(platform: Option<Platform>, message: impl Into<String>) -> Self {
        Self {
            stage: FlowStage::Errored,
            success: false,
            platform,
            user_email: None,
            rows_synced: None,
            synthetic: None,
            message: message.into(),
        }
    }
}

/// Ties codec, adapters, vault, and exporter together for one deployment.
pub struct Orchestrator {
    vault: Arc<CredentialVault>,
    codec: StateTokenCodec,
    exporter: SpendExporter,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    redirect_uri: String,
    allow_state_email_fallback: bool,
}

impl Orchestrator {
    pub fn new(
        vault: Arc<CredentialVault>,
        codec: StateTokenCodec,
        exporter: SpendExporter,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        redirect_uri: String,
        allow_state_email_fallback: bool,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();
        Self {
            vault,
            codec,
            exporter,
            adapters,
            redirect_uri,
            allow_state_email_fallback,
        }
    }

    pub fn adapter(&self, platform: Platform) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform)
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// Start a flow: mint a state token when the session carries an identity
    /// and build the provider consent URL. An unconfigured platform yields a
    /// simulated-consent URL that calls straight back with a fake token, so
    /// development setups complete the loop without provider credentials.
    pub fn start_flow(&self, platform: Platform, session: &mut SessionContext) -> FlowStart {
        let state = session
            .user_email
            .as_deref()
            .map(|email| self.codec.issue(email));
        session.oauth_in_progress = true;

        let adapter = match self.adapter(platform) {
            Some(adapter) => adapter,
            None => {
                return self.simulated_start(platform, state);
            }
        };

        match adapter.authorization_url(&self.redirect_uri, state.as_deref()) {
            Ok(authorization_url) => {
                info!(platform = %platform, "Redirecting to provider consent screen");
                FlowStart {
                    stage: FlowStage::AwaitingCallback,
                    authorization_url,
                    state,
                    simulated: false,
                }
            }
            Err(err) => {
                info!(platform = %platform, reason = %err, "Platform unconfigured, using simulated consent");
                self.simulated_start(platform, state)
            }
        }
    }

    fn simulated_start(&self, platform: Platform, state: Option<String>) -> FlowStart {
        let mut url = format!(
            "{}?platform={}&token=SIMULATED_{}_TOKEN",
            self.redirect_uri,
            platform.key(),
            platform.env_prefix()
        );
        if let Some(state) = &state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }
        FlowStart {
            stage: FlowStage::AwaitingCallback,
            authorization_url: url,
            state,
            simulated: true,
        }
    }

    /// Handle a provider callback and report the final flow outcome. Never
    /// panics; every failure is an `Errored` outcome with a reason.
    pub async fn handle_callback(
        &self,
        request: &CallbackRequest,
        session: &mut SessionContext,
    ) -> FlowOutcome {
        session.oauth_in_progress = false;

        // A provider-reported error short-circuits everything
        if let Some(error) = &request.error {
            warn!(error = %error, "Provider reported an OAuth error");
            return FlowOutcome::errored(None, format!("OAuth error: {}", error));
        }

        let platform = match request.platform.as_deref().map(|p| p.parse::<Platform>()) {
            Some(Ok(platform)) => platform,
            Some(Err(err)) => return FlowOutcome::errored(None, err.to_string()),
            None => return FlowOutcome::errored(None, "Missing platform in callback"),
        };

        let adapter = match self.adapter(platform) {
            Some(adapter) => Arc::clone(adapter),
            None => {
                return FlowOutcome::errored(
                    Some(platform),
                    format!("No adapter registered for platform '{}'", platform),
                )
            }
        };

        // Resolve identity before burning the one-time code
        let user_email = match &request.state {
            Some(state) => match self.codec.verify(state, FLOW_STATE_TTL_SECS) {
                Some(email) => Some(email),
                None if self.allow_state_email_fallback && state.contains('@') => {
                    // Dev-only convenience: a raw email in `state` is accepted
                    // when verification fails. Off unless explicitly enabled.
                    warn!(platform = %platform, "State verification failed; using raw state as email (dev fallback)");
                    Some(state.clone())
                }
                None => {
                    warn!(platform = %platform, "Invalid or expired state token");
                    return FlowOutcome::errored(
                        Some(platform),
                        "Invalid or expired state token",
                    );
                }
            },
            None => session.user_email.clone(),
        };

        // Development/simulated mode supplies a token directly
        let exchanged = if let Some(token) = &request.token {
            info!(platform = %platform, "Using directly supplied token");
            crate::adapters::ExchangedToken::access_only(token.clone())
        } else if let Some(code) = &request.code {
            match adapter.exchange_code(code, &self.redirect_uri).await {
                Ok(exchanged) => exchanged,
                Err(err) => {
                    warn!(platform = %platform, error = %err, "Code exchange failed");
                    return FlowOutcome::errored(
                        Some(platform),
                        format!("Failed to exchange code: {}", err),
                    );
                }
            }
        } else {
            return FlowOutcome::errored(Some(platform), "Missing token or code in callback");
        };

        let token_to_store = exchanged.durable().to_string();

        if let Err(err) = self
            .vault
            .store_token(platform, user_email.as_deref(), &token_to_store)
        {
            warn!(platform = %platform, error = %err, "Token obtained but storage failed");
            return FlowOutcome::errored(
                Some(platform),
                format!("Token obtained but failed to store it: {}", err),
            );
        }

        let mut stage = FlowStage::Stored;
        let mut message = String::from("Token obtained and stored.");
        if let Some(email) = &user_email {
            message.push_str(&format!(" Stored for user: {}.", email));
        }

        // Best-effort sync; failure here never reverts the stored token
        let account = self.vault.account_for(platform, user_email.as_deref());
        let fetch = adapter
            .fetch_spend(
                Some(&token_to_store),
                account.as_deref(),
                &DateRange::last_30_days(),
            )
            .await;

        let mut rows_synced = None;
        let mut synthetic = None;
        match self.exporter.write(&fetch.rows) {
            Ok(count) => {
                if let Err(err) = self.vault.update_last_sync(platform) {
                    warn!(platform = %platform, error = %err, "Failed to record last sync");
                }
                stage = FlowStage::Synced;
                rows_synced = Some(count);
                synthetic = Some(fetch.is_synthetic());
                message.push_str(&format!(" Sync fetched {} rows. {}", count, fetch.message));
            }
            Err(err) => {
                warn!(platform = %platform, error = %err, "Spend export failed after storing token");
                message.push_str(" Sync failed; the stored token is unaffected.");
            }
        }

        info!(
            platform = %platform,
            user = user_email.as_deref().unwrap_or("default"),
            stage = ?stage,
            "OAuth flow completed"
        );
        FlowOutcome {
            stage,
            success: true,
            platform: Some(platform),
            user_email,
            rows_synced,
            synthetic,
            message,
        }
    }
}
