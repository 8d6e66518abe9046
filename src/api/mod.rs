//! HTTP surface for the OAuth flow and admin operations.
//!
//! Flow endpoints:
//! 1. GET /oauth/:platform/start → redirect to the provider consent screen
//!    (or return the simulated-consent URL for unconfigured platforms)
//! 2. Provider redirects to GET /oauth/callback with a code (or a simulated
//!    token) and the opaque state value
//! 3. The orchestrator exchanges, stores, syncs, and the outcome is returned
//!    as JSON
//!
//! Admin endpoints live in [`admin`], behind bearer admin-session tokens.

pub mod admin;

use crate::auth::extract_bearer_token;
use crate::flow::{CallbackRequest, Orchestrator, SessionContext};
use crate::platform::Platform;
use crate::session::AdminSession;
use crate::vault::CredentialVault;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for API endpoints
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the API
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub vault: Arc<CredentialVault>,
    pub sessions: Arc<AdminSession>,
    /// Email allowed to open an admin session; `None` disables admin login.
    pub admin_email: Option<String>,
}

/// Create the API router. The frontend runs on a different origin, so CORS
/// stays permissive like the original deployment.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/oauth/:platform/start", get(oauth_start))
        .route("/oauth/callback", get(oauth_callback))
        .merge(admin::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}

fn parse_platform(name: &str) -> Result<Platform, AppError> {
    name.parse()
        .map_err(|err: crate::platform::UnknownPlatform| AppError::NotFound(err.to_string()))
}

/// GET /oauth/:platform/start
///
/// Starts an OAuth flow. A bearer admin-session token, when present, binds
/// the flow to that identity via a signed state token. Configured platforms
/// get a redirect to the real consent screen; unconfigured ones get the
/// simulated-consent URL back as JSON so a dev client can "grant" explicitly.
async fn oauth_start(
    State(state): State<Arc<ApiState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;
    debug!(platform = %platform, "OAuth start requested");

    let user_email = extract_bearer_token(&headers)
        .ok()
        .and_then(|token| state.sessions.verify(&token));

    let mut session = SessionContext {
        user_email,
        ..Default::default()
    };
    let start = state.orchestrator.start_flow(platform, &mut session);

    if start.simulated {
        Ok(Json(start).into_response())
    } else {
        Ok(Redirect::temporary(&start.authorization_url).into_response())
    }
}

/// GET /oauth/callback
///
/// Provider callback. The outcome JSON reports the final flow stage, the
/// resolved identity, and the row count of the post-connect sync.
async fn oauth_callback(
    State(state): State<Arc<ApiState>>,
    Query(request): Query<CallbackRequest>,
) -> Response {
    debug!(platform = ?request.platform, "OAuth callback received");

    let mut session = SessionContext::default();
    let outcome = state
        .orchestrator
        .handle_callback(&request, &mut session)
        .await;

    if !outcome.success {
        warn!(message = %outcome.message, "OAuth flow failed");
        return (StatusCode::BAD_REQUEST, Json(outcome)).into_response();
    }
    (StatusCode::OK, Json(outcome)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_query_deserialization() {
        // Success case
        let query = "platform=meta&code=auth_code_123&state=opaque_state";
        let callback: CallbackRequest = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.platform.as_deref(), Some("meta"));
        assert_eq!(callback.code.as_deref(), Some("auth_code_123"));
        assert_eq!(callback.state.as_deref(), Some("opaque_state"));
        assert_eq!(callback.error, None);

        // Provider error case
        let query = "platform=google&error=access_denied";
        let callback: CallbackRequest = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.error.as_deref(), Some("access_denied"));
        assert_eq!(callback.code, None);

        // Simulated-token case
        let query = "platform=tiktok&token=SIMULATED_TIKTOK_TOKEN";
        let callback: CallbackRequest = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.token.as_deref(), Some("SIMULATED_TIKTOK_TOKEN"));
    }

    #[test]
    fn test_parse_platform_not_found() {
        assert!(parse_platform("meta").is_ok());
        assert!(matches!(
            parse_platform("shopify"),
            Err(AppError::NotFound(_))
        ));
    }
}
