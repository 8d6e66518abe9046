//! Admin API: app credentials, account mappings, storage diagnostics.
//!
//! Every route except `/admin/login` requires a bearer admin-session token.
//! Credential writes carry the plaintext-consent affirmation explicitly: when
//! no cipher key is configured the first attempt is refused with a warning,
//! and only a repeat with `confirm_plaintext=true` persists the secret.

use super::{parse_platform, ApiState, AppError};
use crate::auth::extract_bearer_token;
use crate::platform::Platform;
use crate::vault::{CredentialRecord, MappingEntry, PlaintextConsent, StorageLocation, VaultError};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/admin/login", post(login))
        .route(
            "/admin/:platform/credentials",
            put(put_credentials).delete(delete_credentials),
        )
        .route(
            "/admin/:platform/mappings",
            get(list_mappings).put(put_mapping),
        )
        .route("/admin/:platform/mappings/:email", delete(delete_mapping))
        .route("/admin/:platform/storage/:user", get(storage_location))
        .route("/admin/:platform/migrate/:user", post(migrate_to_keyring))
        .route("/admin/:platform/accounts/:user", get(list_ad_accounts))
}

fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = extract_bearer_token(headers)
        .map_err(|err| AppError::Unauthorized(format!("Invalid token: {}", err)))?;
    state
        .sessions
        .verify(&token)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired admin session".to_string()))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    email: String,
}

/// POST /admin/login
async fn login(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    match &state.admin_email {
        Some(admin) if admin.eq_ignore_ascii_case(&request.email) => {
            let token = state
                .sessions
                .login(&request.email)
                .map_err(|err| AppError::ServerError(err.to_string()))?;
            info!(email = %request.email, "Admin session opened");
            Ok(Json(LoginResponse {
                token,
                email: request.email,
            }))
        }
        Some(_) => Err(AppError::Unauthorized(
            "Not an admin account".to_string(),
        )),
        None => Err(AppError::Unauthorized(
            "Admin access is not configured".to_string(),
        )),
    }
}

#[derive(Deserialize)]
struct CredentialsRequest {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uri: Option<String>,
    /// Affirmation that plaintext storage is acceptable when no cipher key is
    /// configured.
    #[serde(default)]
    confirm_plaintext: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    ok: bool,
    message: String,
}

/// PUT /admin/:platform/credentials
async fn put_credentials(
    State(state): State<Arc<ApiState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    let consent = if request.confirm_plaintext {
        PlaintextConsent::Granted
    } else {
        PlaintextConsent::Withheld
    };
    let record = CredentialRecord {
        client_id: request.client_id,
        client_secret: request.client_secret,
        redirect_uri: request.redirect_uri.unwrap_or_default(),
    };

    match state.vault.store_credential(platform, &record, consent) {
        Ok(()) => Ok(Json(StatusResponse {
            ok: true,
            message: format!("Stored {} app credentials", platform),
        })),
        Err(VaultError::PlaintextRefused) => Err(AppError::BadRequest(
            "No encryption key is configured, so the client secret would be stored in \
             plaintext. Repeat the request with confirm_plaintext=true to accept that."
                .to_string(),
        )),
        Err(err) => Err(AppError::ServerError(err.to_string())),
    }
}

/// DELETE /admin/:platform/credentials
async fn delete_credentials(
    State(state): State<Arc<ApiState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    let removed = state
        .vault
        .delete_credential(platform)
        .map_err(|err| AppError::ServerError(err.to_string()))?;
    Ok(Json(StatusResponse {
        ok: removed,
        message: if removed {
            format!("Removed {} app credentials", platform)
        } else {
            format!("No {} app credentials stored", platform)
        },
    }))
}

#[derive(Serialize)]
struct MappingsResponse {
    platform: Platform,
    mappings: Vec<MappingEntry>,
}

/// GET /admin/:platform/mappings
async fn list_mappings(
    State(state): State<Arc<ApiState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MappingsResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    Ok(Json(MappingsResponse {
        platform,
        mappings: state.vault.list_mappings(platform),
    }))
}

#[derive(Deserialize)]
struct MappingRequest {
    email: String,
    account_id: String,
}

/// PUT /admin/:platform/mappings
async fn put_mapping(
    State(state): State<Arc<ApiState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MappingRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    if request.email.trim().is_empty() || request.account_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Provide both an email and an ad account id".to_string(),
        ));
    }

    state
        .vault
        .set_account_mapping(platform, request.email.trim(), request.account_id.trim())
        .map_err(|err| AppError::ServerError(err.to_string()))?;
    Ok(Json(StatusResponse {
        ok: true,
        message: format!("Mapped {} to {}", request.email.trim(), request.account_id.trim()),
    }))
}

/// DELETE /admin/:platform/mappings/:email
async fn delete_mapping(
    State(state): State<Arc<ApiState>>,
    Path((platform, email)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    let removed = state
        .vault
        .remove_account_mapping(platform, &email)
        .map_err(|err| AppError::ServerError(err.to_string()))?;
    Ok(Json(StatusResponse {
        ok: removed,
        message: if removed {
            format!("Removed mapping for {}", email)
        } else {
            format!("No mapping for {}", email)
        },
    }))
}

#[derive(Serialize)]
struct StorageResponse {
    platform: Platform,
    user: String,
    location: StorageLocation,
}

/// GET /admin/:platform/storage/:user
async fn storage_location(
    State(state): State<Arc<ApiState>>,
    Path((platform, user)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<StorageResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    Ok(Json(StorageResponse {
        platform,
        location: state.vault.locate_token(platform, Some(&user)),
        user,
    }))
}

/// POST /admin/:platform/migrate/:user
async fn migrate_to_keyring(
    State(state): State<Arc<ApiState>>,
    Path((platform, user)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    match state.vault.migrate_to_keyring(platform, Some(&user)) {
        Ok(()) => Ok(Json(StatusResponse {
            ok: true,
            message: format!("Migrated {} token for {} to the OS secret store", platform, user),
        })),
        Err(VaultError::NothingToMigrate) => Err(AppError::BadRequest(
            "No file-stored token to migrate".to_string(),
        )),
        Err(err) => Err(AppError::ServerError(err.to_string())),
    }
}

/// GET /admin/:platform/accounts/:user
///
/// Lists the ad accounts reachable with the user's stored token, for filling
/// in mappings.
async fn list_ad_accounts(
    State(state): State<Arc<ApiState>>,
    Path((platform, user)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;
    let platform = parse_platform(&platform)?;

    let adapter = state
        .orchestrator
        .adapter(platform)
        .ok_or_else(|| AppError::NotFound(format!("No adapter for platform '{}'", platform)))?;
    let token = state
        .vault
        .retrieve_token(platform, Some(&user))
        .ok_or_else(|| {
            AppError::BadRequest(format!("No token stored for {} on {}", user, platform))
        })?;

    let accounts = adapter.list_ad_accounts(&token).await;
    Ok(Json(serde_json::json!({
        "platform": platform,
        "user": user,
        "accounts": accounts,
    })))
}
