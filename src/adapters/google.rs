//! Google Ads adapter.
//!
//! The code exchange is a single form POST. Google may issue a refresh token
//! alongside the access token; the refresh token is the durable value and is
//! what gets persisted when present.
//!
//! Spend queries go through the official Ads API client, which is not always
//! deployed. That dependency is modeled as an injected [`GoogleAdsStrategy`]:
//! when no strategy is wired in, spend fetching degrades to the synthetic
//! dataset.

use super::{
    AdAccount, AppCredentials, DateRange, ExchangeError, ExchangedToken, PlatformAdapter,
    SpendFetch, SpendRow,
};
use crate::platform::Platform;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_BASE_URL: &str = "https://oauth2.googleapis.com";
const SCOPE: &str = "https://www.googleapis.com/auth/adwords";

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Pluggable Google Ads query backend.
///
/// Implementations wrap whatever Ads API client the deployment ships;
/// `customer_id` is the Google Ads customer id the spend should come from.
#[async_trait]
pub trait GoogleAdsStrategy: Send + Sync {
    async fn query_spend(
        &self,
        refresh_token: &str,
        customer_id: &str,
        range: &DateRange,
    ) -> anyhow::Result<Vec<SpendRow>>;

    async fn list_accounts(&self, _refresh_token: &str) -> Vec<AdAccount> {
        Vec::new()
    }
}

#[derive(Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct GoogleAdapter {
    creds: AppCredentials,
    http: reqwest::Client,
    token_base: String,
    ads: Option<Arc<dyn GoogleAdsStrategy>>,
}

impl GoogleAdapter {
    pub fn new(creds: AppCredentials) -> Self {
        Self::with_base_url(creds, TOKEN_BASE_URL.to_string())
    }

    /// Create an adapter with a custom token endpoint base URL (for testing
    /// with a mock server).
    pub fn with_base_url(creds: AppCredentials, token_base: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("spendsync/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            creds,
            http,
            token_base,
            ads: None,
        }
    }

    /// Wire in an Ads API query backend.
    pub fn with_ads_strategy(mut self, strategy: Arc<dyn GoogleAdsStrategy>) -> Self {
        self.ads = Some(strategy);
        self
    }
}

#[async_trait]
impl PlatformAdapter for GoogleAdapter {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let client_id = self
            .creds
            .client_id
            .as_deref()
            .ok_or_else(|| ExchangeError::NotConfigured("Google client id missing".into()))?;

        // access_type=offline asks for a refresh token on first consent
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline",
            AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE)
        );
        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedToken, ExchangeError> {
        let (client_id, client_secret) = self.creds.pair().ok_or_else(|| {
            ExchangeError::NotConfigured(
                "Google OAuth credentials not configured. Set the Google client id and secret."
                    .into(),
            )
        })?;

        debug!("Exchanging Google authorization code");
        let url = format!("{}/token", self.token_base);
        let response = self
            .http
            .post(&url)
            .timeout(EXCHANGE_TIMEOUT)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(format!("Failed to exchange code: {}", e)))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ExchangeError::Provider(format!(
                "Failed to exchange code: {}",
                body
            )));
        }

        let payload: TokenPayload = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transport(format!("Bad token response: {}", e)))?;
        let access_token = payload
            .access_token
            .ok_or_else(|| ExchangeError::Provider("No access_token returned by provider".into()))?;

        debug!(
            has_refresh_token = payload.refresh_token.is_some(),
            "Google exchange successful"
        );
        Ok(ExchangedToken {
            access_token,
            refresh_token: payload.refresh_token,
        })
    }

    async fn fetch_spend(
        &self,
        token: Option<&str>,
        account_id: Option<&str>,
        range: &DateRange,
    ) -> SpendFetch {
        match (token, account_id, &self.ads) {
            (Some(token), Some(customer_id), Some(ads)) => {
                match ads.query_spend(token, customer_id, range).await {
                    Ok(rows) if !rows.is_empty() => {
                        let message = format!("Fetched {} rows from Google Ads API", rows.len());
                        return SpendFetch::from_api(rows, message);
                    }
                    Ok(_) => warn!("Google Ads API returned no data, using synthetic data"),
                    Err(err) => {
                        warn!(error = %err, "Google spend fetch failed, using synthetic data")
                    }
                }
            }
            (_, _, None) => {
                debug!("No Google Ads API client configured, using synthetic data")
            }
            _ => debug!("No Google token or customer ID, using synthetic data"),
        }

        let message = if self.ads.is_none() {
            "Using synthetic Google Ads data (Ads API client not configured)"
        } else {
            "Using synthetic Google Ads data (no token or customer ID)"
        };
        SpendFetch::synthetic(
            vec![
                SpendRow::new("g_campA", 500.0, Platform::Google, "2025-01-01"),
                SpendRow::new("g_campB", 250.0, Platform::Google, "2025-01-02"),
            ],
            message,
        )
    }

    async fn list_ad_accounts(&self, token: &str) -> Vec<AdAccount> {
        match &self.ads {
            Some(ads) => ads.list_accounts(token).await,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn creds() -> AppCredentials {
        AppCredentials::new("google-client", "google-secret")
    }

    struct StubAds {
        rows: Vec<SpendRow>,
        fail: bool,
    }

    #[async_trait]
    impl GoogleAdsStrategy for StubAds {
        async fn query_spend(
            &self,
            _refresh_token: &str,
            _customer_id: &str,
            _range: &DateRange,
        ) -> anyhow::Result<Vec<SpendRow>> {
            if self.fail {
                return Err(anyhow!("quota exceeded"));
            }
            Ok(self.rows.clone())
        }
    }

    #[test]
    fn test_authorization_url() {
        let adapter = GoogleAdapter::new(creds());
        let url = adapter
            .authorization_url("http://localhost:8888/oauth/callback", Some("st"))
            .unwrap();

        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fadwords"));
        assert!(url.contains("state=st"));
    }

    #[tokio::test]
    async fn test_exchange_surfaces_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "at-1", "refresh_token": "rt-1"}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url(creds(), server.url());
        let token = adapter
            .exchange_code("code-1", "http://localhost/callback")
            .await
            .unwrap();

        assert_eq!(token.access_token, "at-1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
        // The refresh token is the durable value to persist
        assert_eq!(token.durable(), "rt-1");
    }

    #[tokio::test]
    async fn test_exchange_without_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "at-only"}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url(creds(), server.url());
        let token = adapter
            .exchange_code("code-1", "http://localhost/callback")
            .await
            .unwrap();

        assert_eq!(token.durable(), "at-only");
    }

    #[tokio::test]
    async fn test_exchange_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url(creds(), server.url());
        let result = adapter
            .exchange_code("expired", "http://localhost/callback")
            .await;

        match result {
            Err(ExchangeError::Provider(msg)) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_exchange_and_fetch_never_panic() {
        let adapter = GoogleAdapter::new(AppCredentials::default());

        let result = adapter.exchange_code("X", "http://localhost/callback").await;
        assert!(matches!(result, Err(ExchangeError::NotConfigured(_))));

        let fetch = adapter
            .fetch_spend(None, None, &DateRange::last_30_days())
            .await;
        assert!(fetch.is_synthetic());
        assert_eq!(fetch.rows[0].campaign_id, "g_campA");
        assert_eq!(fetch.rows[0].ad_spend, 500.0);
        assert!(fetch.message.contains("synthetic"));
    }

    #[tokio::test]
    async fn test_fetch_spend_with_injected_strategy() {
        let rows = vec![SpendRow::new("g1", 42.0, Platform::Google, "2025-06-01")];
        let adapter = GoogleAdapter::new(creds())
            .with_ads_strategy(Arc::new(StubAds { rows, fail: false }));

        let fetch = adapter
            .fetch_spend(Some("rt"), Some("123-456-7890"), &DateRange::last_30_days())
            .await;

        assert!(!fetch.is_synthetic());
        assert_eq!(fetch.rows.len(), 1);
        assert_eq!(fetch.rows[0].campaign_id, "g1");
    }

    #[tokio::test]
    async fn test_fetch_spend_strategy_failure_degrades() {
        let adapter = GoogleAdapter::new(creds()).with_ads_strategy(Arc::new(StubAds {
            rows: Vec::new(),
            fail: true,
        }));

        let fetch = adapter
            .fetch_spend(Some("rt"), Some("123-456-7890"), &DateRange::last_30_days())
            .await;

        assert!(fetch.is_synthetic());
        assert_eq!(fetch.rows.len(), 2);
    }
}
