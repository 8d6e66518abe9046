//! Platform adapters: consent URLs, code exchange, spend fetch.
//!
//! One adapter per ad platform, all behind [`PlatformAdapter`]. The exchange
//! contracts differ per provider (Meta's two-step upgrade, Google's form
//! POST, TikTok's enveloped status codes) but every adapter reports failures
//! as typed [`ExchangeError`] values and degrades spend fetching to a small
//! deterministic synthetic dataset instead of failing.

pub mod google;
pub mod meta;
pub mod tiktok;

pub use google::{GoogleAdapter, GoogleAdsStrategy};
pub use meta::MetaAdapter;
pub use tiktok::TikTokAdapter;

use crate::platform::Platform;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// App registration an adapter authenticates with. Fields are optional
/// because an unconfigured platform is a supported (degraded) state.
#[derive(Clone, Debug, Default)]
pub struct AppCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AppCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
        }
    }

    /// Both halves of the registration, or `None` if either is missing.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }
}

/// Result of a successful code exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl ExchangedToken {
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    /// The value worth persisting: the refresh token when the provider issued
    /// one (it outlives the access token), otherwise the access token.
    pub fn durable(&self) -> &str {
        self.refresh_token.as_deref().unwrap_or(&self.access_token)
    }
}

/// Typed code-exchange failures. None of these propagate as panics; the
/// orchestrator converts them into an errored flow outcome.
#[derive(Debug)]
pub enum ExchangeError {
    /// Client id/secret missing from configuration.
    NotConfigured(String),
    /// The provider answered but refused the exchange; carries the provider's
    /// message where one was available.
    Provider(String),
    /// The request never completed (connection error, timeout, bad payload).
    Transport(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::NotConfigured(msg) => write!(f, "not configured: {}", msg),
            ExchangeError::Provider(msg) => write!(f, "provider error: {}", msg),
            ExchangeError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// One normalized spend row, the schema the dashboard consumes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpendRow {
    pub campaign_id: String,
    pub ad_spend: f64,
    pub platform: String,
    pub date: String,
}

impl SpendRow {
    pub fn new(campaign_id: &str, ad_spend: f64, platform: Platform, date: &str) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            ad_spend,
            platform: platform.label().to_string(),
            date: date.to_string(),
        }
    }
}

/// Whether rows came from the provider or the synthetic fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Api,
    Synthetic,
}

/// Spend fetch result. Always a result set: provider/config failures select
/// the synthetic dataset, and `source`/`message` tell the caller which
/// happened.
#[derive(Clone, Debug, Serialize)]
pub struct SpendFetch {
    pub rows: Vec<SpendRow>,
    pub source: DataSource,
    pub message: String,
}

impl SpendFetch {
    pub fn from_api(rows: Vec<SpendRow>, message: impl Into<String>) -> Self {
        Self {
            rows,
            source: DataSource::Api,
            message: message.into(),
        }
    }

    pub fn synthetic(rows: Vec<SpendRow>, message: impl Into<String>) -> Self {
        Self {
            rows,
            source: DataSource::Synthetic,
            message: message.into(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Inclusive date range for spend queries, formatted `YYYY-MM-DD`.
#[derive(Clone, Debug)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn last_30_days() -> Self {
        let end = Utc::now().date_naive();
        Self {
            start: end - Duration::days(30),
            end,
        }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// An ad account reachable with a user's token, for admin mapping setup.
#[derive(Clone, Debug, Serialize)]
pub struct AdAccount {
    pub id: String,
    pub name: String,
    pub account_id: String,
}

/// Capability set every platform implements.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Build the provider's consent-screen URL. An opaque `state` value is
    /// passed through unmodified. Fails only when the platform has no client
    /// id configured.
    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String, ExchangeError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedToken, ExchangeError>;

    /// Fetch normalized spend rows. Never fails: missing credentials, a
    /// missing account id, or any provider failure selects the synthetic
    /// dataset with an explanatory message.
    async fn fetch_spend(
        &self,
        token: Option<&str>,
        account_id: Option<&str>,
        range: &DateRange,
    ) -> SpendFetch;

    /// List ad accounts reachable with `token`. Failures yield an empty list.
    async fn list_ad_accounts(&self, _token: &str) -> Vec<AdAccount> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_token_prefers_refresh() {
        let with_refresh = ExchangedToken {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
        };
        assert_eq!(with_refresh.durable(), "rt");

        let access_only = ExchangedToken::access_only("at");
        assert_eq!(access_only.durable(), "at");
    }

    #[test]
    fn test_date_range_formatting() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        };
        assert_eq!(range.start_str(), "2025-01-01");
        assert_eq!(range.end_str(), "2025-01-31");
    }

    #[test]
    fn test_last_30_days_window() {
        let range = DateRange::last_30_days();
        assert_eq!(range.end - range.start, Duration::days(30));
    }

    #[test]
    fn test_missing_credentials_pair() {
        let creds = AppCredentials {
            client_id: Some("id".to_string()),
            client_secret: None,
        };
        assert!(creds.pair().is_none());
        assert!(AppCredentials::default().pair().is_none());
        assert_eq!(
            AppCredentials::new("id", "secret").pair(),
            Some(("id", "secret"))
        );
    }
}
