//! Meta (Facebook) Marketing API adapter.
//!
//! Meta's exchange is two-step: the authorization code buys a short-lived
//! token, which a second call upgrades to a long-lived one. A failed upgrade
//! keeps the short-lived token instead of failing the flow.

use super::{
    AdAccount, AppCredentials, DateRange, ExchangeError, ExchangedToken, PlatformAdapter,
    SpendFetch, SpendRow,
};
use crate::platform::Platform;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v17.0";
const DIALOG_URL: &str = "https://www.facebook.com/v17.0/dialog/oauth";
const SCOPES: &str = "ads_read,ads_management";

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct InsightsPayload {
    #[serde(default)]
    data: Vec<InsightRecord>,
}

/// Insights rows carry `spend` as a decimal string and report date ranges.
#[derive(Deserialize)]
struct InsightRecord {
    campaign_id: Option<String>,
    campaign_name: Option<String>,
    spend: Option<String>,
    date_start: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct AccountsPayload {
    #[serde(default)]
    data: Vec<AccountRecord>,
}

#[derive(Deserialize)]
struct AccountRecord {
    id: Option<String>,
    name: Option<String>,
    account_id: Option<String>,
}

pub struct MetaAdapter {
    creds: AppCredentials,
    http: reqwest::Client,
    graph_base: String,
}

impl MetaAdapter {
    pub fn new(creds: AppCredentials) -> Self {
        Self::with_base_url(creds, GRAPH_BASE_URL.to_string())
    }

    /// Create an adapter with a custom Graph API base URL (for testing with a
    /// mock server).
    pub fn with_base_url(creds: AppCredentials, graph_base: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("spendsync/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            creds,
            http,
            graph_base,
        }
    }

    async fn upgrade_to_long_lived(
        &self,
        client_id: &str,
        client_secret: &str,
        short_lived: &str,
    ) -> Result<String, ExchangeError> {
        let url = format!("{}/oauth/access_token", self.graph_base);
        let response = self
            .http
            .get(&url)
            .timeout(EXCHANGE_TIMEOUT)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("fb_exchange_token", short_lived),
            ])
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(format!("Long-lived exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ExchangeError::Provider(format!(
                "Long-lived exchange rejected: {}",
                body
            )));
        }

        let payload: TokenPayload = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transport(format!("Bad long-lived response: {}", e)))?;
        payload
            .access_token
            .ok_or_else(|| ExchangeError::Provider("No long-lived access_token returned".into()))
    }

    async fn fetch_insights(&self, token: &str, account_id: &str) -> Result<Vec<SpendRow>> {
        let url = format!("{}/act_{}/insights", self.graph_base, account_id);
        let response = self
            .http
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .query(&[
                ("access_token", token),
                ("fields", "campaign_id,spend,date_start,date_stop"),
                ("level", "campaign"),
                ("time_increment", "1"),
            ])
            .send()
            .await
            .context("Failed to reach Meta insights endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Meta API error: {} - {}", status, body));
        }

        let payload: InsightsPayload = response
            .json()
            .await
            .context("Failed to parse Meta insights response")?;

        let rows = payload
            .data
            .into_iter()
            .map(|rec| {
                let campaign = rec
                    .campaign_id
                    .or(rec.campaign_name)
                    .unwrap_or_default();
                let spend = rec
                    .spend
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let date = rec.date_start.or(rec.date).unwrap_or_default();
                SpendRow::new(&campaign, spend, Platform::Meta, &date)
            })
            .collect();
        Ok(rows)
    }
}

#[async_trait]
impl PlatformAdapter for MetaAdapter {
    fn platform(&self) -> Platform {
        Platform::Meta
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
            .ok_or_else(|| ExchangeError::NotConfigured("Meta client id missing".into()))?;

        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}",
            DIALOG_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPES)
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
        let (client_id, client_secret) = self
            .creds
            .pair()
            .ok_or_else(|| ExchangeError::NotConfigured("Meta client id/secret missing".into()))?;

        debug!("Exchanging Meta authorization code for short-lived token");
        let url = format!("{}/oauth/access_token", self.graph_base);
        let response = self
            .http
            .get(&url)
            .timeout(EXCHANGE_TIMEOUT)
            .query(&[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("client_secret", client_secret),
                ("code", code),
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
        let short_lived = payload
            .access_token
            .ok_or_else(|| ExchangeError::Provider("No access_token returned by provider".into()))?;

        // Upgrade failure falls back to the short-lived token rather than
        // failing the whole flow.
        match self
            .upgrade_to_long_lived(client_id, client_secret, &short_lived)
            .await
        {
            Ok(long_lived) => Ok(ExchangedToken::access_only(long_lived)),
            Err(err) => {
                warn!(error = %err, "Long-lived upgrade failed, keeping short-lived token");
                Ok(ExchangedToken::access_only(short_lived))
            }
        }
    }

    async fn fetch_spend(
        &self,
        token: Option<&str>,
        account_id: Option<&str>,
        _range: &DateRange,
    ) -> SpendFetch {
        if let (Some(token), Some(account)) = (token, account_id) {
            match self.fetch_insights(token, account).await {
                Ok(rows) if !rows.is_empty() => {
                    let message = format!("Fetched {} rows from Meta Marketing API", rows.len());
                    return SpendFetch::from_api(rows, message);
                }
                Ok(_) => warn!("Meta API returned no data, using synthetic data"),
                Err(err) => warn!(error = %err, "Meta spend fetch failed, using synthetic data"),
            }
        }

        SpendFetch::synthetic(
            vec![
                SpendRow::new("campA", 120.0, Platform::Meta, "2025-01-01"),
                SpendRow::new("campB", 90.0, Platform::Meta, "2025-01-02"),
            ],
            "Using synthetic Meta Ads data (no token or ad account)",
        )
    }

    async fn list_ad_accounts(&self, token: &str) -> Vec<AdAccount> {
        let url = format!("{}/me/adaccounts", self.graph_base);
        let response = match self
            .http
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .query(&[("access_token", token), ("fields", "id,name,account_id")])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "Meta ad-account listing failed");
                return Vec::new();
            }
            Err(err) => {
                warn!(error = %err, "Meta ad-account listing failed");
                return Vec::new();
            }
        };

        match response.json::<AccountsPayload>().await {
            Ok(payload) => payload
                .data
                .into_iter()
                .map(|acc| AdAccount {
                    id: acc.id.unwrap_or_default(),
                    name: acc.name.unwrap_or_else(|| "Unnamed Account".to_string()),
                    account_id: acc
                        .account_id
                        .unwrap_or_default()
                        .trim_start_matches("act_")
                        .to_string(),
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "Failed to parse Meta ad-account response");
                Vec::new()
            }
        }
    }
}
