//! TikTok Ads adapter.
//!
//! TikTok signals success through an embedded envelope code (`0` = success)
//! layered over the transport status; both layers are checked on every call.
//! The exchange takes the app id/secret pair and `auth_code` as JSON.

use super::{
    AdAccount, AppCredentials, DateRange, ExchangeError, ExchangedToken, PlatformAdapter,
    SpendFetch, SpendRow,
};
use crate::platform::Platform;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub const API_BASE_URL: &str = "https://business-api.tiktok.com/open_api/v1.3";
const AUTH_URL: &str = "https://ads.tiktok.com/marketing_api/auth";

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Envelope every TikTok Business API response arrives in.
#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_code")]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

fn default_code() -> i64 {
    -1
}

#[derive(Deserialize, Default)]
struct TokenData {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReportData {
    #[serde(default)]
    list: Vec<ReportRecord>,
}

#[derive(Deserialize)]
struct ReportRecord {
    #[serde(default)]
    dimensions: ReportDimensions,
    #[serde(default)]
    metrics: ReportMetrics,
}

#[derive(Deserialize, Default)]
struct ReportDimensions {
    campaign_id: Option<serde_json::Value>,
    stat_time_day: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReportMetrics {
    spend: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct AdvertiserData {
    #[serde(default)]
    list: Vec<AdvertiserRecord>,
}

#[derive(Deserialize)]
struct AdvertiserRecord {
    advertiser_id: Option<serde_json::Value>,
    advertiser_name: Option<String>,
}

pub struct TikTokAdapter {
    creds: AppCredentials,
    http: reqwest::Client,
    api_base: String,
}

impl TikTokAdapter {
    pub fn new(creds: AppCredentials) -> Self {
        Self::with_base_url(creds, API_BASE_URL.to_string())
    }

    /// Create an adapter with a custom Business API base URL (for testing
    /// with a mock server).
    pub fn with_base_url(creds: AppCredentials, api_base: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("spendsync/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            creds,
            http,
            api_base,
        }
    }

    async fn fetch_report(
        &self,
        token: &str,
        advertiser_id: &str,
        range: &DateRange,
    ) -> Result<Vec<SpendRow>> {
        let url = format!("{}/report/integrated/get/", self.api_base);
        let payload = json!({
            "advertiser_id": advertiser_id,
            "report_type": "BASIC",
            "data_level": "AUCTION_CAMPAIGN",
            "dimensions": ["campaign_id", "stat_time_day"],
            "metrics": ["spend"],
            "start_date": range.start_str(),
            "end_date": range.end_str(),
            "page": 1,
            "page_size": 1000,
        });

        let response = self
            .http
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .header("Access-Token", token)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach TikTok report endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("TikTok API error: {} - {}", status, body));
        }

        let envelope: Envelope<ReportData> = response
            .json()
            .await
            .context("Failed to parse TikTok report response")?;
        if envelope.code != 0 {
            return Err(anyhow!(
                "TikTok API error: code {} - {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            ));
        }

        let rows = envelope
            .data
            .unwrap_or_default()
            .list
            .into_iter()
            .map(|rec| {
                let campaign = rec
                    .dimensions
                    .campaign_id
                    .map(value_to_string)
                    .unwrap_or_default();
                let date = rec.dimensions.stat_time_day.unwrap_or_default();
                let spend = rec
                    .metrics
                    .spend
                    .map(value_to_f64)
                    .unwrap_or(0.0);
                SpendRow::new(&campaign, spend, Platform::TikTok, &date)
            })
            .collect();
        Ok(rows)
    }
}

/// TikTok is inconsistent about numeric fields arriving as numbers or
/// strings; normalize both.
fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn value_to_f64(value: serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let app_id = self
            .creds
            .client_id
            .as_deref()
            .ok_or_else(|| ExchangeError::NotConfigured("TikTok app id missing".into()))?;

        let mut url = format!(
            "{}?app_id={}&redirect_uri={}",
            AUTH_URL,
            urlencoding::encode(app_id),
            urlencoding::encode(redirect_uri)
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
        _redirect_uri: &str,
    ) -> Result<ExchangedToken, ExchangeError> {
        let (app_id, secret) = self.creds.pair().ok_or_else(|| {
            ExchangeError::NotConfigured("TikTok app id/secret not configured".into())
        })?;

        debug!("Exchanging TikTok auth code");
        let url = format!("{}/oauth2/access_token/", self.api_base);
        let response = self
            .http
            .post(&url)
            .timeout(EXCHANGE_TIMEOUT)
            .json(&json!({
                "app_id": app_id,
                "secret": secret,
                "auth_code": code,
                "grant_type": "authorization_code",
            }))
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

        // Transport success is not enough; the envelope carries the verdict
        let envelope: Envelope<TokenData> = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transport(format!("Bad token response: {}", e)))?;
        if envelope.code != 0 {
            return Err(ExchangeError::Provider(format!(
                "TikTok API error: code {} - {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }

        let data = envelope.data.unwrap_or_default();
        let access_token = data
            .access_token
            .ok_or_else(|| ExchangeError::Provider("No access_token returned by provider".into()))?;
        Ok(ExchangedToken {
            access_token,
            refresh_token: data.refresh_token,
        })
    }

    async fn fetch_spend(
        &self,
        token: Option<&str>,
        account_id: Option<&str>,
        range: &DateRange,
    ) -> SpendFetch {
        if let (Some(token), Some(advertiser)) = (token, account_id) {
            match self.fetch_report(token, advertiser, range).await {
                Ok(rows) if !rows.is_empty() => {
                    let message = format!("Fetched {} rows from TikTok Marketing API", rows.len());
                    return SpendFetch::from_api(rows, message);
                }
                Ok(_) => warn!("TikTok API returned no data, using synthetic data"),
                Err(err) => warn!(error = %err, "TikTok spend fetch failed, using synthetic data"),
            }
        }

        SpendFetch::synthetic(
            vec![
                SpendRow::new("t_campA", 400.0, Platform::TikTok, "2025-01-01"),
                SpendRow::new("t_campB", 180.0, Platform::TikTok, "2025-01-02"),
            ],
            "Using synthetic TikTok Ads data (no token or advertiser ID)",
        )
    }

    async fn list_ad_accounts(&self, token: &str) -> Vec<AdAccount> {
        let url = format!("{}/oauth2/advertiser/get/", self.api_base);
        let response = match self
            .http
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .header("Access-Token", token)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "TikTok advertiser listing failed");
                return Vec::new();
            }
            Err(err) => {
                warn!(error = %err, "TikTok advertiser listing failed");
                return Vec::new();
            }
        };

        let envelope: Envelope<AdvertiserData> = match response.json().await {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "Failed to parse TikTok advertiser response");
                return Vec::new();
            }
        };
        if envelope.code != 0 {
            warn!(code = envelope.code, "TikTok advertiser listing rejected");
            return Vec::new();
        }

        envelope
            .data
            .unwrap_or_default()
            .list
            .into_iter()
            .map(|adv| {
                let id = adv.advertiser_id.map(value_to_string).unwrap_or_default();
                AdAccount {
                    id: id.clone(),
                    name: adv
                        .advertiser_name
                        .unwrap_or_else(|| "Unnamed Account".to_string()),
                    account_id: id,
                }
            })
            .collect()
    }
}
