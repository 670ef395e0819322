//! Remote data-service client and wire models.
//!
//! The remote service is consumed as a black box through the `GrantService`
//! trait; `ApiClient` is the HTTP implementation. The view layer never talks
//! to the network directly.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::export::ExportPayload;
use crate::filter_state::FilterState;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("delivery rejected: {0}")]
    Delivery(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Issuing channel of a single grant record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantSource {
    Regione,
    Stato,
    Europa,
    Fondazioni,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSource::Regione => "regione",
            GrantSource::Stato => "stato",
            GrantSource::Europa => "europa",
            GrantSource::Fondazioni => "fondazioni",
        }
    }
}

/// One grant record as returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSummary {
    pub id: String,
    pub title: String,
    pub entity: String,
    pub source: GrantSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_match: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub records: Vec<GrantSummary>,
    pub total_count: usize,
    pub page: u32,
    pub page_size: u32,
}

/// Aggregate counts used to annotate the view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_active: u64,
    pub total_amount: u64,
    pub closing_soon: u64,
    pub new_this_month: u64,
}

/// What the export endpoint resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Raw artifact bytes for a local download
    Payload(Vec<u8>),
    /// The service accepted delivery to the requested email address
    DeliveryAccepted,
}

/// The remote data service, as seen by the discovery view.
///
/// Timeouts and retries are this layer's responsibility; callers treat "no
/// response" as an eventual failure and never retry on their own.
#[async_trait]
pub trait GrantService: Send + Sync {
    async fn search(&self, filters: &FilterState) -> Result<SearchResponse, ServiceError>;

    async fn get_stats(&self) -> Result<StatsSummary, ServiceError>;

    async fn export(&self, request: &ExportPayload) -> Result<ExportOutcome, ServiceError>;

    async fn save(&self, id: &str) -> Result<(), ServiceError>;

    async fn unsave(&self, id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Deserialize)]
struct DeliveryReceipt {
    accepted: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            // Prefer the structured error message when the body carries one
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|err| err.message)
                .unwrap_or(body);
            Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl GrantService for ApiClient {
    async fn search(&self, filters: &FilterState) -> Result<SearchResponse, ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/bandi/search", self.base_url))
            .json(filters)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let result: SearchResponse = response.json().await?;
        Ok(result)
    }

    async fn get_stats(&self) -> Result<StatsSummary, ServiceError> {
        let response = self
            .client
            .get(format!("{}/api/bandi/stats", self.base_url))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let stats: StatsSummary = response.json().await?;
        Ok(stats)
    }

    async fn export(&self, request: &ExportPayload) -> Result<ExportOutcome, ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/bandi/export", self.base_url))
            .json(request)
            .send()
            .await?;

        let response = Self::check_status(response).await?;

        if request.delivery_email.is_some() {
            let receipt: DeliveryReceipt = response.json().await?;
            if receipt.accepted {
                Ok(ExportOutcome::DeliveryAccepted)
            } else {
                Err(ServiceError::Delivery(
                    receipt.message.unwrap_or_else(|| "delivery refused".to_string()),
                ))
            }
        } else {
            let bytes = response.bytes().await?;
            Ok(ExportOutcome::Payload(bytes.to_vec()))
        }
    }

    async fn save(&self, id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/bandi/{}/save", self.base_url, id))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn unsave(&self, id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/bandi/{}/unsave", self.base_url, id))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
