use crate::domain::error::DomainError;
use crate::domain::gateway::PointGateway;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Serialize)]
struct CreatePointRequest<'a> {
    number: i64,
    comment: &'a str,
}

/// Point service client over HTTP. One attempt per call, bounded by `timeout`.
#[derive(Clone)]
pub struct HttpPointGateway {
    base_url: String,
    client: Client,
}

impl HttpPointGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PointGateway for HttpPointGateway {
    #[instrument(skip(self, token), fields(base_url = %self.base_url))]
    async fn create_point(&self, amount: i64, comment: &str, token: &str) -> Result<()> {
        let url = format!("{}/points", self.base_url);
        debug!(url = %url, "Sending point award request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&CreatePointRequest {
                number: amount,
                comment,
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Point service unreachable");
                DomainError::Upstream(format!("point service unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Point service rejected request");
            return Err(DomainError::Upstream(format!(
                "point service responded with {}",
                status
            ))
            .into());
        }

        info!(amount = amount, "Points awarded");
        Ok(())
    }
}
