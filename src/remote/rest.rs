//! PostgREST-style batch insert (`POST {url}/rest/v1/{table}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument};

use super::row::RemoteRow;
use super::{RemoteBackend, RemoteError};
use crate::config::RemoteConfig;
use crate::record::SensorRecord;

/// Longest response body kept in a [`RemoteError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

pub struct RestBackend {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RestBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let timeout = Duration::from_secs(config.upload_timeout_secs);

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key).map_err(|e| RemoteError::Request(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| RemoteError::Request(e.to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", config.url.trim_end_matches('/'), config.table),
            timeout,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    #[instrument(skip_all, fields(count = records.len()))]
    async fn upload_batch(&self, records: &[SensorRecord]) -> Result<(), RemoteError> {
        let rows: Vec<RemoteRow> = records.iter().map(RemoteRow::from).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&rows)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout(self.timeout)
                } else {
                    RemoteError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Batch accepted");
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(RemoteError::Rejected { status: status.as_u16(), body })
    }
}
