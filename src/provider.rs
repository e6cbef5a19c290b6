//! Weather provider client and response classification.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::FetchError;
use crate::models::{View, WeatherSnapshot};

/// Seam between the session controller and the upstream weather service.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Fetch the snapshot for one (view, query) pair, classified into
    /// [`FetchError`] on failure.
    async fn fetch(&self, view: View, query: &str) -> Result<WeatherSnapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    code: i64,
    #[serde(default)]
    info: String,
}

/// HTTP client for the weatherstack-style API.
///
/// The provider multiplexes all views over one endpoint: the view selects a
/// mode flag, and errors arrive as a structured envelope inside an otherwise
/// successful response.
#[derive(Debug, Clone)]
pub struct WeatherstackClient {
    client: Client,
    base_url: String,
    access_key: String,
}

impl WeatherstackClient {
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            access_key: config.access_key.clone().unwrap_or_default(),
        })
    }

    fn request_url(&self, view: View, query: &str) -> String {
        let mut url = format!(
            "{}?access_key={}&query={}",
            self.base_url,
            self.access_key,
            urlencoding::encode(query)
        );
        if let Some(flag) = view.mode_param() {
            url.push('&');
            url.push_str(flag);
        }
        url
    }
}

#[async_trait]
impl WeatherProvider for WeatherstackClient {
    async fn fetch(&self, view: View, query: &str) -> Result<WeatherSnapshot, FetchError> {
        let url = self.request_url(view, query);
        debug!(%view, query, "requesting weather data");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;
        let status = response.status();

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;

        // The provider reports errors inside a 200 response, so the envelope
        // check comes before the status check.
        if let Ok(envelope) = serde_json::from_value::<ErrorEnvelope>(body.clone()) {
            return Err(FetchError::provider(envelope.error.code, envelope.error.info));
        }

        if !status.is_success() {
            return Err(FetchError::UnexpectedResponse { view });
        }

        serde_json::from_value(body).map_err(|_| FetchError::UnexpectedResponse { view })
    }
}
