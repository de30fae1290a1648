use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use url::Url;

use super::{QueryResponse, Upstream};
use crate::config::UpstreamSettings;
use crate::error::MetricsError;

/// JSON-over-HTTP gateway client.
///
/// Operation `name` is posted to `{base_url}/operations/{name}` with the input
/// as the JSON body; the reply body is a [`QueryResponse`].
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUpstream {
    pub fn new(settings: &UpstreamSettings) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&settings.url)?;
        // Url::join drops the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn operation_url(&self, operation: &str) -> Result<Url, MetricsError> {
        self.base_url
            .join(&format!("operations/{}", operation))
            .map_err(|e| MetricsError::upstream(format!("invalid operation {:?}: {}", operation, e)))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn query(&self, operation: &str, input: &Value) -> Result<QueryResponse, MetricsError> {
        let url = self.operation_url(operation)?;
        debug!("POST {} {}", url, input);

        let response = self
            .client
            .post(url)
            .json(input)
            .send()
            .await
            .map_err(|e| MetricsError::upstream(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::upstream(format!(
                "{} returned HTTP {}",
                operation, status
            )));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| MetricsError::upstream(format!("{} returned an unreadable body: {}", operation, e)))
    }
}
