use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use terralens_common::api::engine::{
    DiscoveryRequest, EvaluateRequest, RenderRequest, RenderResponse, ResultEnvelope,
};
use terralens_common::config::EngineConfig;
use terralens_common::{Result, TerralensError};

use crate::circuit_breaker::CircuitBreaker;

use super::EngineBackend;

/// Max characters of an engine error body echoed into error messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// HTTP client for the remote compute engine, guarded by a circuit
/// breaker so a dead engine fails fast instead of tying up builds.
pub struct HttpEngineClient {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpEngineClient {
    /// The request timeout is expected to be set on the passed
    /// `reqwest::Client` (see the gateway bootstrap).
    pub fn new(http: reqwest::Client, config: &EngineConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::new(&config.breaker),
        }
    }

    async fn post_json<B, T>(&self, path: &'static str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        if !self.breaker.allow() {
            metrics::counter!("engine.request.rejected").increment(1);
            return Err(TerralensError::EngineFailure(
                "engine circuit open; request rejected before dispatch".into(),
            ));
        }

        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            self.breaker.record_failure();
            metrics::counter!("engine.request.errors", "path" => path).increment(1);
            TerralensError::EngineFailure(format!("engine request to {} failed: {}", path, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            self.breaker.record_failure();
            metrics::counter!("engine.request.errors", "path" => path).increment(1);
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(TerralensError::EngineFailure(format!(
                "engine returned {} for {}: {}",
                status, path, excerpt
            )));
        }

        let parsed = response.json::<T>().await.map_err(|e| {
            self.breaker.record_failure();
            metrics::counter!("engine.request.errors", "path" => path).increment(1);
            TerralensError::EngineFailure(format!(
                "malformed engine response from {}: {}",
                path, e
            ))
        })?;

        self.breaker.record_success();
        metrics::histogram!("engine.request.latency", "path" => path)
            .record(start.elapsed().as_secs_f64());
        Ok(parsed)
    }
}

#[async_trait]
impl EngineBackend for HttpEngineClient {
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<ResultEnvelope> {
        self.post_json("/evaluate", request).await
    }

    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        self.post_json("/render", request).await
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<Value> {
        self.post_json("/discover", request).await
    }
}
