#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use terralens_common::api::engine::{
    BandStatistics, DiscoveryRequest, EvaluateRequest, RenderRequest, RenderResponse,
    ResultEnvelope,
};
use terralens_common::config::{RegistryConfig, ResultLimits};
use terralens_common::{Result, TerralensError};
use terralens_gateway::engine::EngineBackend;
use terralens_gateway::registry::HandleRegistry;
use terralens_gateway::tools::{Dispatcher, ToolContext};

/// Counting stand-in for the remote engine.
#[derive(Default)]
pub struct MockEngine {
    pub evaluate_calls: AtomicU32,
    pub render_calls: AtomicU32,
    pub discover_calls: AtomicU32,
    /// When set, every evaluate call fails like an engine-side error.
    pub fail_evaluations: AtomicBool,
    /// Artificial latency for evaluate calls, to force overlap.
    pub evaluate_delay_ms: AtomicU64,
    /// Last render request observed, for chain reconstruction checks.
    pub last_render: Mutex<Option<RenderRequest>>,
}

#[async_trait]
impl EngineBackend for MockEngine {
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<ResultEnvelope> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.evaluate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_evaluations.load(Ordering::SeqCst) {
            return Err(TerralensError::EngineFailure(
                "mock engine quota exceeded".into(),
            ));
        }

        if request.reduction.is_some() {
            let mut bands = BTreeMap::new();
            bands.insert(
                "NDVI".to_string(),
                BandStatistics {
                    mean: 0.42,
                    min: -0.1,
                    max: 0.9,
                    std_dev: 0.2,
                },
            );
            return Ok(ResultEnvelope::Statistics { bands });
        }

        Ok(ResultEnvelope::Reference {
            descriptor: request.descriptor.clone(),
        })
    }

    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_render.lock().unwrap() = Some(request.clone());
        Ok(RenderResponse {
            url: "https://tiles.example/terralens/preview".into(),
            expires_in_seconds: Some(3600),
        })
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<Value> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match request {
            DiscoveryRequest::Search { text, limit } => json!({
                "query": text,
                "limit": limit,
                "datasets": ["COPERNICUS/S2_SR_HARMONIZED", "LANDSAT/LC09/C02/T1_L2"],
            }),
            DiscoveryRequest::DatasetInfo { dataset } => json!({
                "dataset": dataset,
                "bands": ["B2", "B3", "B4", "B8"],
            }),
            DiscoveryRequest::ResolveRegion { .. } => json!({
                "geometry": { "type": "Polygon" },
            }),
        })
    }
}

pub fn fast_registry_config() -> RegistryConfig {
    RegistryConfig {
        handle_ttl_seconds: 3600,
        max_handles: 64,
        build_timeout_seconds: 60,
        sweep_interval_seconds: 1,
    }
}

/// Dispatcher wired to a mock engine, plus direct registry access.
pub fn test_dispatcher(engine: Arc<MockEngine>) -> (Dispatcher, HandleRegistry) {
    let registry = HandleRegistry::new(&fast_registry_config());
    let dispatcher = Dispatcher::new(ToolContext {
        registry: registry.clone(),
        engine,
        limits: ResultLimits::default(),
    });
    (dispatcher, registry)
}
