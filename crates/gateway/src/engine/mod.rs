use async_trait::async_trait;
use serde_json::Value;

use terralens_common::api::engine::{
    DiscoveryRequest, EvaluateRequest, RenderRequest, RenderResponse, ResultEnvelope,
};
use terralens_common::Result;

mod http;

pub use http::HttpEngineClient;

/// The remote, stateless, lazy-evaluation compute backend.
///
/// Safely callable concurrently; the gateway keeps no shared mutable
/// state on its side of these calls.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Materialize a descriptor into statistics or a pass-through
    /// reference envelope.
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<ResultEnvelope>;

    /// Render a descriptor chain to a hosted artifact URL.
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse>;

    /// Catalog pass-through queries; responses are returned verbatim.
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Value>;
}
