use std::sync::Arc;
use std::time::Instant;

use terralens_common::api::invoke::{OperationRequest, OperationResponse};
use terralens_common::config::ResultLimits;
use terralens_common::{Result, TerralensError};

use crate::engine::EngineBackend;
use crate::registry::HandleRegistry;

use super::handlers;

/// Shared context available to all operation handlers.
///
/// The registry and engine are constructor-injected; no handler reaches
/// them through ambient state.
pub struct ToolContext {
    pub registry: HandleRegistry,
    pub engine: Arc<dyn EngineBackend>,
    pub limits: ResultLimits,
}

/// How an operation interacts with the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationClass {
    /// Engine pass-through, no handle involved.
    Discovery,
    /// Produces (or deduplicates onto) a handle.
    Build,
    /// Consumes existing handles.
    Consume,
}

/// The statically-known operation table. `(tool, operation)` strings
/// resolve here exactly once; everything past this point is typed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    CatalogSearch,
    DatasetInfo,
    ResolveRegion,
    BuildComposite,
    ComputeIndex,
    RunModel,
    Statistics,
    Thumbnail,
    Tiles,
    Export,
}

impl Operation {
    pub fn parse(tool: &str, operation: &str) -> Option<Operation> {
        match (tool, operation) {
            ("catalog", "search") => Some(Self::CatalogSearch),
            ("catalog", "dataset_info") => Some(Self::DatasetInfo),
            ("catalog", "resolve_region") => Some(Self::ResolveRegion),
            ("compute", "build_composite") => Some(Self::BuildComposite),
            ("compute", "compute_index") => Some(Self::ComputeIndex),
            ("compute", "run_model") => Some(Self::RunModel),
            ("compute", "statistics") => Some(Self::Statistics),
            ("render", "thumbnail") => Some(Self::Thumbnail),
            ("render", "tiles") => Some(Self::Tiles),
            ("render", "export") => Some(Self::Export),
            _ => None,
        }
    }

    pub fn class(self) -> OperationClass {
        match self {
            Self::CatalogSearch | Self::DatasetInfo | Self::ResolveRegion => {
                OperationClass::Discovery
            }
            Self::BuildComposite | Self::ComputeIndex | Self::RunModel => OperationClass::Build,
            Self::Statistics | Self::Thumbnail | Self::Tiles | Self::Export => {
                OperationClass::Consume
            }
        }
    }
}

/// Routes tool invocations to their handlers and translates every error
/// into the response protocol.
pub struct Dispatcher {
    context: Arc<ToolContext>,
}

impl Dispatcher {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Route a request to its handler. Every failure comes back as a
    /// structured error response; nothing here takes down the process.
    pub async fn dispatch(&self, request: OperationRequest) -> OperationResponse {
        let start = Instant::now();
        let tool = request.tool.clone();
        let operation = request.operation.clone();

        let result = match Operation::parse(&request.tool, &request.operation) {
            None => Err(TerralensError::InvalidOperation {
                tool: request.tool,
                operation: request.operation,
            }),
            Some(op) => {
                tracing::info!(
                    tool = %tool,
                    operation = %operation,
                    class = ?op.class(),
                    "Operation started"
                );
                self.run_operation(op, request.arguments).await
            }
        };

        let latency = start.elapsed().as_secs_f64();
        metrics::histogram!("dispatch.latency", "tool" => tool.clone(), "operation" => operation.clone())
            .record(latency);
        metrics::counter!("dispatch.count", "tool" => tool.clone(), "operation" => operation.clone())
            .increment(1);

        match result {
            Ok(response) => {
                tracing::info!(
                    tool = %tool,
                    operation = %operation,
                    latency_s = latency,
                    "Operation succeeded"
                );
                response
            }
            Err(error) => {
                metrics::counter!(
                    "dispatch.errors",
                    "tool" => tool.clone(),
                    "operation" => operation.clone(),
                    "kind" => error.kind()
                )
                .increment(1);
                if matches!(error, TerralensError::InternalRegistry(_)) {
                    tracing::error!(
                        tool = %tool,
                        operation = %operation,
                        error = %error,
                        "Operation failed on a broken internal invariant"
                    );
                } else if error.is_caller_error() {
                    tracing::info!(
                        tool = %tool,
                        operation = %operation,
                        error = %error,
                        "Operation rejected"
                    );
                } else {
                    tracing::warn!(
                        tool = %tool,
                        operation = %operation,
                        latency_s = latency,
                        error = %error,
                        "Operation failed"
                    );
                }
                OperationResponse::from_error(&error)
            }
        }
    }

    async fn run_operation(
        &self,
        op: Operation,
        args: serde_json::Value,
    ) -> Result<OperationResponse> {
        let ctx = self.context.as_ref();
        match op {
            Operation::CatalogSearch => handlers::search_catalog::run(args, ctx).await,
            Operation::DatasetInfo => handlers::dataset_info::run(args, ctx).await,
            Operation::ResolveRegion => handlers::resolve_region::run(args, ctx).await,
            Operation::BuildComposite => handlers::build_composite::run(args, ctx).await,
            Operation::ComputeIndex => handlers::compute_index::run(args, ctx).await,
            Operation::RunModel => handlers::run_model::run(args, ctx).await,
            Operation::Statistics => handlers::statistics::run(args, ctx).await,
            Operation::Thumbnail => handlers::thumbnail::run(args, ctx).await,
            Operation::Tiles => handlers::tiles::run(args, ctx).await,
            Operation::Export => handlers::export::run(args, ctx).await,
        }
    }
}
