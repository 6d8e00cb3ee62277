use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::{EvaluateRequest, Reducer, ReductionSpec, ResultEnvelope};
use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::ComputationDescriptor;
use terralens_common::{HandleKey, Result, TerralensError};

use crate::tools::dispatch::ToolContext;

use super::parse_args;

#[derive(Deserialize)]
struct Args {
    input_handle: HandleKey,
    #[serde(default)]
    reducer: Option<Reducer>,
    #[serde(default)]
    scale_meters: Option<f64>,
}

/// compute/statistics — materialize summary statistics for an existing
/// handle. Fails fast with HandleNotFound before the engine sees a call.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let snapshot = ctx.registry.lookup(&args.input_handle)?;
    if matches!(&*snapshot.descriptor, ComputationDescriptor::Discovery { .. }) {
        return Err(TerralensError::ConflictingParameters(format!(
            "handle {} does not reference a reducible computation",
            args.input_handle
        )));
    }

    let request = EvaluateRequest {
        descriptor: (*snapshot.descriptor).clone(),
        reduction: Some(ReductionSpec {
            reducer: args.reducer.unwrap_or_default(),
            scale_meters: args.scale_meters,
        }),
    };

    match ctx.engine.evaluate(&request).await? {
        ResultEnvelope::Statistics { bands } => Ok(OperationResponse::with_statistics(bands)),
        _ => Err(TerralensError::EngineFailure(
            "engine returned a non-statistics envelope for a statistics request".into(),
        )),
    }
}
