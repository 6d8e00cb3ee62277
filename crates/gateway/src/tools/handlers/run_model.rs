use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::{ComputationDescriptor, ModelKind};
use terralens_common::{HandleKey, Result};

use crate::tools::dispatch::ToolContext;

use super::{build_and_resolve, chained_source, parse_args, InlineSource};

#[derive(Deserialize)]
struct Args {
    model: ModelKind,
    #[serde(default)]
    input_handle: Option<HandleKey>,
    #[serde(default)]
    parameters: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    inline: InlineSource,
}

/// compute/run_model — run a calibrated model (wildfire risk, flood
/// risk, deforestation) over an upstream computation. Mints a `model_*`
/// handle.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let source = chained_source(ctx, args.input_handle, args.inline, "run_model")?;
    let descriptor = ComputationDescriptor::Model {
        model: args.model,
        source: Box::new(source),
        parameters: args.parameters.unwrap_or_default(),
    };
    build_and_resolve(ctx, descriptor).await
}
