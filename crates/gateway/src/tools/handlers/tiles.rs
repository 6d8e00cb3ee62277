use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::RenderTarget;
use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::VisualizationParams;
use terralens_common::{HandleKey, Result};

use crate::tools::dispatch::ToolContext;

use super::{parse_args, render_handle};

#[derive(Deserialize)]
struct Args {
    input_handle: HandleKey,
    #[serde(default)]
    visualization: Option<VisualizationParams>,
}

/// render/tiles — XYZ tile-service URL for an existing handle.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    render_handle(
        ctx,
        &args.input_handle,
        args.visualization.unwrap_or_default(),
        RenderTarget::Tiles,
    )
    .await
}
