use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::DiscoveryRequest;
use terralens_common::api::invoke::OperationResponse;
use terralens_common::Result;

use crate::tools::dispatch::ToolContext;

use super::{parse_args, RegionArg};

#[derive(Deserialize)]
struct Args {
    region: RegionArg,
}

/// catalog/resolve_region — resolve a place name or bounding box to the
/// engine's canonical geometry.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let data = ctx
        .engine
        .discover(&DiscoveryRequest::ResolveRegion {
            region: args.region.into_region(),
        })
        .await?;
    Ok(OperationResponse::with_data(data))
}
