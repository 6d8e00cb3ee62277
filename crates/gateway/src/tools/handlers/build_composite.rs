use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::{ComputationDescriptor, CompositeMethod};
use terralens_common::Result;

use crate::tools::dispatch::ToolContext;

use super::{build_and_resolve, parse_args, temporal_range, RegionArg};

#[derive(Deserialize)]
struct Args {
    dataset: String,
    region: RegionArg,
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    method: Option<CompositeMethod>,
    #[serde(default)]
    cloud_cover_max: Option<f64>,
}

/// compute/build_composite — cloud-filtered reduction of an image
/// collection. Mints (or deduplicates onto) a `composite_*` handle.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let descriptor = ComputationDescriptor::Composite {
        dataset: args.dataset,
        region: args.region.into_region(),
        range: temporal_range(args.start, args.end)?,
        method: args.method.unwrap_or_default(),
        cloud_cover_max: args.cloud_cover_max,
    };
    build_and_resolve(ctx, descriptor).await
}
