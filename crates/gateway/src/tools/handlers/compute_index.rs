use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::{ComputationDescriptor, SpectralIndex};
use terralens_common::{HandleKey, Result};

use crate::tools::dispatch::ToolContext;

use super::{build_and_resolve, chained_source, parse_args, InlineSource};

#[derive(Deserialize)]
struct Args {
    index: SpectralIndex,
    #[serde(default)]
    input_handle: Option<HandleKey>,
    #[serde(flatten)]
    inline: InlineSource,
}

/// compute/compute_index — derive a spectral index (NDVI, NDWI, ...)
/// from an upstream handle or an inline composite specification. Mints
/// an `idx_*` handle whose descriptor embeds the full upstream chain.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let source = chained_source(ctx, args.input_handle, args.inline, "compute_index")?;
    let descriptor = ComputationDescriptor::DerivedIndex {
        index: args.index,
        source: Box::new(source),
    };
    build_and_resolve(ctx, descriptor).await
}
