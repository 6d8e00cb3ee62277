use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::DiscoveryRequest;
use terralens_common::api::invoke::OperationResponse;
use terralens_common::Result;

use crate::tools::dispatch::ToolContext;

use super::parse_args;

#[derive(Deserialize)]
struct Args {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// catalog/search — free-text dataset catalog search, passed through to
/// the engine verbatim.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let cap = ctx.limits.max_search_results;
    let limit = args.limit.unwrap_or(cap).min(cap);

    let data = ctx
        .engine
        .discover(&DiscoveryRequest::Search {
            text: args.query,
            limit,
        })
        .await?;
    Ok(OperationResponse::with_data(data))
}
