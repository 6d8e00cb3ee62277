use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::DiscoveryRequest;
use terralens_common::api::invoke::OperationResponse;
use terralens_common::Result;

use crate::tools::dispatch::ToolContext;

use super::parse_args;

#[derive(Deserialize)]
struct Args {
    dataset: String,
}

/// catalog/dataset_info — band names, date coverage and description for
/// a single dataset.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    let data = ctx
        .engine
        .discover(&DiscoveryRequest::DatasetInfo {
            dataset: args.dataset,
        })
        .await?;
    Ok(OperationResponse::with_data(data))
}
