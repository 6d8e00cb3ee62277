use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::{ExportFormat, RenderTarget};
use terralens_common::api::invoke::OperationResponse;
use terralens_common::descriptor::VisualizationParams;
use terralens_common::{HandleKey, Result};

use crate::tools::dispatch::ToolContext;

use super::{parse_args, render_handle};

const DEFAULT_SCALE_METERS: f64 = 10.0;
const DEFAULT_CRS: &str = "EPSG:4326";
const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000;

#[derive(Deserialize)]
struct Args {
    input_handle: HandleKey,
    #[serde(default)]
    visualization: Option<VisualizationParams>,
    #[serde(default)]
    scale_meters: Option<f64>,
    #[serde(default)]
    crs: Option<String>,
    #[serde(default)]
    format: Option<ExportFormat>,
    #[serde(default)]
    max_pixels: Option<u64>,
}

/// render/export — full-resolution export URL for an existing handle.
/// Defaults to a cloud-optimized GeoTIFF at 10 m in EPSG:4326.
pub async fn run(args: Value, ctx: &ToolContext) -> Result<OperationResponse> {
    let args: Args = parse_args(args)?;

    render_handle(
        ctx,
        &args.input_handle,
        args.visualization.unwrap_or_default(),
        RenderTarget::Export {
            scale_meters: args.scale_meters.unwrap_or(DEFAULT_SCALE_METERS),
            crs: args.crs.unwrap_or_else(|| DEFAULT_CRS.to_string()),
            format: args.format.unwrap_or(ExportFormat::CloudOptimizedGeoTiff),
            max_pixels: args.max_pixels.unwrap_or(DEFAULT_MAX_PIXELS),
        },
    )
    .await
}
