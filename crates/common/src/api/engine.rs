use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::{ComputationDescriptor, Region};

/// POST /evaluate request — materialize a descriptor.
///
/// `reduction` is set for statistics requests; build requests leave it
/// empty and receive a pass-through `Reference` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub descriptor: ComputationDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduction: Option<ReductionSpec>,
}

/// Server-side reducer applied when materializing statistics.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ReductionSpec {
    pub reducer: Reducer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_meters: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Mean,
    MinMax,
    Percentile,
}

/// Materialized payload of a Ready handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEnvelope {
    /// Summary statistics per band.
    Statistics {
        bands: BTreeMap<String, BandStatistics>,
    },
    /// A renderable artifact hosted by the engine.
    Rendering {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_in_seconds: Option<u64>,
    },
    /// Pass-through envelope for chained builds: compositing produces no
    /// terminal artifact until rendered, so the envelope is the
    /// descriptor itself.
    Reference { descriptor: ComputationDescriptor },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

/// POST /render request — turn a render descriptor into a hosted artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderRequest {
    /// A `Render` descriptor: upstream computation plus visualization.
    pub descriptor: ComputationDescriptor,
    pub target: RenderTarget,
}

/// What kind of artifact the render call should produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenderTarget {
    Thumbnail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<u32>,
    },
    Tiles,
    Export {
        scale_meters: f64,
        crs: String,
        format: ExportFormat,
        max_pixels: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    GeoTiff,
    CloudOptimizedGeoTiff,
    Png,
}

/// POST /render response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderResponse {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
}

/// POST /discover request — catalog pass-through queries. Responses are
/// returned verbatim to the client, so the response shape is untyped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum DiscoveryRequest {
    Search { text: String, limit: u32 },
    DatasetInfo { dataset: String },
    ResolveRegion { region: Region },
}
