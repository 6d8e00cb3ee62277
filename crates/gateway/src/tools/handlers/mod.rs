pub mod build_composite;
pub mod compute_index;
pub mod dataset_info;
pub mod export;
pub mod resolve_region;
pub mod run_model;
pub mod search_catalog;
pub mod statistics;
pub mod thumbnail;
pub mod tiles;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use terralens_common::api::engine::{EvaluateRequest, RenderRequest, RenderTarget};
use terralens_common::api::invoke::{BuildSummary, OperationResponse};
use terralens_common::descriptor::{
    ComputationDescriptor, CompositeMethod, Region, TemporalRange, VisualizationParams,
};
use terralens_common::{HandleKey, Result, TerralensError};

use super::dispatch::ToolContext;

/// Parse an operation's argument bag into its typed record.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| TerralensError::MissingParameter(e.to_string()))
}

/// Region argument: a bare place name or an explicit bounding box.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RegionArg {
    Place(String),
    Bounds {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
}

impl RegionArg {
    pub(crate) fn into_region(self) -> Region {
        match self {
            Self::Place(place) => Region::Named { place },
            Self::Bounds {
                west,
                south,
                east,
                north,
            } => Region::BoundingBox {
                west,
                south,
                east,
                north,
            },
        }
    }
}

/// Validated inclusive date range.
pub(crate) fn temporal_range(start: NaiveDate, end: NaiveDate) -> Result<TemporalRange> {
    if start > end {
        return Err(TerralensError::ConflictingParameters(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    Ok(TemporalRange { start, end })
}

/// Inline composite specification shared by the operations that accept
/// either an upstream handle or raw dataset parameters.
#[derive(Default, Deserialize)]
#[serde(default)]
pub(crate) struct InlineSource {
    dataset: Option<String>,
    region: Option<RegionArg>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    method: Option<CompositeMethod>,
    cloud_cover_max: Option<f64>,
}

impl InlineSource {
    fn is_empty(&self) -> bool {
        self.dataset.is_none() && self.region.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn into_composite(self) -> Result<ComputationDescriptor> {
        let mut missing = Vec::new();
        if self.dataset.is_none() {
            missing.push("dataset");
        }
        if self.region.is_none() {
            missing.push("region");
        }
        if self.start.is_none() {
            missing.push("start");
        }
        if self.end.is_none() {
            missing.push("end");
        }
        let (Some(dataset), Some(region), Some(start), Some(end)) =
            (self.dataset, self.region, self.start, self.end)
        else {
            return Err(TerralensError::MissingParameter(missing.join(", ")));
        };

        Ok(ComputationDescriptor::Composite {
            dataset,
            region: region.into_region(),
            range: temporal_range(start, end)?,
            method: self.method.unwrap_or_default(),
            cloud_cover_max: self.cloud_cover_max,
        })
    }
}

/// Resolve the upstream descriptor for a chained build: exactly one of
/// `input_handle` or the inline specification.
pub(crate) fn chained_source(
    ctx: &ToolContext,
    input_handle: Option<HandleKey>,
    inline: InlineSource,
    operation: &str,
) -> Result<ComputationDescriptor> {
    match (input_handle, inline.is_empty()) {
        (Some(_), false) => Err(TerralensError::ConflictingParameters(format!(
            "{} accepts either input_handle or an inline dataset specification, not both",
            operation
        ))),
        (Some(key), true) => {
            let snapshot = ctx.registry.lookup(&key)?;
            match &*snapshot.descriptor {
                ComputationDescriptor::Discovery { .. } | ComputationDescriptor::Render { .. } => {
                    Err(TerralensError::ConflictingParameters(format!(
                        "handle {} is not a computable source for {}",
                        key, operation
                    )))
                }
                descriptor => Ok(descriptor.clone()),
            }
        }
        (None, false) => inline.into_composite(),
        (None, true) => Err(TerralensError::MissingParameter(format!(
            "{} requires input_handle or dataset, region, start and end",
            operation
        ))),
    }
}

/// Insert a build descriptor and drive it to completion through the
/// engine. Deduplicated inserts coalesce onto the existing build.
pub(crate) async fn build_and_resolve(
    ctx: &ToolContext,
    descriptor: ComputationDescriptor,
) -> Result<OperationResponse> {
    let description = descriptor.describe();
    let (key, deduplicated) = ctx.registry.insert(descriptor.clone())?;

    let engine = Arc::clone(&ctx.engine);
    let request = EvaluateRequest {
        descriptor,
        reduction: None,
    };
    ctx.registry
        .resolve(&key, move || async move { engine.evaluate(&request).await })
        .await?;

    Ok(OperationResponse::with_handle(
        key,
        BuildSummary {
            description,
            deduplicated,
        },
    ))
}

/// Render an existing handle. Fails fast with HandleNotFound before the
/// engine sees a call when the key is unknown or expired.
pub(crate) async fn render_handle(
    ctx: &ToolContext,
    input_handle: &HandleKey,
    visualization: VisualizationParams,
    target: RenderTarget,
) -> Result<OperationResponse> {
    let snapshot = ctx.registry.lookup(input_handle)?;
    if matches!(&*snapshot.descriptor, ComputationDescriptor::Discovery { .. }) {
        return Err(TerralensError::ConflictingParameters(format!(
            "handle {} does not reference a renderable computation",
            input_handle
        )));
    }

    let request = RenderRequest {
        descriptor: ComputationDescriptor::Render {
            source: Box::new((*snapshot.descriptor).clone()),
            visualization,
        },
        target,
    };
    let response = ctx.engine.render(&request).await?;
    Ok(OperationResponse::with_url(response.url))
}
