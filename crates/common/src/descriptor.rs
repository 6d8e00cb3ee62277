use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::HandleKind;

/// Spatial reference for a computation.
///
/// A place name and its numerically-equivalent bounding box are distinct
/// regions for deduplication purposes; resolving a name to geometry is an
/// engine-side concern (the `catalog/resolve_region` operation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    Named {
        place: String,
    },
    BoundingBox {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
}

impl Region {
    /// Canonical form used for fingerprinting: place names compare
    /// case-insensitively and ignore surrounding whitespace.
    pub fn canonicalize(&self) -> Region {
        match self {
            Self::Named { place } => Self::Named {
                place: place.trim().to_lowercase(),
            },
            Self::BoundingBox { .. } => self.clone(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { place } => write!(f, "{}", place),
            Self::BoundingBox {
                west,
                south,
                east,
                north,
            } => write!(f, "bbox({}, {}, {}, {})", west, south, east, north),
        }
    }
}

/// Inclusive date range filter over an image collection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Per-pixel reduction applied when flattening a collection into one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMethod {
    #[default]
    Median,
    Mean,
    Mosaic,
}

/// Spectral indices the engine can derive from a composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralIndex {
    Ndvi,
    Ndwi,
    Evi,
    Savi,
    Nbr,
}

/// Calibrated models the engine can run over an upstream computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    WildfireRisk,
    FloodRisk,
    Deforestation,
}

/// Rendering parameters passed through to the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

/// Immutable description of what to compute, independent of whether it has
/// been executed.
///
/// Derived variants embed the full upstream descriptor rather than its
/// handle key, so a pipeline can still be recomputed and audited after the
/// upstream handle is evicted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputationDescriptor {
    /// Transient catalog lookup. Never stored in the registry.
    Discovery { query: String },

    /// Cloud-filtered reduction of an image collection over a region and
    /// date range.
    Composite {
        dataset: String,
        region: Region,
        range: TemporalRange,
        #[serde(default)]
        method: CompositeMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cloud_cover_max: Option<f64>,
    },

    /// A spectral index derived from an upstream computation.
    DerivedIndex {
        index: SpectralIndex,
        source: Box<ComputationDescriptor>,
    },

    /// A calibrated model run over an upstream computation.
    Model {
        model: ModelKind,
        source: Box<ComputationDescriptor>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        parameters: BTreeMap<String, Value>,
    },

    /// A visualization of an upstream computation.
    Render {
        source: Box<ComputationDescriptor>,
        visualization: VisualizationParams,
    },
}

impl ComputationDescriptor {
    /// The handle kind minted for this descriptor, or `None` for
    /// non-cacheable (discovery) descriptors.
    pub fn handle_kind(&self) -> Option<HandleKind> {
        match self {
            Self::Discovery { .. } => None,
            Self::Composite { .. } => Some(HandleKind::Composite),
            Self::DerivedIndex { .. } => Some(HandleKind::Index),
            Self::Model { .. } => Some(HandleKind::Model),
            Self::Render { .. } => Some(HandleKind::Render),
        }
    }

    /// Canonical form used for fingerprinting, normalized recursively.
    pub fn canonicalize(&self) -> ComputationDescriptor {
        match self {
            Self::Discovery { query } => Self::Discovery {
                query: query.trim().to_lowercase(),
            },
            Self::Composite {
                dataset,
                region,
                range,
                method,
                cloud_cover_max,
            } => Self::Composite {
                dataset: dataset.trim().to_string(),
                region: region.canonicalize(),
                range: *range,
                method: *method,
                cloud_cover_max: *cloud_cover_max,
            },
            Self::DerivedIndex { index, source } => Self::DerivedIndex {
                index: *index,
                source: Box::new(source.canonicalize()),
            },
            Self::Model {
                model,
                source,
                parameters,
            } => Self::Model {
                model: *model,
                source: Box::new(source.canonicalize()),
                parameters: parameters.clone(),
            },
            Self::Render {
                source,
                visualization,
            } => Self::Render {
                source: Box::new(source.canonicalize()),
                visualization: visualization.clone(),
            },
        }
    }

    /// Compact one-line description for summaries and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Discovery { query } => format!("catalog lookup '{}'", query),
            Self::Composite {
                dataset,
                region,
                range,
                method,
                ..
            } => format!(
                "{:?} composite of {} over {} ({} to {})",
                method, dataset, region, range.start, range.end
            ),
            Self::DerivedIndex { index, source } => {
                format!("{:?} from {}", index, source.describe())
            }
            Self::Model { model, source, .. } => {
                format!("{:?} model over {}", model, source.describe())
            }
            Self::Render { source, .. } => format!("rendering of {}", source.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> TemporalRange {
        TemporalRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        }
    }

    #[test]
    fn test_named_region_canonicalization() {
        let a = Region::Named {
            place: "  San Francisco ".into(),
        };
        let b = Region::Named {
            place: "san francisco".into(),
        };
        assert_eq!(a.canonicalize(), b.canonicalize());
    }

    #[test]
    fn test_name_and_coordinates_stay_distinct() {
        let named = Region::Named {
            place: "somewhere".into(),
        };
        let bbox = Region::BoundingBox {
            west: -122.55,
            south: 37.65,
            east: -122.3,
            north: 37.9,
        };
        assert_ne!(named.canonicalize(), bbox.canonicalize());
    }

    #[test]
    fn test_handle_kind_per_variant() {
        let composite = ComputationDescriptor::Composite {
            dataset: "COPERNICUS/S2_SR_HARMONIZED".into(),
            region: Region::Named {
                place: "nairobi".into(),
            },
            range: range(),
            method: CompositeMethod::Median,
            cloud_cover_max: Some(20.0),
        };
        assert_eq!(composite.handle_kind(), Some(HandleKind::Composite));

        let index = ComputationDescriptor::DerivedIndex {
            index: SpectralIndex::Ndvi,
            source: Box::new(composite),
        };
        assert_eq!(index.handle_kind(), Some(HandleKind::Index));

        let discovery = ComputationDescriptor::Discovery {
            query: "sentinel".into(),
        };
        assert_eq!(discovery.handle_kind(), None);
    }

    #[test]
    fn test_describe_mentions_the_chain() {
        let composite = ComputationDescriptor::Composite {
            dataset: "COPERNICUS/S2_SR_HARMONIZED".into(),
            region: Region::Named {
                place: "Lake Tahoe".into(),
            },
            range: range(),
            method: CompositeMethod::Median,
            cloud_cover_max: None,
        };
        let index = ComputationDescriptor::DerivedIndex {
            index: SpectralIndex::Ndvi,
            source: Box::new(composite),
        };
        let description = index.describe();
        assert!(description.contains("Ndvi"));
        assert!(description.contains("COPERNICUS/S2_SR_HARMONIZED"));
        assert!(description.contains("Lake Tahoe"));
    }
}
