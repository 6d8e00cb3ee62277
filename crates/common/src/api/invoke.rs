use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::engine::BandStatistics;
use crate::error::TerralensError;
use crate::keys::HandleKey;

/// POST /invoke request — a single tool invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationRequest {
    pub tool: String,
    pub operation: String,
    #[serde(default)]
    pub arguments: Value,
}

/// POST /invoke response.
///
/// Exactly one of the success payloads is set on success; `error_kind`
/// and `message` are set on failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<HandleKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BuildSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BTreeMap<String, BandStatistics>>,
    /// Verbatim payload for discovery operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Compact description of a freshly built (or deduplicated) handle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildSummary {
    pub description: String,
    /// True when the request matched an existing live handle and no new
    /// build was started.
    pub deduplicated: bool,
}

impl OperationResponse {
    fn success() -> Self {
        Self {
            success: true,
            handle: None,
            summary: None,
            url: None,
            statistics: None,
            data: None,
            error_kind: None,
            message: None,
        }
    }

    pub fn with_handle(key: HandleKey, summary: BuildSummary) -> Self {
        Self {
            handle: Some(key),
            summary: Some(summary),
            ..Self::success()
        }
    }

    pub fn with_url(url: String) -> Self {
        Self {
            url: Some(url),
            ..Self::success()
        }
    }

    pub fn with_statistics(bands: BTreeMap<String, BandStatistics>) -> Self {
        Self {
            statistics: Some(bands),
            ..Self::success()
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    pub fn from_error(error: &TerralensError) -> Self {
        Self {
            success: false,
            error_kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
            ..Self::success()
        }
    }

    /// Transport status equivalent for this response.
    pub fn http_status(&self) -> u16 {
        match &self.error_kind {
            None => 200,
            Some(kind) => crate::error::status_for_kind(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_round_trip() {
        let error = TerralensError::HandleNotFound {
            key: "idx_9f3a".into(),
        };
        let response = OperationResponse::from_error(&error);
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("HandleNotFound"));
        assert_eq!(response.http_status(), 404);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("handle").is_none());
    }

    #[test]
    fn test_handle_response_shape() {
        let response = OperationResponse::with_handle(
            HandleKey::from("composite_ab12cd34ef56"),
            BuildSummary {
                description: "median composite".into(),
                deduplicated: false,
            },
        );
        assert!(response.success);
        assert_eq!(response.http_status(), 200);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["handle"], "composite_ab12cd34ef56");
        assert_eq!(json["summary"]["deduplicated"], false);
    }
}
