//! Generation request and result types.

use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::GenerationError;

// == Generation Request ==
/// One artifact to produce.
///
/// `request_type` selects the generator; `payload` and `config` are opaque
/// to the core and only feed the generator and the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub config: Value,
}

impl GenerationRequest {
    pub fn new(
        id: impl Into<String>,
        request_type: impl Into<String>,
        payload: Value,
        config: Value,
    ) -> Self {
        Self {
            id: id.into(),
            request_type: request_type.into(),
            payload,
            config,
        }
    }
}

// == Generation Result ==
/// Outcome for one request, at the same position as the request.
///
/// Exactly one of `output` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(rename = "generation_time_secs", serialize_with = "as_secs_f64")]
    pub generation_time: Duration,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GenerationError>,
}

impl GenerationResult {
    /// Served from cache; no generation time.
    pub fn cached(id: impl Into<String>, output: Value) -> Self {
        Self {
            id: id.into(),
            output: Some(output),
            generation_time: Duration::ZERO,
            from_cache: true,
            error: None,
        }
    }

    /// Freshly generated.
    pub fn generated(id: impl Into<String>, output: Value, generation_time: Duration) -> Self {
        Self {
            id: id.into(),
            output: Some(output),
            generation_time,
            from_cache: false,
            error: None,
        }
    }

    /// Generation failed or never finished.
    pub fn failed(id: impl Into<String>, error: GenerationError, generation_time: Duration) -> Self {
        Self {
            id: id.into(),
            output: None,
            generation_time,
            from_cache: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_deserialize_with_type_field() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"id":"r1","type":"chart","payload":{"x":[1,2]}}"#).unwrap();
        assert_eq!(req.request_type, "chart");
        assert_eq!(req.payload, json!({"x": [1, 2]}));
        assert_eq!(req.config, Value::Null);
    }

    #[test]
    fn test_failed_result_serialization() {
        let result = GenerationResult::failed(
            "r1",
            GenerationError::failed("boom"),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("output").is_none());
        assert_eq!(json["generation_time_secs"], 1.5);
        assert_eq!(json["error"]["kind"], "failed");
        assert!(!result.is_success());
    }

    #[test]
    fn test_cached_result_has_zero_time() {
        let result = GenerationResult::cached("r1", json!(1));
        assert!(result.from_cache);
        assert_eq!(result.generation_time, Duration::ZERO);
        assert!(result.is_success());
    }
}
