//! Request DTOs for the generation service API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::generation::GenerationRequest;

/// Largest batch accepted in one call.
pub const MAX_BATCH_SIZE: usize = 1000;

const MAX_ID_LENGTH: usize = 256;

/// Longest accepted request type. Types prefix every cache key.
pub const MAX_TYPE_LENGTH: usize = 64;

/// Request types are identifiers: ASCII letters, digits, `_`, `-` and `.`.
fn is_valid_type(request_type: &str) -> bool {
    request_type
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

/// Request body for POST /generate
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    /// Items to generate, answered in the same order
    pub requests: Vec<GenerationRequest>,
    /// Optional deadline for this batch in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl GenerateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.requests.is_empty() {
            return Some("Batch cannot be empty".to_string());
        }
        if self.requests.len() > MAX_BATCH_SIZE {
            return Some(format!(
                "Batch exceeds maximum size of {} requests",
                MAX_BATCH_SIZE
            ));
        }
        for (i, request) in self.requests.iter().enumerate() {
            if request.id.is_empty() {
                return Some(format!("requests[{}]: id cannot be empty", i));
            }
            if request.id.len() > MAX_ID_LENGTH {
                return Some(format!(
                    "requests[{}]: id exceeds maximum length of {} characters",
                    i, MAX_ID_LENGTH
                ));
            }
            if request.request_type.is_empty() {
                return Some(format!("requests[{}]: type cannot be empty", i));
            }
            if request.request_type.len() > MAX_TYPE_LENGTH {
                return Some(format!(
                    "requests[{}]: type exceeds maximum length of {} characters",
                    i, MAX_TYPE_LENGTH
                ));
            }
            if !is_valid_type(&request.request_type) {
                return Some(format!(
                    "requests[{}]: type may only contain letters, digits, '_', '-' and '.'",
                    i
                ));
            }
        }
        if self.timeout_ms == Some(0) {
            return Some("timeout_ms must be greater than zero".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn item(id: &str, request_type: &str) -> GenerationRequest {
        GenerationRequest::new(id, request_type, json!({}), Value::Null)
    }

    #[test]
    fn test_generate_request_deserialize() {
        let json = r#"{"requests": [{"id": "a", "type": "dataset_summary", "payload": {"values": [1]}}]}"#;
        let req: GenerateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.requests.len(), 1);
        assert_eq!(req.requests[0].request_type, "dataset_summary");
        assert!(req.timeout_ms.is_none());
    }

    #[test]
    fn test_validate_empty_batch() {
        let req = GenerateRequest {
            requests: vec![],
            timeout_ms: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_empty_id_and_type() {
        let req = GenerateRequest {
            requests: vec![item("ok", "t"), item("", "t")],
            timeout_ms: None,
        };
        assert!(req.validate().unwrap().contains("requests[1]"));

        let req = GenerateRequest {
            requests: vec![item("ok", "")],
            timeout_ms: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_type_charset_and_length() {
        for bad in ["bar/chart", "a b", "chart?x=1", "%2F", "ünïcode"] {
            let req = GenerateRequest {
                requests: vec![item("a", bad)],
                timeout_ms: None,
            };
            assert!(req.validate().unwrap().contains("type may only contain"), "{}", bad);
        }

        let req = GenerateRequest {
            requests: vec![item("a", &"t".repeat(MAX_TYPE_LENGTH + 1))],
            timeout_ms: None,
        };
        assert!(req.validate().unwrap().contains("maximum length"));

        let req = GenerateRequest {
            requests: vec![item("a", "bar_chart-v2.png"), item("b", &"t".repeat(MAX_TYPE_LENGTH))],
            timeout_ms: None,
        };
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let req = GenerateRequest {
            requests: vec![item("a", "t")],
            timeout_ms: Some(0),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_valid_request() {
        let req = GenerateRequest {
            requests: vec![item("a", "t"), item("b", "t")],
            timeout_ms: Some(500),
        };
        assert!(req.validate().is_none());
    }
}
