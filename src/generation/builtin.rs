//! Built-in generators shipped with the service.

use serde_json::{json, Value};

use crate::error::GenerationError;
use crate::generation::{GenerationRequest, Generator, GeneratorRegistry};

/// Request type served by [`DatasetSummary`].
pub const DATASET_SUMMARY: &str = "dataset_summary";

const MAX_PRECISION: u64 = 12;

// == Dataset Summary ==
/// Summarizes `payload.values` (a non-empty array of numbers) into
/// count, sum, min, max and mean.
///
/// `config.precision` rounds the float statistics to that many decimals.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetSummary;

impl Generator for DatasetSummary {
    fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let values = request
            .payload
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| GenerationError::failed("payload.values must be an array"))?;

        if values.is_empty() {
            return Err(GenerationError::failed("payload.values is empty"));
        }

        let numbers = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64()
                    .ok_or_else(|| GenerationError::failed(format!("payload.values[{}] is not a number", i)))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let precision = match request.config.get("precision") {
            None | Some(Value::Null) => None,
            Some(p) => match p.as_u64() {
                Some(p) if p <= MAX_PRECISION => Some(p as i32),
                _ => {
                    return Err(GenerationError::failed(format!(
                        "config.precision must be an integer between 0 and {}",
                        MAX_PRECISION
                    )))
                }
            },
        };

        let sum: f64 = numbers.iter().sum();
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = sum / numbers.len() as f64;

        let round = |x: f64| match precision {
            Some(p) => {
                let factor = 10f64.powi(p);
                (x * factor).round() / factor
            }
            None => x,
        };

        Ok(json!({
            "count": numbers.len(),
            "sum": round(sum),
            "min": round(min),
            "max": round(max),
            "mean": round(mean),
        }))
    }
}

/// Registry with every built-in generator.
pub fn builtin_registry() -> GeneratorRegistry {
    GeneratorRegistry::new().with(DATASET_SUMMARY, DatasetSummary)
}
