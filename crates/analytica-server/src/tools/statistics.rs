//! Descriptive statistics tools.

use crate::registry::{CachePolicy, ToolSpec};
use analytica_cache::Priority;
use analytica_core::{AnalyticalError, ErrorCode, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// `analyze_dataset`: count, mean, median, standard deviation, min, max.
pub fn analyze_dataset_spec() -> ToolSpec {
    ToolSpec {
        name: "analyze_dataset".into(),
        description: "Summary statistics (count, mean, median, stddev, min, max) for a numeric dataset".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "array",
                    "items": {"type": "number"},
                    "minItems": 1
                }
            },
            "required": ["data"]
        }),
        handler: Arc::new(|params, _ctx| {
            Box::pin(async move {
                let data = numbers(&params, "data")?;
                let mean = data.iter().sum::<f64>() / data.len() as f64;
                Ok(json!({
                    "count": data.len(),
                    "mean": mean,
                    "median": median(&data),
                    "stddev": sample_stddev(&data, mean),
                    "min": data.iter().copied().fold(f64::INFINITY, f64::min),
                    "max": data.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }))
            })
        }),
        cache: Some(CachePolicy {
            namespace: "analysis".into(),
            ttl: Duration::from_secs(600),
            priority: Priority::Medium,
            tags: vec!["statistics".into()],
        }),
        external: None,
    }
}

/// `correlation`: Pearson correlation of two equal-length datasets.
pub fn correlation_spec() -> ToolSpec {
    ToolSpec {
        name: "correlation".into(),
        description: "Pearson correlation coefficient between two numeric datasets".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "x": {"type": "array", "items": {"type": "number"}, "minItems": 2},
                "y": {"type": "array", "items": {"type": "number"}, "minItems": 2}
            },
            "required": ["x", "y"]
        }),
        handler: Arc::new(|params, _ctx| {
            Box::pin(async move {
                let x = numbers(&params, "x")?;
                let y = numbers(&params, "y")?;
                if x.len() != y.len() {
                    return Err(AnalyticalError::validation(format!(
                        "x and y must have equal length ({} vs {})",
                        x.len(),
                        y.len()
                    )));
                }
                let r = pearson(&x, &y)?;
                Ok(json!({"coefficient": r, "n": x.len()}))
            })
        }),
        cache: Some(CachePolicy {
            namespace: "analysis".into(),
            ttl: Duration::from_secs(600),
            priority: Priority::Medium,
            tags: vec!["statistics".into()],
        }),
        external: None,
    }
}

fn numbers(params: &Value, field: &str) -> Result<Vec<f64>> {
    let items = params[field].as_array().ok_or_else(|| {
        AnalyticalError::missing_parameter(field.to_string())
    })?;
    let data: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
    if data.len() != items.len() {
        return Err(AnalyticalError::new(
            ErrorCode::InvalidParameterType,
            format!("{field} must contain only finite numbers"),
        ));
    }
    if data.is_empty() {
        return Err(AnalyticalError::processing(
            ErrorCode::InsufficientData,
            format!("{field} is empty"),
        ));
    }
    Ok(data)
}

fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sample_stddev(data: &[f64], mean: f64) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

fn pearson(x: &[f64], y: &[f64]) -> Result<f64> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return Err(AnalyticalError::processing(
            ErrorCode::CalculationFailed,
            "correlation undefined for constant input",
        ));
    }
    Ok(cov / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolContext;

    #[tokio::test]
    async fn analyze_dataset_computes_summary() {
        let spec = analyze_dataset_spec();
        let out = (spec.handler)(json!({"data": [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out["count"], 8);
        assert_eq!(out["mean"], 5.0);
        assert_eq!(out["median"], 4.5);
        assert_eq!(out["min"], 2.0);
        assert_eq!(out["max"], 9.0);
        let stddev = out["stddev"].as_f64().unwrap();
        assert!((stddev - 2.138).abs() < 0.01);
    }

    #[tokio::test]
    async fn empty_dataset_is_insufficient_data() {
        let spec = analyze_dataset_spec();
        let err = (spec.handler)(json!({"data": []}), ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientData);
    }

    #[tokio::test]
    async fn correlation_of_linear_data_is_one() {
        let spec = correlation_spec();
        let out = (spec.handler)(
            json!({"x": [1.0, 2.0, 3.0, 4.0], "y": [2.0, 4.0, 6.0, 8.0]}),
            ToolContext::default(),
        )
        .await
        .unwrap();
        let r = out["coefficient"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mismatched_lengths_are_rejected() {
        let spec = correlation_spec();
        let err = (spec.handler)(
            json!({"x": [1.0, 2.0], "y": [1.0, 2.0, 3.0]}),
            ToolContext::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn constant_input_cannot_correlate() {
        let spec = correlation_spec();
        let err = (spec.handler)(
            json!({"x": [3.0, 3.0, 3.0], "y": [1.0, 2.0, 3.0]}),
            ToolContext::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CalculationFailed);
    }
}
