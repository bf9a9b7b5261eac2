//! Numeric helpers shared by the classifier and the folder aggregator.
//!
//! "No data" is NaN throughout. Every aggregation drops non-finite values first,
//! so an empty input yields NaN rather than a panic or a misleading zero.

use crate::model::InterTokenLatency;
use serde_json::Value;

/// Coerce a JSON value to `f64`, NaN when it is not numeric.
pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Like [`to_float`] for an optional field; a missing field is NaN.
pub fn opt_to_float(value: Option<&Value>) -> f64 {
    value.map(to_float).unwrap_or(f64::NAN)
}

/// Coerce through float and truncate. `None` means "not provided", distinct from zero.
pub fn to_int(value: &Value) -> Option<i64> {
    let f = to_float(value);
    if f.is_finite() {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean of the finite values, NaN if there are none.
pub fn mean(values: &[f64]) -> f64 {
    let vals = finite(values);
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Linear-interpolated quantile of already sorted, finite, non-empty values.
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Quantiles of the finite values using linear interpolation between closest ranks.
///
/// Each requested quantile is NaN on its own when no finite values remain.
pub fn quantiles<const N: usize>(values: &[f64], qs: [f64; N]) -> [f64; N] {
    let mut sorted = finite(values);
    if sorted.is_empty() {
        return [f64::NAN; N];
    }
    sorted.sort_by(f64::total_cmp);
    qs.map(|q| interpolate(&sorted, q))
}

/// Flatten per-request inter-token latencies into one finite series.
///
/// Missing entries are skipped and nested series are flattened one level. The
/// result is never empty: with no usable value it is a single NaN, which keeps
/// the mean of the series NaN.
pub fn flatten_latency_series<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<&'a InterTokenLatency>>,
{
    let mut out = Vec::new();
    for value in values.into_iter().flatten() {
        match value {
            InterTokenLatency::Series(items) => out.extend(items.iter().map(to_float)),
            InterTokenLatency::Scalar(Value::Null) => {}
            InterTokenLatency::Scalar(v) => out.push(to_float(v)),
        }
    }
    out.retain(|v| v.is_finite());
    if out.is_empty() {
        return vec![f64::NAN];
    }
    out
}

/// Round to the given number of decimals, ties to even. NaN stays NaN.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals as i32);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / scale
}

/// Round a mean to the nearest integer (ties to even), `None` if undefined.
pub fn round_to_int(value: f64) -> Option<i64> {
    if value.is_finite() {
        Some(value.round_ties_even() as i64)
    } else {
        None
    }
}
