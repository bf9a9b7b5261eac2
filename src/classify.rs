//! Per-request validation.
//!
//! Checks run in a fixed order and the first failure wins. An explicit error code
//! is checked first: once the provider reports a failure the numeric fields of
//! that record are not trustworthy.

use crate::metrics::opt_to_float;
use crate::model::{display_value, ClassifiedRecord, ErrorReason, RawRequestRecord, ValidRequest};
use serde_json::Value;

/// `error_code` values that mean "no error".
fn is_success_code(code: &Value) -> bool {
    match code {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        _ => false,
    }
}

pub fn classify(record: &RawRequestRecord) -> ClassifiedRecord<'_> {
    let errored = |reason| ClassifiedRecord::Errored { record, reason };

    if let Some(code) = record.error_code.as_ref() {
        if !is_success_code(code) {
            return errored(ErrorReason::ExplicitErrorCode(display_value(code)));
        }
    }

    let e2e_s = opt_to_float(record.end_to_end_latency_s.as_ref());
    if !e2e_s.is_finite() || e2e_s <= 0.0 {
        return errored(ErrorReason::BadE2eLatency);
    }

    let output_tokens = opt_to_float(record.number_output_tokens.as_ref());
    if !output_tokens.is_finite() || output_tokens <= 0.0 {
        return errored(ErrorReason::BadOutputTokens);
    }

    // Zero prompt tokens is a legal request.
    let input_tokens = opt_to_float(record.number_input_tokens.as_ref());
    if !input_tokens.is_finite() || input_tokens < 0.0 {
        return errored(ErrorReason::BadInputTokens);
    }

    ClassifiedRecord::Valid(ValidRequest {
        record,
        e2e_s,
        output_tokens,
        input_tokens,
    })
}
