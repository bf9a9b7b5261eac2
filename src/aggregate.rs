//! Folder-level aggregation: one [`AggregateRow`] per concurrency folder.
//!
//! Per-request problems only degrade the row (they are counted, never fatal).
//! The wall-clock throughput is the exception: it must come from the run summary
//! and a missing or non-numeric value aborts the folder.

use crate::classify::classify;
use crate::metrics::{self, flatten_latency_series, opt_to_float, quantiles, round_to_int};
use crate::model::{
    AggregateRow, ClassifiedRecord, FolderRunSummary, RawRequestRecord, ValidRequest,
    CONCURRENCY_KEYS, THROUGHPUT_KEY,
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Fatal problems with a folder's authoritative throughput figure.
#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error(
        "[{folder}] missing '{key}' in summary.json; no fallback is computed, re-run the benchmark to generate a complete summary"
    )]
    Missing { folder: String, key: &'static str },

    #[error("[{folder}] '{key}' is not a finite number: {value}")]
    Invalid {
        folder: String,
        key: &'static str,
        value: Value,
    },
}

static FOLDER_CONCURRENCY: OnceLock<Regex> = OnceLock::new();

fn folder_concurrency_re() -> &'static Regex {
    FOLDER_CONCURRENCY.get_or_init(|| {
        Regex::new(r"concurrency[_\- ](\d+)").expect("folder concurrency pattern is valid")
    })
}

/// Concurrency encoded in a folder name such as `concurrency_32`, or -1.
pub fn concurrency_from_folder_name(folder: &Path) -> i64 {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    folder_concurrency_re()
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(-1)
}

/// Effective concurrency: the first summary key holding an integer wins over the folder name.
pub fn resolve_concurrency(summary: &FolderRunSummary, folder: &Path) -> i64 {
    CONCURRENCY_KEYS
        .iter()
        .find_map(|key| summary.get(key).and_then(metrics::to_int))
        .unwrap_or_else(|| concurrency_from_folder_name(folder))
}

/// Read the wall-clock output throughput from the summary. Never derived from requests.
pub fn extract_throughput(
    summary: &FolderRunSummary,
    folder: &Path,
) -> Result<f64, ThroughputError> {
    let raw = summary.get(THROUGHPUT_KEY).ok_or_else(|| ThroughputError::Missing {
        folder: folder.display().to_string(),
        key: THROUGHPUT_KEY,
    })?;
    let throughput = metrics::to_float(raw);
    if !throughput.is_finite() {
        return Err(ThroughputError::Invalid {
            folder: folder.display().to_string(),
            key: THROUGHPUT_KEY,
            value: raw.clone(),
        });
    }
    Ok(throughput)
}

/// Compute the metrics row for one folder from its two parsed documents.
pub fn aggregate(
    requests: &[RawRequestRecord],
    summary: &FolderRunSummary,
    folder: &Path,
) -> Result<AggregateRow, ThroughputError> {
    let total_requests = requests.len();
    let mut valid: Vec<ValidRequest<'_>> = Vec::with_capacity(total_requests);
    let mut error_codes: BTreeMap<String, usize> = BTreeMap::new();

    for record in requests {
        match classify(record) {
            ClassifiedRecord::Valid(v) => valid.push(v),
            ClassifiedRecord::Errored { record, reason } => {
                tracing::trace!(
                    error_code = ?record.error_code,
                    reason = reason.tally_key(),
                    "request excluded"
                );
                *error_codes.entry(reason.tally_key().to_string()).or_default() += 1;
            }
        }
    }
    let error_requests = total_requests - valid.len();

    let throughput_per_s = extract_throughput(summary, folder)?;
    let concurrency = resolve_concurrency(summary, folder);
    let error_rate = if total_requests > 0 {
        error_requests as f64 / total_requests as f64
    } else {
        f64::NAN
    };

    tracing::debug!(
        folder = %folder.display(),
        total = total_requests,
        valid = valid.len(),
        errored = error_requests,
        "classified requests"
    );

    let mut row = AggregateRow {
        concurrency,
        input_length: None,
        output_length: None,
        ttft_mean_s: f64::NAN,
        token_generation_s_per_token: f64::NAN,
        tokens_per_s_user_out: f64::NAN,
        tokens_per_s_user_total: f64::NAN,
        throughput_per_s,
        valid_requests: valid.len(),
        total_requests,
        error_requests,
        error_rate,
        ttft_p50_s: f64::NAN,
        ttft_p95_s: f64::NAN,
        e2e_mean_s: f64::NAN,
        e2e_p50_s: f64::NAN,
        e2e_p95_s: f64::NAN,
        token_generation_tok_per_s: f64::NAN,
        error_codes,
        model: summary.model(),
        folder: folder.display().to_string(),
    };

    if valid.is_empty() {
        tracing::warn!(
            folder = %folder.display(),
            total = total_requests,
            "no valid requests; per-request metrics are NaN"
        );
        return Ok(row);
    }

    let ttft: Vec<f64> = valid
        .iter()
        .map(|v| opt_to_float(v.record.ttft_s.as_ref()))
        .collect();
    let e2e: Vec<f64> = valid.iter().map(|v| v.e2e_s).collect();
    let out_tokens: Vec<f64> = valid.iter().map(|v| v.output_tokens).collect();
    let in_tokens: Vec<f64> = valid.iter().map(|v| v.input_tokens).collect();
    // Mean of per-request ratios: every request weighs the same regardless of length.
    let out_per_s: Vec<f64> = valid.iter().map(|v| v.output_tokens / v.e2e_s).collect();
    let total_per_s: Vec<f64> = valid
        .iter()
        .map(|v| (v.input_tokens + v.output_tokens) / v.e2e_s)
        .collect();
    let inter_token = flatten_latency_series(
        valid
            .iter()
            .map(|v| v.record.inter_token_latency_s.as_ref()),
    );

    let s_per_token = metrics::mean(&inter_token);
    let [ttft_p50_s, ttft_p95_s] = quantiles(&ttft, [0.5, 0.95]);
    let [e2e_p50_s, e2e_p95_s] = quantiles(&e2e, [0.5, 0.95]);

    row.input_length = round_to_int(metrics::mean(&in_tokens));
    row.output_length = round_to_int(metrics::mean(&out_tokens));
    row.ttft_mean_s = metrics::mean(&ttft);
    row.token_generation_s_per_token = s_per_token;
    row.tokens_per_s_user_out = metrics::mean(&out_per_s);
    row.tokens_per_s_user_total = metrics::mean(&total_per_s);
    row.ttft_p50_s = ttft_p50_s;
    row.ttft_p95_s = ttft_p95_s;
    row.e2e_mean_s = metrics::mean(&e2e);
    row.e2e_p50_s = e2e_p50_s;
    row.e2e_p95_s = e2e_p95_s;
    row.token_generation_tok_per_s = if s_per_token.is_finite() && s_per_token > 0.0 {
        1.0 / s_per_token
    } else {
        f64::NAN
    };

    Ok(row)
}
