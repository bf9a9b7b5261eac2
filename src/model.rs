use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the wall-clock throughput figure in an llmperf summary document.
pub const THROUGHPUT_KEY: &str = "results_mean_output_throughput_token_per_s";

/// Summary keys that may carry the concurrency level, highest priority first.
pub const CONCURRENCY_KEYS: [&str; 3] = ["num_concurrent_requests", "concurrency", "num_concurrent"];

/// One request's raw telemetry from an `*_individual_responses.json` file.
///
/// Numeric fields stay as raw JSON values: instrumentation versions disagree on
/// types (ints, floats, numeric strings, nulls) and the classifier decides what
/// is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequestRecord {
    #[serde(default)]
    pub error_code: Option<Value>,
    #[serde(default)]
    pub end_to_end_latency_s: Option<Value>,
    #[serde(default)]
    pub number_output_tokens: Option<Value>,
    #[serde(default)]
    pub number_input_tokens: Option<Value>,
    #[serde(default)]
    pub ttft_s: Option<Value>,
    #[serde(default)]
    pub inter_token_latency_s: Option<InterTokenLatency>,
}

/// Inter-token latency as reported by a single request.
///
/// Older llmperf builds report a scalar mean, newer ones the full per-token series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InterTokenLatency {
    Series(Vec<Value>),
    Scalar(Value),
}

/// The run-level `*_summary.json` object of one concurrency folder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct FolderRunSummary(pub Map<String, Value>);

impl FolderRunSummary {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Model identifier, empty when the summary has no `model` key.
    pub fn model(&self) -> String {
        self.0.get("model").map(display_value).unwrap_or_default()
    }
}

/// Text form of a JSON scalar as llmperf's Python tooling prints it
/// (`None`, `True`, `False`); strings are taken verbatim.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<Value> for FolderRunSummary {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Why a request was excluded from the valid set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReason {
    /// The provider reported a failure; carries the code's string form.
    ExplicitErrorCode(String),
    BadE2eLatency,
    BadOutputTokens,
    BadInputTokens,
}

impl ErrorReason {
    /// Key under which this reason is tallied in the `ERROR CODES` column.
    pub fn tally_key(&self) -> &str {
        match self {
            ErrorReason::ExplicitErrorCode(code) => code,
            ErrorReason::BadE2eLatency => "bad_e2e",
            ErrorReason::BadOutputTokens => "bad_out_tokens",
            ErrorReason::BadInputTokens => "bad_in_tokens",
        }
    }
}

/// A request that passed validation, with its checked numeric fields.
#[derive(Debug, Clone, Copy)]
pub struct ValidRequest<'a> {
    pub record: &'a RawRequestRecord,
    pub e2e_s: f64,
    pub output_tokens: f64,
    pub input_tokens: f64,
}

#[derive(Debug, Clone)]
pub enum ClassifiedRecord<'a> {
    Valid(ValidRequest<'a>),
    Errored {
        record: &'a RawRequestRecord,
        reason: ErrorReason,
    },
}

/// One output row: the metrics of a single concurrency folder.
///
/// Field names serialize to the column names downstream consumers expect.
/// Undefined measurements are NaN, never zero.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateRow {
    #[serde(rename = "NUMBER OF CONCURRENT")]
    pub concurrency: i64,
    #[serde(rename = "INPUT LENGTH")]
    pub input_length: Option<i64>,
    #[serde(rename = "OUTPUT LENGTH")]
    pub output_length: Option<i64>,
    #[serde(rename = "INITIAL (S)")]
    pub ttft_mean_s: f64,
    #[serde(rename = "TOKEN GENERATION SPEED")]
    pub token_generation_s_per_token: f64,
    #[serde(rename = "TOKENS/S/USER (OUT)")]
    pub tokens_per_s_user_out: f64,
    #[serde(rename = "TOKENS/S/USER (OUT + INPUT)")]
    pub tokens_per_s_user_total: f64,
    #[serde(rename = "THROUGHPUT/S")]
    pub throughput_per_s: f64,

    #[serde(rename = "VALID REQUESTS")]
    pub valid_requests: usize,
    #[serde(rename = "TOTAL REQUESTS")]
    pub total_requests: usize,
    #[serde(rename = "ERROR REQUESTS")]
    pub error_requests: usize,
    #[serde(rename = "ERROR RATE")]
    pub error_rate: f64,
    #[serde(rename = "TTFT P50 (S)")]
    pub ttft_p50_s: f64,
    #[serde(rename = "TTFT P95 (S)")]
    pub ttft_p95_s: f64,
    #[serde(rename = "E2E MEAN (S)")]
    pub e2e_mean_s: f64,
    #[serde(rename = "E2E P50 (S)")]
    pub e2e_p50_s: f64,
    #[serde(rename = "E2E P95 (S)")]
    pub e2e_p95_s: f64,
    #[serde(rename = "TOKEN GEN SPEED (TOK/S)")]
    pub token_generation_tok_per_s: f64,
    #[serde(rename = "ERROR CODES")]
    pub error_codes: BTreeMap<String, usize>,
    #[serde(rename = "MODEL")]
    pub model: String,
    #[serde(rename = "FOLDER")]
    pub folder: String,
}

impl AggregateRow {
    /// `ERROR CODES` as JSON object text, spaced like Python's `json.dumps`:
    /// `{"500": 2, "bad_e2e": 1}`.
    pub fn error_codes_json(&self) -> String {
        let entries: Vec<String> = self
            .error_codes
            .iter()
            .map(|(code, count)| format!("{}: {count}", Value::String(code.clone())))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}
