//! Table assembly: ordering, rounding and text cells for the per-folder rows.

use crate::metrics::round_to;
use crate::model::AggregateRow;
use serde::Serialize;

/// Headline columns, in the order downstream reports expect them.
pub const HEADLINE_COLUMNS: [&str; 8] = [
    "NUMBER OF CONCURRENT",
    "INPUT LENGTH",
    "OUTPUT LENGTH",
    "INITIAL (S)",
    "TOKEN GENERATION SPEED",
    "TOKENS/S/USER (OUT)",
    "TOKENS/S/USER (OUT + INPUT)",
    "THROUGHPUT/S",
];

pub const EXTENDED_COLUMNS: [&str; 13] = [
    "VALID REQUESTS",
    "TOTAL REQUESTS",
    "ERROR REQUESTS",
    "ERROR RATE",
    "TTFT P50 (S)",
    "TTFT P95 (S)",
    "E2E MEAN (S)",
    "E2E P50 (S)",
    "E2E P95 (S)",
    "TOKEN GEN SPEED (TOK/S)",
    "ERROR CODES",
    "MODEL",
    "FOLDER",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<AggregateRow>,
}

impl Table {
    /// Build the table sorted by concurrency; equal levels keep their input order.
    pub fn from_rows(mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by_key(|r| r.concurrency);
        Self { rows }
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Round every float column to `decimals` places.
    pub fn round_floats(&mut self, decimals: u32) {
        for row in &mut self.rows {
            for v in [
                &mut row.ttft_mean_s,
                &mut row.token_generation_s_per_token,
                &mut row.tokens_per_s_user_out,
                &mut row.tokens_per_s_user_total,
                &mut row.throughput_per_s,
                &mut row.ttft_p50_s,
                &mut row.ttft_p95_s,
                &mut row.e2e_mean_s,
                &mut row.e2e_p50_s,
                &mut row.e2e_p95_s,
                &mut row.token_generation_tok_per_s,
                &mut row.error_rate,
            ] {
                *v = round_to(*v, decimals);
            }
        }
    }

    /// Headline columns first, then the extended diagnostics.
    pub fn headers() -> Vec<&'static str> {
        HEADLINE_COLUMNS
            .iter()
            .chain(EXTENDED_COLUMNS.iter())
            .copied()
            .collect()
    }

    /// Cell texts of one row in [`Table::headers`] order. `na` stands in for undefined values.
    pub fn cells(row: &AggregateRow, na: &str) -> Vec<String> {
        let float = |v: f64| {
            if v.is_nan() {
                na.to_string()
            } else if v.fract() == 0.0 && v.abs() < 1e16 {
                // Whole values keep their decimal point: `812.0`, not `812`.
                format!("{v:.1}")
            } else {
                v.to_string()
            }
        };
        let int = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_else(|| na.to_string());

        vec![
            row.concurrency.to_string(),
            int(row.input_length),
            int(row.output_length),
            float(row.ttft_mean_s),
            float(row.token_generation_s_per_token),
            float(row.tokens_per_s_user_out),
            float(row.tokens_per_s_user_total),
            float(row.throughput_per_s),
            row.valid_requests.to_string(),
            row.total_requests.to_string(),
            row.error_requests.to_string(),
            float(row.error_rate),
            float(row.ttft_p50_s),
            float(row.ttft_p95_s),
            float(row.e2e_mean_s),
            float(row.e2e_p50_s),
            float(row.e2e_p95_s),
            float(row.token_generation_tok_per_s),
            row.error_codes_json(),
            row.model.clone(),
            row.folder.clone(),
        ]
    }
}
