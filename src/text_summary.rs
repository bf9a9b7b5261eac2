//! Text summary builder for CLI output.
//!
//! This module formats the assembled table as human-readable lines for text mode.

use crate::table::Table;
use comfy_table::presets::ASCII_BORDERS_ONLY_CONDENSED;
use comfy_table::{CellAlignment, ContentArrangement};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from the assembled table.
pub(crate) fn build_text_summary(table: &Table, skipped: usize) -> TextSummary {
    let mut console = comfy_table::Table::new();
    console
        .load_preset(ASCII_BORDERS_ONLY_CONDENSED)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(Table::headers());

    for row in table.rows() {
        console.add_row(Table::cells(row, "NaN"));
    }
    // Numbers read better right-aligned; the last three columns are text.
    let numeric = Table::headers().len() - 3;
    for idx in 0..numeric {
        if let Some(column) = console.column_mut(idx) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    let mut lines: Vec<String> = console.lines().collect();
    lines.push(String::new());
    let mut footer = format!("Folders: {} summarized", table.rows().len());
    if skipped > 0 {
        footer.push_str(&format!(", {skipped} skipped (missing summary or individual responses)"));
    }
    lines.push(footer);

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::model::{FolderRunSummary, RawRequestRecord};
    use serde_json::json;
    use std::path::Path;

    fn table() -> Table {
        let requests: Vec<RawRequestRecord> = serde_json::from_value(json!([
            {"end_to_end_latency_s": 2.0, "number_output_tokens": 10, "number_input_tokens": 20, "ttft_s": 0.5}
        ]))
        .unwrap();
        let summary = FolderRunSummary::from(json!({
            "results_mean_output_throughput_token_per_s": 5.0,
            "model": "tiny"
        }));
        let row = aggregate(&requests, &summary, Path::new("concurrency_4")).unwrap();
        Table::from_rows(vec![row])
    }

    #[test]
    fn renders_headers_and_rows() {
        let summary = build_text_summary(&table(), 0);
        let text = summary.lines.join("\n");
        assert!(text.contains("NUMBER OF CONCURRENT"));
        assert!(text.contains("THROUGHPUT/S"));
        assert!(text.contains("tiny"));
        assert!(text.contains("concurrency_4"));
        assert_eq!(summary.lines.last().unwrap(), "Folders: 1 summarized");
    }

    #[test]
    fn reports_skipped_folders() {
        let summary = build_text_summary(&table(), 2);
        assert!(summary.lines.last().unwrap().contains("2 skipped"));
    }
}
