//! Filesystem side: finding concurrency folders, loading their llmperf
//! documents, and writing the assembled table.

use crate::aggregate::aggregate;
use crate::model::{AggregateRow, FolderRunSummary, RawRequestRecord};
use crate::table::Table;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FOLDER_PREFIX: &str = "concurrency_";
const SUMMARY_SUFFIX: &str = "_summary.json";
const INDIVIDUAL_SUFFIX: &str = "_individual_responses.json";

/// The two parsed documents of one concurrency folder.
#[derive(Debug, Clone)]
pub struct FolderDocuments {
    pub requests: Vec<RawRequestRecord>,
    pub summary: FolderRunSummary,
}

fn is_concurrency_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FOLDER_PREFIX))
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        entries.push(entry.with_context(|| format!("read dir {}", dir.display()))?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Walk below `base` without following symlinks, so a linked run folder is not listed twice.
fn collect_recursive(base: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", base.display()))?;
        let matches = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(FOLDER_PREFIX));
        if matches {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// `concurrency_*` folders directly under `base`, or anywhere below it when there are none.
pub fn discover_concurrency_dirs(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.exists() {
        anyhow::bail!("base dir not found: {}", base.display());
    }

    let mut dirs: Vec<PathBuf> = list_dir(base)?
        .into_iter()
        .filter(|p| is_concurrency_dir(p))
        .collect();
    if dirs.is_empty() {
        tracing::debug!(base = %base.display(), "no top-level concurrency folders, searching recursively");
        dirs = collect_recursive(base)?;
        dirs.sort();
    }
    if dirs.is_empty() {
        anyhow::bail!("no {FOLDER_PREFIX}* folders found under: {}", base.display());
    }
    Ok(dirs)
}

/// First file in `dir` (by name) whose name ends with `suffix`.
pub fn find_one(dir: &Path, suffix: &str) -> Result<Option<PathBuf>> {
    Ok(list_dir(dir)?.into_iter().find(|p| {
        p.is_file()
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
    }))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

/// Load both documents of a folder; `None` when either one is absent.
pub fn load_folder(dir: &Path) -> Result<Option<FolderDocuments>> {
    let summary_path = find_one(dir, SUMMARY_SUFFIX)?;
    let individual_path = find_one(dir, INDIVIDUAL_SUFFIX)?;
    let (Some(summary_path), Some(individual_path)) = (summary_path, individual_path) else {
        tracing::warn!(folder = %dir.display(), "missing summary or individual responses, skipping");
        return Ok(None);
    };

    Ok(Some(FolderDocuments {
        requests: load_json(&individual_path)?,
        summary: load_json(&summary_path)?,
    }))
}

/// Load and aggregate one folder. Throughput errors are fatal and carry the folder name.
pub fn compute_folder(dir: &Path) -> Result<Option<AggregateRow>> {
    let Some(docs) = load_folder(dir)? else {
        return Ok(None);
    };
    let row = aggregate(&docs.requests, &docs.summary, dir)?;
    tracing::info!(
        folder = %dir.display(),
        concurrency = row.concurrency,
        valid = row.valid_requests,
        total = row.total_requests,
        "computed folder metrics"
    );
    Ok(Some(row))
}

/// Wrap a field value in quotes and escape any embedded quotes.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render the table as CSV. Undefined values are empty cells.
pub fn table_to_csv(table: &Table) -> String {
    let mut out = String::new();
    let header: Vec<String> = Table::headers().into_iter().map(csv_escape).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in table.rows() {
        let cells: Vec<String> = Table::cells(row, "")
            .iter()
            .map(|c| csv_escape(c))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

pub fn export_csv(path: &Path, table: &Table) -> Result<()> {
    std::fs::write(path, table_to_csv(table))
        .with_context(|| format!("write CSV {}", path.display()))
}

pub fn export_json(path: &Path, table: &Table) -> Result<()> {
    let out = serde_json::to_string_pretty(table)?;
    std::fs::write(path, out).with_context(|| format!("write JSON {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ThroughputError;
    use serde_json::json;
    use std::fs;

    fn write_folder(
        base: &Path,
        name: &str,
        summary: serde_json::Value,
        requests: serde_json::Value,
    ) -> PathBuf {
        let dir = base.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("model_10_summary.json"), summary.to_string()).unwrap();
        fs::write(
            dir.join("model_10_individual_responses.json"),
            requests.to_string(),
        )
        .unwrap();
        dir
    }

    fn ok_request() -> serde_json::Value {
        json!({
            "error_code": null,
            "end_to_end_latency_s": 2.0,
            "number_output_tokens": 100,
            "number_input_tokens": 500,
            "ttft_s": 0.25,
            "inter_token_latency_s": [0.02, 0.02]
        })
    }

    #[test]
    fn discovers_top_level_folders_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("concurrency_8")).unwrap();
        fs::create_dir_all(tmp.path().join("concurrency_1")).unwrap();
        fs::create_dir_all(tmp.path().join("other")).unwrap();
        fs::write(tmp.path().join("concurrency_2"), "not a dir").unwrap();

        let dirs = discover_concurrency_dirs(tmp.path()).unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["concurrency_1", "concurrency_8"]);
    }

    #[test]
    fn falls_back_to_recursive_search() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("run_a/concurrency_4")).unwrap();
        fs::create_dir_all(tmp.path().join("run_b/nested/concurrency_2")).unwrap();

        let dirs = discover_concurrency_dirs(tmp.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("run_a/concurrency_4"));
        assert!(dirs[1].ends_with("run_b/nested/concurrency_2"));
    }

    #[cfg(unix)]
    #[test]
    fn recursive_search_skips_symlinked_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("run_a/concurrency_4")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("run_a"), tmp.path().join("latest")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("run_a"), tmp.path().join("run_a/back"))
            .unwrap();

        let dirs = discover_concurrency_dirs(tmp.path()).unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("run_a/concurrency_4"));
    }

    #[test]
    fn discovery_errors_name_the_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_concurrency_dirs(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no concurrency_* folders"));

        let missing = tmp.path().join("nope");
        let err = discover_concurrency_dirs(&missing).unwrap_err();
        assert!(err.to_string().contains("base dir not found"));
    }

    #[test]
    fn folder_without_documents_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("concurrency_1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("x_summary.json"), "{}").unwrap();

        assert!(load_folder(&dir).unwrap().is_none());
        assert!(compute_folder(&dir).unwrap().is_none());
    }

    #[test]
    fn computes_row_from_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_folder(
            tmp.path(),
            "concurrency_10",
            json!({
                "model": "meta-llama/Llama-3-8B",
                "results_mean_output_throughput_token_per_s": 480.5
            }),
            json!([ok_request(), ok_request(), {"error_code": 503}]),
        );

        let row = compute_folder(&dir).unwrap().unwrap();
        assert_eq!(row.concurrency, 10);
        assert_eq!(row.valid_requests, 2);
        assert_eq!(row.error_requests, 1);
        assert_eq!(row.input_length, Some(500));
        assert_eq!(row.output_length, Some(100));
        assert_eq!(row.tokens_per_s_user_out, 50.0);
        assert_eq!(row.tokens_per_s_user_total, 300.0);
        assert_eq!(row.throughput_per_s, 480.5);
        assert_eq!(row.model, "meta-llama/Llama-3-8B");
        assert_eq!(row.folder, dir.display().to_string());
    }

    #[test]
    fn missing_throughput_propagates_with_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_folder(tmp.path(), "concurrency_3", json!({}), json!([ok_request()]));

        let err = compute_folder(&dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ThroughputError>(),
            Some(ThroughputError::Missing { .. })
        ));
        assert!(err.to_string().contains("concurrency_3"));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("concurrency_1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a_summary.json"), "{}").unwrap();
        fs::write(dir.join("a_individual_responses.json"), "[{").unwrap();

        let err = load_folder(&dir).unwrap_err();
        assert!(format!("{err:#}").contains("a_individual_responses.json"));
    }

    #[test]
    fn csv_quotes_structured_cells() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_folder(
            tmp.path(),
            "concurrency_2",
            json!({"results_mean_output_throughput_token_per_s": 10.0, "model": "a,b"}),
            json!([{"error_code": 429}, {"error_code": "bad"}]),
        );
        let row = compute_folder(&dir).unwrap().unwrap();
        let table = Table::from_rows(vec![row]);
        let csv = table_to_csv(&table);
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("NUMBER OF CONCURRENT,INPUT LENGTH,OUTPUT LENGTH,"));
        let data = lines.next().unwrap();
        assert!(data.starts_with("2,,,"));
        assert!(data.contains(r#""{""429"": 1, ""bad"": 1}""#));
        assert!(data.contains(",10.0,"));
        assert!(data.contains(r#","a,b","#));
        assert!(lines.next().is_none());

        let out = tmp.path().join("table.csv");
        export_csv(&out, &table).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), csv);
    }

    #[test]
    fn json_export_writes_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_folder(
            tmp.path(),
            "concurrency_5",
            json!({"results_mean_output_throughput_token_per_s": 99.0, "concurrency": 6}),
            json!([ok_request()]),
        );
        let table = Table::from_rows(vec![compute_folder(&dir).unwrap().unwrap()]);
        let out = tmp.path().join("table.json");
        export_json(&out, &table).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written[0]["NUMBER OF CONCURRENT"], json!(6));
        assert_eq!(written[0]["THROUGHPUT/S"], json!(99.0));
        assert_eq!(written[0]["ERROR CODES"], json!({}));
    }
}
