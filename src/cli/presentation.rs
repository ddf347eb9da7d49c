//! CLI presentation: text and JSON rendering of command results.

use crate::error::{ApiError, StorageError};
use crate::idempotency::GenerationRecord;
use crate::progress::ProgressEvent;
use crate::resilience::MetricsSnapshot;
use crate::workflow::EnsureReport;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

fn record_state(record: &GenerationRecord) -> String {
    if record.is_complete() {
        "complete".to_string()
    } else if !record.last_error.is_empty() {
        format!("failed: {}", record.last_error)
    } else {
        "in progress".to_string()
    }
}

fn files_table(record: &GenerationRecord) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["File", "Task", "Main", "Checksum", "Created"]);
    for file in &record.files {
        table.add_row(vec![
            file.name.clone(),
            file.task_id.clone(),
            if file.is_main { "yes" } else { "" }.to_string(),
            file.checksum.chars().take(12).collect::<String>(),
            file.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    table
}

pub fn format_ensure_report(report: &EnsureReport, metrics: Option<&MetricsSnapshot>) -> String {
    let record = &report.record;
    let mut out = String::new();
    if report.reused {
        out.push_str(&format!(
            "Workflow {}: inputs unchanged, reusing {} artifact(s)\n",
            record.workflow_id,
            record.files.len()
        ));
    } else {
        out.push_str(&format!(
            "Workflow {}: generated {} artifact(s) in {} round(s)\n",
            record.workflow_id,
            record.files.len(),
            report.rounds
        ));
    }
    if !record.files.is_empty() {
        out.push_str(&format!("\n{}\n", files_table(record)));
    }
    if !report.batch_errors.is_empty() {
        out.push_str(&format!(
            "\nRecovered from {} batch failure(s):\n",
            report.batch_errors.len()
        ));
        for err in &report.batch_errors {
            out.push_str(&format!("  - {}\n", err));
        }
    }
    if let Some(m) = metrics.filter(|m| m.total_calls > 0) {
        out.push_str(&format!(
            "\nAgent calls: {} ({} ok, {} failed), success rate {:.0}%, avg latency {:.0} ms\n",
            m.total_calls,
            m.successful_calls,
            m.failed_calls,
            m.success_rate * 100.0,
            m.average_latency_ms
        ));
    }
    out.trim_end().to_string()
}

pub fn format_status_text(
    workflow_id: &str,
    record: Option<&GenerationRecord>,
    latest: Option<&ProgressEvent>,
) -> String {
    let Some(record) = record else {
        return format!("No generation record for workflow {}", workflow_id);
    };
    let mut out = String::new();
    out.push_str(&format!("Workflow: {}\n", record.workflow_id));
    out.push_str(&format!("State: {}\n", record_state(record)));
    out.push_str(&format!("Input checksum: {}\n", record.input_checksum));
    out.push_str(&format!("Started: {}\n", record.started_at.to_rfc3339()));
    if let Some(completed) = record.completed_at {
        out.push_str(&format!("Completed: {}\n", completed.to_rfc3339()));
    }
    if let Some(event) = latest {
        out.push_str(&format!(
            "Last progress: {} {}/{} ({})\n",
            event.update.stage, event.update.current, event.update.total, event.ts
        ));
    }
    if record.files.is_empty() {
        out.push_str("\nNo files recorded\n");
    } else {
        out.push_str(&format!("\n{}\n", files_table(record)));
    }
    if record.has_existing_issues() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Issue", "Task", "URL"]);
        for issue in &record.issues {
            table.add_row(vec![
                format!("#{}", issue.number),
                issue.task_id.clone(),
                issue.url.clone(),
            ]);
        }
        out.push_str(&format!("\n{}\n", table));
    }
    out.trim_end().to_string()
}

pub fn format_status_json(
    workflow_id: &str,
    record: Option<&GenerationRecord>,
    latest: Option<&ProgressEvent>,
) -> Result<String, ApiError> {
    let value = json!({
        "workflow_id": workflow_id,
        "complete": record.map(|r| r.is_complete()).unwrap_or(false),
        "record": record,
        "last_progress": latest,
    });
    serde_json::to_string_pretty(&value)
        .map_err(|e| ApiError::StorageError(StorageError::from(e)))
}
