use std::path::Path;

use super::logs_read::{LogValidateOutcome, REQUIRED_FIELDS};
use super::{load_entries, validate_runs_jsonl_file};
use crate::paths::LogLayout;
use crate::types::LogEntry;

fn print_validate_summary(app_name: &str, log_file: &Path, outcome: &LogValidateOutcome) {
    println!("== {app_name} logs validate ==");
    println!("log_file: {}", log_file.display());
    println!("entries_scanned: {}", outcome.total);
    println!("required_fields: {}", REQUIRED_FIELDS.len());
    println!("corrupted_entries: {}", outcome.corrupted_lines.len());
    println!("invalid_json_entries: {}", outcome.invalid_json_lines);
    println!("issue_count: {}", outcome.issues.len());
}

fn validate_outcome_status(outcome: &LogValidateOutcome) -> i32 {
    if outcome.issues.is_empty() {
        println!("status: ok");
        return 0;
    }
    for issue in outcome.issues.iter().take(20) {
        println!("- {issue}");
    }
    if outcome.issues.len() > 20 {
        println!("- ... and {} more", outcome.issues.len() - 20);
    }
    println!("status: invalid");
    1
}

fn handle_validate(app_name: &str, layout: &LogLayout) -> i32 {
    let log_file = layout.run_log();
    if !log_file.exists() {
        println!(
            "{app_name} logs validate: no log file at {}",
            log_file.display()
        );
        return 0;
    }
    match validate_runs_jsonl_file(&log_file) {
        Ok(outcome) => {
            print_validate_summary(app_name, &log_file, &outcome);
            validate_outcome_status(&outcome)
        }
        Err(e) => {
            crate::cx_eprintln!("{app_name} logs validate: {e}");
            1
        }
    }
}

/// Mean over the rows that report the metric; `None` when no row does.
fn mean_present(rows: &[LogEntry], f: impl Fn(&LogEntry) -> Option<u64>) -> Option<f64> {
    let values: Vec<u64> = rows.iter().filter_map(f).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<u64>() as f64 / values.len() as f64)
}

fn fmt_mean(v: Option<f64>) -> String {
    v.map(|m| format!("{m:.1}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn handle_stats(app_name: &str, layout: &LogLayout, args: &[String]) -> i32 {
    let n = match args.get(1).map(|s| s.parse::<usize>()) {
        None => 50,
        Some(Ok(v)) if v > 0 => v,
        Some(_) => {
            crate::cx_eprintln!("Usage: {app_name} logs stats [N]");
            return 2;
        }
    };
    let log_file = layout.run_log();
    if !log_file.exists() {
        println!("{app_name} logs stats: no log file at {}", log_file.display());
        return 0;
    }
    let rows = match load_entries(&log_file, n) {
        Ok(v) => v,
        Err(e) => {
            crate::cx_eprintln!("{app_name} logs stats: {e}");
            return 1;
        }
    };
    let invalid = rows
        .iter()
        .filter(|r| r.schema_enforced && r.schema_valid == Some(false))
        .count();
    println!("== {app_name} logs stats ==");
    println!("log_file: {}", log_file.display());
    println!("window_runs: {}", rows.len());
    println!("avg_duration_ms: {}", fmt_mean(mean_present(&rows, |r| r.duration_ms)));
    println!(
        "avg_effective_input_tokens: {}",
        fmt_mean(mean_present(&rows, |r| r.effective_input_tokens))
    );
    println!(
        "avg_output_tokens: {}",
        fmt_mean(mean_present(&rows, |r| r.output_tokens))
    );
    println!("schema_failures: {invalid}");
    0
}

pub fn cmd_logs(app_name: &str, layout: &LogLayout, args: &[String]) -> i32 {
    match args.first().map(String::as_str).unwrap_or("validate") {
        "validate" => handle_validate(app_name, layout),
        "stats" => handle_stats(app_name, layout, args),
        other => {
            crate::cx_eprintln!(
                "Usage: {app_name} logs <validate|stats> (unknown subcommand: {other})"
            );
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mean_present;
    use crate::types::LogEntry;

    #[test]
    fn nulls_are_excluded_from_means() {
        let rows = vec![
            LogEntry {
                duration_ms: Some(100),
                ..LogEntry::default()
            },
            LogEntry::default(),
            LogEntry {
                duration_ms: Some(300),
                ..LogEntry::default()
            },
        ];
        assert_eq!(mean_present(&rows, |r| r.duration_ms), Some(200.0));
        assert_eq!(mean_present(&rows, |r| r.output_tokens), None);
    }
}
