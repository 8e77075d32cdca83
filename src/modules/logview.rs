use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::capture::BudgetPolicy;
use crate::config::APP_NAME;
use crate::logs::load_entries;
use crate::paths::LogLayout;

fn show_field<T: ToString>(label: &str, value: Option<T>) {
    match value {
        Some(v) => println!("{label}: {}", v.to_string()),
        None => println!("{label}: n/a"),
    }
}

pub fn cmd_budget(budget: &BudgetPolicy, layout: &LogLayout) -> i32 {
    let log_file = layout.run_log();
    println!("== {APP_NAME} budget ==");
    println!("CX_CONTEXT_BUDGET_CHARS={}", budget.max_chars);
    println!("CX_CONTEXT_BUDGET_LINES={}", budget.max_lines);
    println!("CX_CONTEXT_CLIP_MODE={}", budget.mode.as_str());
    println!(
        "CX_CONTEXT_CLIP_FOOTER={}",
        if budget.append_footer { "1" } else { "0" }
    );
    println!("log_file: {}", log_file.display());

    if !log_file.exists() {
        return 0;
    }
    let rows = load_entries(&log_file, 1).unwrap_or_default();
    if let Some(last) = rows.last() {
        println!();
        println!("Last run clip fields ({}):", last.tool);
        show_field("outcome", Some(last.outcome.as_str()));
        show_field("system_output_len_raw", last.system_output_len_raw);
        show_field(
            "system_output_len_processed",
            last.system_output_len_processed,
        );
        show_field("system_output_len_clipped", last.system_output_len_clipped);
        show_field("system_output_lines_raw", last.system_output_lines_raw);
        show_field("system_output_lines_clipped", last.system_output_lines_clipped);
        show_field("clipped", last.clipped);
        show_field("budget_chars", last.budget_chars);
        show_field("budget_lines", last.budget_lines);
        show_field("clip_mode", last.clip_mode.clone());
        show_field("reducer_used", last.reducer_used);
        show_field("capture_provider", last.capture_provider.clone());
    }
    0
}

/// Pretty-prints the last `n` raw lines; lines that do not parse are echoed
/// as-is so a damaged log stays inspectable.
pub fn cmd_log_tail(layout: &LogLayout, n: usize) -> i32 {
    let log_file = layout.run_log();
    let file = match File::open(&log_file) {
        Ok(v) => v,
        Err(_) if !log_file.exists() => {
            crate::cx_eprintln!("{APP_NAME} log-tail: no log file at {}", log_file.display());
            return 1;
        }
        Err(e) => {
            crate::cx_eprintln!(
                "{APP_NAME} log-tail: cannot open {}: {e}",
                log_file.display()
            );
            return 1;
        }
    };
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    for line in &lines[start..] {
        match serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
        {
            Some(s) => println!("{s}"),
            None => println!("{line}"),
        }
    }
    0
}
