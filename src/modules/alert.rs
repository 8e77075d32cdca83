use std::path::Path;

use crate::config::APP_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub enabled: bool,
    pub max_duration_ms: u64,
    pub max_effective_input_tokens: u64,
    pub max_output_tokens: u64,
}

/// Metrics of one finished invocation, as the alert engine sees them.
#[derive(Debug, Clone, Copy)]
pub struct AlertInput<'a> {
    pub tool: &'a str,
    pub duration_ms: Option<u64>,
    pub effective_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub log_path: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warn,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertLine {
    pub level: AlertLevel,
    pub text: String,
}

fn fmt_opt(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// Pure decision. `None` when alerts are off or the call has no duration.
pub fn evaluate_alert(input: &AlertInput<'_>, t: &AlertThresholds) -> Option<AlertLine> {
    if !t.enabled {
        return None;
    }
    let duration = input.duration_ms?;
    let checks = [
        ("duration_ms", Some(duration), t.max_duration_ms),
        (
            "effective_input_tokens",
            input.effective_input_tokens,
            t.max_effective_input_tokens,
        ),
        ("output_tokens", input.output_tokens, t.max_output_tokens),
    ];
    let violations: Vec<String> = checks
        .iter()
        .filter_map(|(name, value, max)| {
            value
                .filter(|v| v > max)
                .map(|v| format!("{name}={v}>{max}"))
        })
        .collect();
    let log = input.log_path.display();
    if violations.is_empty() {
        return Some(AlertLine {
            level: AlertLevel::Info,
            text: format!(
                "{APP_NAME} alert: {} tool={} duration_ms={duration} effective_input_tokens={} output_tokens={} log={log}",
                AlertLevel::Info.as_str(),
                input.tool,
                fmt_opt(input.effective_input_tokens),
                fmt_opt(input.output_tokens),
            ),
        });
    }
    Some(AlertLine {
        level: AlertLevel::Warn,
        text: format!(
            "{APP_NAME} alert: {} tool={} {} log={log}",
            AlertLevel::Warn.as_str(),
            input.tool,
            violations.join(" ")
        ),
    })
}

/// Writes the alert line, if any, to the diagnostic stream.
pub fn emit_alert(input: &AlertInput<'_>, t: &AlertThresholds) {
    if let Some(line) = evaluate_alert(input, t) {
        crate::cx_eprintln!("{}", line.text);
    }
}

pub fn cmd_alert_show(t: &AlertThresholds) -> i32 {
    println!("== {APP_NAME} alert-show ==");
    println!("enabled: {}", t.enabled);
    println!("max_duration_ms: {}", t.max_duration_ms);
    println!("max_effective_input_tokens: {}", t.max_effective_input_tokens);
    println!("max_output_tokens: {}", t.max_output_tokens);
    0
}

#[cfg(test)]
mod tests {
    use super::{AlertInput, AlertLevel, AlertThresholds, evaluate_alert};
    use std::path::Path;

    fn thresholds() -> AlertThresholds {
        AlertThresholds {
            enabled: true,
            max_duration_ms: 8_000,
            max_effective_input_tokens: 5_000,
            max_output_tokens: 500,
        }
    }

    fn input(duration: Option<u64>, eff: Option<u64>, out: Option<u64>) -> AlertInput<'static> {
        AlertInput {
            tool: "next",
            duration_ms: duration,
            effective_input_tokens: eff,
            output_tokens: out,
            log_path: Path::new("/repo/.codex/cxlogs/runs.jsonl"),
        }
    }

    #[test]
    fn slow_call_warns_about_duration_only() {
        let line = evaluate_alert(&input(Some(9_000), Some(1_000), Some(20)), &thresholds())
            .expect("alert line");
        assert_eq!(line.level, AlertLevel::Warn);
        assert!(line.text.contains("duration_ms=9000>8000"));
        assert!(!line.text.contains("effective_input_tokens"));
        assert!(!line.text.contains("output_tokens"));
        assert!(!line.text.contains('\n'));
    }

    #[test]
    fn every_violated_metric_is_listed() {
        let line = evaluate_alert(&input(Some(9_000), Some(6_000), Some(900)), &thresholds())
            .expect("alert line");
        assert!(line.text.contains("duration_ms=9000>8000"));
        assert!(line.text.contains("effective_input_tokens=6000>5000"));
        assert!(line.text.contains("output_tokens=900>500"));
    }

    #[test]
    fn quiet_call_gets_info_summary() {
        let line = evaluate_alert(&input(Some(100), None, Some(3)), &thresholds())
            .expect("alert line");
        assert_eq!(line.level, AlertLevel::Info);
        assert!(line.text.contains("effective_input_tokens=n/a"));
        assert!(line.text.ends_with("log=/repo/.codex/cxlogs/runs.jsonl"));
    }

    #[test]
    fn disabled_or_missing_duration_emits_nothing() {
        let mut off = thresholds();
        off.enabled = false;
        assert_eq!(evaluate_alert(&input(Some(9_000), None, None), &off), None);
        assert_eq!(evaluate_alert(&input(None, Some(9_999), None), &thresholds()), None);
    }

    #[test]
    fn value_at_threshold_is_not_a_violation() {
        let line = evaluate_alert(&input(Some(8_000), Some(5_000), Some(500)), &thresholds())
            .expect("alert line");
        assert_eq!(line.level, AlertLevel::Info);
    }
}
