use crate::capture::CaptureProviderMode;
use crate::config::{APP_NAME, AppConfig};
use crate::execution::Harness;

fn provider_label(mode: CaptureProviderMode) -> &'static str {
    match mode {
        CaptureProviderMode::Auto => "auto",
        CaptureProviderMode::Reducer => "reducer",
        CaptureProviderMode::Raw => "raw",
    }
}

pub fn cmd_reducer_status(harness: &mut Harness<'_>) -> i32 {
    let cfg = harness.cfg;
    let reducer = &cfg.reducer;
    let status = harness.reducer_status().clone();
    let ver = status
        .version_raw
        .clone()
        .unwrap_or_else(|| "unavailable".to_string());
    let max = reducer.max_version.as_deref().unwrap_or("<unset>");
    println!(
        "{APP_NAME} reducer: version={ver} range=[{}, {max}] usable={} enabled={} provider={}",
        reducer.min_version,
        status.usable,
        reducer.enabled,
        provider_label(reducer.provider)
    );
    println!("reducer_program: {}", shell_words::join(&reducer.program));
    println!("reducer_usable: {}", status.usable);
    if let Some(reason) = status.reason {
        println!("reducer_reason: {reason}");
    }
    println!("native_reduce: {}", reducer.native_reduce);
    println!(
        "fallback: {}",
        if status.usable {
            "none"
        } else if reducer.native_reduce {
            "native reduction"
        } else {
            "raw command output"
        }
    );
    0
}

/// Resolved pipeline configuration for this process.
pub fn cmd_core(cfg: &AppConfig, harness: &Harness<'_>) -> i32 {
    let layout = harness.layout();
    println!("== {APP_NAME} core ==");
    println!("execution_mode: {}", cfg.mode);
    println!("strictness: {}", cfg.strictness.as_str());
    println!("backend: {}", harness.adapter.backend_id());
    println!(
        "model: {}",
        harness.adapter.model().unwrap_or_else(|| "<unset>".to_string())
    );
    println!(
        "budget: chars={} lines={} clip_mode={} footer={}",
        cfg.budget.max_chars,
        cfg.budget.max_lines,
        cfg.budget.mode.as_str(),
        cfg.budget.append_footer
    );
    println!(
        "replay_floor: chars={} lines={}",
        cfg.replay_floor.min_chars, cfg.replay_floor.min_lines
    );
    println!("logging_enabled: {}", cfg.logging_enabled);
    println!("alerts_enabled: {}", cfg.alerts.enabled);
    println!("log_scope: {}", layout.scope.as_str());
    println!("run_log: {}", layout.run_log().display());
    println!("schema_fail_log: {}", layout.schema_fail_log().display());
    println!("quarantine_dir: {}", layout.quarantine_dir().display());
    0
}
