use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

pub const PROMPT_PREVIEW_CHARS: usize = 180;

pub fn prompt_preview(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn safe_tool_name(tool: &str) -> String {
    tool.replace(
        |c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-',
        "_",
    )
}

/// Time-ordered, collision-resistant identifier. Lexicographic order follows
/// creation time at millisecond resolution; the per-process counter and the
/// random suffix keep ids unique within the same millisecond and across
/// processes.
pub fn make_time_ordered_id(tool: &str) -> String {
    let seq = ID_SEQ.fetch_add(1, Ordering::SeqCst);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{:06}_{}",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        safe_tool_name(tool),
        std::process::id(),
        seq,
        &suffix[..8]
    )
}

pub fn utc_now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
