use serde::{Deserialize, Serialize};

use crate::config::ReplayFloor;

/// Marker that opens the discard-provenance footer line.
pub const CLIP_FOOTER_PREFIX: &str = "[cx] output clipped:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    Head,
    Tail,
    Smart,
}

impl ClipMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "head" => Self::Head,
            "tail" => Self::Tail,
            _ => Self::Smart,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Tail => "tail",
            Self::Smart => "smart",
        }
    }
}

/// The end of the text that survives clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipSide {
    Head,
    Tail,
}

impl ClipSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Tail => "tail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    pub max_chars: usize,
    pub max_lines: usize,
    pub mode: ClipMode,
    pub append_footer: bool,
}

impl BudgetPolicy {
    /// Half of this budget on both axes, never below `floor`.
    pub fn halved(&self, floor: &ReplayFloor) -> Self {
        Self {
            max_chars: (self.max_chars / 2).max(floor.min_chars),
            max_lines: (self.max_lines / 2).max(floor.min_lines),
            mode: self.mode,
            append_footer: self.append_footer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedOutput {
    pub text: String,
    pub original_chars: usize,
    pub original_lines: usize,
    pub kept_chars: usize,
    pub kept_lines: usize,
    pub was_clipped: bool,
    pub mode_used: ClipSide,
}

pub fn choose_clip_side(input: &str, mode: ClipMode) -> ClipSide {
    match mode {
        ClipMode::Head => ClipSide::Head,
        ClipMode::Tail => ClipSide::Tail,
        ClipMode::Smart => {
            let lower = input.to_lowercase();
            if lower.contains("error") || lower.contains("fail") || lower.contains("warning") {
                ClipSide::Tail
            } else {
                ClipSide::Head
            }
        }
    }
}

fn first_n_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn last_n_chars(s: &str, n: usize) -> String {
    let total = s.chars().count();
    if n >= total {
        return s.to_string();
    }
    s.chars().skip(total - n).collect()
}

fn parse_counts(raw: &str) -> Option<(usize, usize)> {
    let (chars, lines) = raw.split_once('/')?;
    Some((chars.parse().ok()?, lines.parse().ok()?))
}

/// True when `line` is exactly a footer `clip_text` would have written after
/// `body`: well-formed fields and kept counts that match `body`.
fn is_clip_footer(line: &str, body: &str) -> bool {
    let Some(rest) = line.strip_prefix(CLIP_FOOTER_PREFIX) else {
        return false;
    };
    let mut parts = rest.trim_start().splitn(3, ", ");
    let original = parts.next().and_then(|p| p.strip_prefix("original="));
    let kept = parts.next().and_then(|p| p.strip_prefix("kept="));
    let mode = parts.next().and_then(|p| p.strip_prefix("mode="));
    let (Some(original), Some(kept), Some(mode)) = (original, kept, mode) else {
        return false;
    };
    if mode != ClipSide::Head.as_str() && mode != ClipSide::Tail.as_str() {
        return false;
    }
    let Some((orig_chars, orig_lines)) = parse_counts(original) else {
        return false;
    };
    let Some((kept_chars, kept_lines)) = parse_counts(kept) else {
        return false;
    };
    kept_chars == body.chars().count()
        && kept_lines == body.lines().count()
        && (kept_chars < orig_chars || kept_lines < orig_lines)
}

/// Splits off a footer previously appended by `clip_text`, so clipping an
/// already clipped text measures only its content. Lookalike lines from the
/// captured output itself are left in place.
fn split_footer(input: &str) -> &str {
    let (body, last) = match input.rfind('\n') {
        Some(idx) => (&input[..idx], &input[idx + 1..]),
        None => ("", input),
    };
    if is_clip_footer(last, body) {
        body
    } else {
        input
    }
}

pub fn clip_text(input: &str, policy: &BudgetPolicy) -> ClippedOutput {
    let content = split_footer(input);
    let original_chars = content.chars().count();
    let original_lines = content.lines().count();
    let side = choose_clip_side(content, policy.mode);

    let lines: Vec<&str> = content.lines().collect();
    let line_limited = if lines.len() <= policy.max_lines {
        content.to_string()
    } else if side == ClipSide::Tail {
        lines[lines.len() - policy.max_lines..].join("\n")
    } else {
        lines[..policy.max_lines].join("\n")
    };
    let char_limited = if line_limited.chars().count() <= policy.max_chars {
        line_limited
    } else if side == ClipSide::Tail {
        last_n_chars(&line_limited, policy.max_chars)
    } else {
        first_n_chars(&line_limited, policy.max_chars)
    };

    let kept_chars = char_limited.chars().count();
    let kept_lines = char_limited.lines().count();
    let was_clipped = kept_chars < original_chars || kept_lines < original_lines;
    let text = if !was_clipped {
        input.to_string()
    } else if policy.append_footer {
        format!(
            "{char_limited}\n{CLIP_FOOTER_PREFIX} original={original_chars}/{original_lines}, \
             kept={kept_chars}/{kept_lines}, mode={}",
            side.as_str()
        )
    } else {
        char_limited
    };
    ClippedOutput {
        text,
        original_chars,
        original_lines,
        kept_chars,
        kept_lines,
        was_clipped,
        mode_used: side,
    }
}
