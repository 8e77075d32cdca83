const MAX_LINE_CHARS: usize = 600;
const MAX_DIFF_BODY_LINES: usize = 300;
const STATUS_FALLBACK_LINES: usize = 120;

/// Collapses blank-line runs and shortens overlong lines.
fn normalize_lines(input: &str) -> String {
    let mut out = String::new();
    let mut blank_seen = false;
    for line in input.lines() {
        if line.trim().is_empty() {
            if !blank_seen {
                out.push('\n');
            }
            blank_seen = true;
            continue;
        }
        blank_seen = false;
        if line.chars().count() > MAX_LINE_CHARS {
            out.extend(line.chars().take(MAX_LINE_CHARS));
            out.push_str("...");
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn is_status_header(line: &str) -> bool {
    [
        "On branch ",
        "HEAD detached",
        "Your branch ",
        "Changes to be committed:",
        "Changes not staged for commit:",
        "Untracked files:",
        "nothing to commit",
        "no changes added to commit",
    ]
    .iter()
    .any(|p| line.starts_with(p))
}

fn is_status_entry(line: &str) -> bool {
    let t = line.trim_start();
    [
        "modified:",
        "new file:",
        "deleted:",
        "renamed:",
        "both modified:",
        "both added:",
        "both deleted:",
    ]
    .iter()
    .any(|p| t.starts_with(p))
}

fn condense_git_status(input: &str) -> String {
    let kept: Vec<&str> = input
        .lines()
        .filter(|l| is_status_header(l) || is_status_entry(l))
        .collect();
    if kept.is_empty() {
        input
            .lines()
            .take(STATUS_FALLBACK_LINES)
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        kept.join("\n")
    }
}

fn is_diff_header(line: &str) -> bool {
    [
        "diff --git ",
        "index ",
        "--- ",
        "+++ ",
        "@@ ",
        "Binary files ",
        "rename from ",
        "rename to ",
    ]
    .iter()
    .any(|p| line.starts_with(p))
}

fn condense_diff(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut body_lines = 0usize;
    for line in input.lines() {
        if is_diff_header(line) {
            out.push(line);
        } else if (line.starts_with('+') || line.starts_with('-'))
            && body_lines < MAX_DIFF_BODY_LINES
        {
            out.push(line);
            body_lines += 1;
        }
    }
    if out.is_empty() {
        input.to_string()
    } else {
        out.join("\n")
    }
}

/// In-process reduction used when the external reducer is not applied.
pub fn native_reduce_output(cmd: &[String], input: &str) -> String {
    let verb = cmd.first().map(String::as_str).unwrap_or("");
    let sub = cmd.get(1).map(String::as_str).unwrap_or("");
    let reduced = match (verb, sub) {
        ("git", "status") => condense_git_status(input),
        ("git", "diff") | ("diff", _) => condense_diff(input),
        _ => input.to_string(),
    };
    normalize_lines(&reduced)
}

#[cfg(test)]
mod tests {
    use super::native_reduce_output;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn git_status_keeps_headers_and_entries() {
        let input = "On branch main\n\n  (use \"git add\" to stage)\n\tmodified:   src/lib.rs\nrandom chatter\n";
        let out = native_reduce_output(&cmd(&["git", "status"]), input);
        assert_eq!(out, "On branch main\n\tmodified:   src/lib.rs\n");
    }

    #[test]
    fn diff_drops_context_lines() {
        let input = "diff --git a/x b/x\n@@ -1,2 +1,2 @@\n context\n-old\n+new\n";
        let out = native_reduce_output(&cmd(&["git", "diff"]), input);
        assert_eq!(out, "diff --git a/x b/x\n@@ -1,2 +1,2 @@\n-old\n+new\n");
    }

    #[test]
    fn other_commands_only_normalize_blank_runs() {
        let out = native_reduce_output(&cmd(&["ls"]), "a\n\n\n\nb\n");
        assert_eq!(out, "a\n\nb\n");
    }

    #[test]
    fn overlong_lines_are_shortened() {
        let long = "x".repeat(700);
        let out = native_reduce_output(&cmd(&["cat"]), &long);
        assert_eq!(out.chars().count(), 600 + 3 + 1);
        assert!(out.ends_with("...\n"));
    }
}
