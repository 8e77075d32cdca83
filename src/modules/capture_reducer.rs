use std::cmp::Ordering;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::config::APP_NAME;
use crate::process::{run_probe_output, run_probe_status};

static REDUCER_WARNED_UNSUPPORTED: AtomicBool = AtomicBool::new(false);

/// Which capture path the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProviderMode {
    /// Use the reducer when enabled, allow-listed and usable.
    Auto,
    /// Same gate as `Auto`; recorded separately so logs show intent.
    Reducer,
    /// Never use the reducer.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerConfig {
    pub enabled: bool,
    /// Program and fixed leading arguments; the wrapped command is appended.
    pub program: Vec<String>,
    pub provider: CaptureProviderMode,
    pub min_version: String,
    pub max_version: Option<String>,
    pub probe_timeout_secs: u64,
    pub native_reduce: bool,
    pub capture_stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerStatus {
    pub version_raw: Option<String>,
    pub usable: bool,
    pub reason: Option<String>,
}

type Semver = (u64, u64, u64);

fn parse_semver_triplet(raw: &str) -> Option<Semver> {
    let candidate = raw
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|s| !s.is_empty() && s.contains('.'))?;
    let mut it = candidate.split('.');
    let mut next = || it.next().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
    Some((next(), next(), next()))
}

fn semver_cmp(a: Semver, b: Semver) -> Ordering {
    a.cmp(&b)
}

fn version_in_range(ver_raw: &str, min: &str, max: Option<&str>) -> Result<(), String> {
    let Some(cur) = parse_semver_triplet(ver_raw) else {
        return Err("unable to parse reducer version".to_string());
    };
    let floor = parse_semver_triplet(min).unwrap_or((0, 0, 0));
    if semver_cmp(cur, floor) == Ordering::Less {
        return Err(format!(
            "reducer version '{ver_raw}' is below supported minimum '{min}'"
        ));
    }
    if let Some(max) = max {
        let ceiling = parse_semver_triplet(max).unwrap_or((u64::MAX, u64::MAX, u64::MAX));
        if semver_cmp(cur, ceiling) == Ordering::Greater {
            return Err(format!(
                "reducer version '{ver_raw}' is above supported maximum '{max}'"
            ));
        }
    }
    Ok(())
}

fn reducer_command(cfg: &ReducerConfig) -> Option<Command> {
    let (bin, fixed) = cfg.program.split_first()?;
    let mut cmd = Command::new(bin);
    cmd.args(fixed);
    Some(cmd)
}

fn reducer_version_raw(cfg: &ReducerConfig) -> Option<String> {
    let mut cmd = reducer_command(cfg)?;
    cmd.arg("--version");
    let out = run_probe_output(cmd, "reducer --version", cfg.probe_timeout_secs).ok()?;
    let mut s = String::from_utf8_lossy(&out.stdout).to_string();
    if s.trim().is_empty() {
        s = String::from_utf8_lossy(&out.stderr).to_string();
    }
    let t = s.trim().to_string();
    if t.is_empty() { None } else { Some(t) }
}

/// Checks that the reducer answers `--help` and reports a version inside the
/// configured range. Unusable reducers are warned about once per process.
pub fn probe_reducer(cfg: &ReducerConfig) -> ReducerStatus {
    let Some(mut help) = reducer_command(cfg) else {
        return ReducerStatus {
            version_raw: None,
            usable: false,
            reason: Some("reducer program is empty".to_string()),
        };
    };
    help.arg("--help");
    let answers = run_probe_status(help, "reducer --help", cfg.probe_timeout_secs)
        .map(|s| s.success())
        .unwrap_or(false);
    if !answers {
        return ReducerStatus {
            version_raw: None,
            usable: false,
            reason: Some("reducer unavailable".to_string()),
        };
    }
    let version_raw = reducer_version_raw(cfg);
    let verdict = version_in_range(
        version_raw.as_deref().unwrap_or(""),
        &cfg.min_version,
        cfg.max_version.as_deref(),
    );
    match verdict {
        Ok(()) => ReducerStatus {
            version_raw,
            usable: true,
            reason: None,
        },
        Err(reason) => {
            if !REDUCER_WARNED_UNSUPPORTED.swap(true, AtomicOrdering::SeqCst) {
                crate::cx_eprintln!(
                    "{APP_NAME}: {reason}; falling back to raw command output."
                );
            }
            ReducerStatus {
                version_raw,
                usable: false,
                reason: Some(reason),
            }
        }
    }
}

fn is_reducer_supported_verb(verb: &str) -> bool {
    matches!(
        verb,
        "git" | "diff" | "ls" | "tree" | "grep" | "test" | "log" | "read"
    )
}

/// Pure decision: same command, config and availability give the same answer.
pub fn should_use_reducer(cmd: &[String], cfg: &ReducerConfig, reducer_usable: bool) -> bool {
    let supported = cmd
        .first()
        .map(|c| is_reducer_supported_verb(c))
        .unwrap_or(false);
    match cfg.provider {
        CaptureProviderMode::Raw => false,
        CaptureProviderMode::Auto | CaptureProviderMode::Reducer => {
            cfg.enabled && supported && reducer_usable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CaptureProviderMode, ReducerConfig, parse_semver_triplet, probe_reducer,
        should_use_reducer, version_in_range,
    };

    fn cfg(provider: CaptureProviderMode, enabled: bool) -> ReducerConfig {
        ReducerConfig {
            enabled,
            program: vec!["rtk".to_string()],
            provider,
            min_version: "0.22.1".to_string(),
            max_version: None,
            probe_timeout_secs: 2,
            native_reduce: false,
            capture_stderr: false,
        }
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn semver_is_extracted_from_banner() {
        assert_eq!(parse_semver_triplet("rtk 0.23.4"), Some((0, 23, 4)));
        assert_eq!(parse_semver_triplet("v1.2"), Some((1, 2, 0)));
        assert_eq!(parse_semver_triplet("no version"), None);
    }

    #[test]
    fn version_range_is_inclusive() {
        assert!(version_in_range("rtk 0.22.1", "0.22.1", None).is_ok());
        assert!(version_in_range("rtk 0.21.9", "0.22.1", None).is_err());
        assert!(version_in_range("rtk 0.30.0", "0.22.1", Some("0.29.0")).is_err());
        assert!(version_in_range("garbage", "0.22.1", None).is_err());
    }

    #[test]
    fn reducer_decision_requires_allow_listed_verb_and_usability() {
        let auto = cfg(CaptureProviderMode::Auto, true);
        assert!(should_use_reducer(&cmd(&["git", "status"]), &auto, true));
        assert!(!should_use_reducer(&cmd(&["git", "status"]), &auto, false));
        assert!(!should_use_reducer(&cmd(&["cargo", "test"]), &auto, true));
        assert!(!should_use_reducer(&[], &auto, true));
    }

    #[test]
    fn raw_mode_and_disabled_reducer_never_reduce() {
        let raw = cfg(CaptureProviderMode::Raw, true);
        assert!(!should_use_reducer(&cmd(&["git", "diff"]), &raw, true));
        let disabled = cfg(CaptureProviderMode::Reducer, false);
        assert!(!should_use_reducer(&cmd(&["git", "diff"]), &disabled, true));
    }

    #[test]
    fn missing_reducer_binary_is_unusable() {
        let mut c = cfg(CaptureProviderMode::Auto, true);
        c.program = vec!["cxharness-missing-reducer".to_string()];
        let status = probe_reducer(&c);
        assert!(!status.usable);
        assert_eq!(status.reason.as_deref(), Some("reducer unavailable"));
    }
}
