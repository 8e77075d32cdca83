#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Scratch repository with its own HOME and a PATH prefix for mock
/// backends. Everything is removed on drop.
pub struct TempRepo {
    _dir: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
    pub mock_bin: PathBuf,
    original_path: String,
}

impl TempRepo {
    pub fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("create temp dir");
        let root = dir.path().join("repo");
        let home = dir.path().join("home");
        let mock_bin = dir.path().join("mockbin");
        fs::create_dir_all(root.join(".git")).expect("create temp repo dir");
        fs::create_dir_all(&home).expect("create temp home dir");
        fs::create_dir_all(&mock_bin).expect("create mock bin dir");
        Self {
            _dir: dir,
            root,
            home,
            mock_bin,
            original_path: std::env::var("PATH").unwrap_or_default(),
        }
    }

    pub fn write_mock(&self, name: &str, body: &str) {
        let p = self.mock_bin.join(name);
        fs::write(&p, body).expect("write mock");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&p).expect("mock metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&p, perms).expect("set mock executable");
        }
    }

    pub fn write_mock_codex(&self, body: &str) {
        self.write_mock("codex", body);
    }

    pub fn write_schema(&self, name: &str, body: &str) {
        let dir = self.root.join(".codex").join("schemas");
        fs::create_dir_all(&dir).expect("create schema dir");
        fs::write(dir.join(format!("{name}.schema.json")), body).expect("write schema");
    }

    fn command(&self, args: &[&str], envs: &[(&str, &str)]) -> Command {
        let path = format!("{}:{}", self.mock_bin.display(), self.original_path);
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cxharness"));
        cmd.args(args)
            .current_dir(&self.root)
            .env("HOME", &self.home)
            .env("PATH", path)
            .env("CX_REDUCER_ENABLED", "0")
            .env_remove("CX_MODE")
            .env_remove("CX_PROVIDER_ADAPTER")
            .env_remove("CX_LLM_BACKEND")
            .env_remove("CXLOG_ENABLED");
        for (k, v) in envs {
            cmd.env(k, v);
        }
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        self.command(args, envs)
            .output()
            .expect("run cxharness command")
    }

    pub fn run_with_stdin(&self, args: &[&str], envs: &[(&str, &str)], stdin: &str) -> Output {
        let mut child = self
            .command(args, envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn cxharness command");
        child
            .stdin
            .take()
            .expect("child stdin")
            .write_all(stdin.as_bytes())
            .expect("write stdin");
        child.wait_with_output().expect("wait cxharness command")
    }

    pub fn schema_fail_log(&self) -> PathBuf {
        self.root
            .join(".codex")
            .join("cxlogs")
            .join("schema_failures.jsonl")
    }

    pub fn runs_log(&self) -> PathBuf {
        self.root.join(".codex").join("cxlogs").join("runs.jsonl")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.join(".codex").join("quarantine")
    }

    pub fn quarantine_file(&self, id: &str) -> PathBuf {
        self.quarantine_dir().join(format!("{id}.json"))
    }
}

/// Codex stand-in that swallows the prompt and answers with `text`.
pub fn mock_codex_agent_text(text: &str) -> String {
    let item = serde_json::json!({
        "type": "item.completed",
        "item": {"type": "agent_message", "text": text}
    });
    format!(
        "#!/usr/bin/env bash\ncat >/dev/null\ncat <<'CXEOF'\n{item}\n{{\"type\":\"turn.completed\",\"usage\":{{\"input_tokens\":64,\"cached_input_tokens\":8,\"output_tokens\":12}}}}\nCXEOF\n"
    )
}

pub fn stdout_str(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

pub fn stderr_str(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

pub fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("read json");
    serde_json::from_str::<Value>(&text).expect("parse json")
}

pub fn parse_jsonl(path: &Path) -> Vec<Value> {
    let text =
        fs::read_to_string(path).unwrap_or_else(|_| panic!("read jsonl: {}", path.display()));
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str::<Value>(line).expect("valid json line"))
        .collect()
}

pub fn quarantine_ids(repo: &TempRepo) -> Vec<String> {
    let Ok(rd) = fs::read_dir(repo.quarantine_dir()) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = rd
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.strip_suffix(".json")
                .filter(|_| !name.starts_with('.'))
                .map(ToOwned::to_owned)
        })
        .collect();
    ids.sort();
    ids
}
