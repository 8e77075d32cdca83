use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{APP_NAME, ExecutionMode, Strictness};
use crate::error::{CxError, CxResult};
use crate::execmeta::{make_time_ordered_id, utc_now_iso};
use crate::types::QuarantineRecord;
use crate::util::sha256_hex;

/// Inputs for one quarantine entry; id, timestamp and hashes are derived.
#[derive(Debug, Clone, Copy)]
pub struct NewQuarantine<'a> {
    pub tool: &'a str,
    pub reason: &'a str,
    pub schema_description: &'a str,
    pub required_keys: &'a [String],
    pub mode: ExecutionMode,
    pub strictness: Strictness,
    pub prompt_text: &'a str,
    pub full_prompt: &'a str,
    pub raw_response_text: &'a str,
}

/// One JSON file per record under `dir`. Records are written once and never
/// rewritten.
#[derive(Debug, Clone)]
pub struct QuarantineStore {
    dir: PathBuf,
}

impl QuarantineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn store(&self, new: NewQuarantine<'_>) -> CxResult<QuarantineRecord> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| CxError::persistence(&self.dir, format!("create dir: {e}")))?;
        let id = make_time_ordered_id(new.tool);
        let rec = QuarantineRecord {
            id: id.clone(),
            created_at: utc_now_iso(),
            tool: new.tool.to_string(),
            reason: new.reason.to_string(),
            schema_description: new.schema_description.to_string(),
            required_keys: new.required_keys.to_vec(),
            mode: new.mode,
            strictness: new.strictness,
            prompt_text: new.prompt_text.to_string(),
            full_prompt: new.full_prompt.to_string(),
            raw_response_text: new.raw_response_text.to_string(),
            prompt_sha256: sha256_hex(new.full_prompt),
            raw_sha256: sha256_hex(new.raw_response_text),
        };
        let serialized = serde_json::to_string_pretty(&rec)
            .map_err(|e| CxError::json("failed to serialize quarantine record", e))?;
        let file = self.record_path(&id);
        let tmp = self.dir.join(format!(".{id}.json.tmp"));
        fs::write(&tmp, serialized)
            .map_err(|e| CxError::persistence(&tmp, format!("write: {e}")))?;
        fs::rename(&tmp, &file).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CxError::persistence(&file, format!("rename: {e}"))
        })?;
        Ok(rec)
    }

    pub fn read(&self, id: &str) -> CxResult<QuarantineRecord> {
        let bad_id = id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.');
        let path = self.record_path(id);
        if bad_id || !path.is_file() {
            return Err(CxError::not_found(format!("quarantine id {id}")));
        }
        let s = fs::read_to_string(&path)
            .map_err(|e| CxError::io(format!("cannot read {}", path.display()), e))?;
        serde_json::from_str(&s)
            .map_err(|e| CxError::json(format!("invalid quarantine JSON {}", path.display()), e))
    }

    /// Newest first. Unreadable files are skipped.
    pub fn list(&self, n: usize) -> Vec<QuarantineRecord> {
        let mut rows: Vec<QuarantineRecord> = Vec::new();
        let Ok(rd) = fs::read_dir(&self.dir) else {
            return rows;
        };
        for ent in rd.flatten() {
            let path = ent.path();
            if path.extension().and_then(|v| v.to_str()) != Some("json") {
                continue;
            }
            let Ok(s) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(rec) = serde_json::from_str::<QuarantineRecord>(&s) {
                rows.push(rec);
            }
        }
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(n);
        rows
    }
}

pub fn cmd_quarantine_list(store: &QuarantineStore, n: usize) -> i32 {
    let rows = store.list(n);
    println!("== {APP_NAME} quarantine list ==");
    println!("entries: {}", rows.len());
    for rec in rows {
        println!(
            "- {} | {} | {} | {}",
            rec.id, rec.created_at, rec.tool, rec.reason
        );
    }
    println!("quarantine_dir: {}", store.dir().display());
    0
}

pub fn cmd_quarantine_show(store: &QuarantineStore, id: &str) -> i32 {
    let rec = match store.read(id) {
        Ok(v) => v,
        Err(e) => {
            crate::cx_eprintln!("{APP_NAME} quarantine show: {e}");
            return 1;
        }
    };
    match serde_json::to_string_pretty(&rec) {
        Ok(v) => {
            println!("{v}");
            0
        }
        Err(e) => {
            crate::cx_eprintln!("{APP_NAME} quarantine show: failed to render JSON: {e}");
            1
        }
    }
}
