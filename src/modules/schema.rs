use jsonschema::JSONSchema;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{CxError, CxResult};

/// Why a structured response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    NotJson,
    MissingKey(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson => f.write_str("not_json"),
            Self::MissingKey(k) => write!(f, "missing_key:{k}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(Value),
    Invalid(InvalidReason),
}

/// Presence check for one top-level key. Value types are not inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredKey(pub String);

impl RequiredKey {
    fn check(&self, value: &Value) -> Result<(), InvalidReason> {
        if value.get(&self.0).is_some() {
            Ok(())
        } else {
            Err(InvalidReason::MissingKey(self.0.clone()))
        }
    }
}

/// The contract a structured response must meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    pub description: String,
    pub required: Vec<RequiredKey>,
}

impl SchemaContract {
    pub fn new(description: impl Into<String>, keys: &[String]) -> Self {
        Self {
            description: description.into(),
            required: keys.iter().cloned().map(RequiredKey).collect(),
        }
    }

    pub fn required_keys(&self) -> Vec<String> {
        self.required.iter().map(|k| k.0.clone()).collect()
    }

    /// Parses `raw` as one JSON value, then checks keys in declaration order.
    /// The first missing key is the reported reason.
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return ValidationOutcome::Invalid(InvalidReason::NotJson);
        };
        for key in &self.required {
            if let Err(reason) = key.check(&value) {
                return ValidationOutcome::Invalid(reason);
            }
        }
        ValidationOutcome::Valid(value)
    }
}

/// Contract used by `next`: a `commands` array of shell commands.
pub fn next_commands_contract() -> SchemaContract {
    SchemaContract::new(
        "{\n  \"commands\": [\"<shell command>\", \"...\"]\n}",
        &["commands".to_string()],
    )
}

fn normalize_schema_name(name: &str) -> String {
    if name.ends_with(".schema.json") {
        name.to_string()
    } else {
        format!("{name}.schema.json")
    }
}

/// Loads `<dir>/<name>.schema.json`, checks it compiles as a JSON Schema and
/// derives a contract from it: the pretty-printed document is the
/// description and the top-level `required` array gives the keys.
pub fn load_registered_schema(dir: &Path, name: &str) -> CxResult<SchemaContract> {
    let path = dir.join(normalize_schema_name(name));
    let raw = fs::read_to_string(&path)
        .map_err(|e| CxError::io(format!("failed to read {}", path.display()), e))?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| CxError::json(format!("invalid schema JSON {}", path.display()), e))?;
    JSONSchema::compile(&value).map_err(|e| {
        CxError::invalid(format!("failed to compile schema {}: {e}", path.display()))
    })?;
    let keys: Vec<String> = value
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let description = serde_json::to_string_pretty(&value)
        .map_err(|e| CxError::json("failed to render schema", e))?;
    Ok(SchemaContract::new(description, &keys))
}

#[cfg(test)]
mod tests {
    use super::{
        InvalidReason, SchemaContract, ValidationOutcome, load_registered_schema,
        next_commands_contract,
    };
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn contract(keys: &[&str]) -> SchemaContract {
        let keys: Vec<String> = keys.iter().map(|s| s.to_string()).collect();
        SchemaContract::new("test", &keys)
    }

    #[test]
    fn commands_response_is_valid_and_order_preserved() {
        let out = next_commands_contract().validate(r#"{"commands":["ls","pwd"]}"#);
        let ValidationOutcome::Valid(v) = out else {
            panic!("expected valid outcome");
        };
        assert_eq!(v["commands"], json!(["ls", "pwd"]));
    }

    #[test]
    fn prose_is_not_json() {
        assert_eq!(
            contract(&["commands"]).validate("not json at all"),
            ValidationOutcome::Invalid(InvalidReason::NotJson)
        );
        assert_eq!(
            contract(&[]).validate(""),
            ValidationOutcome::Invalid(InvalidReason::NotJson)
        );
    }

    #[test]
    fn first_missing_key_in_declaration_order_is_reported() {
        let out = contract(&["a", "b", "c"]).validate(r#"{"a":1}"#);
        assert_eq!(
            out,
            ValidationOutcome::Invalid(InvalidReason::MissingKey("b".to_string()))
        );
        assert_eq!(
            InvalidReason::MissingKey("b".to_string()).to_string(),
            "missing_key:b"
        );
    }

    #[test]
    fn extra_keys_and_odd_types_are_accepted() {
        let out = contract(&["commands"]).validate(r#"{"commands":null,"extra":true}"#);
        assert_eq!(
            out,
            ValidationOutcome::Valid(json!({"commands": null, "extra": true}))
        );
    }

    #[test]
    fn registered_schema_supplies_required_keys() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("commit.schema.json"),
            r#"{"type":"object","required":["subject","body"],"properties":{"subject":{"type":"string"}}}"#,
        )
        .expect("write schema");
        let c = load_registered_schema(dir.path(), "commit").expect("load schema");
        assert_eq!(c.required_keys(), vec!["subject".to_string(), "body".to_string()]);
        assert!(c.description.contains("\"required\""));
    }

    #[test]
    fn uncompilable_schema_is_rejected() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("bad.schema.json"), r#"{"type":12}"#).expect("write schema");
        assert!(load_registered_schema(dir.path(), "bad.schema.json").is_err());
        assert!(load_registered_schema(dir.path(), "missing").is_err());
    }
}
