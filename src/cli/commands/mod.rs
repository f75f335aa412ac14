//! CLI command implementations
//!
//! This module contains all CLI command implementations and the file
//! helpers they share.

pub mod build;
pub mod flatten;
pub mod validate;
pub mod validate_config;

use crate::core::schema::SchemaIndex;
use crate::domain::{MeridianError, Result, WebTemplate};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Loads a Web Template file and indexes it
pub(crate) fn load_index(path: &Path) -> Result<SchemaIndex> {
    let template = WebTemplate::from_file(path)?;
    let index = SchemaIndex::build(&template)?;
    tracing::debug!(
        template_id = %index.template_id(),
        nodes = index.len(),
        "Schema index built"
    );
    Ok(index)
}

/// Reads a JSON document
pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)
        .map_err(|e| MeridianError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents).map_err(|e| {
        MeridianError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Writes pretty-printed JSON to a file, or to stdout when no file is given
pub(crate) fn write_json(value: &Value, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| MeridianError::Serialization(e.to_string()))?;
    match output {
        Some(path) => fs::write(path, text + "\n")
            .map_err(|e| MeridianError::Io(format!("Failed to write {}: {}", path.display(), e))),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let value = json!({"vitals/pulse:0/rate|magnitude": 72});

        write_json(&value, Some(&path)).unwrap();
        assert_eq!(read_json(&path).unwrap(), value);
    }

    #[test]
    fn test_read_json_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_json(&dir.path().join("missing.json")),
            Err(MeridianError::Io(_))
        ));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_json(&path), Err(MeridianError::Serialization(_))));
    }

    #[test]
    fn test_load_index_rejects_bad_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("template.json");
        fs::write(&path, r#"{"templateId": "X.v1"}"#).unwrap();
        assert!(matches!(load_index(&path), Err(MeridianError::Schema(_))));
    }
}
