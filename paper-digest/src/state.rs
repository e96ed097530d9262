use crate::parser::strip_version;
use crate::types::{DigestError, Result, SeenSet};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// JSON file holding the identifiers of every paper already delivered.
pub struct SeenSetStore {
    path: PathBuf,
}

impl SeenSetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the seen-set. A missing or blank file is an empty set.
    ///
    /// Accepts the current array format and the older `{"id": "date"}` map,
    /// whose keys carry version suffixes (`2401.01234v1`). Suffixes are
    /// dropped either way. Anything else is `StateCorrupted` and the file is
    /// left as it is.
    pub fn load(&self) -> Result<SeenSet> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No seen-set at {}, starting empty", self.path.display());
                return Ok(SeenSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(SeenSet::new());
        }

        let value: Value = serde_json::from_str(&content).map_err(|e| self.corrupted(e.to_string()))?;

        let seen = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => Ok(strip_version(id.trim()).to_string()),
                    other => Err(self.corrupted(format!("expected a string identifier, found {}", other))),
                })
                .collect::<Result<SeenSet>>()?,
            Value::Object(map) => {
                debug!("Reading legacy map format from {}", self.path.display());
                map.keys().map(|id| strip_version(id.trim()).to_string()).collect()
            }
            other => {
                return Err(self.corrupted(format!(
                    "expected an array of identifiers, found {}",
                    json_kind(&other)
                )))
            }
        };

        info!("Loaded {} seen papers from {}", seen.len(), self.path.display());
        Ok(seen)
    }

    /// Replace the file with `seen`. Written to a temporary file in the same
    /// directory and renamed over the old one.
    pub fn persist(&self, seen: &SeenSet) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut body = serde_json::to_string_pretty(seen)?;
        body.push('\n');

        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(body.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| DigestError::Io(e.error))?;

        info!("Saved {} seen papers to {}", seen.len(), self.path.display());
        Ok(())
    }

    fn corrupted(&self, detail: String) -> DigestError {
        DigestError::StateCorrupted {
            path: self.path.display().to_string(),
            detail,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
