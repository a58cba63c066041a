// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::config::model::{NukeConfig, RawRunConfig, RunConfig};
use crate::errors::{Result, TeuthologyError};

/// Read every YAML document in one file.
///
/// Empty documents are skipped; a document that is not a mapping is a
/// configuration error.
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Mapping>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        TeuthologyError::config(format!("cannot read config file {}: {e}", path.display()))
    })?;

    let mut docs = Vec::new();
    for (idx, doc) in serde_yaml::Deserializer::from_str(&contents).enumerate() {
        let value = Value::deserialize(doc).map_err(|e| {
            TeuthologyError::config(format!("{}: invalid YAML: {e}", path.display()))
        })?;
        match value {
            Value::Null => continue,
            Value::Mapping(m) => docs.push(m),
            _ => {
                return Err(TeuthologyError::config(format!(
                    "{}: document {idx} is not a mapping",
                    path.display()
                )));
            }
        }
    }

    debug!(path = %path.display(), documents = docs.len(), "loaded config file");
    Ok(docs)
}

/// Shallow-merge documents: top-level keys of later documents overwrite
/// earlier ones.
pub fn merge_documents(docs: impl IntoIterator<Item = Mapping>) -> Mapping {
    let mut merged = Mapping::new();
    for doc in docs {
        for (key, value) in doc {
            merged.insert(key, value);
        }
    }
    merged
}

/// Load and merge all config files, in the order given.
pub fn load_merged(paths: &[PathBuf]) -> Result<Mapping> {
    let mut docs = Vec::new();
    for path in paths {
        docs.extend(load_documents(path)?);
    }
    Ok(merge_documents(docs))
}

/// Load, merge and validate a run configuration.
pub fn load_and_validate(paths: &[PathBuf]) -> Result<RunConfig> {
    let merged = load_merged(paths)?;
    let raw = RawRunConfig::from_mapping(merged)
        .map_err(|e| TeuthologyError::config(format!("invalid config: {e}")))?;
    RunConfig::try_from(raw)
}

/// Load and merge config files, reading only `targets`.
pub fn load_nuke_config(paths: &[PathBuf]) -> Result<NukeConfig> {
    NukeConfig::try_from(load_merged(paths)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn later_documents_win_on_shallow_merge() {
        let merged = merge_documents([mapping("{a: 1, b: 2}"), mapping("{b: 3, c: 4}")]);
        assert_eq!(merged, mapping("{a: 1, b: 3, c: 4}"));
    }

    #[test]
    fn merge_is_shallow() {
        let merged = merge_documents([
            mapping("{kernel: {version: x, branch: y}}"),
            mapping("{kernel: {version: z}}"),
        ]);
        assert_eq!(merged, mapping("{kernel: {version: z}}"));
    }
}
