// src/archive.rs

//! Local archive directory for one run.
//!
//! Layout:
//! - `teuthology.log`: written by the logging layer
//! - `config.yaml`: merged config, written before anything runs
//! - `summary.yaml`: written by [`Archive::finish`], which consumes the
//!   archive so it cannot be written twice
//! - `remote/<host>.tgz`: pulled by the `internal.archive` stage

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Mapping;
use tracing::info;

use crate::context::Summary;
use crate::errors::{Result, TeuthologyError};

pub const LOG_FILE: &str = "teuthology.log";
pub const CONFIG_FILE: &str = "config.yaml";
pub const SUMMARY_FILE: &str = "summary.yaml";

#[derive(Debug)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    /// Create the archive directory. Fails if it already exists.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir(&dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                TeuthologyError::config(format!(
                    "archive directory {} already exists",
                    dir.display()
                ))
            } else {
                TeuthologyError::Io(e)
            }
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn write_config(&self, document: &Mapping) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_yaml::to_string(document)?)?;
        info!(path = %path.display(), "wrote config");
        Ok(())
    }

    /// Write `summary.yaml`. Consumes the archive.
    pub fn finish(self, summary: &Summary) -> Result<PathBuf> {
        let path = self.dir.join(SUMMARY_FILE);
        fs::write(&path, summary.to_yaml()?)?;
        info!(path = %path.display(), "wrote summary");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_fails_if_directory_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Archive::create(tmp.path()).unwrap_err();
        assert!(matches!(err, TeuthologyError::Configuration(ref m) if m.contains("already exists")));
    }

    #[test]
    fn writes_config_and_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = Archive::create(tmp.path().join("run")).unwrap();

        let doc: Mapping = serde_yaml::from_str("targets: [h1]\nroles: [[a]]\n").unwrap();
        archive.write_config(&doc).unwrap();

        let mut summary = Summary::for_run("me@box", None);
        summary.mark_succeeded();
        let path = archive.finish(&summary).unwrap();

        let written = fs::read_to_string(path).unwrap();
        assert!(written.contains("success: true"));
        let config = fs::read_to_string(tmp.path().join("run").join(CONFIG_FILE)).unwrap();
        assert!(config.contains("targets"));
    }
}
