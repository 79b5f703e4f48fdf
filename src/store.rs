use std::fs;
use std::io::Write;

use camino::Utf8PathBuf;
use serde::Serialize;
use tempfile::Builder;

use crate::domain::Record;
use crate::error::CollectorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub path: Utf8PathBuf,
    pub records: usize,
    pub bytes: u64,
}

impl ArtifactReport {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: Utf8PathBuf,
}

impl ArtifactStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn artifact_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn ensure_root(&self) -> Result<(), CollectorError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| CollectorError::Persistence {
            path: self.root.to_string(),
            message: err.to_string(),
        })
    }

    /// Replaces `{root}/{name}.json` with `records`. Nothing is written for an empty set.
    pub fn write(
        &self,
        name: &str,
        records: &[Record],
    ) -> Result<Option<ArtifactReport>, CollectorError> {
        if records.is_empty() {
            return Ok(None);
        }
        let path = self.artifact_path(name);
        let fail = |message: String| CollectorError::Persistence {
            path: path.to_string(),
            message,
        };

        self.ensure_root()?;
        let content = serde_json::to_vec_pretty(records).map_err(|err| fail(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".txn-collector")
            .suffix(".json.tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| fail(err.to_string()))?;
        temp.write_all(&content)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| fail(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| fail(err.error.to_string()))?;

        let bytes = fs::metadata(path.as_std_path())
            .map(|meta| meta.len())
            .map_err(|err| fail(err.to_string()))?;
        Ok(Some(ArtifactReport {
            path,
            records: records.len(),
            bytes,
        }))
    }

    pub fn read(&self, name: &str) -> Result<Vec<Record>, CollectorError> {
        let path = self.artifact_path(name);
        let content = fs::read(path.as_std_path()).map_err(|err| CollectorError::Persistence {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        serde_json::from_slice(&content).map_err(|err| CollectorError::Persistence {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.artifact_path(name).as_std_path().exists()
    }
}
