use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{GeneratorError, Result};

/// Outcome of one artifact write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Unchanged,
}

/// Writes generated artifacts, leaving files whose content did not change
/// untouched.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn write(&self, file_name: &str, content: &str) -> Result<WriteStatus> {
        let path = self.artifact_path(file_name);

        if let Ok(existing) = fs::read_to_string(&path) {
            if Self::compute_hash(&existing) == Self::compute_hash(content) {
                debug!("Unchanged: {}", path.display());
                return Ok(WriteStatus::Unchanged);
            }
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| GeneratorError::Output {
            path: self.output_dir.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, content).map_err(|e| GeneratorError::Output {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(WriteStatus::Written)
    }
}
