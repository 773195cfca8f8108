use serde::{Deserialize, Serialize};

use crate::api::{error::StorageError, run::RunInfo};

/// An entry of a run's artifact tree, as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub file_size: Option<i64>,
}

/// Access to the artifact store behind a tracking server.
///
/// Unlike [`Client`](crate::Client) this takes `&self` so that one run's files
/// can be transferred by several workers at once.
pub trait ArtifactRepository: Sync {
    /// Lists the direct children of `path` (or of the root when `None`).
    fn list_artifacts(&self, run: &RunInfo, path: Option<&str>) -> Result<Vec<FileInfo>, StorageError>;
    fn download_artifact(&self, run: &RunInfo, path: &str) -> Result<Vec<u8>, StorageError>;
    fn upload_artifact(&self, run: &RunInfo, path: &str, contents: &[u8]) -> Result<(), StorageError>;

    /// Walks the whole tree below the artifact root and returns every file path in sorted order.
    fn list_artifact_tree(&self, run: &RunInfo) -> Result<Vec<String>, StorageError> {
        let mut files = Vec::new();
        let mut pending = vec![None];
        while let Some(dir) = pending.pop() {
            for entry in self.list_artifacts(run, dir.as_deref())? {
                if entry.is_dir {
                    pending.push(Some(entry.path));
                } else {
                    files.push(entry.path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}
