//! Copies artifact trees between a run's artifact root and a local directory.
//!
//! Files of one run are transferred by a bounded pool of workers. A failing
//! file never stops its siblings and nothing already transferred is undone;
//! every failure is reported against the path it concerns.

use rayon::prelude::*;
use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::{
    api::run::RunInfo,
    transfer::error::{ArtifactError, Error},
    ArtifactRepository,
};

/// What happened to one run's artifacts.
#[derive(Debug, Default)]
pub struct ArtifactReport {
    /// Every path that belongs to the run, in order.
    pub manifest: Vec<String>,
    /// Paths that arrived at the destination.
    pub transferred: Vec<String>,
    pub failures: Vec<ArtifactError>,
}

impl ArtifactReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ArtifactTransfer {
    pool: rayon::ThreadPool,
}

impl ArtifactTransfer {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("artifact-worker-{}", index))
            .build()
            .map_err(|e| Error::io("starting artifact workers", io::Error::new(io::ErrorKind::Other, e)))?;
        Ok(ArtifactTransfer { pool })
    }

    /// Downloads the run's whole tree into `destination/<relative-path>`.
    ///
    /// Whatever `destination` held before is removed first.
    pub fn archive(&self, repository: &dyn ArtifactRepository, run: &RunInfo, destination: &Path) -> ArtifactReport {
        if let Err(source) = clear_dir(destination) {
            return ArtifactReport {
                failures: vec![ArtifactError::Io { path: destination.display().to_string(), source }],
                ..ArtifactReport::default()
            };
        }
        let listed = match repository.list_artifact_tree(run) {
            Ok(listed) => listed,
            Err(error) => {
                return ArtifactReport {
                    failures: vec![ArtifactError::List(error)],
                    ..ArtifactReport::default()
                }
            }
        };
        let (manifest, mut failures) = check_manifest(listed);
        if manifest.is_empty() {
            return ArtifactReport { manifest, transferred: Vec::new(), failures };
        }

        let results: Vec<Result<String, ArtifactError>> = self.pool.install(|| {
            manifest
                .par_iter()
                .map(|path| {
                    let target = local_path(destination, path)?;
                    let contents = repository
                        .download_artifact(run, path)
                        .map_err(|source| ArtifactError::Download { path: path.clone(), source })?;
                    write_file(&target, &contents).map_err(|source| ArtifactError::Io { path: path.clone(), source })?;
                    tracing::debug!(run_id = %run.run_id, %path, bytes = contents.len(), "archived artifact");
                    Ok(path.clone())
                })
                .collect()
        });
        let transferred = split_results(results, &mut failures);
        ArtifactReport { manifest, transferred, failures }
    }

    /// Uploads the files below `source` under the same relative path.
    ///
    /// With a `manifest` only the listed paths are uploaded; listed paths that
    /// are not on disk are reported as missing and unlisted files are skipped.
    /// Without one every file below `source` is uploaded.
    pub fn restore(
        &self,
        repository: &dyn ArtifactRepository,
        run: &RunInfo,
        source: &Path,
        manifest: Option<&[String]>,
    ) -> ArtifactReport {
        let mut failures = Vec::new();
        let local = if source.is_dir() {
            match local_tree(source) {
                Ok(local) => local,
                Err(error) => {
                    failures.push(error);
                    Vec::new()
                }
            }
        } else {
            if manifest.map_or(false, |manifest| !manifest.is_empty()) {
                tracing::warn!(run_id = %run.run_id, path = %source.display(), "artifact directory is missing");
            }
            Vec::new()
        };

        let planned = match manifest {
            Some(manifest) => {
                let on_disk: BTreeSet<&str> = local.iter().map(String::as_str).collect();
                let (listed, refused) = check_manifest(manifest.to_vec());
                failures.extend(refused);
                let (present, missing): (Vec<String>, Vec<String>) =
                    listed.into_iter().partition(|path| on_disk.contains(path.as_str()));
                failures.extend(missing.into_iter().map(ArtifactError::Missing));
                let unlisted = local.len() - present.len();
                if unlisted > 0 {
                    tracing::warn!(run_id = %run.run_id, files = unlisted, "skipping local files that are not in the manifest");
                }
                present
            }
            None => local,
        };

        let results: Vec<Result<String, ArtifactError>> = self.pool.install(|| {
            planned
                .par_iter()
                .map(|path| {
                    let file = local_path(source, path)?;
                    let contents = fs::read(&file).map_err(|source| ArtifactError::Io { path: path.clone(), source })?;
                    repository
                        .upload_artifact(run, path, &contents)
                        .map_err(|source| ArtifactError::Upload { path: path.clone(), source })?;
                    tracing::debug!(run_id = %run.run_id, %path, bytes = contents.len(), "restored artifact");
                    Ok(path.clone())
                })
                .collect()
        });
        let transferred = split_results(results, &mut failures);
        ArtifactReport {
            manifest: planned,
            transferred,
            failures,
        }
    }
}

fn split_results(results: Vec<Result<String, ArtifactError>>, failures: &mut Vec<ArtifactError>) -> Vec<String> {
    let mut transferred = Vec::new();
    for result in results {
        match result {
            Ok(path) => transferred.push(path),
            Err(error) => failures.push(error),
        }
    }
    transferred
}

/// Drops unsafe and repeated paths from a listing.
fn check_manifest(listed: Vec<String>) -> (Vec<String>, Vec<ArtifactError>) {
    let mut seen = BTreeSet::new();
    let mut manifest = Vec::with_capacity(listed.len());
    let mut failures = Vec::new();
    for path in listed {
        if !is_safe(&path) {
            failures.push(ArtifactError::UnsafePath(path));
        } else if !seen.insert(path.clone()) {
            failures.push(ArtifactError::DuplicatePath(path));
        } else {
            manifest.push(path);
        }
    }
    (manifest, failures)
}

fn is_safe(relative: &str) -> bool {
    !relative.is_empty()
        && relative
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\'))
}

fn local_path(root: &Path, relative: &str) -> Result<PathBuf, ArtifactError> {
    if !is_safe(relative) {
        return Err(ArtifactError::UnsafePath(relative.to_string()));
    }
    Ok(relative.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment)))
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

fn write_file(target: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, contents)
}

/// Every file below `root` as a `/`-separated relative path, sorted.
fn local_tree(root: &Path) -> Result<Vec<String>, ArtifactError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| ArtifactError::Io {
            path: root.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or_else(|_| entry.path());
        let segments = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ArtifactError::Io {
                path: relative.display().to_string(),
                source: io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
            })?;
        files.push(segments.join("/"));
    }
    files.sort();
    Ok(files)
}
