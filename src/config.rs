//! Where to connect and what to transfer.

use std::path::PathBuf;

use crate::{
    backend::{memory::MemoryServer, rest::Server, retry::Backoff},
    transfer::MissingExperiment,
    ArtifactRepository, Client,
};

pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const DEFAULT_TRACKING_URI: &str = "http://127.0.0.1:5000";
/// Selects the in-process store instead of a server.
pub const MEMORY_URI: &str = "memory:";
pub const DEFAULT_ARTIFACT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    pub uri: String,
    pub backoff: Backoff,
}

/// Both halves of a tracking backend.
pub struct Connection {
    pub client: Box<dyn Client>,
    pub artifacts: Box<dyn ArtifactRepository>,
}

impl TrackingConfig {
    /// `uri` if given, else the environment, else a server on localhost.
    pub fn resolve(uri: Option<String>, max_retries: Option<u32>) -> Self {
        let uri = uri
            .or_else(|| std::env::var(TRACKING_URI_ENV).ok().filter(|uri| !uri.is_empty()))
            .unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string());
        let backoff = max_retries.map_or_else(Backoff::default, Backoff::with_retries);
        TrackingConfig { uri, backoff }
    }

    pub fn connect(&self) -> Connection {
        if self.uri == MEMORY_URI {
            tracing::info!("using an in-memory tracking store, nothing will be persisted");
            let store = MemoryServer::new();
            return Connection {
                client: Box::new(store.clone()),
                artifacts: Box::new(store),
            };
        }
        let server = Server::new(self.uri.trim_end_matches('/')).with_backoff(self.backoff);
        tracing::debug!(uri = %self.uri, retries = self.backoff.max_retries, "connecting to tracking server");
        Connection {
            client: Box::new(server.clone()),
            artifacts: Box::new(server),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Name of the experiment, or its id.
    pub experiment_name: String,
    pub output_dir: PathBuf,
    pub include_artifacts: bool,
    pub artifact_workers: usize,
}

impl ExportOptions {
    pub fn new(experiment_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        ExportOptions {
            experiment_name: experiment_name.into(),
            output_dir: output_dir.into(),
            include_artifacts: true,
            artifact_workers: DEFAULT_ARTIFACT_WORKERS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// The export directory.
    pub input_dir: PathBuf,
    /// The destination experiment.
    pub experiment_name: String,
    /// Overrides the `*_runs.csv` lookup in `input_dir`.
    pub csv_path: Option<PathBuf>,
    /// Overrides `<input_dir>/metadata.json`.
    pub metadata_path: Option<PathBuf>,
    pub include_artifacts: bool,
    pub missing_experiment: MissingExperiment,
    pub artifact_workers: usize,
}

impl ImportOptions {
    pub fn new(input_dir: impl Into<PathBuf>, experiment_name: impl Into<String>) -> Self {
        ImportOptions {
            input_dir: input_dir.into(),
            experiment_name: experiment_name.into(),
            csv_path: None,
            metadata_path: None,
            include_artifacts: true,
            missing_experiment: MissingExperiment::Create,
            artifact_workers: DEFAULT_ARTIFACT_WORKERS,
        }
    }
}
