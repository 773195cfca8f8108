pub mod api;
pub mod backend;
pub mod config;
pub mod lifecycle;
pub mod tracking;
pub mod transfer;

pub use api::artifact::ArtifactRepository;
pub use api::client::Client;
pub use api::id::{ExperimentId, RunId};

/// Utility function to create a MLflow timestamp.
pub fn timestamp() -> i64 {
    use std::convert::TryInto;
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|since| since.as_millis().try_into().unwrap_or(i64::MAX))
        .unwrap_or_default()
}
