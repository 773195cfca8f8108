//! Moving an experiment's runs out of a tracking server and back in.
//!
//! An export is a directory holding a flat CSV table (one row per run), a
//! metadata document with what the table cannot hold and one artifact tree
//! per run. See [`layout`] for the naming and [`export`]/[`import`] for the
//! two directions.

pub mod artifacts;
pub mod deserialize;
pub mod error;
pub mod export;
pub mod import;
pub mod layout;
pub mod metadata;
pub mod report;
pub mod resolver;
pub mod serialize;
pub mod table;

pub use error::{ArtifactError, Error, Result, SchemaError};
pub use export::export_experiment;
pub use import::import_experiment;
pub use resolver::MissingExperiment;
