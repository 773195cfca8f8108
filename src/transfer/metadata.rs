//! The sidecar document holding what a CSV row cannot: full metric
//! histories, tags and artifact manifests, keyed by the exported run id.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::Path,
};

use crate::{
    api::{lenient_float, run::Metric},
    transfer::{
        error::{Error, Result, SchemaError},
        table::Table,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(with = "lenient_float")]
    pub value: f64,
    pub step: i64,
    pub timestamp: i64,
}

impl From<&Metric> for MetricSample {
    fn from(metric: &Metric) -> Self {
        MetricSample {
            value: metric.value,
            step: metric.step,
            timestamp: metric.timestamp,
        }
    }
}

impl MetricSample {
    pub fn to_metric(&self, key: &str) -> Metric {
        Metric {
            key: key.to_string(),
            value: self.value,
            timestamp: self.timestamp,
            step: self.step,
        }
    }
}

/// The most recent sample: highest step, then highest timestamp, then last logged.
pub fn latest(samples: &[MetricSample]) -> Option<&MetricSample> {
    samples
        .iter()
        .max_by(|a, b| (a.step, a.timestamp).cmp(&(b.step, b.timestamp)))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Vec<MetricSample>>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDocument {
    pub runs: BTreeMap<String, RunMetadata>,
}

impl MetadataDocument {
    pub fn get(&self, run_id: &str) -> Option<&RunMetadata> {
        self.runs.get(run_id)
    }

    pub fn insert(&mut self, run_id: impl Into<String>, metadata: RunMetadata) {
        self.runs.insert(run_id.into(), metadata);
    }

    /// Every metric key of every run.
    pub fn metric_keys(&self) -> BTreeSet<String> {
        self.runs
            .values()
            .flat_map(|run| run.metrics.keys().cloned())
            .collect()
    }

    /// Every row of `table` needs an entry here.
    pub fn check_covers(&self, table: &Table) -> Result<(), SchemaError> {
        match table.rows.iter().find(|row| !self.runs.contains_key(&row.run_id)) {
            Some(row) => Err(SchemaError::MissingMetadata(row.run_id.clone())),
            None => Ok(()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), self)
            .map_err(|e| Error::io(format!("writing {}", path.display()), e.into()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
        serde_json::from_reader(io::BufReader::new(file)).map_err(|source| {
            SchemaError::MalformedMetadata {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    /// Like [`load`](Self::load), but a missing file is `None`.
    pub fn load_if_present(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }
}
