//! Turns server-side runs into table rows and metadata entries.
//!
//! Serialization is two passes: every run is fetched into a [`RunSnapshot`]
//! first, the union of keys is frozen into a [`Header`], and only then rows
//! are built. The column set therefore does not depend on run order.

use std::collections::BTreeMap;

use crate::{
    api::{
        error::StorageError,
        run::{Run, RunInfo},
    },
    transfer::{
        metadata::{latest, MetadataDocument, MetricSample, RunMetadata},
        table::{Header, Row, Table},
    },
    Client,
};

/// Everything exported about one run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, Vec<MetricSample>>,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<String>,
}

impl RunSnapshot {
    /// Fetches the full history of every metric the run reports.
    pub fn fetch(client: &mut dyn Client, run: Run) -> Result<Self, StorageError> {
        let params = run
            .data
            .params()
            .iter()
            .map(|param| (param.key.clone(), param.value.clone()))
            .collect();
        let tags = run
            .data
            .tags()
            .iter()
            .map(|tag| (tag.key.clone(), tag.value.clone()))
            .collect();
        let mut metrics = BTreeMap::new();
        for metric in run.data.metrics() {
            let history = client.get_metric_history(&run.info.run_id, &metric.key)?;
            let samples = if history.is_empty() {
                // the search result already holds the only sample
                vec![MetricSample::from(metric)]
            } else {
                history.iter().map(MetricSample::from).collect()
            };
            metrics.insert(metric.key.clone(), samples);
        }
        Ok(RunSnapshot {
            info: run.info,
            params,
            metrics,
            tags,
            artifacts: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        self.info.run_id.as_ref()
    }

    pub fn to_row(&self, header: &Header) -> Row {
        let mut row = Row::blank(self.run_id(), header);
        row.status = self.info.status.to_string();
        row.start_time = self.info.start_time.to_string();
        for (cell, key) in row.params.iter_mut().zip(&header.params) {
            if let Some(value) = self.params.get(key) {
                *cell = value.clone();
            }
        }
        for (cell, key) in row.metrics.iter_mut().zip(&header.metrics) {
            if let Some(sample) = self.metrics.get(key).and_then(|samples| latest(samples)) {
                *cell = format_value(sample.value);
            }
        }
        row
    }

    pub fn to_metadata(&self) -> RunMetadata {
        RunMetadata {
            tags: self.tags.clone(),
            metrics: self.metrics.clone(),
            artifacts: self.artifacts.clone(),
            end_time: self.info.end_time,
        }
    }
}

/// Shortest representation that parses back to the same value.
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// The first pass: the union of param and metric keys over all runs.
pub fn collect_header(snapshots: &[RunSnapshot]) -> Header {
    Header::new(
        snapshots.iter().flat_map(|run| run.params.keys().cloned()),
        snapshots.iter().flat_map(|run| run.metrics.keys().cloned()),
    )
}

/// The second pass: one row and one metadata entry per run.
pub fn serialize_runs(snapshots: &[RunSnapshot]) -> (Table, MetadataDocument) {
    let header = collect_header(snapshots);
    let mut metadata = MetadataDocument::default();
    let rows = snapshots
        .iter()
        .map(|run| {
            metadata.insert(run.run_id(), run.to_metadata());
            run.to_row(&header)
        })
        .collect();
    (Table { header, rows }, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::run::RunStatus, backend::memory::MemoryServer};

    fn snapshot(run_id: &str, params: &[(&str, &str)], metrics: &[(&str, Vec<MetricSample>)]) -> RunSnapshot {
        RunSnapshot {
            info: RunInfo {
                run_id: run_id.into(),
                experiment_id: "1".into(),
                status: RunStatus::Finished,
                start_time: 1_600_000_000_000,
                end_time: Some(1_600_000_000_500),
                artifact_uri: String::new(),
                lifecycle_stage: "active".into(),
            },
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    fn sample(value: f64, step: i64, timestamp: i64) -> MetricSample {
        MetricSample { value, step, timestamp }
    }

    #[test]
    fn worked_example_row() {
        let run = snapshot("r1", &[("lr", "0.1")], &[("acc", vec![sample(0.9, 0, 0), sample(0.95, 1, 1)])]);
        let (table, metadata) = serialize_runs(&[run]);
        assert_eq!(table.header.columns(), vec!["run_id", "status", "start_time", "param:lr", "metric:acc"]);
        assert_eq!(table.rows[0].record(), vec!["r1", "FINISHED", "1600000000000", "0.1", "0.95"]);
        assert_eq!(metadata.get("r1").unwrap().metrics["acc"].len(), 2);
        assert_eq!(metadata.get("r1").unwrap().end_time, Some(1_600_000_000_500));
    }

    #[test]
    fn columns_are_stable_across_runs() {
        let runs = vec![
            snapshot("r1", &[("a", "1")], &[]),
            snapshot("r2", &[("b", "2"), ("c", "3")], &[]),
            snapshot("r3", &[], &[("m", vec![sample(0.0, 0, 0)])]),
        ];
        let (table, _) = serialize_runs(&runs);
        assert_eq!(table.header.params, vec!["a", "b", "c"]);
        for row in &table.rows {
            assert_eq!(row.params.len(), 3);
            assert_eq!(row.metrics.len(), 1);
        }
        assert_eq!(table.rows[0].params, vec!["1", "", ""]);
        assert_eq!(table.rows[1].params, vec!["", "2", "3"]);
        assert_eq!(table.rows[2].metrics, vec!["0"]);
        assert_eq!(table.rows[0].metrics, vec![""]);

        let mut reversed = runs.clone();
        reversed.reverse();
        assert_eq!(serialize_runs(&reversed).0.header, table.header);
    }

    #[test]
    fn values_keep_full_precision() {
        assert_eq!(format_value(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_value(1e-7).parse::<f64>().unwrap(), 1e-7);
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn fetch_reads_full_metric_history() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        let run = server.create_run(&experiment, 7, &[]).unwrap();
        let id = run.info.run_id.clone();
        server.log_param(&id, "lr", "0.1").unwrap();
        server.set_tag(&id, "mlflow.user", "me").unwrap();
        server.log_metric(&id, "acc", 0.9, 0, 0).unwrap();
        server.log_metric(&id, "acc", 0.95, 1, 1).unwrap();

        let fetched = server.get_run(&id).unwrap();
        let snapshot = RunSnapshot::fetch(&mut server, fetched).unwrap();
        assert_eq!(snapshot.params["lr"], "0.1");
        assert_eq!(snapshot.tags["mlflow.user"], "me");
        assert_eq!(snapshot.metrics["acc"], vec![sample(0.9, 0, 0), sample(0.95, 1, 1)]);
    }
}
