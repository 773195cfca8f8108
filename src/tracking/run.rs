use crate::{
    api::{
        error::{limits, BatchError, DeleteError, StorageError},
        run::{Metric, Param, Run, RunTag},
    },
    timestamp, Client, ExperimentId, RunId,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("creating the run failed: {0:#}")]
    Create(StorageError),
    #[error("logging to run {run} failed, the run was deleted again: {source}")]
    RolledBack { run: RunId, source: BatchError },
    #[error("logging to run {run} failed ({source}) and deleting it failed too: {rollback}")]
    Orphaned {
        run: RunId,
        source: BatchError,
        rollback: DeleteError,
    },
}

/// A MLflow Run that is assembled locally and then submitted in batches.
///
/// Nothing is sent before [`submit`](TrackingRun::submit). If any batch is
/// rejected the freshly created run is deleted again, so a run either
/// arrives with all of its data or not at all.
#[derive(Debug, Clone)]
pub struct TrackingRun {
    start_time: i64,
    param_buffer: Vec<Param>,
    tag_buffer: Vec<RunTag>,
    metric_buffer: Vec<Metric>,
}

impl Default for TrackingRun {
    fn default() -> Self {
        TrackingRun::new()
    }
}

impl TrackingRun {
    pub fn new() -> Self {
        TrackingRun::started_at(timestamp())
    }

    pub fn started_at(start_time: i64) -> Self {
        TrackingRun {
            start_time,
            param_buffer: Vec::new(),
            tag_buffer: Vec::new(),
            metric_buffer: Vec::new(),
        }
    }

    pub fn log_param(&mut self, param: Param) {
        self.param_buffer.push(param);
    }

    pub fn log_tag(&mut self, tag: RunTag) {
        self.tag_buffer.push(tag);
    }

    pub fn log_metric(&mut self, metric: Metric) {
        self.metric_buffer.push(metric);
    }

    pub fn params(&self) -> &[Param] {
        &self.param_buffer
    }

    pub fn tags(&self) -> &[RunTag] {
        &self.tag_buffer
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metric_buffer
    }

    /// Creates the run in `experiment` and logs everything buffered so far.
    ///
    /// The run is left in its initial status; terminating it is up to the caller.
    pub fn submit(self, client: &mut dyn Client, experiment: &ExperimentId) -> Result<Run, SubmitError> {
        let run = client
            .create_run(experiment, self.start_time, &[])
            .map_err(SubmitError::Create)?;
        let id = run.info.run_id.clone();
        if let Err(source) = self.log_buffers(client, &id) {
            tracing::warn!(run_id = %id, error = %source, "logging failed, deleting the run");
            return Err(match client.delete_run(&id) {
                Ok(()) => SubmitError::RolledBack { run: id, source },
                Err(rollback) => SubmitError::Orphaned { run: id, source, rollback },
            });
        }
        Ok(run)
    }

    fn log_buffers(&self, client: &mut dyn Client, id: &RunId) -> Result<(), BatchError> {
        for params in self.param_buffer.chunks(limits::BATCH_PARAMS) {
            client.log_batch(id, &[], params, &[])?;
        }
        for tags in self.tag_buffer.chunks(limits::BATCH_TAGS) {
            client.log_batch(id, &[], &[], tags)?;
        }
        for metrics in self.metric_buffer.chunks(limits::BATCH_METRICS) {
            client.log_batch(id, metrics, &[], &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryServer;

    fn metric(key: &str, value: f64, step: i64) -> Metric {
        Metric { key: key.to_string(), value, timestamp: 1000 + step, step }
    }

    #[test]
    fn submit_logs_everything_in_batches() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        let mut run = TrackingRun::started_at(42);
        for i in 0..150 {
            run.log_param(Param { key: format!("p{}", i), value: i.to_string() });
        }
        for step in 0..2500 {
            run.log_metric(metric("loss", 1.0 / (step as f64 + 1.0), step));
        }
        run.log_tag(RunTag { key: "team".into(), value: "vision".into() });

        let created = run.submit(&mut server, &experiment).unwrap();
        let fetched = server.get_run(&created.info.run_id).unwrap();
        assert_eq!(fetched.info.start_time, 42);
        assert_eq!(fetched.data.params().len(), 150);
        assert_eq!(fetched.data.tags().len(), 1);
        assert_eq!(server.logged_metrics(&created.info.run_id).len(), 2500);
    }

    #[test]
    fn failed_batch_deletes_the_run() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        server.fail_metric("broken");
        let mut run = TrackingRun::started_at(0);
        run.log_param(Param { key: "lr".into(), value: "0.1".into() });
        run.log_metric(metric("broken", 1.0, 0));

        let error = run.submit(&mut server, &experiment).unwrap_err();
        assert!(matches!(error, SubmitError::RolledBack { .. }));
        assert_eq!(server.run_count(&experiment), 0);
    }
}
