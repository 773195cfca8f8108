//! Rebuilds a run from its table row and, when there is one, its metadata entry.

use crate::{
    api::{
        error::UpdateError,
        run::{Metric, Param, RunInfo, RunStatus, RunTag},
    },
    timestamp,
    tracking::TrackingRun,
    transfer::{
        metadata::RunMetadata,
        table::{Header, Row},
    },
    Client,
};

/// Everything the destination run gets logged, before it is created.
///
/// With metadata the full metric histories and the non-reserved tags are
/// replayed. Without it only the latest value per metric is known; it is
/// logged at step 0 with the run's start time as timestamp, and no tags are
/// logged at all.
pub fn to_tracking_run(row: &Row, header: &Header, metadata: Option<&RunMetadata>) -> TrackingRun {
    let start_time = row.start_time().unwrap_or_else(timestamp);
    let mut run = TrackingRun::started_at(start_time);
    for (key, value) in row.params(header) {
        run.log_param(Param { key: key.to_string(), value: value.to_string() });
    }

    let metadata = match metadata {
        Some(metadata) => metadata,
        None => {
            for (key, value) in row.metrics(header) {
                run.log_metric(Metric { key: key.to_string(), value, timestamp: start_time, step: 0 });
            }
            return run;
        }
    };

    for (key, samples) in &metadata.metrics {
        for sample in samples {
            run.log_metric(sample.to_metric(key));
        }
    }
    for (key, value) in row.metrics(header) {
        let has_history = metadata.metrics.get(key).map_or(false, |samples| !samples.is_empty());
        if !has_history {
            tracing::warn!(run_id = %row.run_id, metric = key, "no history for metric, logging the table value only");
            run.log_metric(Metric { key: key.to_string(), value, timestamp: start_time, step: 0 });
        }
    }

    let mut reserved = 0;
    for (key, value) in &metadata.tags {
        let tag = RunTag { key: key.clone(), value: value.clone() };
        if tag.is_reserved() {
            reserved += 1;
        } else {
            run.log_tag(tag);
        }
    }
    if reserved > 0 {
        tracing::debug!(run_id = %row.run_id, reserved, "skipped reserved tags");
    }
    run
}

/// Moves a freshly created run into the status it had when it was exported.
///
/// An empty status counts as `FINISHED`. Terminated runs without a known end
/// time end now.
pub fn terminate(client: &mut dyn Client, run: &RunInfo, row: &Row, metadata: Option<&RunMetadata>) -> Result<RunInfo, UpdateError> {
    let status = row.status().unwrap_or(RunStatus::Finished);
    let end_time = metadata.and_then(|metadata| metadata.end_time);
    let end_time = match end_time {
        None if status.is_terminated() => Some(timestamp()),
        end_time => end_time,
    };
    client.update_run(&run.run_id, status, end_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::memory::MemoryServer, transfer::metadata::MetricSample};

    fn row_and_header() -> (Row, Header) {
        let header = Header::new(vec!["lr".to_string(), "opt".to_string()], vec!["acc".to_string(), "loss".to_string()]);
        let mut row = Row::blank("r1", &header);
        row.status = "FAILED".into();
        row.start_time = "1000".into();
        row.params = vec!["0.1".into(), "".into()];
        row.metrics = vec!["0.95".into(), "0.2".into()];
        (row, header)
    }

    fn metadata() -> RunMetadata {
        let mut metadata = RunMetadata::default();
        metadata.metrics.insert(
            "acc".into(),
            vec![
                MetricSample { value: 0.9, step: 0, timestamp: 1001 },
                MetricSample { value: 0.95, step: 1, timestamp: 1002 },
            ],
        );
        metadata.tags.insert("team".into(), "vision".into());
        metadata.tags.insert("mlflow.user".into(), "someone".into());
        metadata.end_time = Some(2000);
        metadata
    }

    #[test]
    fn without_metadata_only_latest_values_are_logged() {
        let (row, header) = row_and_header();
        let run = to_tracking_run(&row, &header, None);
        assert_eq!(run.params(), &[Param { key: "lr".into(), value: "0.1".into() }]);
        assert!(run.tags().is_empty());
        assert_eq!(
            run.metrics(),
            &[
                Metric { key: "acc".into(), value: 0.95, timestamp: 1000, step: 0 },
                Metric { key: "loss".into(), value: 0.2, timestamp: 1000, step: 0 },
            ]
        );
    }

    #[test]
    fn metadata_replays_history_and_user_tags() {
        let (row, header) = row_and_header();
        let metadata = metadata();
        let run = to_tracking_run(&row, &header, Some(&metadata));
        let acc: Vec<_> = run.metrics().iter().filter(|metric| metric.key == "acc").collect();
        assert_eq!(acc.len(), 2);
        assert_eq!((acc[1].step, acc[1].timestamp), (1, 1002));
        // loss has no history and falls back to the table value
        assert!(run.metrics().iter().any(|metric| metric.key == "loss" && metric.value == 0.2));
        assert_eq!(run.tags(), &[RunTag { key: "team".into(), value: "vision".into() }]);
    }

    #[test]
    fn terminate_applies_status_and_end_time() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        let (row, header) = row_and_header();
        let created = to_tracking_run(&row, &header, None).submit(&mut server, &experiment).unwrap();

        let info = terminate(&mut server, &created.info, &row, Some(&metadata())).unwrap();
        assert_eq!(info.status, RunStatus::Failed);
        assert_eq!(info.end_time, Some(2000));
    }
}
