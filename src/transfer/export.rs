//! Writes an experiment's runs into an export directory.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
};

use crate::{
    api::{client::list_runs, experiment::Experiment},
    config::ExportOptions,
    transfer::{
        artifacts::ArtifactTransfer,
        error::{Error, Result},
        layout::ExportLayout,
        report::{write_summary, Counts, ExportSummary, RunOutcome, RunReport},
        resolver::resolve_source,
        serialize::{serialize_runs, RunSnapshot},
        table::{is_path_segment, write_table_file},
    },
    ArtifactRepository, Client,
};

#[derive(Debug)]
pub struct ExportReport {
    pub experiment: Experiment,
    pub layout: ExportLayout,
    pub runs: Vec<RunReport>,
    pub summary: ExportSummary,
}

/// Exports every active run of the experiment named in `options`.
///
/// A run whose data cannot be read is reported as failed and left out of the
/// table. A run whose artifacts cannot all be copied is exported anyway and
/// reported as degraded.
pub fn export_experiment(
    client: &mut dyn Client,
    artifacts: &dyn ArtifactRepository,
    tracking_uri: &str,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let experiment = resolve_source(client, &options.experiment_name)?;
    let layout = ExportLayout::for_export(&options.output_dir, &experiment.name);
    fs::create_dir_all(&layout.root).map_err(|e| Error::io(format!("creating {}", layout.root.display()), e))?;

    let runs = list_runs(client, &experiment.experiment_id)?;
    tracing::info!(experiment = %experiment.name, runs = runs.len(), output = %layout.root.display(), "exporting");

    let transfer = if options.include_artifacts {
        Some(ArtifactTransfer::new(options.artifact_workers)?)
    } else {
        tracing::info!("artifact transfer is disabled");
        None
    };

    let mut snapshots = Vec::with_capacity(runs.len());
    let mut reports = Vec::with_capacity(runs.len());
    for run in runs {
        let source = run.info.run_id.to_string();
        if !is_path_segment(&source) {
            let report = RunReport {
                source,
                target: None,
                outcome: RunOutcome::Failed("the run id cannot name an artifact directory".to_string()),
            };
            report.log();
            reports.push(report);
            continue;
        }
        let mut snapshot = match RunSnapshot::fetch(client, run) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                let report = RunReport {
                    source,
                    target: None,
                    outcome: RunOutcome::Failed(format!("reading the run failed: {:#}", error)),
                };
                report.log();
                reports.push(report);
                continue;
            }
        };

        let mut problems = Vec::new();
        if let Some(transfer) = &transfer {
            let archived = transfer.archive(artifacts, &snapshot.info, &layout.run_artifacts(&source));
            problems.extend(archived.failures.iter().map(ToString::to_string));
            snapshot.artifacts = archived.transferred;
        }
        let report = RunReport {
            target: Some(snapshot.info.run_id.clone()),
            source,
            outcome: RunOutcome::degraded_by(problems),
        };
        report.log();
        reports.push(report);
        snapshots.push(snapshot);
    }

    let (table, metadata) = serialize_runs(&snapshots);
    write_table_file(&layout.table, &table)?;
    metadata.save(&layout.metadata)?;

    let mut statuses = BTreeMap::new();
    for snapshot in &snapshots {
        *statuses.entry(snapshot.info.status.to_string()).or_insert(0) += 1;
    }
    let tag_keys: BTreeSet<&String> = snapshots.iter().flat_map(|run| run.tags.keys()).collect();
    let summary = ExportSummary {
        experiment_name: experiment.name.clone(),
        experiment_id: experiment.experiment_id.to_string(),
        tracking_uri: tracking_uri.to_string(),
        runs: Counts::of(&reports),
        param_keys: table.header.params.len(),
        metric_keys: table.header.metrics.len(),
        tag_keys: tag_keys.len(),
        statuses,
    };
    write_summary(&layout.export_summary(), &summary)?;
    tracing::info!(
        table = %layout.table.display(),
        succeeded = summary.runs.succeeded,
        degraded = summary.runs.degraded,
        failed = summary.runs.failed,
        "export finished"
    );

    Ok(ExportReport {
        experiment,
        layout,
        runs: reports,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::run::RunStatus, backend::memory::MemoryServer};

    #[test]
    fn missing_experiment_fails_before_writing() {
        let server = MemoryServer::new();
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions::new("Nope", dir.path());
        let error = export_experiment(&mut server.clone(), &server, "memory:", &options).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn summary_counts_statuses_and_keys() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        for (i, status) in [RunStatus::Finished, RunStatus::Failed, RunStatus::Finished].iter().enumerate() {
            let run = server.create_run(&experiment, i as i64, &[]).unwrap();
            server.log_param(&run.info.run_id, &format!("p{}", i), "1").unwrap();
            server.set_tag(&run.info.run_id, "team", "vision").unwrap();
            server.update_run(&run.info.run_id, *status, Some(10)).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let report = export_experiment(&mut server.clone(), &server, "memory:", &ExportOptions::new("Exp", dir.path())).unwrap();

        assert_eq!(report.summary.runs, Counts { attempted: 3, succeeded: 3, degraded: 0, failed: 0 });
        assert_eq!(report.summary.param_keys, 3);
        assert_eq!(report.summary.tag_keys, 1);
        assert_eq!(report.summary.statuses["FINISHED"], 2);
        assert_eq!(report.summary.statuses["FAILED"], 1);
        assert!(report.layout.export_summary().is_file());
        assert!(report.layout.metadata.is_file());
    }
}
