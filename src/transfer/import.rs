//! Recreates the runs of an export directory in a destination experiment.

use crate::{
    api::experiment::Experiment,
    config::ImportOptions,
    tracking::SubmitError,
    transfer::{
        artifacts::ArtifactTransfer,
        deserialize::{terminate, to_tracking_run},
        error::Result,
        layout::ExportLayout,
        metadata::{MetadataDocument, RunMetadata},
        report::{write_summary, ImportSummary, RunOutcome, RunReport},
        resolver::resolve_destination,
        table::{read_table_file, Header, Row},
    },
    ArtifactRepository, Client,
};

#[derive(Debug)]
pub struct ImportReport {
    pub experiment: Experiment,
    pub layout: ExportLayout,
    pub runs: Vec<RunReport>,
    pub summary: ImportSummary,
}

impl ImportReport {
    pub fn has_failures(&self) -> bool {
        self.summary.runs.failed > 0
    }
}

/// Imports every row of the export in `options.input_dir` as a new run.
///
/// The table and the metadata document are validated completely before the
/// destination experiment is touched. After that every run stands alone: a
/// run that cannot be created is reported as failed and the next one is
/// attempted.
pub fn import_experiment(
    client: &mut dyn Client,
    artifacts: &dyn ArtifactRepository,
    tracking_uri: &str,
    options: &ImportOptions,
) -> Result<ImportReport> {
    let mut layout = match &options.csv_path {
        Some(table) => ExportLayout::with_table(&options.input_dir, table.clone()),
        None => ExportLayout::open(&options.input_dir)?,
    };
    if let Some(metadata) = &options.metadata_path {
        layout.metadata = metadata.clone();
    }

    let metadata = MetadataDocument::load_if_present(&layout.metadata)?;
    let metric_keys = metadata.as_ref().map(MetadataDocument::metric_keys).unwrap_or_default();
    let table = read_table_file(&layout.table, &metric_keys)?;
    match &metadata {
        Some(metadata) => metadata.check_covers(&table)?,
        None => tracing::warn!(
            path = %layout.metadata.display(),
            "no metadata document, importing params and latest metric values only"
        ),
    }
    tracing::info!(table = %layout.table.display(), runs = table.rows.len(), "table is valid");

    let experiment = resolve_destination(client, &options.experiment_name, options.missing_experiment)?;
    let transfer = if options.include_artifacts {
        Some(ArtifactTransfer::new(options.artifact_workers)?)
    } else {
        tracing::info!("artifact transfer is disabled");
        None
    };
    let importer = RunImporter {
        experiment: &experiment,
        header: &table.header,
        layout: &layout,
        artifacts: transfer.as_ref().map(|transfer| (transfer, artifacts)),
    };

    let mut reports = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let entry = metadata.as_ref().and_then(|metadata| metadata.get(&row.run_id));
        let report = importer.import(client, row, entry);
        report.log();
        reports.push(report);
    }

    let summary = ImportSummary::new(&experiment, tracking_uri, &reports);
    write_summary(&layout.import_summary(), &summary)?;
    tracing::info!(
        experiment = %experiment.name,
        succeeded = summary.runs.succeeded,
        degraded = summary.runs.degraded,
        failed = summary.runs.failed,
        "import finished"
    );

    Ok(ImportReport {
        experiment,
        layout,
        runs: reports,
        summary,
    })
}

struct RunImporter<'a> {
    experiment: &'a Experiment,
    header: &'a Header,
    layout: &'a ExportLayout,
    artifacts: Option<(&'a ArtifactTransfer, &'a dyn ArtifactRepository)>,
}

impl RunImporter<'_> {
    fn import(&self, client: &mut dyn Client, row: &Row, metadata: Option<&RunMetadata>) -> RunReport {
        let source = row.run_id.clone();
        let tracking_run = to_tracking_run(row, self.header, metadata);
        let run = match tracking_run.submit(client, &self.experiment.experiment_id) {
            Ok(run) => run,
            Err(error) => {
                if let SubmitError::Orphaned { run, .. } = &error {
                    tracing::error!(run_id = %run, "an incomplete run was left behind in the destination");
                }
                return RunReport {
                    source,
                    target: None,
                    outcome: RunOutcome::Failed(error.to_string()),
                };
            }
        };
        tracing::debug!(run_id = %source, new_run_id = %run.info.run_id, "created run");

        let mut problems = Vec::new();
        if let Some((transfer, repository)) = self.artifacts {
            let manifest = metadata.map(|metadata| metadata.artifacts.as_slice());
            let restored = transfer.restore(repository, &run.info, &self.layout.run_artifacts(&source), manifest);
            problems.extend(restored.failures.iter().map(ToString::to_string));
        }
        if let Err(error) = terminate(client, &run.info, row, metadata) {
            problems.push(format!("setting the run status failed: {}", error));
        }

        RunReport {
            source,
            target: Some(run.info.run_id),
            outcome: RunOutcome::degraded_by(problems),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::memory::MemoryServer, transfer::error::{Error, SchemaError}, transfer::MissingExperiment};
    use std::fs;

    fn write_export(dir: &std::path::Path, csv: &str, metadata: Option<&str>) {
        fs::write(dir.join("Exp_runs.csv"), csv).unwrap();
        if let Some(metadata) = metadata {
            fs::write(dir.join("metadata.json"), metadata).unwrap();
        }
    }

    #[test]
    fn schema_errors_abort_before_any_run_is_created() {
        let server = MemoryServer::new();
        let dir = tempfile::tempdir().unwrap();
        write_export(
            dir.path(),
            "run_id,status,start_time,metric:acc\nr1,FINISHED,1,0.9\nr2,FINISHED,1,high\n",
            None,
        );
        let options = ImportOptions::new(dir.path(), "Dest");
        let error = import_experiment(&mut server.clone(), &server, "memory:", &options).unwrap_err();
        assert!(matches!(error, Error::Schema(SchemaError::NotNumeric { .. })));
        // the destination was not even created
        assert!(server.clone().get_experiment_by_name("Dest").is_err());
    }

    #[test]
    fn metadata_must_cover_every_row() {
        let server = MemoryServer::new();
        let dir = tempfile::tempdir().unwrap();
        write_export(
            dir.path(),
            "run_id,status,start_time\nr1,FINISHED,1\nr2,FINISHED,1\n",
            Some(r#"{"r1": {}}"#),
        );
        let error = import_experiment(&mut server.clone(), &server, "memory:", &ImportOptions::new(dir.path(), "Dest")).unwrap_err();
        assert!(matches!(error, Error::Schema(SchemaError::MissingMetadata(id)) if id == "r2"));
    }

    #[test]
    fn failed_run_does_not_stop_the_others() {
        let server = MemoryServer::new();
        server.fail_metric("broken");
        let dir = tempfile::tempdir().unwrap();
        write_export(
            dir.path(),
            "run_id,status,start_time,metric:acc,metric:broken\nr1,FINISHED,1,0.9,\nr2,FINISHED,1,0.8,1\nr3,FAILED,1,0.7,\n",
            None,
        );
        let report = import_experiment(&mut server.clone(), &server, "memory:", &ImportOptions::new(dir.path(), "Dest")).unwrap();
        assert!(report.has_failures());
        assert_eq!(report.summary.failed_runs, vec!["r2"]);
        assert_eq!(report.summary.runs.succeeded, 2);
        assert_eq!(server.run_count(&report.experiment.experiment_id), 2);
        assert!(report.layout.import_summary().is_file());
    }

    #[test]
    fn strict_mode_needs_an_existing_experiment() {
        let server = MemoryServer::new();
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path(), "run_id,status,start_time\nr1,FINISHED,1\n", None);
        let mut options = ImportOptions::new(dir.path(), "Dest");
        options.missing_experiment = MissingExperiment::Fail;
        let error = import_experiment(&mut server.clone(), &server, "memory:", &options).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }
}
