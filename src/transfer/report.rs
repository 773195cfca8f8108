//! Per-run outcomes and the summaries written at the end of a transfer.

use serde::Serialize;
use std::{collections::BTreeMap, fs, io, path::Path};

use crate::{
    api::experiment::Experiment,
    transfer::error::{Error, Result},
    RunId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// The run made it, but something attached to it did not.
    Degraded(Vec<String>),
    Failed(String),
}

impl RunOutcome {
    /// `Succeeded` when there is nothing to complain about.
    pub fn degraded_by(problems: Vec<String>) -> Self {
        if problems.is_empty() {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Degraded(problems)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// The run id in the source of the transfer.
    pub source: String,
    /// The run that now holds the data, if one does.
    pub target: Option<RunId>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn log(&self) {
        match &self.outcome {
            RunOutcome::Succeeded => tracing::info!(run_id = %self.source, "run transferred"),
            RunOutcome::Degraded(problems) => {
                for problem in problems {
                    tracing::warn!(run_id = %self.source, "{}", problem);
                }
                tracing::warn!(run_id = %self.source, problems = problems.len(), "run transferred with problems");
            }
            RunOutcome::Failed(reason) => tracing::error!(run_id = %self.source, %reason, "run failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub attempted: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
}

impl Counts {
    pub fn of(reports: &[RunReport]) -> Self {
        let mut counts = Counts::default();
        for report in reports {
            counts.attempted += 1;
            match report.outcome {
                RunOutcome::Succeeded => counts.succeeded += 1,
                RunOutcome::Degraded(_) => counts.degraded += 1,
                RunOutcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub experiment_name: String,
    pub experiment_id: String,
    pub tracking_uri: String,
    pub runs: Counts,
    pub param_keys: usize,
    pub metric_keys: usize,
    pub tag_keys: usize,
    /// Exported runs per status.
    pub statuses: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub experiment_name: String,
    pub experiment_id: String,
    pub tracking_uri: String,
    pub runs: Counts,
    /// Source run ids of runs that were not created.
    pub failed_runs: Vec<String>,
    pub degraded_runs: Vec<String>,
}

impl ImportSummary {
    pub fn new(experiment: &Experiment, tracking_uri: &str, reports: &[RunReport]) -> Self {
        let with = |pick: fn(&RunOutcome) -> bool| -> Vec<String> {
            reports
                .iter()
                .filter(|report| pick(&report.outcome))
                .map(|report| report.source.clone())
                .collect()
        };
        ImportSummary {
            experiment_name: experiment.name.clone(),
            experiment_id: experiment.experiment_id.to_string(),
            tracking_uri: tracking_uri.to_string(),
            runs: Counts::of(reports),
            failed_runs: with(|outcome| matches!(outcome, RunOutcome::Failed(_))),
            degraded_runs: with(|outcome| matches!(outcome, RunOutcome::Degraded(_))),
        }
    }
}

pub fn write_summary<T: Serialize>(path: &Path, summary: &T) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), summary)
        .map_err(|e| Error::io(format!("writing {}", path.display()), e.into()))
}
