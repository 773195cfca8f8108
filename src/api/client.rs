use crate::api::{error::*, experiment::*, id::*, run::*, search::*};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewType {
    #[serde(rename = "ACTIVE_ONLY")]
    Active,
    #[serde(rename = "DELETED_ONLY")]
    Deleted,
    #[serde(rename = "ALL")]
    All,
}

/// The calls this crate makes against a tracking server.
#[rustfmt::skip]
pub trait Client {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId, CreateError>;
    fn search_experiments(&mut self, view_type: ViewType, max_results: i32, page_token: Option<&str>) -> Result<ExperimentPage, StorageError>;
    fn get_experiment(&mut self, id: &ExperimentId) -> Result<Experiment, GetError>;
    fn get_experiment_by_name(&mut self, name: &str) -> Result<Experiment, GetError>;
    fn delete_experiment(&mut self, id: &ExperimentId) -> Result<(), DeleteError>;
    fn restore_experiment(&mut self, id: &ExperimentId) -> Result<(), RestoreError>;

    fn create_run(&mut self, experiment: &ExperimentId, start_time: i64, tags: &[RunTag]) -> Result<Run, StorageError>;
    fn delete_run(&mut self, id: &RunId) -> Result<(), DeleteError>;
    fn get_run(&mut self, id: &RunId) -> Result<Run, GetError>;
    fn update_run(&mut self, id: &RunId, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, UpdateError>;
    fn search_runs(&mut self, experiment_ids: &[&ExperimentId], filter: &str, run_view_type: ViewType, max_results: i32, order_by: Option<&str>, page_token: Option<&str>) -> Result<Search, StorageError>;
    fn get_metric_history(&mut self, run: &RunId, metric: &str) -> Result<Vec<Metric>, GetError>;

    fn log_param(&mut self, run: &RunId, key: &str, value: &str) -> Result<(), StorageError>;
    fn log_metric(&mut self, run: &RunId, key: &str, value: f64, timestamp: i64, step: i64) -> Result<(), StorageError>;
    fn set_tag(&mut self, run: &RunId, key: &str, value: &str) -> Result<(), StorageError>;
    fn log_batch(&mut self, run: &RunId, metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<(), BatchError>;
}

/// Collects every run of an experiment by following search page tokens.
pub fn list_runs(client: &mut dyn Client, experiment: &ExperimentId) -> Result<Vec<Run>, StorageError> {
    const PAGE_SIZE: i32 = 1000;
    let mut runs = Vec::new();
    let mut page_token: Option<PageToken> = None;
    loop {
        let page = client.search_runs(
            &[experiment],
            "",
            ViewType::Active,
            PAGE_SIZE,
            None,
            page_token.as_ref().map(|token| token.as_ref()),
        )?;
        tracing::debug!(experiment = %experiment, count = page.runs.len(), "fetched page of runs");
        runs.extend(page.runs);
        match page.next_page_token {
            Some(token) if !token.as_ref().is_empty() => page_token = Some(token),
            _ => break,
        }
    }
    Ok(runs)
}

/// Collects every experiment visible under `view_type`.
pub fn list_experiments(client: &mut dyn Client, view_type: ViewType) -> Result<Vec<Experiment>, StorageError> {
    const PAGE_SIZE: i32 = 1000;
    let mut experiments = Vec::new();
    let mut page_token: Option<PageToken> = None;
    loop {
        let page = client.search_experiments(view_type, PAGE_SIZE, page_token.as_ref().map(|token| token.as_ref()))?;
        experiments.extend(page.experiments);
        match page.next_page_token {
            Some(token) if !token.as_ref().is_empty() => page_token = Some(token),
            _ => break,
        }
    }
    Ok(experiments)
}
