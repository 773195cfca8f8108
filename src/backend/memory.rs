//! A tracking store that lives in process memory.
//!
//! It follows the semantics of the REST server closely enough to run exports
//! and imports against it: experiment names are unique across lifecycle
//! stages, search results carry the latest value per metric and artifact
//! listings are one directory level deep. Clones share the same store.

use crate::{ExperimentId, RunId, api::{
        artifact::{ArtifactRepository, FileInfo},
        client::{Client, ViewType},
        error::{check_batch, BatchError, CreateError, DeleteError, GetError, RestoreError, StorageError, UpdateError},
        experiment::{Experiment, LifecycleStage},
        run::{Metric, Param, Run, RunData, RunInfo, RunStatus, RunTag},
        search::{ExperimentPage, PageToken, Search},
    }};
use anyhow::anyhow;
use nanorand::{WyRand, RNG};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    /// Random per store, so runs of two stores never share an id.
    run_id_prefix: u64,
    next_id: u64,
    experiments: Vec<Experiment>,
    runs: BTreeMap<RunId, StoredRun>,
    artifacts: BTreeMap<RunId, BTreeMap<String, Vec<u8>>>,
    failing_uploads: BTreeSet<String>,
    failing_metrics: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct StoredRun {
    info: RunInfo,
    params: Vec<Param>,
    tags: Vec<RunTag>,
    metrics: Vec<Metric>,
    deleted: bool,
}

impl StoredRun {
    fn to_run(&self) -> Run {
        let mut latest: BTreeMap<&str, &Metric> = BTreeMap::new();
        for metric in &self.metrics {
            let newer = latest
                .get(metric.key.as_str())
                .map_or(true, |current| (metric.step, metric.timestamp) >= (current.step, current.timestamp));
            if newer {
                latest.insert(&metric.key, metric);
            }
        }
        Run {
            info: self.info.clone(),
            data: RunData {
                metrics: Some(latest.values().map(|metric| (*metric).clone()).collect()),
                params: Some(self.params.clone()),
                tags: Some(self.tags.clone()),
            },
        }
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        MemoryServer::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        let state = State {
            run_id_prefix: WyRand::new().generate::<u64>(),
            ..State::default()
        };
        MemoryServer { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not take the store down with it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every upload of `path` fail, whichever run it belongs to.
    pub fn fail_uploads_of(&self, path: &str) {
        self.state().failing_uploads.insert(path.to_string());
    }

    /// Makes every batch containing a metric named `key` fail.
    pub fn fail_metric(&self, key: &str) {
        self.state().failing_metrics.insert(key.to_string());
    }

    /// Stores an artifact directly, bypassing the client calls.
    pub fn put_artifact(&self, run: &RunId, path: &str, contents: &[u8]) {
        self.state()
            .artifacts
            .entry(run.clone())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn artifact(&self, run: &RunId, path: &str) -> Option<Vec<u8>> {
        self.state().artifacts.get(run)?.get(path).cloned()
    }

    pub fn artifact_paths(&self, run: &RunId) -> Vec<String> {
        self.state()
            .artifacts
            .get(run)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every logged sample of every metric, in logging order.
    pub fn logged_metrics(&self, run: &RunId) -> Vec<Metric> {
        self.state().runs.get(run).map(|run| run.metrics.clone()).unwrap_or_default()
    }

    pub fn run_count(&self, experiment: &ExperimentId) -> usize {
        self.state()
            .runs
            .values()
            .filter(|run| !run.deleted && run.info.experiment_id == *experiment)
            .count()
    }
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn experiment_mut(&mut self, id: &ExperimentId) -> Result<&mut Experiment, GetError> {
        self.experiments
            .iter_mut()
            .find(|experiment| experiment.experiment_id == *id)
            .ok_or_else(|| GetError::DoesNotExist(id.to_string()))
    }

    fn run_mut(&mut self, id: &RunId) -> Result<&mut StoredRun, StorageError> {
        match self.runs.get_mut(id) {
            Some(run) if !run.deleted => Ok(run),
            _ => Err(anyhow!("run {} does not exist", id)),
        }
    }
}

fn visible(stage: LifecycleStage, view_type: ViewType) -> bool {
    match view_type {
        ViewType::Active => stage == LifecycleStage::Active,
        ViewType::Deleted => stage == LifecycleStage::Deleted,
        ViewType::All => true,
    }
}

fn page<T: Clone>(items: &[T], max_results: i32, page_token: Option<&str>) -> Result<(Vec<T>, Option<PageToken>), StorageError> {
    let offset = match page_token {
        Some(token) => token.parse::<usize>().map_err(|_| anyhow!("invalid page token {}", token))?,
        None => 0,
    };
    let size = usize::try_from(max_results.max(1)).unwrap_or(1);
    let end = (offset + size).min(items.len());
    let next = if end < items.len() { Some(PageToken::from(end.to_string())) } else { None };
    Ok((items.get(offset..end).unwrap_or_default().to_vec(), next))
}

impl Client for MemoryServer {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId, CreateError> {
        let mut state = self.state();
        if state.experiments.iter().any(|experiment| experiment.name == name) {
            return Err(CreateError::AlreadyExists(name.to_string()));
        }
        let id = ExperimentId::from(state.next_id().to_string());
        state.experiments.push(Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
            artifact_location: format!("memory:/{}", id),
            lifecycle_stage: LifecycleStage::Active,
            last_update_time: None,
            creation_time: Some(crate::timestamp()),
            tags: None,
        });
        Ok(id)
    }

    fn search_experiments(&mut self, view_type: ViewType, max_results: i32, page_token: Option<&str>) -> Result<ExperimentPage, StorageError> {
        let state = self.state();
        let matching: Vec<Experiment> = state
            .experiments
            .iter()
            .filter(|experiment| visible(experiment.lifecycle_stage, view_type))
            .cloned()
            .collect();
        let (experiments, next_page_token) = page(&matching, max_results, page_token)?;
        Ok(ExperimentPage { experiments, next_page_token })
    }

    fn get_experiment(&mut self, id: &ExperimentId) -> Result<Experiment, GetError> {
        self.state().experiment_mut(id).map(|experiment| experiment.clone())
    }

    fn get_experiment_by_name(&mut self, name: &str) -> Result<Experiment, GetError> {
        self.state()
            .experiments
            .iter()
            .find(|experiment| experiment.name == name)
            .cloned()
            .ok_or_else(|| GetError::DoesNotExist(name.to_string()))
    }

    fn delete_experiment(&mut self, id: &ExperimentId) -> Result<(), DeleteError> {
        self.state().experiment_mut(id)?.lifecycle_stage = LifecycleStage::Deleted;
        Ok(())
    }

    fn restore_experiment(&mut self, id: &ExperimentId) -> Result<(), RestoreError> {
        self.state().experiment_mut(id)?.lifecycle_stage = LifecycleStage::Active;
        Ok(())
    }

    fn create_run(&mut self, experiment: &ExperimentId, start_time: i64, tags: &[RunTag]) -> Result<Run, StorageError> {
        let mut state = self.state();
        match state.experiment_mut(experiment) {
            Ok(found) if found.lifecycle_stage == LifecycleStage::Active => {}
            _ => return Err(anyhow!("experiment {} is not active", experiment)),
        }
        let run_id_prefix = state.run_id_prefix;
        let run_id = RunId::from(format!("{:016x}{:016x}", run_id_prefix, state.next_id()));
        let stored = StoredRun {
            info: RunInfo {
                run_id: run_id.clone(),
                experiment_id: experiment.clone(),
                status: RunStatus::Running,
                start_time,
                end_time: None,
                artifact_uri: format!("memory:/{}/{}/artifacts", experiment, run_id),
                lifecycle_stage: "active".to_string(),
            },
            params: Vec::new(),
            tags: tags.to_vec(),
            metrics: Vec::new(),
            deleted: false,
        };
        let run = stored.to_run();
        state.runs.insert(run_id, stored);
        Ok(run)
    }

    fn delete_run(&mut self, id: &RunId) -> Result<(), DeleteError> {
        let mut state = self.state();
        let run = state.run_mut(id).map_err(|_| GetError::DoesNotExist(id.to_string()))?;
        run.deleted = true;
        run.info.lifecycle_stage = "deleted".to_string();
        Ok(())
    }

    fn get_run(&mut self, id: &RunId) -> Result<Run, GetError> {
        let mut state = self.state();
        let run = state.run_mut(id).map_err(|_| GetError::DoesNotExist(id.to_string()))?;
        Ok(run.to_run())
    }

    fn update_run(&mut self, id: &RunId, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, UpdateError> {
        let mut state = self.state();
        let run = state.run_mut(id).map_err(|_| GetError::DoesNotExist(id.to_string()))?;
        run.info.status = status;
        if end_time.is_some() {
            run.info.end_time = end_time;
        }
        Ok(run.info.clone())
    }

    fn search_runs(&mut self, experiment_ids: &[&ExperimentId], _filter: &str, run_view_type: ViewType, max_results: i32, _order_by: Option<&str>, page_token: Option<&str>) -> Result<Search, StorageError> {
        let state = self.state();
        let matching: Vec<Run> = state
            .runs
            .values()
            .filter(|run| experiment_ids.iter().any(|id| **id == run.info.experiment_id))
            .filter(|run| {
                let stage = if run.deleted { LifecycleStage::Deleted } else { LifecycleStage::Active };
                visible(stage, run_view_type)
            })
            .map(StoredRun::to_run)
            .collect();
        let (runs, next_page_token) = page(&matching, max_results, page_token)?;
        Ok(Search { runs, next_page_token })
    }

    fn get_metric_history(&mut self, run: &RunId, metric: &str) -> Result<Vec<Metric>, GetError> {
        let mut state = self.state();
        let stored = state.run_mut(run).map_err(|_| GetError::DoesNotExist(run.to_string()))?;
        Ok(stored.metrics.iter().filter(|sample| sample.key == metric).cloned().collect())
    }

    fn log_param(&mut self, run: &RunId, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        let stored = state.run_mut(run)?;
        if let Some(existing) = stored.params.iter().find(|param| param.key == key) {
            if existing.value != value {
                return Err(anyhow!("param {} of run {} is already logged with a different value", key, run));
            }
            return Ok(());
        }
        stored.params.push(Param { key: key.to_string(), value: value.to_string() });
        Ok(())
    }

    fn log_metric(&mut self, run: &RunId, key: &str, value: f64, timestamp: i64, step: i64) -> Result<(), StorageError> {
        let mut state = self.state();
        if state.failing_metrics.contains(key) {
            return Err(anyhow!("metric {} is rejected by the store", key));
        }
        state.run_mut(run)?.metrics.push(Metric { key: key.to_string(), value, timestamp, step });
        Ok(())
    }

    fn set_tag(&mut self, run: &RunId, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        let stored = state.run_mut(run)?;
        stored.tags.retain(|tag| tag.key != key);
        stored.tags.push(RunTag { key: key.to_string(), value: value.to_string() });
        Ok(())
    }

    fn log_batch(&mut self, run: &RunId, metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<(), BatchError> {
        check_batch(metrics.len(), params.len(), tags.len())?;
        if let Some(metric) = metrics.iter().find(|metric| self.state().failing_metrics.contains(&metric.key)) {
            return Err(BatchError::Storage(anyhow!("metric {} is rejected by the store", metric.key)));
        }
        for param in params {
            self.log_param(run, &param.key, &param.value)?;
        }
        for tag in tags {
            self.set_tag(run, &tag.key, &tag.value)?;
        }
        for metric in metrics {
            self.log_metric(run, &metric.key, metric.value, metric.timestamp, metric.step)?;
        }
        Ok(())
    }
}

impl ArtifactRepository for MemoryServer {
    fn list_artifacts(&self, run: &RunInfo, path: Option<&str>) -> Result<Vec<FileInfo>, StorageError> {
        let state = self.state();
        let prefix = path.map(|path| format!("{}/", path.trim_end_matches('/'))).unwrap_or_default();
        let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
        for (file, contents) in state.artifacts.get(&run.run_id).into_iter().flatten() {
            let rest = match file.strip_prefix(&prefix) {
                Some(rest) => rest,
                None => continue,
            };
            let entry = match rest.split_once('/') {
                Some((dir, _)) => FileInfo { path: format!("{}{}", prefix, dir), is_dir: true, file_size: None },
                None => FileInfo { path: file.clone(), is_dir: false, file_size: Some(contents.len() as i64) },
            };
            entries.insert(entry.path.clone(), entry);
        }
        Ok(entries.into_values().collect())
    }

    fn download_artifact(&self, run: &RunInfo, path: &str) -> Result<Vec<u8>, StorageError> {
        self.artifact(&run.run_id, path)
            .ok_or_else(|| anyhow!("artifact {} of run {} does not exist", path, run.run_id))
    }

    fn upload_artifact(&self, run: &RunInfo, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        if self.state().failing_uploads.contains(path) {
            return Err(anyhow!("upload of {} was rejected by the store", path));
        }
        self.put_artifact(&run.run_id, path, contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separate_stores_never_share_run_ids() {
        let mut first = MemoryServer::new();
        let mut second = MemoryServer::new();
        let a = first.create_experiment("Exp").unwrap();
        let b = second.create_experiment("Exp").unwrap();
        let from_first = first.create_run(&a, 0, &[]).unwrap().info.run_id;
        let from_second = second.create_run(&b, 0, &[]).unwrap().info.run_id;
        assert_ne!(from_first, from_second);
        assert_eq!(from_first.to_string().len(), 32);
        // clones share the store and keep counting
        let again = first.clone().create_run(&a, 0, &[]).unwrap().info.run_id;
        assert_ne!(again, from_first);
    }

    #[test]
    fn search_reports_latest_metric_by_step_then_timestamp() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        let run = server.create_run(&experiment, 0, &[]).unwrap();
        let id = run.info.run_id;
        server.log_metric(&id, "acc", 0.95, 1, 1).unwrap();
        server.log_metric(&id, "acc", 0.90, 2, 0).unwrap();
        server.log_metric(&id, "acc", 0.97, 3, 1).unwrap();

        let search = server.search_runs(&[&experiment], "", ViewType::Active, 10, None, None).unwrap();
        let latest = &search.runs[0].data.metrics()[0];
        assert_eq!(latest.value, 0.97);
        assert_eq!(server.get_metric_history(&id, "acc").unwrap().len(), 3);
    }

    #[test]
    fn names_stay_taken_after_soft_delete() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        server.delete_experiment(&experiment).unwrap();
        assert!(server.get_experiment_by_name("Exp").unwrap().is_deleted());
        assert!(matches!(server.create_experiment("Exp"), Err(CreateError::AlreadyExists(_))));
        server.restore_experiment(&experiment).unwrap();
        assert!(!server.get_experiment_by_name("Exp").unwrap().is_deleted());
    }

    #[test]
    fn artifact_listing_is_one_level_deep() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        let run = server.create_run(&experiment, 0, &[]).unwrap();
        server.put_artifact(&run.info.run_id, "model/weights.bin", b"w");
        server.put_artifact(&run.info.run_id, "model/conf/params.yaml", b"p");
        server.put_artifact(&run.info.run_id, "notes.txt", b"n");

        let root = server.list_artifacts(&run.info, None).unwrap();
        let paths: Vec<_> = root.iter().map(|entry| (entry.path.as_str(), entry.is_dir)).collect();
        assert_eq!(paths, vec![("model", true), ("notes.txt", false)]);

        let tree = server.list_artifact_tree(&run.info).unwrap();
        assert_eq!(tree, vec!["model/conf/params.yaml", "model/weights.bin", "notes.txt"]);
    }

    #[test]
    fn search_pages_through_runs() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        for start in 0..5 {
            server.create_run(&experiment, start, &[]).unwrap();
        }
        let first = server.search_runs(&[&experiment], "", ViewType::Active, 2, None, None).unwrap();
        assert_eq!(first.runs.len(), 2);
        let runs = crate::api::client::list_runs(&mut server, &experiment).unwrap();
        assert_eq!(runs.len(), 5);
    }
}
