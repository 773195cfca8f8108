use crate::{ExperimentId, RunId, api::{
        artifact::{ArtifactRepository, FileInfo},
        client::{Client, ViewType},
        error::{check_batch, BatchError, CreateError, DeleteError, GetError, RestoreError, StorageError, UpdateError},
        experiment::Experiment,
        run::{Metric, Param, Run, RunInfo, RunStatus, RunTag},
        search::{ExperimentPage, Search},
    }, backend::retry::Backoff};
use anyhow::{anyhow, Context, Error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt::Display, io::Read};

#[derive(Deserialize)]
struct RestErrorResponse {
    pub error_code: RestErrorCode,
    #[serde(default)]
    pub message: String,
}
#[derive(Debug, Clone, thiserror::Error)]
pub enum RestError {
    #[error("{status} {code}: {message}")]
    Known { status: u16, code: RestErrorCode, message: String },
    #[error("Unknown {status} error:\n{body}")]
    Unknown { status: u16, body: String },
    #[error("could not reach the tracking server: {message}")]
    Transport { message: String },
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<RestError> },
}
impl RestError {
    /// Connection failures, rate limiting and 5xx responses may go away on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            RestError::Transport { .. } => true,
            RestError::Known { status, .. } | RestError::Unknown { status, .. } => *status == 429 || *status >= 500,
            RestError::Exhausted { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Known { status, .. } | RestError::Unknown { status, .. } => Some(*status),
            RestError::Transport { .. } => None,
            RestError::Exhausted { last, .. } => last.status(),
        }
    }
}
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RestErrorCode {
    ResourceAlreadyExists,
    ResourceDoesNotExist,
    InvalidParameterValue,
    Unknown(String),
}
impl From<String> for RestErrorCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "RESOURCE_ALREADY_EXISTS" => RestErrorCode::ResourceAlreadyExists,
            "RESOURCE_DOES_NOT_EXIST" => RestErrorCode::ResourceDoesNotExist,
            "INVALID_PARAMETER_VALUE" => RestErrorCode::InvalidParameterValue,
            _ => RestErrorCode::Unknown(value),
        }
    }
}
impl Display for RestErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn is_code(error: &RestError, expected: RestErrorCode) -> bool {
    matches!(error, RestError::Known { code, .. } if *code == expected)
}

/// A MLflow tracking server reached over its REST API.
///
/// `base_url` is the server root, e.g. `http://127.0.0.1:5000`.
#[derive(Debug, Clone)]
pub struct Server {
    base_url: String,
    api_url: String,
    backoff: Backoff,
}

fn parse_error(response: ureq::Response) -> RestError {
    if let Some(error) = response.synthetic_error() {
        return RestError::Transport { message: error.to_string() };
    }
    let status = response.status();
    let body = response
        .into_string()
        .unwrap_or_else(|_| "Could not turn error body into String.".to_string());

    let response = serde_json::from_str::<RestErrorResponse>(&body).ok();
    if let Some(response) = response {
        RestError::Known {
            status,
            code: response.error_code,
            message: response.message,
        }
    } else {
        RestError::Unknown { status, body }
    }
}

fn checked(response: ureq::Response) -> Result<ureq::Response, RestError> {
    if response.error() {
        Err(parse_error(response))
    } else {
        Ok(response)
    }
}

impl Server {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_url = format!("{}/api", base_url);
        Server { base_url, api_url, backoff: Backoff::default() }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn execute<Ep, Val, Hand, Err>(&self, request: Ep, error_handler: Hand) -> Result<Val, Err>
    where
        Ep: Endpoint<Value = Val> + EndpointExt,
        Hand: FnOnce(RestError) -> Err,
        Err: From<anyhow::Error>,
    {
        let url = format!("{}/{}", self.api_url, Ep::PATH);
        let (url, body) = match Ep::METHOD {
            Method::Get => {
                let query = Ep::write_request_query(&request).context("serializing request failed")?;
                (format!("{}?{}", url, query), None)
            }
            Method::Post => {
                let buffer = Ep::write_request_string(&request).context("serializing request failed")?;
                (url, Some(buffer))
            }
        };
        let send = || {
            let response = match &body {
                None => ureq::get(&url).call(),
                Some(body) => ureq::post(&url)
                    .set("Content-Type", "application/json")
                    .send_string(body),
            };
            checked(response)
        };
        match self.backoff.run(send) {
            Err(error) => Err(error_handler(error)),
            Ok(http_response) => {
                let response_string = http_response.into_string().context("failed to turn response into string")?;
                let response = Ep::read_response_string(&response_string)
                    .with_context(|| format!("deserializing response failed:\n{}", &response_string))?;
                let value = Ep::extract(response);
                Ok(value)
            }
        }
    }

    /// Location of a run's artifact root below the `mlflow-artifacts` proxy.
    fn proxied_artifact_url(&self, run: &RunInfo, path: &str) -> Result<String, StorageError> {
        let root = proxied_artifact_root(&run.artifact_uri).ok_or_else(|| {
            anyhow!(
                "artifact root {} of run {} is not served by the tracking server",
                run.artifact_uri,
                run.run_id
            )
        })?;
        Ok(format!("{}/2.0/mlflow-artifacts/artifacts/{}/{}", self.api_url, root, path))
    }
}

/// Strips the `mlflow-artifacts:` scheme (and an optional authority) from an artifact uri.
fn proxied_artifact_root(artifact_uri: &str) -> Option<&str> {
    let rest = artifact_uri.strip_prefix("mlflow-artifacts:")?;
    let rest = match rest.strip_prefix("//") {
        Some(authority_and_path) => &authority_and_path[authority_and_path.find('/')?..],
        None => rest,
    };
    Some(rest.trim_matches('/'))
}

impl Client for Server {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId, CreateError> {
        let request = CreateExperiment {
            name,
            artifact_location: None,
        };
        self.execute(request, |error| {
            if is_code(&error, RestErrorCode::ResourceAlreadyExists) {
                CreateError::AlreadyExists(name.to_string())
            } else {
                CreateError::Storage(error.into())
            }
        })
    }

    fn search_experiments(&mut self, view_type: ViewType, max_results: i32, page_token: Option<&str>) -> Result<ExperimentPage, StorageError> {
        let request = SearchExperiments { view_type, max_results, page_token };
        self.execute(request, StorageError::from)
    }

    fn get_experiment(&mut self, id: &ExperimentId) -> Result<Experiment, GetError> {
        let request = GetExperiment { experiment_id: id };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn get_experiment_by_name(&mut self, name: &str) -> Result<Experiment, GetError> {
        let request = GetExperimentByName { experiment_name: name };
        self.execute(request, |error| does_not_exist(error, name))
    }

    fn delete_experiment(&mut self, id: &ExperimentId) -> Result<(), DeleteError> {
        let request = DeleteExperiment { experiment_id: id };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn restore_experiment(&mut self, id: &ExperimentId) -> Result<(), RestoreError> {
        let request = RestoreExperiment { experiment_id: id };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn create_run(&mut self, experiment_id: &ExperimentId, start_time: i64, tags: &[RunTag]) -> Result<Run, StorageError> {
        let request = CreateRun { experiment_id, start_time, tags };
        self.execute(request, StorageError::from)
    }

    fn delete_run(&mut self, id: &RunId) -> Result<(), DeleteError> {
        let request = DeleteRun { run_id: id };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn get_run(&mut self, id: &RunId) -> Result<Run, GetError> {
        let request = GetRun { run_id: id };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn update_run(&mut self, id: &RunId, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, UpdateError> {
        let request = UpdateRun { run_id: id, status, end_time };
        self.execute(request, |error| does_not_exist(error, id))
    }

    fn search_runs(&mut self, experiment_ids: &[&ExperimentId], filter: &str, run_view_type: ViewType, max_results: i32, order_by: Option<&str>, page_token: Option<&str>) -> Result<Search, StorageError> {
        let request = SearchRuns {
            experiment_ids,
            filter,
            run_view_type,
            max_results,
            order_by: order_by.map(|order| vec![order]),
            page_token,
        };
        self.execute(request, StorageError::from)
    }

    fn get_metric_history(&mut self, run: &RunId, metric: &str) -> Result<Vec<Metric>, GetError> {
        let request = GetMetricHistory { run_id: run, metric_key: metric };
        self.execute(request, |error| does_not_exist(error, run))
    }

    fn log_param(&mut self, run_id: &RunId, key: &str, value: &str) -> Result<(), StorageError> {
        let request = LogParam { run_id, key, value };
        self.execute(request, StorageError::from)
    }

    fn log_metric(&mut self, run_id: &RunId, key: &str, value: f64, timestamp: i64, step: i64) -> Result<(), StorageError> {
        let request = LogMetric { run_id, key, value, timestamp, step };
        self.execute(request, StorageError::from)
    }

    fn set_tag(&mut self, run_id: &RunId, key: &str, value: &str) -> Result<(), StorageError> {
        let request = SetTag { run_id, key, value };
        self.execute(request, StorageError::from)
    }

    fn log_batch(&mut self, run_id: &RunId, metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<(), BatchError> {
        check_batch(metrics.len(), params.len(), tags.len())?;
        let request = LogBatch { run_id, metrics, params, tags };
        self.execute(request, |error| BatchError::Storage(error.into()))
    }
}

impl ArtifactRepository for Server {
    fn list_artifacts(&self, run: &RunInfo, path: Option<&str>) -> Result<Vec<FileInfo>, StorageError> {
        let request = ListArtifacts { run_id: &run.run_id, path };
        self.execute(request, StorageError::from)
    }

    fn download_artifact(&self, run: &RunInfo, path: &str) -> Result<Vec<u8>, StorageError> {
        #[derive(Serialize)]
        struct Query<'a> {
            run_id: &'a RunId,
            path: &'a str,
        }
        let query = serde_qs::to_string(&Query { run_id: &run.run_id, path })?;
        let url = format!("{}/get-artifact?{}", self.base_url, query);
        let response = self.backoff.run(|| checked(ureq::get(&url).call()))?;
        let mut contents = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut contents)
            .with_context(|| format!("reading artifact {} of run {}", path, run.run_id))?;
        Ok(contents)
    }

    fn upload_artifact(&self, run: &RunInfo, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        let url = self.proxied_artifact_url(run, path)?;
        self.backoff.run(|| checked(ureq::put(&url).send_bytes(contents)))?;
        Ok(())
    }
}

fn does_not_exist(error: RestError, resource: &(impl Display + ?Sized)) -> GetError {
    if is_code(&error, RestErrorCode::ResourceDoesNotExist) {
        GetError::DoesNotExist(resource.to_string())
    } else {
        GetError::Storage(error.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

trait Endpoint {
    const PATH: &'static str;
    const METHOD: Method;

    type Response;
    type Value;

    fn extract(response: Self::Response) -> Self::Value;
}
trait VoidEndpoint {
    const PATH: &'static str;
    const METHOD: Method;
}
trait EndpointExt: Endpoint {
    fn read_response_string(response: &str) -> Result<Self::Response, Error>;
    fn write_request_string(request: &Self) -> Result<String, Error>;
    fn write_request_query(request: &Self) -> Result<String, Error>;
}
impl<E> Endpoint for E
where
    E: VoidEndpoint,
{
    const PATH: &'static str = E::PATH;
    const METHOD: Method = E::METHOD;

    type Response = VoidResponse;
    type Value = ();

    fn extract(_response: Self::Response) -> Self::Value {}
}
impl<P, R, V> EndpointExt for P
where
    P: Serialize,
    R: DeserializeOwned,
    P: Endpoint<Response = R, Value = V>,
{
    fn read_response_string(response: &str) -> Result<Self::Response, Error> {
        let response = serde_json::from_str::<'_, R>(response)?;
        Ok(response)
    }

    fn write_request_string(request: &Self) -> Result<String, Error> {
        Ok(serde_json::to_string(request)?)
    }

    fn write_request_query(request: &Self) -> Result<String, Error> {
        Ok(serde_qs::to_string(request)?)
    }
}

#[derive(Deserialize)]
struct VoidResponse {}

#[derive(Debug, Clone, Copy, Serialize)]
struct CreateExperiment<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<&'a str>,
}
#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: ExperimentId,
}
impl Endpoint for CreateExperiment<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/create";
    const METHOD: Method = Method::Post;
    type Response = CreateExperimentResponse;
    type Value = ExperimentId;

    fn extract(response: Self::Response) -> Self::Value {
        response.experiment_id
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GetExperiment<'a> {
    pub experiment_id: &'a ExperimentId,
}
#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}
impl Endpoint for GetExperiment<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/get";
    const METHOD: Method = Method::Get;
    type Value = Experiment;
    type Response = GetExperimentResponse;

    fn extract(response: Self::Response) -> Self::Value {
        response.experiment
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SearchExperiments<'a> {
    pub view_type: ViewType,
    pub max_results: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
}
impl Endpoint for SearchExperiments<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/search";
    const METHOD: Method = Method::Post;
    type Response = ExperimentPage;
    type Value = ExperimentPage;

    fn extract(response: Self::Response) -> Self::Value {
        response
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GetExperimentByName<'a> {
    pub experiment_name: &'a str,
}
impl Endpoint for GetExperimentByName<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/get-by-name";
    const METHOD: Method = Method::Get;
    type Value = Experiment;
    type Response = GetExperimentResponse;

    fn extract(response: Self::Response) -> Self::Value {
        response.experiment
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct DeleteExperiment<'a> {
    pub experiment_id: &'a ExperimentId,
}
impl VoidEndpoint for DeleteExperiment<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/delete";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct RestoreExperiment<'a> {
    pub experiment_id: &'a ExperimentId,
}
impl VoidEndpoint for RestoreExperiment<'_> {
    const PATH: &'static str = "2.0/mlflow/experiments/restore";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct CreateRun<'a> {
    pub experiment_id: &'a ExperimentId,
    pub start_time: i64,
    pub tags: &'a [RunTag],
}
#[derive(Deserialize)]
struct CreateRunResponse {
    run: Run,
}
impl Endpoint for CreateRun<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/create";
    const METHOD: Method = Method::Post;
    type Response = CreateRunResponse;
    type Value = Run;

    fn extract(response: Self::Response) -> Self::Value {
        response.run
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct DeleteRun<'a> {
    pub run_id: &'a RunId,
}
impl VoidEndpoint for DeleteRun<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/delete";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GetRun<'a> {
    pub run_id: &'a RunId,
}
impl Endpoint for GetRun<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/get";
    const METHOD: Method = Method::Get;
    type Response = CreateRunResponse;
    type Value = Run;

    fn extract(response: Self::Response) -> Self::Value {
        response.run
    }
}

#[derive(Debug, Clone, Serialize)]
struct SearchRuns<'a> {
    pub experiment_ids: &'a [&'a ExperimentId],
    pub filter: &'a str,
    pub run_view_type: ViewType,
    pub max_results: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
}
impl Endpoint for SearchRuns<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/search";
    const METHOD: Method = Method::Post;
    type Response = Search;
    type Value = Search;

    fn extract(response: Self::Response) -> Self::Value {
        response
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GetMetricHistory<'a> {
    pub run_id: &'a RunId,
    pub metric_key: &'a str,
}
#[derive(Deserialize)]
struct GetMetricHistoryResponse {
    #[serde(default)]
    metrics: Vec<Metric>,
}
impl Endpoint for GetMetricHistory<'_> {
    const PATH: &'static str = "2.0/mlflow/metrics/get-history";
    const METHOD: Method = Method::Get;
    type Response = GetMetricHistoryResponse;
    type Value = Vec<Metric>;

    fn extract(response: Self::Response) -> Self::Value {
        response.metrics
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct LogParam<'a> {
    pub run_id: &'a RunId,
    pub key: &'a str,
    pub value: &'a str,
}
impl VoidEndpoint for LogParam<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/log-parameter";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct LogMetric<'a> {
    pub run_id: &'a RunId,
    pub key: &'a str,
    #[serde(with = "crate::api::lenient_float")]
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}
impl VoidEndpoint for LogMetric<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/log-metric";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SetTag<'a> {
    pub run_id: &'a RunId,
    pub key: &'a str,
    pub value: &'a str,
}
impl VoidEndpoint for SetTag<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/set-tag";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct LogBatch<'a> {
    pub run_id: &'a RunId,
    pub metrics: &'a [Metric],
    pub params: &'a [Param],
    pub tags: &'a [RunTag],
}
impl VoidEndpoint for LogBatch<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/log-batch";
    const METHOD: Method = Method::Post;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct UpdateRun<'a> {
    pub run_id: &'a RunId,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}
#[derive(Deserialize)]
struct UpdateRunResponse {
    run_info: RunInfo,
}
impl Endpoint for UpdateRun<'_> {
    const PATH: &'static str = "2.0/mlflow/runs/update";
    const METHOD: Method = Method::Post;
    type Response = UpdateRunResponse;
    type Value = RunInfo;

    fn extract(response: Self::Response) -> Self::Value {
        response.run_info
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ListArtifacts<'a> {
    pub run_id: &'a RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
}
#[derive(Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
}
impl Endpoint for ListArtifacts<'_> {
    const PATH: &'static str = "2.0/mlflow/artifacts/list";
    const METHOD: Method = Method::Get;
    type Response = ListArtifactsResponse;
    type Value = Vec<FileInfo>;

    fn extract(response: Self::Response) -> Self::Value {
        response.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_experiment_response() {
        let response = r#"
        {
            "experiment": {
                "experiment_id": "1",
                "name": "T1",
                "artifact_location": "./mlruns/1",
                "lifecycle_stage": "active"
            }
        }
        "#;
        let parsed = serde_json::from_str::<GetExperimentResponse>(response).unwrap();
        assert_eq!(parsed.experiment.experiment_id.as_ref(), "1");
        assert!(!parsed.experiment.is_deleted());
    }

    #[test]
    fn parse_known_error_code() {
        let body = r#"{"error_code": "RESOURCE_DOES_NOT_EXIST", "message": "No Experiment with name=Exp exists"}"#;
        let parsed = serde_json::from_str::<RestErrorResponse>(body).unwrap();
        assert_eq!(parsed.error_code, RestErrorCode::ResourceDoesNotExist);
        let parsed = serde_json::from_str::<RestErrorResponse>(r#"{"error_code": "PERMISSION_DENIED"}"#).unwrap();
        assert_eq!(parsed.error_code, RestErrorCode::Unknown("PERMISSION_DENIED".to_string()));
    }

    #[test]
    fn transient_errors_are_server_side_or_transport() {
        let unavailable = RestError::Unknown { status: 502, body: String::new() };
        let bad_request = RestError::Known {
            status: 400,
            code: RestErrorCode::InvalidParameterValue,
            message: String::new(),
        };
        assert!(unavailable.is_transient());
        assert!(RestError::Transport { message: "reset".into() }.is_transient());
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn get_requests_are_query_encoded() {
        let run_id = RunId::from("abc");
        let query = GetMetricHistory::write_request_query(&GetMetricHistory { run_id: &run_id, metric_key: "val_acc" }).unwrap();
        assert_eq!(query, "run_id=abc&metric_key=val_acc");
        let listing = ListArtifacts::write_request_query(&ListArtifacts { run_id: &run_id, path: None }).unwrap();
        assert_eq!(listing, "run_id=abc");
    }

    #[test]
    fn proxied_artifact_roots() {
        assert_eq!(proxied_artifact_root("mlflow-artifacts:/1/abc/artifacts"), Some("1/abc/artifacts"));
        assert_eq!(proxied_artifact_root("mlflow-artifacts://host:5000/1/abc/artifacts"), Some("1/abc/artifacts"));
        assert_eq!(proxied_artifact_root("s3://bucket/1/abc/artifacts"), None);
    }

    #[test]
    fn server_splits_base_and_api_urls() {
        let server = Server::new("http://127.0.0.1:5000/");
        assert_eq!(server.base_url(), "http://127.0.0.1:5000");
        assert_eq!(server.api_url, "http://127.0.0.1:5000/api");
    }
}
