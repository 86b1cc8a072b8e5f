use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::Display,
    fs,
    io::{self, Write},
    path::Path,
    time::Duration,
};

use backon::{BlockingRetryable, ConstantBuilder};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::debug;
use reqwest::{blocking, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
    auth::{self, AuthError, IdentityProvider},
    config::ClientConfig,
    data::{DataId, DataNode, JobId},
    errors::{GraphFailure, RequestFailure},
    file_id::{self, FileId},
    table::Table,
};

/// Well-known job detecting table bounding boxes on a page image.
pub const DETECT_TABLE_JOB: &str = "pageimg2tablebox_base64";

/// Well-known job recognising table structure on a page image.
pub const EXTRACT_TABLE_JOB: &str = "hf_recognise_table_base64";

/// Server-side job state. Anything other than `Queued` and `Running` is
/// terminal; statuses this client doesn't know about fold into `Other` and
/// count as terminal too.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Other,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Status record returned by the jobs endpoint, keyed by job handle.
#[derive(Clone, Debug, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} cannot be base, provide valid URL")]
    CannotBeBase(Url),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("upload failed: {0}")]
    Upload(RequestFailure),

    #[error("job submission failed: {0}")]
    JobSubmission(RequestFailure),

    #[error("query failed: {0}")]
    Query(RequestFailure),

    #[error(transparent)]
    Graph(#[from] GraphFailure),

    #[error("{0} is not supported")]
    NotSupported(&'static str),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("jobs are still in progress")]
    InProgress,

    #[error("{first} and {second} both normalize to query alias {alias}")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    #[error("expected data type {expected}, got {actual}")]
    UnexpectedDataType {
        expected: &'static str,
        actual: String,
    },

    #[error("{0} produced no output")]
    MissingOutput(&'static str),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data_id: DataId,
}

#[derive(Debug, Deserialize)]
struct JobDispatch {
    job_id: JobId,
}

/// Blocking client for the Toto document-processing service.
///
/// Holds the base host, the bearer token resolved once at construction, and
/// a reusable transport handle. All I/O is synchronous; sequential reuse of
/// one instance is supported, concurrent use of the same instance from
/// several threads is not guaranteed.
#[derive(Debug)]
pub struct TotoClient {
    pub(crate) host: Url,
    pub(crate) token: String,
    pub(crate) http: blocking::Client,
    poll_interval: Duration,
}

impl TotoClient {
    /// Build an authenticated client. The injected provider supplies an
    /// identity-provider bearer token which is exchanged once, at
    /// construction, for the service token; it is never refreshed.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot be a base URL, the provider yields no
    /// token, or the exchange endpoint answers with a non-success status.
    pub fn new(
        config: ClientConfig,
        provider: &dyn IdentityProvider,
    ) -> Result<Self, ClientError> {
        if config.host.cannot_be_a_base() {
            return Err(ClientError::CannotBeBase(config.host));
        }

        let http = blocking::Client::new();
        let token = auth::exchange_token(&http, &config.token_url, provider)?;
        Ok(Self {
            host: config.host,
            token,
            http,
            poll_interval: config.poll_interval,
        })
    }

    /// Build a client for a deployment with authentication disabled; a
    /// fixed sentinel token is attached to every request.
    ///
    /// # Errors
    ///
    /// Fails if the provided host cannot be a base URL.
    pub fn new_unauthenticated(config: ClientConfig) -> Result<Self, ClientError> {
        if config.host.cannot_be_a_base() {
            return Err(ClientError::CannotBeBase(config.host));
        }

        Ok(Self {
            host: config.host,
            token: auth::NO_TOKEN.to_owned(),
            http: blocking::Client::new(),
            poll_interval: config.poll_interval,
        })
    }

    pub(crate) fn endpoint(&self, segment: &str) -> Result<Url, ClientError> {
        let mut url = self.host.clone();
        let url_clone = url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::CannotBeBase(url_clone))?
            .push(segment);
        Ok(url)
    }

    /// Upload a local file and return the server-confirmed data id.
    ///
    /// The payload is base64 with a data-URI scheme marker for recognised
    /// extensions; the upload identifier is the deterministic
    /// name-size-mtime [`FileId`], which makes re-uploads of the unchanged
    /// file idempotent. The server may normalize the identifier, so always
    /// use the returned id for subsequent calls.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Upload`] on any non-200 response, carrying
    /// the original status and body.
    pub fn upload_file(&self, path: impl AsRef<Path>) -> Result<DataId, ClientError> {
        let path = path.as_ref();
        let file_id = FileId::for_path(path)?;
        let file_name = file_id::file_name(path)?;
        let payload = encode_payload(path, &fs::read(path)?);

        let url = self.endpoint("upload_file")?;
        debug!("uploading {file_name} as {file_id} to {url}");
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "fileContentBase64": payload,
                "fileName": file_name,
                "uuid": file_id.as_ref(),
            }))
            .send()?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<UploadResponse>()?.data_id),
            status => Err(ClientError::Upload(RequestFailure::new(
                url,
                status,
                response.text()?,
            ))),
        }
    }

    /// Queue a named job against a data id and return the server-assigned
    /// job handle.
    ///
    /// `extra_arguments` is serialized to JSON and passed through opaquely;
    /// `force` requests a re-run even when the server already has a result.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::JobSubmission`] on any non-200 response.
    pub fn queue_job(
        &self,
        job_name: &str,
        data_id: &str,
        extra_arguments: Option<&serde_json::Map<String, serde_json::Value>>,
        force: bool,
    ) -> Result<JobId, ClientError> {
        let mut params: Vec<(&str, String)> = vec![
            ("jobName", job_name.to_owned()),
            ("dataId", data_id.to_owned()),
        ];
        if let Some(extra) = extra_arguments {
            params.push(("extraArguments", serde_json::to_string(extra)?));
        }
        if force {
            params.push(("force", "True".to_owned()));
        }

        let url = self.endpoint("queue_job")?;
        debug!("queuing job {job_name} for {data_id}");
        let response = self
            .http
            .get(url.clone())
            .query(&params)
            .bearer_auth(&self.token)
            .send()?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<JobDispatch>()?.job_id),
            status => Err(ClientError::JobSubmission(RequestFailure::new(
                url,
                status,
                response.text()?,
            ))),
        }
    }

    /// Current status for the given job handles, or for every job known to
    /// the server when `job_ids` is `None`.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Query`] on any non-200 response.
    pub fn jobs(
        &self,
        job_ids: Option<&[JobId]>,
    ) -> Result<HashMap<JobId, JobRecord>, ClientError> {
        let url = self.endpoint("jobs")?;
        let mut request = self.http.get(url.clone()).bearer_auth(&self.token);
        if let Some(ids) = job_ids {
            request = request.json(&serde_json::json!({ "jobIds": ids }));
        }

        let response = request.send()?;
        match response.status() {
            StatusCode::OK => Ok(response.json()?),
            status => Err(ClientError::Query(RequestFailure::new(
                url,
                status,
                response.text()?,
            ))),
        }
    }

    /// Block until every supplied handle has left the `Queued`/`Running`
    /// states, polling at the configured fixed interval.
    ///
    /// Each round snapshots the pending handles, checks the status of every
    /// one of them, and derives the next round's pending set as a fresh
    /// filtered collection. `debug_marks` prints a `.` per poll round and
    /// has no semantic effect. Abandoning the call does not stop server-side
    /// execution.
    ///
    /// # Errors
    ///
    /// Supplying a `timeout` fails immediately with
    /// [`ClientError::NotSupported`]; timeout enforcement is an explicit
    /// non-goal. A handle missing from a status response fails with
    /// [`ClientError::JobNotFound`]; transport and HTTP failures propagate
    /// without retry.
    pub fn wait_for_jobs_to_complete(
        &self,
        job_ids: &[JobId],
        timeout: Option<Duration>,
        debug_marks: bool,
    ) -> Result<(), ClientError> {
        if timeout.is_some() {
            return Err(ClientError::NotSupported("timeout"));
        }
        if job_ids.is_empty() {
            return Ok(());
        }

        let pending = RefCell::new(job_ids.to_vec());

        let fetch = || -> Result<(), Poll> {
            if debug_marks {
                print!(".");
                let _ = io::stdout().flush();
            }

            let snapshot = pending.borrow().clone();
            let statuses = self.jobs(Some(&snapshot)).map_err(Poll::Finished)?;

            let mut still_pending = Vec::new();
            for job_id in snapshot {
                match statuses.get(&job_id) {
                    None => return Err(Poll::Finished(ClientError::JobNotFound(job_id))),
                    Some(record) if !record.status.is_terminal() => still_pending.push(job_id),
                    Some(_) => {}
                }
            }

            let done = still_pending.is_empty();
            *pending.borrow_mut() = still_pending;
            if done {
                Ok(())
            } else {
                Err(Poll::Pending)
            }
        };

        fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .without_max_times(),
            )
            .when(is_pending)
            .notify(|_, delay: Duration| {
                log::trace!("jobs still in progress, next poll in {delay:?}");
            })
            .call()
            .map_err(|err| match err {
                Poll::Pending => ClientError::InProgress,
                Poll::Finished(error) => error,
            })
    }

    /// Run table detection on a page image and return the detected table
    /// boxes: queue the well-known job, wait for it, re-fetch the node and
    /// read the job's output collection.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::UnexpectedDataType`] when the node is not
    /// an image, or with any error of the underlying queue/wait/query calls.
    pub fn detect_table(&self, data_id: &str) -> Result<Vec<DataNode>, ClientError> {
        let data = self.get_data(data_id, None, Some(&[DETECT_TABLE_JOB]), None)?;
        expect_data_type(&data, "image")?;

        let job_id = self.queue_job(DETECT_TABLE_JOB, data_id, None, false)?;
        self.wait_for_jobs_to_complete(&[job_id], None, false)?;

        let data = self.get_data(data_id, None, Some(&[DETECT_TABLE_JOB]), None)?;
        Ok(data.datas(DETECT_TABLE_JOB).to_vec())
    }

    /// Run table recognition on a page image and return the data id of the
    /// first recognised table. When the job produces several outputs the
    /// first of the list is taken; the order is server-determined.
    ///
    /// # Errors
    ///
    /// As [`TotoClient::detect_table`], plus [`ClientError::MissingOutput`]
    /// when the job yields no table at all.
    pub fn extract_table(&self, data_id: &str) -> Result<DataId, ClientError> {
        let data = self.get_data(data_id, None, Some(&[EXTRACT_TABLE_JOB]), None)?;
        expect_data_type(&data, "image")?;

        let job_id = self.queue_job(EXTRACT_TABLE_JOB, data_id, None, false)?;
        self.wait_for_jobs_to_complete(&[job_id], None, false)?;

        let data = self.get_data(data_id, None, Some(&[EXTRACT_TABLE_JOB]), None)?;
        data.datas(EXTRACT_TABLE_JOB)
            .first()
            .map(|node| node.id.clone())
            .ok_or(ClientError::MissingOutput(EXTRACT_TABLE_JOB))
    }

    /// Fetch a dataframe node and decode its headerless CSV payload.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::UnexpectedDataType`] when the node is not
    /// a dataframe, or with [`ClientError::Csv`] on a malformed payload.
    pub fn get_df_from_table(&self, table_data_id: &str) -> Result<Table, ClientError> {
        let data = self.get_data(table_data_id, None, None, None)?;
        expect_data_type(&data, "dataframe")?;

        let csv = data.table_csv.as_deref().unwrap_or_default();
        Ok(Table::from_headerless_csv(csv)?)
    }
}

fn expect_data_type(node: &DataNode, expected: &'static str) -> Result<(), ClientError> {
    let actual = node.data_type.clone().unwrap_or_default();
    if actual == expected {
        Ok(())
    } else {
        Err(ClientError::UnexpectedDataType { expected, actual })
    }
}

enum Poll {
    Pending,
    Finished(ClientError),
}

const fn is_pending(poll: &Poll) -> bool {
    match poll {
        Poll::Pending => true,
        Poll::Finished(_) => false,
    }
}

fn data_uri_scheme(path: &Path) -> Option<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => Some("application/pdf"),
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("tif" | "tiff") => Some("image/tiff"),
        _ => None,
    }
}

fn encode_payload(path: &Path, bytes: &[u8]) -> String {
    let encoded = BASE64.encode(bytes);
    match data_uri_scheme(path) {
        Some(mime) => format!("data:{mime};base64,{encoded}"),
        None => encoded,
    }
}
