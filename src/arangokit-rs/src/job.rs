//! Deferred results of async and batch execution
//!
//! An [`AsyncJob`] is a server-side job created by a fire-and-forget request;
//! its result is fetched on demand. A [`BatchJob`] is a slot that the batch
//! executor fills in when the batch is committed.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use arangokit_core::errno;
use arangokit_core::error::{ArangoError, ClientError, ErrorKind, Result, ServerError};
use arangokit_core::request::Request;
use arangokit_core::response::Response;

use crate::connection::Connection;

/// Converts the response of a deferred request into its typed result
pub(crate) type ResponseHandler<T> = Box<dyn FnOnce(Response) -> Result<T> + Send>;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Done,
    /// The job completed but its handler reported a failure
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct AsyncJobState<T> {
    handler: Option<ResponseHandler<T>>,
    outcome: Option<Result<T>>,
}

/// Handle of a job the server runs in the background
pub struct AsyncJob<T> {
    id: String,
    conn: Arc<Connection>,
    state: Arc<tokio::sync::Mutex<AsyncJobState<T>>>,
}

impl<T> Clone for AsyncJob<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            conn: self.conn.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for AsyncJob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<AsyncJob {}>", self.id)
    }
}

impl<T: Clone + Send + 'static> AsyncJob<T> {
    pub(crate) fn new(id: String, conn: Arc<Connection>, handler: ResponseHandler<T>) -> Self {
        Self {
            id,
            conn,
            state: Arc::new(tokio::sync::Mutex::new(AsyncJobState {
                handler: Some(handler),
                outcome: None,
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the server where the job stands
    ///
    /// Once the result has been fetched the server forgets the job, so the
    /// cached outcome answers from then on.
    pub async fn status(&self) -> Result<JobStatus> {
        if let Some(outcome) = &self.state.lock().await.outcome {
            return Ok(if outcome.is_ok() { JobStatus::Done } else { JobStatus::Error });
        }

        let request = Request::get(format!("/_api/job/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if response.status_code == 204 {
            Ok(JobStatus::Pending)
        } else if response.is_success {
            Ok(JobStatus::Done)
        } else if is_not_found(&response) {
            let message = format!("job {} not found", self.id);
            Err(ServerError::with_message(ErrorKind::AsyncJobStatus, &request, response, message).into())
        } else {
            Err(ServerError::new(ErrorKind::AsyncJobStatus, &request, response).into())
        }
    }

    /// Fetch the result, running the operation's handler on it
    ///
    /// The server hands out a result only once; later calls return the cached
    /// outcome.
    pub async fn result(&self) -> Result<T> {
        let mut state = self.state.lock().await;
        if let Some(outcome) = &state.outcome {
            return outcome.clone();
        }

        let request = Request::put(format!("/_api/job/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;

        if response.header("x-arango-async-id").is_some() {
            let handler = state
                .handler
                .take()
                .ok_or_else(|| ClientError::BatchJobResult(format!("job {} result already consumed", self.id)))?;
            let outcome = handler(response);
            state.outcome = Some(outcome.clone());
            return outcome;
        }

        if response.status_code == 204 {
            let message = format!("job {} not done", self.id);
            Err(ServerError::with_message(ErrorKind::AsyncJobResult, &request, response, message).into())
        } else if is_not_found(&response) {
            let message = format!("job {} not found", self.id);
            Err(ServerError::with_message(ErrorKind::AsyncJobResult, &request, response, message).into())
        } else {
            Err(ServerError::new(ErrorKind::AsyncJobResult, &request, response).into())
        }
    }

    /// Cancel the job; `Ok(false)` when it is gone and `ignore_missing` is set
    pub async fn cancel(&self, ignore_missing: bool) -> Result<bool> {
        let request = Request::put(format!("/_api/job/{}/cancel", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if response.is_success {
            Ok(true)
        } else if is_not_found(&response) {
            if ignore_missing {
                return Ok(false);
            }
            let message = format!("job {} not found", self.id);
            Err(ServerError::with_message(ErrorKind::AsyncJobCancel, &request, response, message).into())
        } else {
            Err(ServerError::new(ErrorKind::AsyncJobCancel, &request, response).into())
        }
    }

    /// Delete the job and its stored result from the server
    pub async fn clear(&self, ignore_missing: bool) -> Result<bool> {
        let request = Request::delete(format!("/_api/job/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if response.is_success {
            Ok(true)
        } else if is_not_found(&response) {
            if ignore_missing {
                return Ok(false);
            }
            let message = format!("job {} not found", self.id);
            Err(ServerError::with_message(ErrorKind::AsyncJobClear, &request, response, message).into())
        } else {
            Err(ServerError::new(ErrorKind::AsyncJobClear, &request, response).into())
        }
    }
}

fn is_not_found(response: &Response) -> bool {
    response.status_code == 404 || response.error_code == Some(errno::HTTP_NOT_FOUND)
}

enum BatchOutcome<T> {
    Pending,
    Done(T),
    Failed(ArangoError),
}

/// Anything that can report a [`JobStatus`] without knowing the result type
trait JobProbe: Send + Sync {
    fn status(&self) -> JobStatus;
}

impl<T: Send> JobProbe for Mutex<BatchOutcome<T>> {
    fn status(&self) -> JobStatus {
        match &*self.lock() {
            BatchOutcome::Pending => JobStatus::Pending,
            BatchOutcome::Done(_) => JobStatus::Done,
            BatchOutcome::Failed(_) => JobStatus::Error,
        }
    }
}

/// Result slot of one request queued in a batch
pub struct BatchJob<T> {
    id: String,
    slot: Arc<Mutex<BatchOutcome<T>>>,
}

impl<T> Clone for BatchJob<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T> fmt::Debug for BatchJob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<BatchJob {}>", self.id)
    }
}

impl<T: Send + 'static> BatchJob<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot: Arc::new(Mutex::new(BatchOutcome::Pending)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.slot.status()
    }

    /// Type-erased handle sharing this job's state
    pub fn queued_job(&self) -> QueuedJob {
        QueuedJob {
            id: self.id.clone(),
            probe: self.slot.clone(),
        }
    }

    /// Closure that runs `handler` on the job's response and stores the outcome
    pub(crate) fn resolver(&self, handler: ResponseHandler<T>) -> Box<dyn FnOnce(Response) + Send> {
        let slot = self.slot.clone();
        Box::new(move |response| {
            let outcome = match handler(response) {
                Ok(value) => BatchOutcome::Done(value),
                Err(e) => BatchOutcome::Failed(e),
            };
            *slot.lock() = outcome;
        })
    }
}

impl<T: Clone> BatchJob<T> {
    /// Result of the job; available once the batch has been committed
    pub fn result(&self) -> Result<T> {
        match &*self.slot.lock() {
            BatchOutcome::Pending => {
                Err(ClientError::BatchJobResult("result not available yet".to_string()).into())
            }
            BatchOutcome::Done(value) => Ok(value.clone()),
            BatchOutcome::Failed(e) => Err(e.clone()),
        }
    }
}

/// Result-type-erased view of a queued batch job
#[derive(Clone)]
pub struct QueuedJob {
    id: String,
    probe: Arc<dyn JobProbe>,
}

impl QueuedJob {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.probe.status()
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<BatchJob {}>", self.id)
    }
}
