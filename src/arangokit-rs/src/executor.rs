//! Execution strategies for API requests
//!
//! Every API operation builds a [`Request`] plus a response handler and hands
//! both to an [`ApiExecutor`]. The executor decides what actually happens:
//! - default: send now, return the handled value
//! - async: send with the async header, return an [`AsyncJob`] (or nothing)
//! - batch: queue locally, return a [`BatchJob`] (or nothing) until commit
//! - transaction: send now, tagged with the transaction id

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arangokit_core::error::{ClientError, ErrorKind, Result, ServerError};
use arangokit_core::multipart::{self, ResponsePart};
use arangokit_core::request::Request;
use arangokit_core::response::Response;

use crate::connection::Connection;
use crate::job::{AsyncJob, BatchJob, QueuedJob};

/// Which executor an API group runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    Default,
    Async,
    Batch,
    Transaction,
}

impl ExecutionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Default => "default",
            ExecutionContext::Async => "async",
            ExecutionContext::Batch => "batch",
            ExecutionContext::Transaction => "transaction",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of executing one API operation
#[derive(Debug)]
pub enum ApiResult<T> {
    /// The handled result, available immediately
    Value(T),
    /// Server-side job holding the result
    Async(AsyncJob<T>),
    /// Queued batch slot filled in on commit
    Batch(BatchJob<T>),
    /// Async or batch execution without result tracking
    Empty,
}

impl<T> ApiResult<T> {
    fn variant_name(&self) -> &'static str {
        match self {
            ApiResult::Value(_) => "value",
            ApiResult::Async(_) => "async job",
            ApiResult::Batch(_) => "batch job",
            ApiResult::Empty => "empty",
        }
    }

    fn unexpected(self, expected: &'static str) -> ClientError {
        ClientError::UnexpectedResult {
            expected,
            actual: self.variant_name(),
        }
    }

    /// The immediate value; an error for deferred results
    pub fn value(self) -> Result<T> {
        match self {
            ApiResult::Value(value) => Ok(value),
            other => Err(other.unexpected("value").into()),
        }
    }

    pub fn async_job(self) -> Result<AsyncJob<T>> {
        match self {
            ApiResult::Async(job) => Ok(job),
            other => Err(other.unexpected("async job").into()),
        }
    }

    pub fn batch_job(self) -> Result<BatchJob<T>> {
        match self {
            ApiResult::Batch(job) => Ok(job),
            other => Err(other.unexpected("batch job").into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ApiResult::Empty)
    }
}

/// Executor of one of the four execution contexts
#[derive(Clone)]
pub enum ApiExecutor {
    Default(Arc<DefaultApiExecutor>),
    Async(Arc<AsyncApiExecutor>),
    Batch(Arc<BatchApiExecutor>),
    Transaction(Arc<TransactionApiExecutor>),
}

impl ApiExecutor {
    pub fn context(&self) -> ExecutionContext {
        match self {
            ApiExecutor::Default(_) => ExecutionContext::Default,
            ApiExecutor::Async(_) => ExecutionContext::Async,
            ApiExecutor::Batch(_) => ExecutionContext::Batch,
            ApiExecutor::Transaction(_) => ExecutionContext::Transaction,
        }
    }

    pub async fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        match self {
            ApiExecutor::Default(executor) => executor.execute(request, handler).await,
            ApiExecutor::Async(executor) => executor.execute(request, handler).await,
            ApiExecutor::Batch(executor) => executor.execute(request, handler),
            ApiExecutor::Transaction(executor) => executor.execute(request, handler).await,
        }
    }
}

impl fmt::Debug for ApiExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ApiExecutor {}>", self.context())
    }
}

/// Sends each request immediately
pub struct DefaultApiExecutor {
    conn: Arc<Connection>,
}

impl DefaultApiExecutor {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    pub async fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        F: FnOnce(Response) -> Result<T>,
    {
        let response = self.conn.send_request(request).await?;
        Ok(ApiResult::Value(handler(response)?))
    }
}

/// Sends each request as a server-side async job
pub struct AsyncApiExecutor {
    conn: Arc<Connection>,
    return_result: bool,
}

impl AsyncApiExecutor {
    pub fn new(conn: Arc<Connection>, return_result: bool) -> Self {
        Self { conn, return_result }
    }

    pub async fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let mode = if self.return_result { "store" } else { "true" };
        let request = request.with_header("x-arango-async", mode);

        let response = self.conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::AsyncExecute, &request, response).into());
        }
        if !self.return_result {
            return Ok(ApiResult::Empty);
        }

        let job_id = response
            .header("x-arango-async-id")
            .ok_or_else(|| ClientError::MalformedResponse("async response carries no job id".to_string()))?
            .to_string();
        tracing::debug!(job_id = %job_id, endpoint = %request.endpoint, "Async job created");
        Ok(ApiResult::Async(AsyncJob::new(job_id, self.conn.clone(), Box::new(handler))))
    }
}

struct QueuedRequest {
    job_id: String,
    request: Request,
    resolve: Option<Box<dyn FnOnce(Response) + Send>>,
}

#[derive(Default)]
struct BatchState {
    committed: bool,
    queue: Vec<QueuedRequest>,
    jobs: Vec<QueuedJob>,
}

/// Queues requests locally and sends them as one multipart request on commit
pub struct BatchApiExecutor {
    conn: Arc<Connection>,
    return_result: bool,
    state: Mutex<BatchState>,
}

impl BatchApiExecutor {
    pub fn new(conn: Arc<Connection>, return_result: bool) -> Self {
        Self {
            conn,
            return_result,
            state: Mutex::new(BatchState::default()),
        }
    }

    pub fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.committed {
            return Err(ClientError::BatchState("batch already committed".to_string()).into());
        }

        if !self.return_result {
            state.queue.push(QueuedRequest {
                job_id: uuid::Uuid::new_v4().to_string(),
                request,
                resolve: None,
            });
            return Ok(ApiResult::Empty);
        }

        let job = BatchJob::new();
        state.queue.push(QueuedRequest {
            job_id: job.id().to_string(),
            request,
            resolve: Some(job.resolver(Box::new(handler))),
        });
        state.jobs.push(job.queued_job());
        Ok(ApiResult::Batch(job))
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    /// Handles of the queued jobs in queue order; `None` without result tracking
    pub fn queued_jobs(&self) -> Option<Vec<QueuedJob>> {
        if !self.return_result {
            return None;
        }
        Some(self.state.lock().jobs.clone())
    }

    /// Send every queued request in one multipart request
    ///
    /// The batch counts as committed from the first call on, whatever the
    /// outcome. An empty batch sends nothing.
    #[tracing::instrument(skip_all, fields(db = %self.conn.db_name()))]
    pub async fn commit(&self) -> Result<Option<Vec<QueuedJob>>> {
        let (queue, jobs) = {
            let mut state = self.state.lock();
            if state.committed {
                return Err(ClientError::BatchState("batch already committed".to_string()).into());
            }
            state.committed = true;
            (std::mem::take(&mut state.queue), state.jobs.clone())
        };

        if queue.is_empty() {
            return Ok(self.return_result.then(Vec::new));
        }

        let boundary = multipart::new_boundary();
        let parts: Vec<(&str, &Request)> = queue
            .iter()
            .map(|queued| (queued.job_id.as_str(), &queued.request))
            .collect();
        let body = multipart::encode_batch(&boundary, &parts, self.conn.serializer())?;

        let request = Request::post("/_api/batch")
            .with_header("content-type", multipart::content_type(&boundary))
            .with_data(Value::String(body));

        tracing::info!(requests = queue.len(), "Committing batch");
        let response = self.conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::BatchExecute, &request, response).into());
        }
        if !self.return_result {
            return Ok(None);
        }

        let decoded = multipart::decode_batch(&response.raw_body, &boundary)?;
        if decoded.len() != queue.len() {
            return Err(ClientError::BatchState(format!(
                "expecting {} parts in batch response but got {}",
                queue.len(),
                decoded.len()
            ))
            .into());
        }

        let mut by_id: HashMap<String, ResponsePart> = HashMap::with_capacity(decoded.len());
        for (position, part) in decoded.into_iter().enumerate() {
            let content_id = part
                .content_id
                .clone()
                .unwrap_or_else(|| queue[position].job_id.clone());
            by_id.insert(content_id, part);
        }
        if let Some(missing) = queue.iter().find(|queued| !by_id.contains_key(&queued.job_id)) {
            return Err(ClientError::BatchState(format!(
                "batch response has no part for job {}",
                missing.job_id
            ))
            .into());
        }

        let url_prefix = response.url.trim_end_matches("/_api/batch").to_string();
        for queued in queue {
            let (Some(part), Some(resolve)) = (by_id.remove(&queued.job_id), queued.resolve) else {
                continue;
            };
            let url = format!("{}{}", url_prefix, queued.request.endpoint);
            let sub_response = Response::new(
                queued.request.method,
                url,
                part.headers,
                part.status_code,
                part.status_text,
                part.body,
            )
            .prepare(self.conn.serializer(), queued.request.deserialize);
            resolve(sub_response);
        }

        Ok(Some(jobs))
    }
}

/// Lifecycle state of a stream transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Running,
    Committed,
    Aborted,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Running => "running",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ClientError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(TransactionStatus::Running),
            "committed" => Ok(TransactionStatus::Committed),
            "aborted" => Ok(TransactionStatus::Aborted),
            other => Err(ClientError::MalformedResponse(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collections and settings a stream transaction is opened with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOptions {
    pub read: Option<Vec<String>>,
    pub write: Option<Vec<String>>,
    pub exclusive: Option<Vec<String>>,
    pub sync: Option<bool>,
    pub allow_implicit: Option<bool>,
    /// Seconds to wait for collection locks; 0 waits forever
    pub lock_timeout: Option<u64>,
    /// Bytes
    pub max_size: Option<u64>,
    pub intermediate_commit_count: Option<u64>,
    /// Bytes
    pub intermediate_commit_size: Option<u64>,
}

fn names<I, S>(collections: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Some(collections.into_iter().map(Into::into).collect())
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<I: IntoIterator<Item = S>, S: Into<String>>(mut self, collections: I) -> Self {
        self.read = names(collections);
        self
    }

    pub fn write<I: IntoIterator<Item = S>, S: Into<String>>(mut self, collections: I) -> Self {
        self.write = names(collections);
        self
    }

    pub fn exclusive<I: IntoIterator<Item = S>, S: Into<String>>(mut self, collections: I) -> Self {
        self.exclusive = names(collections);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn allow_implicit(mut self, allow: bool) -> Self {
        self.allow_implicit = Some(allow);
        self
    }

    pub fn lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout = Some(seconds);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Commit automatically every `count` operations
    pub fn intermediate_commit_count(mut self, count: u64) -> Self {
        self.intermediate_commit_count = Some(count);
        self
    }

    /// Commit automatically once `bytes` have been written
    pub fn intermediate_commit_size(mut self, bytes: u64) -> Self {
        self.intermediate_commit_size = Some(bytes);
        self
    }

    /// Options for a transaction covering exactly what `request` declares
    fn for_request(request: &Request) -> Self {
        Self {
            read: request.read.clone(),
            write: request.write.clone(),
            exclusive: request.exclusive.clone(),
            ..Self::default()
        }
    }

    /// Body of the begin request
    pub fn to_body(&self) -> Value {
        let mut collections = Map::new();
        for (key, value) in [("read", &self.read), ("write", &self.write), ("exclusive", &self.exclusive)] {
            if let Some(names) = value {
                collections.insert(key.to_string(), json!(names));
            }
        }

        let mut body = Map::new();
        body.insert("collections".to_string(), Value::Object(collections));
        if let Some(sync) = self.sync {
            body.insert("waitForSync".to_string(), json!(sync));
        }
        if let Some(allow) = self.allow_implicit {
            body.insert("allowImplicit".to_string(), json!(allow));
        }
        if let Some(timeout) = self.lock_timeout {
            body.insert("lockTimeout".to_string(), json!(timeout));
        }
        if let Some(size) = self.max_size {
            body.insert("maxTransactionSize".to_string(), json!(size));
        }
        if let Some(count) = self.intermediate_commit_count {
            body.insert("intermediateCommitCount".to_string(), json!(count));
        }
        if let Some(size) = self.intermediate_commit_size {
            body.insert("intermediateCommitSize".to_string(), json!(size));
        }
        Value::Object(body)
    }

    fn declares_same_collections(&self, request: &Request) -> bool {
        fn set(names: &Option<Vec<String>>) -> BTreeSet<&str> {
            names.iter().flatten().map(String::as_str).collect()
        }
        set(&self.read) == set(&request.read)
            && set(&self.write) == set(&request.write)
            && set(&self.exclusive) == set(&request.exclusive)
    }
}

/// Runs requests inside a server-side stream transaction
#[derive(Debug)]
pub struct TransactionApiExecutor {
    conn: Arc<Connection>,
    options: TransactionOptions,
    id: String,
    status: RwLock<TransactionStatus>,
}

impl TransactionApiExecutor {
    /// Open a stream transaction on the server
    #[tracing::instrument(skip_all, fields(db = %conn.db_name()))]
    pub async fn begin(conn: Arc<Connection>, options: TransactionOptions) -> Result<Self> {
        let request = Request::post("/_api/transaction/begin").with_data(options.to_body());
        let response = conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::TransactionInit, &request, response).into());
        }

        let id = response
            .body
            .pointer("/result/id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::MalformedResponse("transaction id missing".to_string()))?
            .to_string();
        tracing::info!(transaction_id = %id, "Transaction started");

        Ok(Self {
            conn,
            options,
            id,
            status: RwLock::new(TransactionStatus::Running),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Last status seen by this client
    pub fn last_status(&self) -> TransactionStatus {
        *self.status.read()
    }

    /// Run a request in this transaction
    ///
    /// A request that declares collections other than the transaction's runs
    /// in a transaction of its own that is committed right after.
    pub async fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        F: FnOnce(Response) -> Result<T>,
    {
        if request.declares_collections() && !self.options.declares_same_collections(&request) {
            let isolated = Self::begin(self.conn.clone(), TransactionOptions::for_request(&request)).await?;
            return match isolated.execute_tagged(request, handler).await {
                Ok(value) => {
                    isolated.commit().await?;
                    Ok(ApiResult::Value(value))
                }
                Err(e) => {
                    if let Err(abort_err) = isolated.abort().await {
                        tracing::warn!(transaction_id = %isolated.id, "Abort after failure failed: {}", abort_err);
                    }
                    Err(e)
                }
            };
        }

        Ok(ApiResult::Value(self.execute_tagged(request, handler).await?))
    }

    async fn execute_tagged<T, F>(&self, request: Request, handler: F) -> Result<T>
    where
        F: FnOnce(Response) -> Result<T>,
    {
        let request = request.with_header("x-arango-trx-id", self.id.as_str());
        let response = self.conn.send_request(request).await?;
        handler(response)
    }

    /// Query the server for the transaction status
    pub async fn status(&self) -> Result<TransactionStatus> {
        let request = Request::get(format!("/_api/transaction/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::TransactionStatus, &request, response).into());
        }

        let status = response
            .body
            .pointer("/result/status")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::MalformedResponse("transaction status missing".to_string()))?
            .parse::<TransactionStatus>()?;
        *self.status.write() = status;
        Ok(status)
    }

    pub async fn commit(&self) -> Result<()> {
        let request = Request::put(format!("/_api/transaction/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::TransactionCommit, &request, response).into());
        }
        *self.status.write() = TransactionStatus::Committed;
        tracing::info!(transaction_id = %self.id, "Transaction committed");
        Ok(())
    }

    pub async fn abort(&self) -> Result<()> {
        let request = Request::delete(format!("/_api/transaction/{}", self.id));
        let response = self.conn.send_request(request.clone()).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::TransactionAbort, &request, response).into());
        }
        *self.status.write() = TransactionStatus::Aborted;
        tracing::info!(transaction_id = %self.id, "Transaction aborted");
        Ok(())
    }
}
