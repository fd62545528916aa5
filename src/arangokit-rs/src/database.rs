//! Database API and its execution-context wrappers
//!
//! [`Database`] carries every database-level operation. The wrappers only
//! differ in the executor they were built with plus the controls that make
//! sense for it: a [`BatchDatabase`] can be committed, a
//! [`TransactionDatabase`] can be committed or aborted.

use serde_json::{json, Map, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use arangokit_core::errno;
use arangokit_core::error::{ClientError, ErrorKind, Result};
use arangokit_core::request::Request;
use arangokit_core::response::Response;

use crate::api::{ensure_success, ApiGroup};
use crate::aql::Aql;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::executor::{
    ApiExecutor, ApiResult, AsyncApiExecutor, BatchApiExecutor, DefaultApiExecutor, ExecutionContext,
    TransactionApiExecutor, TransactionOptions, TransactionStatus,
};
use crate::job::{JobStatus, QueuedJob};

/// Server-side JavaScript transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsTransaction {
    pub command: String,
    pub params: Option<Value>,
    pub read: Option<Vec<String>>,
    pub write: Option<Vec<String>>,
    pub sync: Option<bool>,
    /// Lock timeout in seconds
    pub timeout: Option<u64>,
    pub max_size: Option<u64>,
    pub allow_implicit: Option<bool>,
    pub intermediate_commit_count: Option<u64>,
    pub intermediate_commit_size: Option<u64>,
}

impl JsTransaction {
    /// `command` is the JavaScript function source
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn read<I: IntoIterator<Item = S>, S: Into<String>>(mut self, collections: I) -> Self {
        self.read = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    pub fn write<I: IntoIterator<Item = S>, S: Into<String>>(mut self, collections: I) -> Self {
        self.write = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn allow_implicit(mut self, allow: bool) -> Self {
        self.allow_implicit = Some(allow);
        self
    }

    pub fn intermediate_commit_count(mut self, count: u64) -> Self {
        self.intermediate_commit_count = Some(count);
        self
    }

    pub fn intermediate_commit_size(mut self, bytes: u64) -> Self {
        self.intermediate_commit_size = Some(bytes);
        self
    }

    fn to_body(&self) -> Value {
        let mut collections = Map::new();
        if let Some(read) = &self.read {
            collections.insert("read".to_string(), json!(read));
        }
        if let Some(write) = &self.write {
            collections.insert("write".to_string(), json!(write));
        }

        let mut body = Map::new();
        body.insert("action".to_string(), json!(self.command));
        body.insert("collections".to_string(), Value::Object(collections));

        let optional = [
            ("params", self.params.clone()),
            ("waitForSync", self.sync.map(Value::from)),
            ("lockTimeout", self.timeout.map(Value::from)),
            ("maxTransactionSize", self.max_size.map(Value::from)),
            ("allowImplicit", self.allow_implicit.map(Value::from)),
            ("intermediateCommitCount", self.intermediate_commit_count.map(Value::from)),
            ("intermediateCommitSize", self.intermediate_commit_size.map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body.insert(key.to_string(), value);
            }
        }
        Value::Object(body)
    }
}

/// Database-level operations, run on whatever executor the database has
#[derive(Debug, Clone)]
pub struct Database {
    group: ApiGroup,
}

impl Database {
    pub(crate) fn new(conn: Arc<Connection>, executor: ApiExecutor) -> Self {
        Self {
            group: ApiGroup::new(conn, executor),
        }
    }

    pub fn name(&self) -> &str {
        self.group.db_name()
    }

    pub fn username(&self) -> Option<&str> {
        self.group.username()
    }

    pub fn context(&self) -> ExecutionContext {
        self.group.context()
    }

    pub fn conn(&self) -> &Arc<Connection> {
        self.group.conn()
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.group.clone(), name)
    }

    pub fn aql(&self) -> Aql {
        Aql::new(self.group.clone())
    }

    /// Run a caller-built request and hand back the prepared response
    pub async fn execute_request(&self, request: Request) -> Result<ApiResult<Response>> {
        self.group.execute(request, Ok).await
    }

    /// Server version string
    pub async fn version(&self) -> Result<ApiResult<String>> {
        let request = Request::get("/_api/version");
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::ServerVersion, &req, resp)?;
                resp.body
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::MalformedResponse("version missing".to_string()).into())
            })
            .await
    }

    /// Properties of the current database (id, name, path, system flag)
    pub async fn properties(&self) -> Result<ApiResult<Value>> {
        let request = Request::get("/_api/database/current");
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::DatabaseProperties, &req, resp)?;
                Ok(resp.body.get("result").cloned().unwrap_or(Value::Null))
            })
            .await
    }

    /// Descriptions of every collection, system collections included
    pub async fn collections(&self) -> Result<ApiResult<Vec<Value>>> {
        let request = Request::get("/_api/collection");
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::CollectionList, &req, resp)?;
                collection_list(resp)
            })
            .await
    }

    pub async fn has_collection(&self, name: &str) -> Result<ApiResult<bool>> {
        let request = Request::get("/_api/collection");
        let req = request.clone();
        let name = name.to_string();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::CollectionList, &req, resp)?;
                Ok(collection_list(resp)?
                    .iter()
                    .any(|c| c.get("name").and_then(Value::as_str) == Some(name.as_str())))
            })
            .await
    }

    /// Create a document (or edge) collection
    pub async fn create_collection(&self, name: &str, edge: bool) -> Result<ApiResult<Collection>> {
        let request = Request::post("/_api/collection").with_data(json!({
            "name": name,
            "type": if edge { 3 } else { 2 },
        }));
        let req = request.clone();
        let collection = self.collection(name);
        self.group
            .execute(request, move |resp: Response| {
                ensure_success(ErrorKind::CollectionCreate, &req, resp)?;
                Ok(collection)
            })
            .await
    }

    /// Drop a collection; `false` when it is missing and `ignore_missing` is set
    pub async fn delete_collection(&self, name: &str, ignore_missing: bool) -> Result<ApiResult<bool>> {
        let request = Request::delete(format!("/_api/collection/{}", name));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                if ignore_missing && resp.error_code == Some(errno::DATA_SOURCE_NOT_FOUND) {
                    return Ok(false);
                }
                ensure_success(ErrorKind::CollectionDelete, &req, resp)?;
                Ok(true)
            })
            .await
    }

    /// Run a JavaScript transaction and return its `result`
    pub async fn execute_transaction(&self, transaction: JsTransaction) -> Result<ApiResult<Value>> {
        let request = Request::post("/_api/transaction").with_data(transaction.to_body());
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::TransactionExecute, &req, resp)?;
                Ok(resp.body.get("result").cloned().unwrap_or(Value::Null))
            })
            .await
    }

    /// Ids of async jobs that are pending or done
    pub async fn async_jobs(&self, status: JobStatus, count: Option<usize>) -> Result<ApiResult<Vec<String>>> {
        if status == JobStatus::Error {
            return Err(ClientError::InvalidArgument("job status must be pending or done".to_string()).into());
        }
        let mut request = Request::get(format!("/_api/job/{}", status));
        if let Some(count) = count {
            request = request.with_param("count", count);
        }
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::AsyncJobList, &req, resp)?;
                match resp.body {
                    Value::Array(ids) => Ok(ids
                        .into_iter()
                        .filter_map(|id| id.as_str().map(str::to_string))
                        .collect()),
                    _ => Err(ClientError::MalformedResponse("expected a list of job ids".to_string()).into()),
                }
            })
            .await
    }

    /// Drop stored async job results, all of them or those older than
    /// `threshold` (seconds since the epoch)
    pub async fn clear_async_jobs(&self, threshold: Option<i64>) -> Result<ApiResult<bool>> {
        let request = match threshold {
            Some(stamp) => Request::delete("/_api/job/expired").with_param("stamp", stamp),
            None => Request::delete("/_api/job/all"),
        };
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                ensure_success(ErrorKind::AsyncJobClear, &req, resp)?;
                Ok(true)
            })
            .await
    }
}

fn collection_list(resp: Response) -> Result<Vec<Value>> {
    match resp.body.get("result") {
        Some(Value::Array(list)) => Ok(list.clone()),
        _ => Err(ClientError::MalformedResponse("collection list missing".to_string()).into()),
    }
}

/// Database whose operations are sent immediately
#[derive(Debug, Clone)]
pub struct StandardDatabase {
    db: Database,
}

impl StandardDatabase {
    pub fn new(conn: Arc<Connection>) -> Self {
        let executor = ApiExecutor::Default(Arc::new(DefaultApiExecutor::new(conn.clone())));
        Self {
            db: Database::new(conn, executor),
        }
    }

    /// Same database, with every operation run as a server-side async job
    pub fn begin_async_execution(&self, return_result: bool) -> AsyncDatabase {
        let conn = self.conn().clone();
        let executor = ApiExecutor::Async(Arc::new(AsyncApiExecutor::new(conn.clone(), return_result)));
        AsyncDatabase {
            db: Database::new(conn, executor),
        }
    }

    /// Same database, with every operation queued until `commit`
    pub fn begin_batch_execution(&self, return_result: bool) -> BatchDatabase {
        let conn = self.conn().clone();
        let executor = Arc::new(BatchApiExecutor::new(conn.clone(), return_result));
        BatchDatabase {
            db: Database::new(conn, ApiExecutor::Batch(executor.clone())),
            executor,
        }
    }

    /// Open a stream transaction and run operations inside it
    pub async fn begin_transaction(&self, options: TransactionOptions) -> Result<TransactionDatabase> {
        let conn = self.conn().clone();
        let executor = Arc::new(TransactionApiExecutor::begin(conn.clone(), options).await?);
        Ok(TransactionDatabase {
            db: Database::new(conn, ApiExecutor::Transaction(executor.clone())),
            executor,
        })
    }
}

impl Deref for StandardDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// Database whose operations become server-side async jobs
#[derive(Debug, Clone)]
pub struct AsyncDatabase {
    db: Database,
}

impl Deref for AsyncDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// Database whose operations are queued and sent together on commit
#[derive(Clone)]
pub struct BatchDatabase {
    db: Database,
    executor: Arc<BatchApiExecutor>,
}

impl BatchDatabase {
    /// Handles of the queued jobs; `None` without result tracking
    pub fn queued_jobs(&self) -> Option<Vec<QueuedJob>> {
        self.executor.queued_jobs()
    }

    pub fn is_committed(&self) -> bool {
        self.executor.is_committed()
    }

    /// Send the queued requests and resolve their jobs
    pub async fn commit(&self) -> Result<Option<Vec<QueuedJob>>> {
        self.executor.commit().await
    }
}

impl Deref for BatchDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl fmt::Debug for BatchDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<BatchDatabase {}>", self.name())
    }
}

/// Database whose operations run inside one stream transaction
#[derive(Clone)]
pub struct TransactionDatabase {
    db: Database,
    executor: Arc<TransactionApiExecutor>,
}

impl TransactionDatabase {
    pub fn transaction_id(&self) -> &str {
        self.executor.id()
    }

    pub async fn transaction_status(&self) -> Result<TransactionStatus> {
        self.executor.status().await
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.executor.commit().await
    }

    pub async fn abort_transaction(&self) -> Result<()> {
        self.executor.abort().await
    }
}

impl Deref for TransactionDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl fmt::Debug for TransactionDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TransactionDatabase {} {}>", self.name(), self.transaction_id())
    }
}
