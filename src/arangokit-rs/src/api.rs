use std::sync::Arc;

use arangokit_core::error::{ErrorKind, Result, ServerError};
use arangokit_core::request::Request;
use arangokit_core::response::Response;

use crate::connection::Connection;
use crate::executor::{ApiExecutor, ApiResult, ExecutionContext};

/// State shared by every API wrapper: the connection and the executor
#[derive(Debug, Clone)]
pub struct ApiGroup {
    conn: Arc<Connection>,
    executor: ApiExecutor,
}

impl ApiGroup {
    pub fn new(conn: Arc<Connection>, executor: ApiExecutor) -> Self {
        Self { conn, executor }
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn executor(&self) -> &ApiExecutor {
        &self.executor
    }

    pub fn db_name(&self) -> &str {
        self.conn.db_name()
    }

    pub fn username(&self) -> Option<&str> {
        self.conn.username()
    }

    pub fn context(&self) -> ExecutionContext {
        self.executor.context()
    }

    pub async fn execute<T, F>(&self, request: Request, handler: F) -> Result<ApiResult<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        self.executor.execute(request, handler).await
    }
}

/// Pass successful responses through, turn the rest into a `kind` error
pub(crate) fn ensure_success(kind: ErrorKind, request: &Request, response: Response) -> Result<Response> {
    if response.is_success {
        Ok(response)
    } else {
        Err(ServerError::new(kind, request, response).into())
    }
}
