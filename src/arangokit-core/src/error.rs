//! Error taxonomy
//!
//! Errors come in two flavours:
//! - [`ClientError`]: raised before a request reached the server, or while
//!   interpreting what came back (connection failures, batch state, bad
//!   document handles). Carries no HTTP status.
//! - [`ServerError`]: a response arrived and reports a failure. Each API
//!   operation tags its failures with its own [`ErrorKind`], so callers can
//!   branch on the operation as well as on `error_code`/`http_code`.

use std::collections::BTreeMap;
use std::fmt;

use crate::request::{Method, Request};
use crate::response::Response;

pub type Result<T> = std::result::Result<T, ArangoError>;

/// API subsystem an [`ErrorKind`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Auth,
    Server,
    Database,
    Collection,
    Document,
    Index,
    Aql,
    Cursor,
    AsyncJob,
    Batch,
    Transaction,
    Graph,
    User,
}

macro_rules! error_kinds {
    ($( $subsystem:ident => [ $( $kind:ident ),* $(,)? ] ),* $(,)?) => {
        /// Operation whose server-side failure produced a [`ServerError`]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorKind {
            $( $( $kind, )* )*
        }

        impl ErrorKind {
            pub fn subsystem(&self) -> Subsystem {
                match self {
                    $( $( ErrorKind::$kind => Subsystem::$subsystem, )* )*
                }
            }

            /// Stable name, e.g. `DocumentInsertError`
            pub fn name(&self) -> &'static str {
                match self {
                    $( $( ErrorKind::$kind => concat!(stringify!($kind), "Error"), )* )*
                }
            }
        }
    };
}

error_kinds! {
    Auth => [JwtAuth, JwtSecretList, JwtSecretReload],
    Server => [
        ServerVersion, ServerDetails, ServerStatus, ServerEngine, ServerTime,
        ServerTls, ServerTlsReload, ServerEncryption, ServerLogLevel,
    ],
    Database => [DatabaseProperties, DatabaseList, DatabaseCreate, DatabaseDelete],
    Collection => [
        CollectionList, CollectionProperties, CollectionConfigure, CollectionStatistics,
        CollectionRevision, CollectionChecksum, CollectionCreate, CollectionDelete,
        CollectionRename, CollectionTruncate, CollectionLoad, CollectionUnload,
    ],
    Document => [
        DocumentCount, DocumentIn, DocumentGet, DocumentKeys, DocumentIds,
        DocumentInsert, DocumentUpdate, DocumentReplace, DocumentDelete, DocumentRevision,
    ],
    Index => [IndexList, IndexCreate, IndexDelete, IndexLoad],
    Aql => [
        AqlQueryExecute, AqlQueryExplain, AqlQueryValidate, AqlQueryList,
        AqlQueryKill, AqlQueryClear, AqlCacheProperties, AqlFunctionList,
    ],
    Cursor => [CursorState, CursorNext, CursorClose],
    AsyncJob => [
        AsyncExecute, AsyncJobList, AsyncJobCancel, AsyncJobStatus,
        AsyncJobResult, AsyncJobClear,
    ],
    Batch => [BatchExecute],
    Transaction => [
        TransactionInit, TransactionStatus, TransactionExecute, TransactionCommit,
        TransactionAbort, TransactionList,
    ],
    Graph => [
        GraphList, GraphGet, GraphCreate, GraphDelete, GraphProperties,
        VertexCollectionList, VertexCollectionCreate, VertexCollectionDelete,
        EdgeDefinitionList, EdgeDefinitionCreate, EdgeDefinitionReplace, EdgeDefinitionDelete,
    ],
    User => [
        UserList, UserGet, UserCreate, UserUpdate, UserReplace, UserDelete,
        PermissionList, PermissionGet, PermissionUpdate, PermissionReset,
    ],
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by the server for one API operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[HTTP {}]{} {}", .http_code, error_code_tag(.error_code), .error_message)]
pub struct ServerError {
    pub kind: ErrorKind,
    pub http_method: Method,
    pub url: String,
    pub http_code: u16,
    pub http_status_text: String,
    pub http_headers: BTreeMap<String, String>,
    pub error_code: Option<i64>,
    pub error_message: String,
    pub request: Request,
    pub response: Response,
}

impl ServerError {
    pub fn new(kind: ErrorKind, request: &Request, response: Response) -> Self {
        let error_message = response
            .error_message
            .clone()
            .unwrap_or_else(|| response.status_text.clone());
        Self::build(kind, request, response, error_message)
    }

    /// Same as [`ServerError::new`] but with a client-chosen message
    pub fn with_message(
        kind: ErrorKind,
        request: &Request,
        response: Response,
        message: impl Into<String>,
    ) -> Self {
        Self::build(kind, request, response, message.into())
    }

    fn build(kind: ErrorKind, request: &Request, response: Response, error_message: String) -> Self {
        Self {
            kind,
            http_method: response.method,
            url: response.url.clone(),
            http_code: response.status_code,
            http_status_text: response.status_text.clone(),
            http_headers: response.headers.clone(),
            error_code: response.error_code,
            error_message,
            request: request.clone(),
            response,
        }
    }
}

fn error_code_tag(error_code: &Option<i64>) -> String {
    error_code.map(|code| format!("[ERR {}]", code)).unwrap_or_default()
}

/// Failure detected on the client side; never carries HTTP data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport failure: the request never produced a response
    #[error("{0}")]
    Connection(String),

    /// Connectivity check against the server failed
    #[error("{0}")]
    ServerConnection(String),

    #[error("{0}")]
    BatchState(String),

    #[error("{0}")]
    BatchJobResult(String),

    #[error("{0}")]
    DocumentParse(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    JwtExpired(String),

    #[error("expected {expected} result but got {actual}")]
    UnexpectedResult {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Top-level error of every client operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArangoError {
    #[error(transparent)]
    Server(Box<ServerError>),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<ServerError> for ArangoError {
    fn from(err: ServerError) -> Self {
        ArangoError::Server(Box::new(err))
    }
}

impl ArangoError {
    pub fn is_server(&self) -> bool {
        matches!(self, ArangoError::Server(_))
    }

    pub fn is_client(&self) -> bool {
        matches!(self, ArangoError::Client(_))
    }

    pub fn server(&self) -> Option<&ServerError> {
        match self {
            ArangoError::Server(err) => Some(err),
            ArangoError::Client(_) => None,
        }
    }

    pub fn client(&self) -> Option<&ClientError> {
        match self {
            ArangoError::Client(err) => Some(err),
            ArangoError::Server(_) => None,
        }
    }

    /// Operation kind of a server error
    pub fn kind(&self) -> Option<ErrorKind> {
        self.server().map(|e| e.kind)
    }

    /// Server error number (`errorNum`)
    pub fn error_code(&self) -> Option<i64> {
        self.server().and_then(|e| e.error_code)
    }

    pub fn http_code(&self) -> Option<u16> {
        self.server().map(|e| e.http_code)
    }

    pub fn http_method(&self) -> Option<Method> {
        self.server().map(|e| e.http_method)
    }

    pub fn url(&self) -> Option<&str> {
        self.server().map(|e| e.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use serde_json::json;

    fn conflict_response() -> Response {
        let body = json!({
            "code": 409,
            "error": true,
            "errorNum": 1210,
            "errorMessage": "unique constraint violated - in index primary"
        });
        Response::new(
            Method::Post,
            "http://127.0.0.1:8529/_db/test/_api/document/users",
            BTreeMap::new(),
            409,
            "Conflict",
            body.to_string(),
        )
        .prepare(&JsonSerializer, true)
    }

    #[test]
    fn test_server_error_message() {
        let request = Request::post("/_api/document/users").with_data(json!({"_key": "1"}));
        let err: ArangoError = ServerError::new(ErrorKind::DocumentInsert, &request, conflict_response()).into();

        assert!(err.is_server());
        assert_eq!(err.kind(), Some(ErrorKind::DocumentInsert));
        assert_eq!(err.error_code(), Some(1210));
        assert_eq!(err.http_code(), Some(409));
        assert_eq!(err.http_method(), Some(Method::Post));
        assert!(err.to_string().starts_with("[HTTP 409][ERR 1210] unique constraint"));

        let server = err.server().unwrap();
        assert_eq!(server.request.data, Some(json!({"_key": "1"})));
        assert_eq!(server.response.status_text, "Conflict");
    }

    #[test]
    fn test_server_error_without_error_num_uses_status_text() {
        let response = Response::new(Method::Get, "http://h/x", BTreeMap::new(), 503, "Service Unavailable", "")
            .prepare(&JsonSerializer, true);
        let err = ServerError::new(ErrorKind::ServerVersion, &Request::get("/x"), response);
        assert_eq!(err.to_string(), "[HTTP 503] Service Unavailable");
    }

    #[test]
    fn test_client_error_has_no_http_data() {
        let err: ArangoError = ClientError::DocumentParse("bad collection name".to_string()).into();
        assert!(err.is_client());
        assert_eq!(err.error_code(), None);
        assert_eq!(err.http_code(), None);
        assert_eq!(err.url(), None);
        assert_eq!(err.to_string(), "bad collection name");
    }

    #[test]
    fn test_kind_names_and_subsystems() {
        assert_eq!(ErrorKind::DocumentInsert.name(), "DocumentInsertError");
        assert_eq!(ErrorKind::BatchExecute.subsystem(), Subsystem::Batch);
        assert_eq!(ErrorKind::TransactionCommit.subsystem(), Subsystem::Transaction);
        assert_eq!(ErrorKind::JwtAuth.to_string(), "JwtAuthError");
    }
}
