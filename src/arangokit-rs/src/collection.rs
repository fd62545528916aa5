//! Standard collection API

use serde_json::Value;

use arangokit_core::errno;
use arangokit_core::error::{ClientError, ErrorKind, Result, ServerError};
use arangokit_core::request::{Method, Request};
use arangokit_core::response::Response;

use crate::api::{ensure_success, ApiGroup};
use crate::executor::{ApiResult, ExecutionContext};

/// Flags for document inserts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Include the stored document under `new`
    pub return_new: bool,
    pub sync: Option<bool>,
    /// Return nothing but success
    pub silent: bool,
    /// Replace an existing document with the same key
    pub overwrite: bool,
}

impl InsertOptions {
    pub fn return_new(mut self) -> Self {
        self.return_new = true;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    fn apply(&self, request: Request) -> Request {
        let request = request
            .with_flag("returnNew", self.return_new)
            .with_flag("silent", self.silent)
            .with_flag("overwrite", self.overwrite);
        match self.sync {
            Some(sync) => request.with_flag("waitForSync", sync),
            None => request,
        }
    }
}

/// Document collection in one database
#[derive(Debug, Clone)]
pub struct Collection {
    group: ApiGroup,
    name: String,
}

impl Collection {
    pub(crate) fn new(group: ApiGroup, name: impl Into<String>) -> Self {
        Self {
            group,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_name(&self) -> &str {
        self.group.db_name()
    }

    pub fn context(&self) -> ExecutionContext {
        self.group.context()
    }

    /// Full `collection/key` id of a document given by key, id or body
    ///
    /// Strings without a slash are keys. Ids and bodies naming another
    /// collection are rejected.
    pub fn document_id(&self, document: &Value) -> Result<String> {
        let handle = match document {
            Value::String(handle) => handle.as_str(),
            Value::Object(body) => match (body.get("_id"), body.get("_key")) {
                (Some(Value::String(id)), _) => id.as_str(),
                (_, Some(Value::String(key))) => return Ok(format!("{}/{}", self.name, key)),
                _ => {
                    return Err(
                        ClientError::DocumentParse("field \"_key\" or \"_id\" required".to_string()).into()
                    )
                }
            },
            _ => return Err(ClientError::DocumentParse("bad document handle".to_string()).into()),
        };

        match handle.split_once('/') {
            Some((collection, _)) if collection != self.name => {
                Err(ClientError::DocumentParse("bad collection name".to_string()).into())
            }
            Some(_) => Ok(handle.to_string()),
            None => Ok(format!("{}/{}", self.name, handle)),
        }
    }

    /// Number of documents
    pub async fn count(&self) -> Result<ApiResult<u64>> {
        let request = Request::get(format!("/_api/collection/{}/count", self.name));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::DocumentCount, &req, resp)?;
                resp.body
                    .get("count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ClientError::MalformedResponse("count missing".to_string()).into())
            })
            .await
    }

    /// Insert one document; returns its metadata (`_id`, `_key`, `_rev`)
    pub async fn insert(&self, document: Value, options: InsertOptions) -> Result<ApiResult<Value>> {
        let request = options
            .apply(Request::post(format!("/_api/document/{}", self.name)))
            .with_data(document);
        let req = request.clone();
        let silent = options.silent;
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::DocumentInsert, &req, resp)?;
                Ok(if silent { Value::Bool(true) } else { resp.body })
            })
            .await
    }

    /// Insert several documents in one request
    ///
    /// The server answers per document; entries of failed documents carry
    /// `error`, `errorNum` and `errorMessage`.
    pub async fn insert_many(&self, documents: Vec<Value>, options: InsertOptions) -> Result<ApiResult<Vec<Value>>> {
        let request = options
            .apply(Request::post(format!("/_api/document/{}", self.name)))
            .with_data(Value::Array(documents));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::DocumentInsert, &req, resp)?;
                match resp.body {
                    Value::Array(results) => Ok(results),
                    _ if req_is_silent(&req) => Ok(Vec::new()),
                    _ => Err(ClientError::MalformedResponse("expected a list of results".to_string()).into()),
                }
            })
            .await
    }

    /// Fetch a document; `None` when it does not exist
    pub async fn get(&self, document: &Value) -> Result<ApiResult<Option<Value>>> {
        let id = self.document_id(document)?;
        let request = Request::get(format!("/_api/document/{}", id));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) {
                    return Ok(None);
                }
                let resp = ensure_success(ErrorKind::DocumentGet, &req, resp)?;
                Ok(Some(resp.body))
            })
            .await
    }

    /// Whether a document exists
    pub async fn has(&self, document: &Value) -> Result<ApiResult<bool>> {
        let id = self.document_id(document)?;
        let request = Request::new(Method::Head, format!("/_api/document/{}", id));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                if resp.status_code == 404 || resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) {
                    return Ok(false);
                }
                ensure_success(ErrorKind::DocumentIn, &req, resp)?;
                Ok(true)
            })
            .await
    }

    /// Delete a document; `None` when it is missing and `ignore_missing` is set
    pub async fn delete(&self, document: &Value, ignore_missing: bool) -> Result<ApiResult<Option<Value>>> {
        let id = self.document_id(document)?;
        let request = Request::delete(format!("/_api/document/{}", id));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                if ignore_missing && resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) {
                    return Ok(None);
                }
                let resp = ensure_success(ErrorKind::DocumentDelete, &req, resp)?;
                Ok(Some(resp.body))
            })
            .await
    }

    /// Remove every document
    pub async fn truncate(&self) -> Result<ApiResult<bool>> {
        let request = Request::put(format!("/_api/collection/{}/truncate", self.name));
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                if !resp.is_success {
                    return Err(ServerError::new(ErrorKind::CollectionTruncate, &req, resp).into());
                }
                Ok(true)
            })
            .await
    }
}

fn req_is_silent(request: &Request) -> bool {
    request.params.get("silent").map(String::as_str) == Some("1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ApiExecutor, DefaultApiExecutor};
    use crate::testing::{json_response, mock_connection, raw_response, MockHttpClient};
    use serde_json::json;
    use std::sync::Arc;

    fn collection(http: Arc<MockHttpClient>) -> Collection {
        let conn = mock_connection(http);
        let executor = ApiExecutor::Default(Arc::new(DefaultApiExecutor::new(conn.clone())));
        Collection::new(ApiGroup::new(conn, executor), "users")
    }

    #[test]
    fn test_document_id() {
        let col = collection(Arc::new(MockHttpClient::scripted(vec![])));
        assert_eq!(col.document_id(&json!("1")).unwrap(), "users/1");
        assert_eq!(col.document_id(&json!("users/1")).unwrap(), "users/1");
        assert_eq!(col.document_id(&json!({"_key": "2"})).unwrap(), "users/2");
        assert_eq!(col.document_id(&json!({"_id": "users/3", "_key": "x"})).unwrap(), "users/3");

        let err = col.document_id(&json!("orders/1")).unwrap_err();
        assert_eq!(err.to_string(), "bad collection name");
        assert!(matches!(err.client(), Some(ClientError::DocumentParse(_))));

        assert!(col.document_id(&json!({"name": "x"})).is_err());
        assert!(col.document_id(&json!(5)).is_err());
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(202, json!({"_id": "users/1", "_key": "1", "_rev": "_a"}))),
            Ok(json_response(
                409,
                json!({"error": true, "code": 409, "errorNum": errno::UNIQUE_CONSTRAINT_VIOLATED, "errorMessage": "unique constraint violated"}),
            )),
        ]));
        let col = collection(http.clone());

        let meta = col
            .insert(json!({"_key": "1", "val": 1}), InsertOptions::default())
            .await
            .unwrap()
            .value()
            .unwrap();
        assert_eq!(meta["_key"], "1");

        let err = col.insert(json!({"_key": "1"}), InsertOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DocumentInsert));
        assert_eq!(err.error_code(), Some(errno::UNIQUE_CONSTRAINT_VIOLATED));
        assert_eq!(err.http_code(), Some(409));

        let calls = http.calls();
        assert_eq!(calls[0].url, "http://127.0.0.1:8529/_db/test/_api/document/users");
        assert_eq!(calls[0].params["returnNew"], "0");
        assert_eq!(calls[0].data.as_deref(), Some(r#"{"_key":"1","val":1}"#));
    }

    #[tokio::test]
    async fn test_get_has_delete() {
        let missing = json!({"error": true, "errorNum": errno::DOCUMENT_NOT_FOUND, "errorMessage": "document not found"});
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"_key": "1", "val": 1}))),
            Ok(json_response(404, missing.clone())),
            Ok(raw_response(200, "")),
            Ok(raw_response(404, "")),
            Ok(json_response(404, missing.clone())),
            Ok(json_response(404, missing)),
        ]));
        let col = collection(http);

        let doc = col.get(&json!("1")).await.unwrap().value().unwrap();
        assert_eq!(doc.unwrap()["val"], 1);
        assert_eq!(col.get(&json!("2")).await.unwrap().value().unwrap(), None);

        assert!(col.has(&json!("1")).await.unwrap().value().unwrap());
        assert!(!col.has(&json!("2")).await.unwrap().value().unwrap());

        assert_eq!(col.delete(&json!("2"), true).await.unwrap().value().unwrap(), None);
        let err = col.delete(&json!("2"), false).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DocumentDelete));
    }

    #[tokio::test]
    async fn test_count_and_truncate() {
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"count": 12}))),
            Ok(json_response(200, json!({"name": "users"}))),
        ]));
        let col = collection(http.clone());

        assert_eq!(col.count().await.unwrap().value().unwrap(), 12);
        assert!(col.truncate().await.unwrap().value().unwrap());
        assert!(http.calls()[1].url.ends_with("/_api/collection/users/truncate"));
    }

    #[tokio::test]
    async fn test_invalid_handle_sends_nothing() {
        let http = Arc::new(MockHttpClient::scripted(vec![]));
        let col = collection(http.clone());

        let err = col.get(&json!("orders/1")).await.unwrap_err();
        assert_eq!(err.to_string(), "bad collection name");
        assert!(http.calls().is_empty());
    }
}
