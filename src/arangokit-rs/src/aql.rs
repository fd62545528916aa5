use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use arangokit_core::error::{ClientError, ErrorKind, Result};
use arangokit_core::request::Request;
use arangokit_core::response::Response;

use crate::api::{ensure_success, ApiGroup};
use crate::executor::ApiResult;

/// First batch of an AQL query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub result: Vec<Value>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
    /// Cursor id when more batches are waiting on the server
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub extra: Option<Value>,
}

/// Knobs of a single query run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub bind_vars: Option<Value>,
    /// Ask the server for the total result count
    pub count: bool,
    pub batch_size: Option<u64>,
    pub ttl: Option<u64>,
}

impl QueryOptions {
    pub fn bind_vars(mut self, vars: Value) -> Self {
        self.bind_vars = Some(vars);
        self
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }
}

/// AQL query API
#[derive(Debug, Clone)]
pub struct Aql {
    group: ApiGroup,
}

impl Aql {
    pub(crate) fn new(group: ApiGroup) -> Self {
        Self { group }
    }

    /// Run a query and return its first result batch
    pub async fn execute(&self, query: &str, options: QueryOptions) -> Result<ApiResult<QueryResult>> {
        let mut data = json!({"query": query, "count": options.count});
        if let Some(vars) = options.bind_vars {
            data["bindVars"] = vars;
        }
        if let Some(size) = options.batch_size {
            data["batchSize"] = json!(size);
        }
        if let Some(ttl) = options.ttl {
            data["ttl"] = json!(ttl);
        }

        let request = Request::post("/_api/cursor").with_data(data);
        let req = request.clone();
        self.group
            .execute(request, move |resp: Response| {
                let resp = ensure_success(ErrorKind::AqlQueryExecute, &req, resp)?;
                serde_json::from_value(resp.body)
                    .map_err(|e| ClientError::MalformedResponse(format!("bad cursor body: {}", e)).into())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ApiExecutor, DefaultApiExecutor};
    use crate::testing::{json_response, mock_connection, MockHttpClient};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_execute_query() {
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(201, json!({"result": [1, 2], "hasMore": false, "count": 2, "error": false, "code": 201}))),
            Ok(json_response(400, json!({"error": true, "errorNum": 1501, "errorMessage": "syntax error"}))),
        ]));
        let conn = mock_connection(http.clone());
        let aql = Aql::new(ApiGroup::new(
            conn.clone(),
            ApiExecutor::Default(Arc::new(DefaultApiExecutor::new(conn))),
        ));

        let result = aql
            .execute("RETURN @x", QueryOptions::default().bind_vars(json!({"x": 1})).count())
            .await
            .unwrap()
            .value()
            .unwrap();
        assert_eq!(result.result, vec![json!(1), json!(2)]);
        assert_eq!(result.count, Some(2));
        assert!(!result.has_more);

        let err = aql.execute("RETRUN 1", QueryOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AqlQueryExecute));
        assert_eq!(err.error_code(), Some(1501));

        let sent: Value = serde_json::from_str(http.calls()[0].data.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"query": "RETURN @x", "count": true, "bindVars": {"x": 1}}));
    }
}
