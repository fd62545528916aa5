//! Arangokit Client Library
//!
//! HTTP client for ArangoDB-compatible document database servers. Every API
//! operation runs through one of four executors: immediate, server-side
//! async jobs, client-side batches, or stream transactions.

pub mod aql;
pub mod collection;
pub mod connection;
pub mod database;
pub mod executor;
pub mod job;
pub mod telemetry;

mod api;
mod client;

#[cfg(test)]
mod testing;

pub use aql::{Aql, QueryOptions, QueryResult};
pub use api::ApiGroup;
pub use client::ArangoClient;
pub use collection::{Collection, InsertOptions};
pub use connection::{Auth, AuthMethod, Connection};
pub use database::{
    AsyncDatabase, BatchDatabase, Database, JsTransaction, StandardDatabase, TransactionDatabase,
};
pub use executor::{ApiExecutor, ApiResult, ExecutionContext, TransactionOptions, TransactionStatus};
pub use job::{AsyncJob, BatchJob, JobStatus, QueuedJob};

pub use arangokit_core::{
    errno, ArangoError, ClientConfig, ClientError, DefaultHttpClient, ErrorKind, HttpClient, JsonSerializer,
    Method, Request, Response, Result, RetryPolicy, Serializer, ServerError,
};
