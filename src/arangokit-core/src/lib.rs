//! Arangokit Core Library
//!
//! Transport-independent building blocks of the arangokit client:
//! - Request/Response envelopes
//! - Error taxonomy and server error numbers
//! - Host resolution strategies
//! - Serializer and HTTP transport capabilities
//! - Multipart codec for batch requests
//! - Client configuration

pub mod config;
pub mod errno;
pub mod error;
pub mod http;
pub mod multipart;
pub mod request;
pub mod resolver;
pub mod response;
pub mod serializer;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{ArangoError, ClientError, ErrorKind, Result, ServerError, Subsystem};
pub use http::{BasicAuth, DefaultHttpClient, HttpClient, RetryPolicy};
pub use request::{Method, Request};
pub use resolver::{HostResolver, ResolverKind};
pub use response::Response;
pub use serializer::{JsonSerializer, Serializer};
