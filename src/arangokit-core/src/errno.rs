//! Server error numbers (`errorNum`) the client branches on

pub const BAD_PARAMETER: i64 = 10;
pub const FORBIDDEN: i64 = 11;

pub const HTTP_UNAUTHORIZED: i64 = 401;
pub const HTTP_NOT_FOUND: i64 = 404;

pub const DOCUMENT_NOT_FOUND: i64 = 1202;
pub const DATA_SOURCE_NOT_FOUND: i64 = 1203;
pub const UNIQUE_CONSTRAINT_VIOLATED: i64 = 1210;
pub const DATABASE_NOT_FOUND: i64 = 1228;

pub const TRANSACTION_NOT_FOUND: i64 = 1655;
