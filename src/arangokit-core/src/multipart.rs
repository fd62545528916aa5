//! Multipart codec for the batch endpoint
//!
//! A batch request is one `multipart/form-data` body. Every part is tagged
//! with `Content-Type: application/x-arango-batchpart` and a `Content-Id`
//! and carries a raw HTTP/1.1 rendering of one sub-request. The server
//! answers with the same framing, one raw HTTP response per part.

use std::collections::BTreeMap;

use crate::error::{ClientError, Result};
use crate::request::Request;
use crate::serializer::{normalize_data, Serializer};

pub const BATCH_PART_CONTENT_TYPE: &str = "application/x-arango-batchpart";

/// Fresh boundary for one batch request
pub fn new_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// `Content-Type` header value announcing `boundary`
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Render one request as a raw HTTP/1.1 request block
pub fn render_request(request: &Request, serializer: &dyn Serializer) -> Result<String> {
    let mut buffer = vec![format!("{} {} HTTP/1.1", request.method, request.path_and_query())];
    for (name, value) in &request.headers {
        buffer.push(format!("{}: {}", name, value));
    }
    if let Some(body) = normalize_data(request.data.as_ref(), serializer)? {
        buffer.push(format!("\r\n{}", body));
    }
    Ok(buffer.join("\r\n"))
}

/// Encode `(content id, request)` pairs into one multipart body
pub fn encode_batch(
    boundary: &str,
    parts: &[(&str, &Request)],
    serializer: &dyn Serializer,
) -> Result<String> {
    let mut buffer = Vec::with_capacity(parts.len() * 4 + 1);
    for (content_id, request) in parts {
        buffer.push(format!("--{}", boundary));
        buffer.push(format!("Content-Type: {}", BATCH_PART_CONTENT_TYPE));
        buffer.push(format!("Content-Id: {}", content_id));
        buffer.push(format!("\r\n{}", render_request(request, serializer)?));
    }
    buffer.push(format!("--{}--", boundary));
    Ok(buffer.join("\r\n"))
}

/// One decoded part of a batch response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePart {
    pub content_id: Option<String>,
    pub status_code: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Split a multipart response body into its parts
///
/// Text before the first delimiter and after the closing delimiter is
/// ignored, so an empty or unframed body yields zero parts.
pub fn decode_batch(body: &str, boundary: &str) -> Result<Vec<ResponsePart>> {
    let delimiter = format!("--{}", boundary);
    let segments: Vec<&str> = body.split(delimiter.as_str()).collect();
    if segments.len() < 2 {
        return Ok(Vec::new());
    }

    segments[1..segments.len() - 1]
        .iter()
        .map(|segment| decode_part(segment))
        .collect()
}

fn decode_part(segment: &str) -> Result<ResponsePart> {
    let segment = segment.trim_start_matches(['\r', '\n']);
    let (part_head, http) = split_blank_line(segment);
    let (response_head, body) = split_blank_line(http);

    let content_id = parse_headers(part_head).remove("content-id");

    let mut lines = response_head.lines();
    let status_line = lines
        .next()
        .map(str::trim)
        .filter(|l| l.starts_with("HTTP/"))
        .ok_or_else(|| malformed("missing status line"))?;

    let mut fields = status_line.splitn(3, ' ');
    let _version = fields.next();
    let status_code = fields
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| malformed(status_line))?;
    let status_text = fields.next().unwrap_or_default().to_string();

    let headers = parse_headers(&lines.collect::<Vec<_>>().join("\n"));

    Ok(ResponsePart {
        content_id,
        status_code,
        status_text,
        headers,
        body: strip_delimiter_newline(body).to_string(),
    })
}

fn malformed(detail: &str) -> crate::error::ArangoError {
    ClientError::BatchState(format!("malformed batch response part: {}", detail)).into()
}

/// Drop the one line break that belongs to the following delimiter
fn strip_delimiter_newline(body: &str) -> &str {
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

/// Split at the first empty line; the second half is empty when there is none
fn split_blank_line(s: &str) -> (&str, &str) {
    if let Some(pos) = s.find("\r\n\r\n") {
        (&s[..pos], &s[pos + 4..])
    } else if let Some(pos) = s.find("\n\n") {
        (&s[..pos], &s[pos + 2..])
    } else {
        (s, "")
    }
}

fn parse_headers(block: &str) -> BTreeMap<String, String> {
    block
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect()
}
