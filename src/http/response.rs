use serde_json::{json, Value};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;

pub type ApiResult = Result<HttpResponse, ApiError>;

/// Copy chunk size for the user-space file send path.
const FILE_COPY_CHUNK: usize = 8 * 1024;

/// Applied to every response, API and static alike.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    (
        "Content-Security-Policy",
        "default-src 'self'; img-src 'self' data:; media-src 'self'; \
         style-src 'self' 'unsafe-inline'; script-src 'self';",
    ),
];

pub enum ResponseBody {
    Bytes(Vec<u8>),
    File { file: File, offset: u64, length: u64 },
    Empty,
}

impl ResponseBody {
    fn len(&self) -> u64 {
        match self {
            ResponseBody::Bytes(bytes) => bytes.len() as u64,
            ResponseBody::File { length, .. } => *length,
            ResponseBody::Empty => 0,
        }
    }
}

pub struct HttpResponse {
    pub status: u16,
    content_type: Option<&'static str>,
    extra_headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            extra_headers: Vec::new(),
            body: ResponseBody::Bytes(value.to_string().into_bytes()),
        }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some(content_type),
            extra_headers: Vec::new(),
            body: ResponseBody::Bytes(body),
        }
    }

    pub fn file(status: u16, content_type: &'static str, file: File, offset: u64, length: u64) -> Self {
        Self {
            status,
            content_type: Some(content_type),
            extra_headers: Vec::new(),
            body: ResponseBody::File { file, offset, length },
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            extra_headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        206 => "Partial Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub(crate) fn format_head(response: &HttpResponse) -> String {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\n",
        response.status,
        reason_phrase(response.status)
    );
    for (name, value) in SECURITY_HEADERS {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    let _ = write!(head, "Content-Length: {}\r\n", response.body.len());
    if let Some(content_type) = response.content_type {
        let _ = write!(head, "Content-Type: {content_type}\r\n");
    }
    for (name, value) in &response.extra_headers {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    head.push_str("\r\n");
    head
}

/// Writes one complete response and returns. The caller closes the socket;
/// partial writes are not retried past what `write_all` already does.
pub fn write_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    stream.write_all(format_head(&response).as_bytes())?;
    match response.body {
        ResponseBody::Bytes(bytes) => stream.write_all(&bytes)?,
        ResponseBody::Empty => {}
        ResponseBody::File { file, offset, length } => send_file(stream, file, offset, length)?,
    }
    stream.flush()
}

/// Sends `length` bytes of `file` starting at `offset`, preferring kernel
/// zero-copy transmission and falling back to a buffered copy loop.
fn send_file(stream: &mut TcpStream, mut file: File, offset: u64, length: u64) -> std::io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        if sendfile_linux(stream, &file, offset, length)? {
            return Ok(());
        }
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut remaining = length;
    let mut chunk = [0u8; FILE_COPY_CHUNK];
    while remaining > 0 {
        let want = chunk.len().min(remaining as usize);
        let n = file.read(&mut chunk[..want])?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        stream.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Returns Ok(false) when the kernel declines sendfile so the caller can use
/// the copy loop instead.
#[cfg(target_os = "linux")]
fn sendfile_linux(
    stream: &TcpStream,
    file: &File,
    offset: u64,
    length: u64,
) -> std::io::Result<bool> {
    use std::os::fd::AsRawFd;

    let mut off = offset as libc::off_t;
    let mut remaining = length;
    let mut first = true;
    while remaining > 0 {
        let sent = unsafe {
            libc::sendfile(
                stream.as_raw_fd(),
                file.as_raw_fd(),
                &mut off,
                remaining as usize,
            )
        };
        if sent < 0 {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR | libc::EAGAIN) => continue,
                Some(libc::EINVAL | libc::ENOSYS) if first => return Ok(false),
                _ => return Err(err),
            }
        }
        if sent == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        remaining -= sent as u64;
        first = false;
    }
    Ok(true)
}

/// Every failure a handler can surface, with its wire mapping. The JSON
/// envelope is always `{"error":"<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(&'static str),
    Forbidden,
    NotFound(&'static str),
    Conflict(&'static str),
    RangeNotSatisfiable(u64),
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Logs the underlying cause and returns the opaque 500. The cause never
    /// reaches the client.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error");
        ApiError::Internal
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::RangeNotSatisfiable(_) => 416,
            ApiError::Internal => 500,
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.as_str(),
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::RangeNotSatisfiable(_) => "range not satisfiable",
            ApiError::Internal => "internal server error",
        };
        let response = HttpResponse::json(status, &json!({ "error": message }));
        match self {
            ApiError::RangeNotSatisfiable(size) => {
                response.header("Content-Range", format!("bytes */{size}"))
            }
            _ => response,
        }
    }
}

impl From<crate::db::DbError> for ApiError {
    fn from(err: crate::db::DbError) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(response: &HttpResponse) -> Value {
        match &response.body {
            ResponseBody::Bytes(bytes) => serde_json::from_slice(bytes).expect("json body"),
            _ => panic!("expected a bytes body"),
        }
    }

    #[test]
    fn bad_request_carries_message() {
        let response = ApiError::bad_request("position must be a number").into_response();
        assert_eq!(response.status, 400);
        assert_eq!(body_json(&response)["error"], "position must be a number");
    }

    #[test]
    fn unauthorized_and_conflict_use_fixed_messages() {
        let response = ApiError::Unauthorized("authentication required").into_response();
        assert_eq!(response.status, 401);
        assert_eq!(body_json(&response)["error"], "authentication required");

        let response = ApiError::Conflict("username already taken").into_response();
        assert_eq!(response.status, 409);
        assert_eq!(body_json(&response)["error"], "username already taken");
    }

    #[test]
    fn internal_is_opaque() {
        let response = ApiError::internal("connection pool exhausted").into_response();
        assert_eq!(response.status, 500);
        assert_eq!(body_json(&response)["error"], "internal server error");
    }

    #[test]
    fn range_not_satisfiable_reports_total_size() {
        let response = ApiError::RangeNotSatisfiable(1_000_000).into_response();
        assert_eq!(response.status, 416);
        let head = format_head(&response);
        assert!(head.contains("Content-Range: bytes */1000000\r\n"));
    }

    #[test]
    fn head_carries_the_wire_contract() {
        let response = HttpResponse::json(200, &json!({ "ok": true }));
        let head = format_head(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Connection: close\r\n"));
        assert!(head.contains("Content-Length: 11\r\n"));
        assert!(head.contains("Content-Type: application/json\r\n"));
        assert!(head.contains("X-Content-Type-Options: nosniff\r\n"));
        assert!(head.contains("X-Frame-Options: DENY\r\n"));
        assert!(head.contains("Content-Security-Policy: default-src 'self';"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn file_responses_advertise_the_requested_length() {
        let file = tempfile::tempfile().expect("tempfile");
        let response = HttpResponse::file(206, "video/mp4", file, 100, 50)
            .header("Content-Range", "bytes 100-149/1000");
        let head = format_head(&response);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(head.contains("Content-Length: 50\r\n"));
        assert!(head.contains("Content-Range: bytes 100-149/1000\r\n"));
    }

    #[test]
    fn empty_responses_have_zero_length() {
        let head = format_head(&HttpResponse::empty(204));
        assert!(head.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(head.contains("Content-Length: 0\r\n"));
        assert!(!head.contains("Content-Type"));
    }
}
