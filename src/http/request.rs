use std::io::Read;
use thiserror::Error;

/// Initial receive buffer size; grows on demand.
pub const RECV_BUFFER_INITIAL: usize = 8 * 1024;
/// Hard cap on a single request (head + body).
pub const RECV_BUFFER_MAX: usize = 8 * 1024 * 1024;
/// Fixed capacity of the parsed header list.
pub const MAX_HEADERS: usize = 64;
pub const MAX_PATH_LEN: usize = 512;
pub const MAX_QUERY_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("connection closed before a full request arrived")]
    ConnectionClosed,
    #[error("request exceeds the receive buffer cap")]
    TooLarge,
    #[error("malformed request line")]
    BadRequestLine,
    #[error("request target too long")]
    TargetTooLong,
    #[error("malformed header line")]
    BadHeader,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("invalid Content-Length")]
    BadContentLength,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// One parsed HTTP/1.1 request. The target is split at the first `?`; no
/// percent-decoding happens at parse time, `query_param` decodes on lookup.
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
    pub version: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Percent-decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        for pair in self.query.split('&') {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if percent_decode(k) == key {
                return Some(percent_decode(v));
            }
        }
        None
    }
}

/// Reads exactly one request from a blocking stream. The buffer starts at
/// `RECV_BUFFER_INITIAL` bytes and grows as needed up to `RECV_BUFFER_MAX`;
/// a request with no header terminator inside the cap is rejected, as is a
/// `Content-Length` that would push past it.
pub fn parse_request<R: Read>(reader: &mut R) -> Result<Request, ParseError> {
    let mut buf: Vec<u8> = Vec::with_capacity(RECV_BUFFER_INITIAL);
    let mut scratch = [0u8; RECV_BUFFER_INITIAL];

    // Accumulate until the CRLFCRLF header terminator shows up. `scanned`
    // marks how far the buffer is known terminator-free, so each pass only
    // looks at new bytes.
    let mut scanned = 0;
    let head_end = loop {
        if let Some(pos) = find_terminator(&buf[scanned..]) {
            break scanned + pos;
        }
        scanned = buf.len().saturating_sub(3);
        if buf.len() >= RECV_BUFFER_MAX {
            return Err(ParseError::TooLarge);
        }
        let n = reader.read(&mut scratch)?;
        if n == 0 {
            return Err(ParseError::ConnectionClosed);
        }
        buf.extend_from_slice(&scratch[..n]);
    };

    let head =
        std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::BadRequestLine)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::BadRequestLine)?;
    let (method, path, query, version) = parse_request_line(request_line)?;

    let mut headers = Vec::with_capacity(MAX_HEADERS.min(16));
    for line in lines {
        if headers.len() >= MAX_HEADERS {
            return Err(ParseError::TooManyHeaders);
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::BadHeader)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::BadHeader);
        }
        headers.push((name.to_owned(), value.trim().to_owned()));
    }

    let mut request = Request {
        method,
        path,
        query,
        version,
        headers,
        body: Vec::new(),
    };

    let body_start = head_end + 4;
    if let Some(raw) = request.header("content-length") {
        let length: usize = raw.parse().map_err(|_| ParseError::BadContentLength)?;
        if length > RECV_BUFFER_MAX {
            return Err(ParseError::TooLarge);
        }
        while buf.len() - body_start < length {
            let n = reader.read(&mut scratch)?;
            if n == 0 {
                return Err(ParseError::ConnectionClosed);
            }
            buf.extend_from_slice(&scratch[..n]);
        }
        request.body = buf[body_start..body_start + length].to_vec();
    }
    Ok(request)
}

fn parse_request_line(line: &str) -> Result<(String, String, String, String), ParseError> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::BadRequestLine);
    };
    if method.is_empty() || target.is_empty() || !version.starts_with("HTTP/") {
        return Err(ParseError::BadRequestLine);
    }
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };
    if path.len() > MAX_PATH_LEN || query.len() > MAX_QUERY_LEN {
        return Err(ParseError::TargetTooLong);
    }
    Ok((
        method.to_owned(),
        path.to_owned(),
        query.to_owned(),
        version.to_owned(),
    ))
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
