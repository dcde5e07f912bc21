use crate::http::response::{ApiError, ApiResult, HttpResponse};
use crate::router::RequestContext;
use std::path::Path;

/// Extension to MIME mapping for the front-end tree.
const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("mp4", "video/mp4"),
];

fn mime_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(e, _)| ext.eq_ignore_ascii_case(e))
                .map(|(_, mime)| *mime)
        })
        .unwrap_or("application/octet-stream")
}

fn is_traversal(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Serves the front-end for every path no API route claimed. `/` resolves
/// to `index.html`; MIME types come from the file extension.
pub fn serve(ctx: &RequestContext) -> ApiResult {
    if ctx.request.method != "GET" {
        return Ok(HttpResponse::empty(405));
    }
    let path = ctx.request.path.as_str();
    if is_traversal(path) {
        return Err(ApiError::Forbidden);
    }

    let relative = path.trim_start_matches('/');
    let target = if relative.is_empty() { "index.html" } else { relative };
    let full = ctx.state.config.static_dir.join(target);
    if full.is_dir() {
        return Err(ApiError::NotFound("not found"));
    }
    let file = std::fs::File::open(&full).map_err(|_| ApiError::NotFound("not found"))?;
    let length = file.metadata().map_err(ApiError::internal)?.len();
    Ok(HttpResponse::file(200, mime_for(&full), file, 0, length))
}
