use crate::http::response::{ApiError, ApiResult, HttpResponse};
use crate::media;
use crate::repo::videos::{VideoListRow, VideoRow};
use crate::router::RequestContext;
use crate::thumbs;
use serde_json::{json, Value};
use std::fs::File;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_PAGE_SIZE: i64 = 12;
const MAX_PAGE_SIZE: i64 = 50;

fn video_json(row: &VideoListRow) -> Value {
    json!({
        "id": row.video_id,
        "title": row.title,
        "filename": row.filename,
        "description": row.description,
        "duration": row.duration,
        "thumbnailUrl": format!("/api/videos/{}/thumbnail", row.video_id),
        "streamUrl": format!("/api/videos/{}/stream", row.video_id),
        "resumeSeconds": row.resume_seconds,
    })
}

/// Parses an optional integer query parameter; garbage is a client error.
fn int_param(ctx: &RequestContext, name: &str) -> Result<Option<i64>, ApiError> {
    match ctx.request.query_param(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request("invalid query parameters")),
    }
}

/// GET /api/videos
///
/// Synchronizes the catalog with the media directory before querying, so a
/// freshly dropped file shows up even when the watcher is disabled.
pub fn list_videos(ctx: &mut RequestContext) -> ApiResult {
    let user_id = ctx.require_user()?.user_id;

    let cursor = int_param(ctx, "cursor")?.unwrap_or(0).max(0);
    let limit = match int_param(ctx, "limit")? {
        Some(l) if l >= 1 => l.min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    };
    let search = ctx
        .request
        .query_param("q")
        .map(|q| q.trim().to_owned())
        .filter(|q| !q.is_empty());

    media::sync_media_directory(&ctx.state.db, &ctx.state.config.media_dir)
        .map_err(ApiError::internal)?;

    let (rows, has_more) =
        ctx.state
            .db
            .list_videos_with_resume(user_id, search.as_deref(), limit, cursor)?;
    let videos: Vec<Value> = rows.iter().map(video_json).collect();
    let next_cursor = cursor + videos.len() as i64;

    Ok(HttpResponse::json(
        200,
        &json!({
            "videos": videos,
            "cursor": cursor,
            "limit": limit,
            "nextCursor": next_cursor,
            "hasMore": has_more,
            "query": search,
        }),
    ))
}

fn parse_video_id(ctx: &RequestContext) -> Result<i64, ApiError> {
    ctx.param("id")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::bad_request("invalid video id"))
}

fn lookup_video(ctx: &RequestContext, id: i64) -> Result<(VideoRow, PathBuf), ApiError> {
    let Some(video) = ctx.state.db.get_video_by_id(id)? else {
        return Err(ApiError::NotFound("video not found"));
    };
    let path = ctx.state.config.media_dir.join(&video.filename);
    Ok((video, path))
}

/// GET /api/videos/:id/stream
pub fn stream_video(ctx: &mut RequestContext) -> ApiResult {
    ctx.require_user()?;
    let id = parse_video_id(ctx)?;
    let (_, path) = lookup_video(ctx, id)?;
    let metadata = std::fs::metadata(&path).map_err(|_| ApiError::NotFound("video file missing"))?;
    let size = metadata.len();

    let range = match ctx.request.header("range") {
        None => None,
        Some(value) => match parse_range_header(value, size) {
            Ok(range) => Some(range),
            Err(RangeError::Malformed) => {
                return Err(ApiError::bad_request("malformed Range header"))
            }
            Err(RangeError::Unsatisfiable) => return Err(ApiError::RangeNotSatisfiable(size)),
        },
    };

    let file = File::open(&path).map_err(ApiError::internal)?;
    match range {
        Some(range) => {
            debug!(id, start = range.start, end = range.end, size, "range request");
            let length = range.end - range.start + 1;
            Ok(
                HttpResponse::file(206, "video/mp4", file, range.start, length)
                    .header("Accept-Ranges", "bytes")
                    .header(
                        "Content-Range",
                        format!("bytes {}-{}/{}", range.start, range.end, size),
                    ),
            )
        }
        None => Ok(HttpResponse::file(200, "video/mp4", file, 0, size)
            .header("Accept-Ranges", "bytes")),
    }
}

/// GET /api/videos/:id/thumbnail
pub fn video_thumbnail(ctx: &mut RequestContext) -> ApiResult {
    ctx.require_user()?;
    let id = parse_video_id(ctx)?;
    let (_, path) = lookup_video(ctx, id)?;
    if !path.is_file() {
        return Err(ApiError::NotFound("video file missing"));
    }
    let bytes = thumbs::get_or_generate(ctx.state, id, &path)?;
    Ok(HttpResponse::bytes(200, "image/jpeg", bytes))
}

#[derive(Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RangeError {
    Malformed,
    Unsatisfiable,
}

/// Single-range `bytes=` parser. `end` past the file is clamped; a range
/// that cannot yield a single byte is unsatisfiable.
pub fn parse_range_header(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let raw = value.strip_prefix("bytes=").ok_or(RangeError::Malformed)?;
    let (start_raw, end_raw) = raw.split_once('-').ok_or(RangeError::Malformed)?;
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    if start_raw.is_empty() {
        // Suffix form: the last N bytes.
        let n: u64 = end_raw.parse().map_err(|_| RangeError::Malformed)?;
        if size == 0 || n == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: size - n.min(size),
            end: size - 1,
        });
    }

    let start: u64 = start_raw.parse().map_err(|_| RangeError::Malformed)?;
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }
    let end = match end_raw {
        "" => size - 1,
        raw => {
            let end: u64 = raw.parse().map_err(|_| RangeError::Malformed)?;
            if end < start {
                return Err(RangeError::Unsatisfiable);
            }
            end.min(size - 1)
        }
    };
    Ok(ByteRange { start, end })
}
