use crate::http::response::{ApiError, ApiResult, HttpResponse};
use crate::router::RequestContext;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

/// A position this close to the end of a title counts as finished and is
/// stored as 0 so the client starts over instead of resuming.
const COMPLETION_EPSILON_SECS: f64 = 5.0;

fn normalize_position(position: f64, duration: Option<i64>) -> f64 {
    match duration {
        Some(d) if position >= d as f64 - COMPLETION_EPSILON_SECS => 0.0,
        _ => position,
    }
}

/// GET /api/history
pub fn list_history(ctx: &mut RequestContext) -> ApiResult {
    let user_id = ctx.require_user()?.user_id;
    let rows = ctx.state.db.list_watch_history(user_id)?;
    let history: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "videoId": r.video_id,
                "title": r.title,
                "position": r.position,
                "updatedAt": r.updated_at.to_rfc3339(),
                "thumbnailUrl": format!("/api/videos/{}/thumbnail", r.video_id),
                "streamUrl": format!("/api/videos/{}/stream", r.video_id),
            })
        })
        .collect();
    Ok(HttpResponse::json(200, &json!({ "history": history })))
}

/// POST /api/history/:id
pub fn update_history(ctx: &mut RequestContext) -> ApiResult {
    let user_id = ctx.require_user()?.user_id;
    let id: i64 = ctx
        .param("id")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::bad_request("invalid video id"))?;
    let body: Value = serde_json::from_slice(&ctx.request.body)
        .map_err(|_| ApiError::bad_request("invalid JSON body"))?;
    let position = body
        .get("position")
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| ApiError::bad_request("position must be a non-negative number"))?;

    let Some(video) = ctx.state.db.get_video_by_id(id)? else {
        return Err(ApiError::NotFound("video not found"));
    };

    let stored = normalize_position(position, video.duration);
    if stored != position {
        debug!(video_id = id, position, "position normalized to completion");
    }
    ctx.state
        .db
        .update_watch_history(user_id, id, stored, Utc::now())?;
    Ok(HttpResponse::json(200, &json!({ "status": "ok" })))
}
