use crate::auth;
use crate::http::response::{ApiError, ApiResult, HttpResponse};
use crate::repo::users::CreateUserError;
use crate::router::RequestContext;
use crate::state::AppState;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

fn parse_body(ctx: &RequestContext) -> Result<Value, ApiError> {
    serde_json::from_slice(&ctx.request.body)
        .map_err(|_| ApiError::bad_request("invalid JSON body"))
}

fn require_str_field<'a>(body: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Issues a fresh session for `user_id` and builds the 200 response carrying
/// the cookie. Expired sessions are purged opportunistically on this path.
fn issue_session(state: &AppState, user_id: i64, username: &str) -> ApiResult {
    let token = auth::generate_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
    state.db.create_session(&token, user_id, expires_at)?;
    match state.db.purge_expired_sessions(Utc::now()) {
        Ok(purged) if purged > 0 => info!(purged, "purged expired sessions"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "session purge failed"),
    }
    let cookie = auth::session_cookie(&token, state.config.session_ttl_seconds());
    Ok(HttpResponse::json(200, &json!({ "username": username })).header("Set-Cookie", cookie))
}

/// POST /api/auth/login
pub fn login(ctx: &mut RequestContext) -> ApiResult {
    let body = parse_body(ctx)?;
    let username = require_str_field(&body, "username")?;
    let password = require_str_field(&body, "password")?;

    let Some(creds) = ctx.state.db.get_user_credentials(username)? else {
        return Err(ApiError::Unauthorized("invalid username or password"));
    };
    if !auth::verify_password(password, &creds.salt, &creds.hash) {
        return Err(ApiError::Unauthorized("invalid username or password"));
    }
    info!(username = %username, "login");
    issue_session(ctx.state, creds.user_id, username)
}

/// POST /api/auth/register
pub fn register(ctx: &mut RequestContext) -> ApiResult {
    let body = parse_body(ctx)?;
    let username = require_str_field(&body, "username")?;
    let password = require_str_field(&body, "password")?;
    let confirm = require_str_field(&body, "confirmPassword")?;

    auth::validate_username(username).map_err(ApiError::bad_request)?;
    auth::validate_password(password).map_err(ApiError::bad_request)?;
    if confirm != password {
        return Err(ApiError::bad_request("passwords do not match"));
    }

    let salt = auth::generate_salt();
    let hash = auth::derive_password_hash(password, &salt);
    let user_id = match ctx.state.db.create_user(username, &hash, &salt) {
        Ok(id) => id,
        Err(CreateUserError::DuplicateUsername) => {
            return Err(ApiError::Conflict("username already taken"))
        }
        Err(CreateUserError::Db(err)) => return Err(err.into()),
    };
    info!(username = %username, "registered user");
    issue_session(ctx.state, user_id, username)
}

/// POST /api/auth/logout
pub fn logout(ctx: &mut RequestContext) -> ApiResult {
    if let Some(token) = auth::extract_session_token(ctx.request.header("cookie")) {
        if let Err(err) = ctx.state.db.delete_session(&token) {
            warn!(error = %err, "failed to delete session on logout");
        }
    }
    Ok(HttpResponse::empty(204).header("Set-Cookie", auth::clear_session_cookie()))
}

/// GET /api/auth/me
pub fn me(ctx: &mut RequestContext) -> ApiResult {
    let user = ctx.require_user()?;
    Ok(HttpResponse::json(
        200,
        &json!({ "username": user.username, "userId": user.user_id }),
    ))
}
