use crate::auth::AuthedUser;
use crate::http::request::Request;
use crate::http::response::{ApiError, ApiResult};
use crate::http::static_files;
use crate::state::AppState;

/// Bound path parameters per request.
pub const MAX_PATH_PARAMS: usize = 8;

pub type Handler = fn(&mut RequestContext) -> ApiResult;

/// Everything a handler sees: the shared server state, the parsed request,
/// the authentication outcome and the bound path parameters.
pub struct RequestContext<'a> {
    pub state: &'a AppState,
    pub request: &'a Request,
    pub user: Option<AuthedUser>,
    params: Vec<(String, String)>,
}

impl<'a> RequestContext<'a> {
    pub fn new(state: &'a AppState, request: &'a Request, user: Option<AuthedUser>) -> Self {
        Self {
            state,
            request,
            user,
            params: Vec::with_capacity(MAX_PATH_PARAMS),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_user(&self) -> Result<&AuthedUser, ApiError> {
        self.user
            .as_ref()
            .ok_or(ApiError::Unauthorized("authentication required"))
    }
}

struct Route {
    method: &'static str,
    pattern: &'static str,
    handler: Handler,
}

/// Static method+pattern table, set once at startup and read-only after.
/// Segments starting with `:` bind path parameters.
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn route(mut self, method: &'static str, pattern: &'static str, handler: Handler) -> Self {
        self.routes.push(Route {
            method,
            pattern,
            handler,
        });
        self
    }

    /// Runs the first matching handler. Unmatched `/api` paths get the JSON
    /// 404; everything else falls through to the static-asset tree.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> ApiResult {
        for route in &self.routes {
            if route.method != ctx.request.method {
                continue;
            }
            let mut params = Vec::with_capacity(MAX_PATH_PARAMS);
            if match_pattern(route.pattern, &ctx.request.path, &mut params) {
                ctx.params = params;
                return (route.handler)(ctx);
            }
        }
        if is_api_path(&ctx.request.path) {
            return Err(ApiError::NotFound("not found"));
        }
        static_files::serve(ctx)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn is_api_path(path: &str) -> bool {
    let first_segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
    first_segment == "api"
}

/// Tokenizes both pattern and path by `/` and requires equal segment counts;
/// `:name` segments record a binding, everything else matches literally.
fn match_pattern(pattern: &str, path: &str, params: &mut Vec<(String, String)>) -> bool {
    let mut pattern_segments = pattern.split('/').filter(|s| !s.is_empty());
    let mut path_segments = path.split('/').filter(|s| !s.is_empty());
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) => {
                if let Some(name) = p.strip_prefix(':') {
                    if params.len() >= MAX_PATH_PARAMS {
                        return false;
                    }
                    params.push((name.to_owned(), s.to_owned()));
                } else if p != s {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        match_pattern(pattern, path, &mut params).then_some(params)
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(bind("/api/videos", "/api/videos").is_some());
        assert!(bind("/api/videos", "/api/history").is_none());
        assert!(bind("/api/videos", "/api").is_none());
        assert!(bind("/api/videos", "/api/videos/7").is_none());
    }

    #[test]
    fn param_segments_bind_values() {
        let params = bind("/api/videos/:id/stream", "/api/videos/7/stream").unwrap();
        assert_eq!(params, vec![("id".to_owned(), "7".to_owned())]);
        assert!(bind("/api/videos/:id/stream", "/api/videos/7/thumbnail").is_none());
    }

    #[test]
    fn api_prefix_detection() {
        assert!(is_api_path("/api"));
        assert!(is_api_path("/api/anything"));
        assert!(!is_api_path("/apidocs"));
        assert!(!is_api_path("/"));
        assert!(!is_api_path("/index.html"));
    }
}
