pub mod auth;
pub mod config;
pub mod db;
pub mod http;
pub mod media;
pub mod repo;
pub mod router;
pub mod server;
pub mod state;
pub mod thumbs;

pub use state::AppState;

use router::Router;

pub fn build_router() -> Router {
    Router::new()
        .route("POST", "/api/auth/login", http::auth::login)
        .route("POST", "/api/auth/register", http::auth::register)
        .route("POST", "/api/auth/logout", http::auth::logout)
        .route("GET", "/api/auth/me", http::auth::me)
        .route("GET", "/api/videos", http::videos::list_videos)
        .route("GET", "/api/videos/:id/stream", http::videos::stream_video)
        .route(
            "GET",
            "/api/videos/:id/thumbnail",
            http::videos::video_thumbnail,
        )
        .route("GET", "/api/history", http::history::list_history)
        .route("POST", "/api/history/:id", http::history::update_history)
}
