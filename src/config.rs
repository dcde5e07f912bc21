use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub media_dir: PathBuf,
    pub thumb_dir: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub static_dir: PathBuf,
    pub schema_path: PathBuf,
    pub session_ttl_hours: i64,
    pub watch_interval: Duration,
    pub ffmpeg_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = resolve_path("DATA_DIR", "data");
        let db_path = env::var("DB_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map_or_else(|| data_dir.join("app.db"), PathBuf::from);

        // Interval below 1s would busy-poll the directory metadata.
        let watch_secs = parse_or(env::var("MEDIA_WATCH_INTERVAL_SEC").ok(), 2u64).max(1);

        Self {
            port: parse_or(env::var("PORT").ok(), 3000),
            media_dir: resolve_path("MEDIA_DIR", "media"),
            thumb_dir: resolve_path("THUMB_DIR", "web/thumbnails"),
            data_dir,
            db_path,
            static_dir: resolve_path("STATIC_DIR", "web/public"),
            schema_path: resolve_path("SCHEMA_PATH", "schema.sql"),
            session_ttl_hours: parse_or(env::var("SESSION_TTL_HOURS").ok(), 24),
            watch_interval: Duration::from_secs(watch_secs),
            ffmpeg_path: env::var("FFMPEG_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "ffmpeg".to_owned()),
        }
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_hours * 3600
    }
}

/// Resolves a path variable: the environment wins; otherwise probe
/// `./<name>` then `../<name>`, falling back to `./<name>`.
fn resolve_path(var: &str, name: &str) -> PathBuf {
    if let Some(v) = env::var(var).ok().filter(|v| !v.is_empty()) {
        return PathBuf::from(v);
    }
    let local = PathBuf::from(name);
    if local.exists() {
        return local;
    }
    let parent = PathBuf::from("..").join(name);
    if parent.exists() {
        return parent;
    }
    local
}

/// Numeric variables fall back to the default on parse error, silently.
fn parse_or<T: FromStr + Copy>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
