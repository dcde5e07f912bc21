use ott_server::config::Config;
use ott_server::db::Db;
use ott_server::media::{self, watcher};
use ott_server::server::Server;
use ott_server::{auth, build_router, AppState};
use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = Config::from_env();
    if let Err(err) = run(config) {
        error!(error = %err, "fatal initialization failure");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if !config.static_dir.is_dir() {
        return Err(format!("static dir not found: {}", config.static_dir.display()).into());
    }
    let schema_sql = std::fs::read_to_string(&config.schema_path)
        .map_err(|err| format!("schema file {}: {err}", config.schema_path.display()))?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(db = %config.db_path.display(), "opening store");
    let db = Arc::new(Db::open(&config.db_path)?);
    db.apply_schema(&schema_sql)?;
    auth::seed_users(&db)?;

    match media::sync_media_directory(&db, &config.media_dir) {
        Ok(count) => {
            info!(videos = count, dir = %config.media_dir.display(), "media catalog synchronized");
        }
        Err(err) => warn!(error = %err, "initial media synchronization failed"),
    }

    // SIGINT/SIGTERM raise the flag; poll() wakes on the signal and both the
    // acceptor loop and the watcher exit promptly. SIGPIPE is already
    // ignored by the runtime, so a dead peer surfaces as a send error.
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let watcher_handle = watcher::spawn(
        Arc::clone(&db),
        config.media_dir.clone(),
        config.watch_interval,
        watcher::dir_mtime(&config.media_dir),
        Arc::clone(&shutdown),
    )?;

    let state = AppState::new(Arc::clone(&db), config);
    let mut server = Server::bind(state, build_router(), Arc::clone(&shutdown))?;
    server.run();

    // Teardown: the loop already stopped accepting; stop the watcher, then
    // dropping the server joins the worker pool, then the store closes.
    if watcher_handle.join().is_err() {
        warn!("media watcher panicked");
    }
    drop(server);
    info!("server shut down gracefully");
    Ok(())
}
