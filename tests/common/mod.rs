#![allow(dead_code)]
//! Shared harness: a real server on an ephemeral port backed by a temp
//! SQLite file and temp media/static/thumbnail directories.

use ott_server::config::Config;
use ott_server::db::Db;
use ott_server::server::Server;
use ott_server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    _root: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.state.config.media_dir.clone()
    }

    pub fn thumb_dir(&self) -> PathBuf {
        self.state.config.thumb_dir.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // A throwaway connection wakes the poll loop so it notices the flag
        // without waiting out the timeout.
        let _ = std::net::TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn spawn_server() -> TestServer {
    spawn_server_with(|_| {})
}

pub fn spawn_server_with(tweak: impl FnOnce(&mut Config)) -> TestServer {
    let root = tempfile::tempdir().expect("tempdir");
    let media_dir = root.path().join("media");
    let thumb_dir = root.path().join("thumbnails");
    let static_dir = root.path().join("public");
    let data_dir = root.path().join("data");
    for dir in [&media_dir, &thumb_dir, &static_dir, &data_dir] {
        std::fs::create_dir_all(dir).expect("create test dir");
    }
    std::fs::write(
        static_dir.join("index.html"),
        "<!DOCTYPE html><html><head><title>test ui</title></head><body>ok</body></html>",
    )
    .expect("write index.html");

    let mut config = Config {
        port: 0,
        media_dir,
        thumb_dir,
        db_path: data_dir.join("app.db"),
        data_dir,
        static_dir,
        schema_path: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/schema.sql")),
        session_ttl_hours: 24,
        watch_interval: Duration::from_secs(1),
        ffmpeg_path: "ffmpeg".to_owned(),
    };
    tweak(&mut config);

    let db = Arc::new(prepare_db(&config.db_path));
    let state = AppState::new(db, config);

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut server = Server::bind(state.clone(), build_router(), Arc::clone(&shutdown))
        .expect("bind test server");
    let addr = server.local_addr().expect("local addr");
    let thread = std::thread::spawn(move || server.run());

    TestServer {
        addr,
        state,
        shutdown,
        thread: Some(thread),
        _root: root,
    }
}

pub fn prepare_db(db_path: &std::path::Path) -> Db {
    let db = Db::open(db_path).expect("open sqlite");
    let schema = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/schema.sql"))
        .expect("read schema.sql");
    db.apply_schema(&schema).expect("apply schema");
    db
}

/// Registers a fresh account and returns the `ott_session=<token>` pair to
/// send back as a `Cookie` header.
pub fn register_user(
    client: &reqwest::blocking::Client,
    server: &TestServer,
    username: &str,
    password: &str,
) -> String {
    let response = client
        .post(server.url("/api/auth/register"))
        .json(&serde_json::json!({
            "username": username,
            "password": password,
            "confirmPassword": password,
        }))
        .send()
        .expect("register request");
    assert_eq!(response.status(), 200, "register should succeed");
    session_cookie_from(&response)
}

pub fn session_cookie_from(response: &reqwest::blocking::Response) -> String {
    let set_cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .expect("cookie is ascii");
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_owned()
}
