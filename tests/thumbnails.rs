//! Tests for the thumbnail cache contract. The happy regeneration path
//! needs a real encoder binary, so these exercise the cache-hit and
//! failure behaviors, which are encoder-independent.
mod common;

use common::{register_user, spawn_server, spawn_server_with, TestServer};
use reqwest::blocking::Client;
use reqwest::header::COOKIE;
use serde_json::Value;

fn first_video_id(client: &Client, server: &TestServer, cookie: &str) -> i64 {
    let body: Value = client
        .get(server.url("/api/videos"))
        .header(COOKIE, cookie)
        .send()
        .unwrap()
        .json()
        .unwrap();
    body["videos"][0]["id"].as_i64().expect("at least one video")
}

#[test]
fn fresh_cache_is_served_without_the_encoder() {
    // An unusable encoder proves the cache path never shells out.
    let server = spawn_server_with(|c| c.ffmpeg_path = "/no/such/encoder".to_owned());
    let client = Client::new();
    let cookie = register_user(&client, &server, "thumbs", "password1");

    std::fs::write(server.media_dir().join("movie.mp4"), b"fake video").unwrap();
    let id = first_video_id(&client, &server, &cookie);

    // Cache written after the source, so it is fresh.
    let marker = b"\xff\xd8fake jpeg bytes";
    std::fs::write(server.thumb_dir().join(format!("{id}.jpg")), marker).unwrap();

    let response = client
        .get(server.url(&format!("/api/videos/{id}/thumbnail")))
        .header(COOKIE, &cookie)
        .send()
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.bytes().unwrap().as_ref(), marker);
}

#[test]
fn missing_encoder_is_an_internal_error() {
    let server = spawn_server_with(|c| c.ffmpeg_path = "/no/such/encoder".to_owned());
    let client = Client::new();
    let cookie = register_user(&client, &server, "nothumbs", "password1");

    std::fs::write(server.media_dir().join("movie.mp4"), b"fake video").unwrap();
    let id = first_video_id(&client, &server, &cookie);

    let response = client
        .get(server.url(&format!("/api/videos/{id}/thumbnail")))
        .header(COOKIE, &cookie)
        .send()
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().unwrap();
    assert_eq!(body["error"], "internal server error");
}

#[test]
fn failing_encoder_leaves_no_partial_file() {
    // /bin/false accepts any argv and exits non-zero.
    let server = spawn_server_with(|c| c.ffmpeg_path = "/bin/false".to_owned());
    let client = Client::new();
    let cookie = register_user(&client, &server, "partials", "password1");

    std::fs::write(server.media_dir().join("movie.mp4"), b"fake video").unwrap();
    let id = first_video_id(&client, &server, &cookie);

    let response = client
        .get(server.url(&format!("/api/videos/{id}/thumbnail")))
        .header(COOKIE, &cookie)
        .send()
        .unwrap();
    assert_eq!(response.status(), 500);
    assert!(!server.thumb_dir().join(format!("{id}.jpg")).exists());
}

#[test]
fn thumbnail_requires_auth_and_a_known_video() {
    let server = spawn_server();
    let client = Client::new();

    let response = client
        .get(server.url("/api/videos/1/thumbnail"))
        .send()
        .unwrap();
    assert_eq!(response.status(), 401);

    let cookie = register_user(&client, &server, "lost", "password1");
    let response = client
        .get(server.url("/api/videos/777/thumbnail"))
        .header(COOKIE, &cookie)
        .send()
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(server.url("/api/videos/xyz/thumbnail"))
        .header(COOKIE, &cookie)
        .send()
        .unwrap();
    assert_eq!(response.status(), 400);
}
