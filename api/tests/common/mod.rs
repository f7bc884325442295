#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use lyricslib_api::accounts::{self, SignupForm};
use lyricslib_api::catalog::{self, NewArtist, NewSong};
use lyricslib_api::config::Config;
use lyricslib_api::models::{NewLine, Song, User};
use lyricslib_api::{build_router, db, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`

/// Migrated in-memory database and a router over it.
pub async fn setup() -> (Router, SqlitePool) {
    setup_with_config(Config::default()).await
}

pub async fn setup_with_config(config: Config) -> (Router, SqlitePool) {
    let pool = db::connect_in_memory()
        .await
        .expect("Should open in-memory database");
    let app = build_router(AppState::new(pool.clone(), config));
    (app, pool)
}

pub struct TestRequest {
    builder: axum::http::request::Builder,
    body: Body,
}

pub fn request(method: &str, uri: &str) -> TestRequest {
    TestRequest {
        builder: Request::builder().method(method).uri(uri),
        body: Body::empty(),
    }
}

impl TestRequest {
    pub fn cookie(mut self, cookie: &str) -> Self {
        self.builder = self.builder.header(header::COOKIE, cookie);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.builder = self.builder.header(header::CONTENT_TYPE, "application/json");
        self.body = Body::from(body.to_string());
        self
    }

    pub async fn send(self, app: &Router) -> TestResponse {
        let request = self.builder.body(self.body).expect("Should build request");
        let response = app.clone().oneshot(request).await.expect("Should get response");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        TestResponse {
            status,
            headers,
            bytes: bytes.to_vec(),
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("Should parse JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// `name=value` of the session cookie set by this response.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| pair.starts_with("sessionid=") && pair.len() > "sessionid=".len())
            .map(String::from)
    }
}

/// Creates a user directly in the store and returns it with a session cookie.
pub async fn login_as(pool: &SqlitePool, username: &str, staff: bool) -> (User, String) {
    let user = accounts::create_user(
        pool,
        &SignupForm {
            username: username.into(),
            email: format!("{}@example.com", username),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
        },
    )
    .await
    .expect("Should create user");
    if staff {
        accounts::set_staff(pool, username, true).await.unwrap();
    }
    let token = accounts::create_session(pool, user.id).await.unwrap();
    (user, format!("{}={}", accounts::SESSION_COOKIE, token))
}

/// A published song with `lines` lines by a new artist.
pub async fn published_song(pool: &SqlitePool, artist: &str, title: &str, lines: i64) -> Song {
    let artist = catalog::create_artist(
        pool,
        &NewArtist {
            name: artist.into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let song = catalog::create_song(
        pool,
        &NewSong {
            artist_id: artist.id,
            title: title.into(),
            year: Some(2020),
            is_published: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let lines: Vec<NewLine> = (1..=lines)
        .map(|no| NewLine {
            no,
            original: format!("original {}", no),
            romanized: None,
            translation_en: format!("translation {}", no),
        })
        .collect();
    catalog::replace_song_lines(pool, song.id, &lines).await.unwrap();
    song
}

pub async fn page_view_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM page_views")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// `/a/{artist}/{song}/` for a song.
pub async fn song_path(pool: &SqlitePool, song: &Song) -> String {
    let artist = catalog::get_artist(pool, song.artist_id).await.unwrap().unwrap();
    format!("/a/{}/{}/", artist.slug, song.slug)
}
