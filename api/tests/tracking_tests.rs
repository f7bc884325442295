//! Page-view tracking through the full router.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{login_as, page_view_count, published_song, request, setup, setup_with_config, song_path};
use lyricslib_api::config::Config;
use lyricslib_api::models::PageView;
use lyricslib_api::stats::{self, Window};
use lyricslib_api::tracking::ContentCategory;

async fn views(pool: &sqlx::SqlitePool) -> Vec<PageView> {
    sqlx::query_as::<_, PageView>(
        "SELECT id, content_type, content_id, content_title, url, ip_address, user_id, session_key, user_agent, created_at FROM page_views ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_song_page_records_exactly_one_song_view() {
    let (app, pool) = setup().await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 2).await;
    let path = song_path(&pool, &song).await;

    let response = request("GET", &path)
        .header("user-agent", "test-agent/1.0")
        .send(&app)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let rows = views(&pool).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_type, "song");
    assert_eq!(rows[0].content_id, Some(song.id));
    assert_eq!(rows[0].content_title, "295");
    assert_eq!(rows[0].url, path);
    assert_eq!(rows[0].user_agent, "test-agent/1.0");
    assert_eq!(rows[0].user_id, None);
    assert_eq!(rows[0].session_key, "");
}

#[tokio::test]
async fn test_excluded_prefixes_are_never_tracked() {
    let static_dir = std::env::temp_dir().join(format!("lyricslib-static-{}", std::process::id()));
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("app.css"), "body {}").unwrap();

    let (app, pool) = setup_with_config(Config {
        static_dir: static_dir.clone(),
        ..Config::default()
    })
    .await;
    let (_staff, cookie) = login_as(&pool, "editor", true).await;

    let asset = request("GET", "/static/app.css").send(&app).await;
    assert_eq!(asset.status, StatusCode::OK);
    assert_eq!(asset.text(), "body {}");

    let summary = request("GET", "/admin/summary/").cookie(&cookie).send(&app).await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.json()["users"], 1);

    assert_eq!(page_view_count(&pool).await, 0);
    std::fs::remove_dir_all(&static_dir).ok();
}

#[tokio::test]
async fn test_non_get_and_non_200_are_not_tracked() {
    let (app, pool) = setup().await;
    published_song(&pool, "Karan Aujla", "Softly", 1).await;

    let missing = request("GET", "/a/nobody/").send(&app).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let redirect = request("GET", "/songs/").send(&app).await;
    assert_eq!(redirect.status, StatusCode::SEE_OTHER);

    let post = request("POST", "/login/")
        .json(serde_json::json!({"username": "x", "password": "y"}))
        .send(&app)
        .await;
    assert_eq!(post.status, StatusCode::UNAUTHORIZED);

    assert_eq!(page_view_count(&pool).await, 0);
}

#[tokio::test]
async fn test_index_pages_are_classified() {
    let (app, pool) = setup().await;

    request("GET", "/").send(&app).await;
    request("GET", "/charts").send(&app).await;
    request("GET", "/artists/").send(&app).await;
    request("GET", "/albums/").send(&app).await;

    let rows = views(&pool).await;
    let summary: Vec<(&str, &str)> = rows
        .iter()
        .map(|v| (v.content_type.as_str(), v.content_title.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("home", "Home / Charts"),
            ("home", "Home / Charts"),
            ("other", "Artists Index"),
            ("album", "Albums Index"),
        ]
    );
}

#[tokio::test]
async fn test_forwarded_for_and_session_are_recorded() {
    let (app, pool) = setup().await;
    let (user, cookie) = login_as(&pool, "listener", false).await;
    let song = published_song(&pool, "Diljit Dosanjh", "Lover", 1).await;
    let path = song_path(&pool, &song).await;

    request("GET", &path)
        .header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")
        .cookie(&cookie)
        .send(&app)
        .await;

    let rows = views(&pool).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(rows[0].user_id, Some(user.id));
    assert!(!rows[0].session_key.is_empty());
}

#[tokio::test]
async fn test_long_user_agent_is_truncated() {
    let (app, pool) = setup().await;

    let agent = "a".repeat(600);
    request("GET", "/").header("user-agent", &agent).send(&app).await;

    let rows = views(&pool).await;
    assert_eq!(rows[0].user_agent.chars().count(), 500);
}

#[tokio::test]
async fn test_both_slash_spellings_share_one_url() {
    let (app, pool) = setup().await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;
    let path = song_path(&pool, &song).await;

    assert_eq!(request("GET", &path).send(&app).await.status, StatusCode::OK);
    let bare = path.trim_end_matches('/');
    assert_eq!(request("GET", bare).send(&app).await.status, StatusCode::OK);

    let top = stats::top_content(&pool, ContentCategory::Song, Window::Last30Days, 10, Utc::now())
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, song.id);
    assert_eq!(top[0].url, path);
    assert_eq!(top[0].views, 2);
}

#[tokio::test]
async fn test_tracking_failure_does_not_fail_request() {
    let (app, pool) = setup().await;
    published_song(&pool, "Karan Aujla", "Softly", 1).await;
    sqlx::query("DROP TABLE page_views").execute(&pool).await.unwrap();

    let response = request("GET", "/artists/").send(&app).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()[0]["name"], "Karan Aujla");

    let home = request("GET", "/").send(&app).await;
    assert_eq!(home.status, StatusCode::OK);
    assert!(home.json()["trending"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_page_views_cannot_be_edited() {
    let (app, pool) = setup().await;
    request("GET", "/").send(&app).await;

    let result = sqlx::query("UPDATE page_views SET url = '/tampered'")
        .execute(&pool)
        .await;
    assert!(result.is_err());
}
