//! Search over songs and lines.

mod common;

use axum::http::StatusCode;
use common::{published_song, request, setup};
use lyricslib_api::catalog;
use lyricslib_api::models::NewLine;

#[tokio::test]
async fn test_romanized_only_match_returns_parent_song() {
    let (app, pool) = setup().await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 0).await;
    catalog::replace_song_lines(
        &pool,
        song.id,
        &[NewLine {
            no: 1,
            original: "ਮੇਹਨਤ".into(),
            romanized: Some("mehnat".into()),
            translation_en: "Hard work".into(),
        }],
    )
    .await
    .unwrap();

    let response = request("GET", "/search/?q=MEHNAT").send(&app).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["query"], "MEHNAT");
    assert_eq!(body["songs"]["total_results"], 1);
    assert_eq!(body["songs"]["items"][0]["id"], song.id);
    assert_eq!(body["lines"]["total_results"], 1);
    assert_eq!(body["lines"]["items"][0]["song_slug"], song.slug);
    assert_eq!(body["lines"]["items"][0]["artist_slug"], "sidhu-moose-wala");
}

#[tokio::test]
async fn test_no_match_returns_nothing() {
    let (app, pool) = setup().await;
    published_song(&pool, "Sidhu Moose Wala", "295", 3).await;

    let body = request("GET", "/search/?q=zzzz-nowhere").send(&app).await.json();
    assert_eq!(body["songs"]["total_results"], 0);
    assert_eq!(body["lines"]["total_results"], 0);
    assert!(body["songs"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_matches_artist_name_and_title() {
    let (app, pool) = setup().await;
    published_song(&pool, "Karan Aujla", "Softly", 0).await;
    published_song(&pool, "Diljit Dosanjh", "Karan's Song", 0).await;

    let body = request("GET", "/search?q=karan").send(&app).await.json();
    let titles: Vec<&str> = body["songs"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Karan's Song", "Softly"]);
}

#[tokio::test]
async fn test_line_results_paginate_and_clamp() {
    let (app, pool) = setup().await;
    // every line says "original N"
    published_song(&pool, "Sidhu Moose Wala", "295", 45).await;

    let first = request("GET", "/search/?q=original").send(&app).await.json();
    assert_eq!(first["lines"]["total_results"], 45);
    assert_eq!(first["lines"]["total_pages"], 3);
    assert_eq!(first["lines"]["items"].as_array().unwrap().len(), 20);
    assert_eq!(first["lines"]["items"][0]["no"], 1);

    let clamped = request("GET", "/search/?q=original&lp=99").send(&app).await.json();
    assert_eq!(clamped["lines"]["page"], 3);
    assert_eq!(clamped["lines"]["items"].as_array().unwrap().len(), 5);
    assert_eq!(clamped["lines"]["items"][0]["no"], 41);
}

#[tokio::test]
async fn test_empty_query_is_empty() {
    let (app, pool) = setup().await;
    published_song(&pool, "Sidhu Moose Wala", "295", 2).await;

    let body = request("GET", "/search/?q=%20%20").send(&app).await.json();
    assert_eq!(body["query"], "");
    assert_eq!(body["songs"]["total_results"], 0);
    assert_eq!(body["lines"]["total_results"], 0);
}
