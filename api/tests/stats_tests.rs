//! View aggregation, rankings, rollups and the staff dashboard.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, TimeZone, Utc};
use common::{login_as, published_song, request, setup, song_path};
use lyricslib_api::catalog;
use lyricslib_api::community::{self, RatingValue, Subject};
use lyricslib_api::stats::{self, Window};
use lyricslib_api::tracking::{record_page_view_at, ContentCategory, NewPageView};

fn view(category: ContentCategory, url: &str, ip: &str) -> NewPageView {
    NewPageView::anonymous(category, url, Some(ip))
}

#[tokio::test]
async fn test_window_counts() {
    let (_app, pool) = setup().await;
    let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();

    let home = view(ContentCategory::Home, "/", "10.0.0.1");
    record_page_view_at(&pool, &home, now - Duration::hours(1)).await.unwrap();
    record_page_view_at(&pool, &view(ContentCategory::Home, "/", "10.0.0.2"), now - Duration::hours(2))
        .await
        .unwrap();
    // yesterday: inside 7 and 30 days, outside today
    record_page_view_at(&pool, &home, now - Duration::days(1)).await.unwrap();
    record_page_view_at(&pool, &home, now - Duration::days(10)).await.unwrap();
    record_page_view_at(&pool, &home, now - Duration::days(60)).await.unwrap();

    let counts = stats::view_counts(&pool, now).await.unwrap();
    assert_eq!(counts.total, 5);
    assert_eq!(counts.today, 2);
    assert_eq!(counts.last_7_days, 3);
    assert_eq!(counts.last_30_days, 4);

    let visitors = stats::unique_visitors(&pool, now).await.unwrap();
    assert_eq!(visitors.today, 2);
    assert_eq!(visitors.last_7_days, 2);
    assert_eq!(visitors.last_30_days, 2);
}

#[tokio::test]
async fn test_top_content_ranks_and_drops_deleted() {
    let (_app, pool) = setup().await;
    let now = Utc::now();
    let popular = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;
    let quiet = published_song(&pool, "Karan Aujla", "Softly", 1).await;
    let doomed = published_song(&pool, "AP Dhillon", "Excuses", 1).await;

    for (song, times) in [(&popular, 3), (&quiet, 1), (&doomed, 5)] {
        let path = song_path(&pool, song).await;
        let mut song_view = view(ContentCategory::Song, &path, "10.0.0.1");
        song_view.content_id = Some(song.id);
        for _ in 0..times {
            record_page_view_at(&pool, &song_view, now - Duration::hours(1)).await.unwrap();
        }
    }

    let before = stats::top_content(&pool, ContentCategory::Song, Window::Last30Days, 10, now).await.unwrap();
    assert_eq!(
        before.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
        vec!["Excuses", "295", "Softly"]
    );
    assert_eq!(before[0].views, 5);

    catalog::delete_song(&pool, doomed.id).await.unwrap();

    let after = stats::top_content(&pool, ContentCategory::Song, Window::Last30Days, 10, now).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, popular.id);
    assert_eq!(after[0].views, 3);
    assert_eq!(after[1].id, quiet.id);
}

#[tokio::test]
async fn test_index_views_do_not_take_ranking_slots() {
    let (app, pool) = setup().await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;
    let album = catalog::create_album(
        &pool,
        &catalog::NewAlbum {
            title: "Moosetape".into(),
            artist_id: song.artist_id,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let page = format!("/albums/sidhu-moose-wala/{}/", album.slug);
    assert_eq!(request("GET", &page).send(&app).await.status, StatusCode::OK);
    for _ in 0..3 {
        assert_eq!(request("GET", "/albums/").send(&app).await.status, StatusCode::OK);
    }

    let top = stats::top_content(&pool, ContentCategory::Album, Window::Last30Days, 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, album.id);
    assert_eq!(top[0].title, "Moosetape");
    assert_eq!(top[0].views, 1);
}

#[tokio::test]
async fn test_engagement_without_ratings() {
    let (_app, pool) = setup().await;
    login_as(&pool, "lurker", false).await;

    let engagement = stats::engagement(&pool, Utc::now()).await.unwrap();
    assert_eq!(engagement.average_song_rating, None);
    assert_eq!(engagement.average_artist_rating, None);
    assert_eq!(engagement.song_ratings, 0);
    assert_eq!(engagement.days_since_launch, 1);
    assert_eq!(engagement.ratings_per_day, 0.0);
}

#[tokio::test]
async fn test_engagement_averages() {
    let (_app, pool) = setup().await;
    let (a, _) = login_as(&pool, "first", false).await;
    let (b, _) = login_as(&pool, "second", false).await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;

    community::rate(&pool, Subject::Song(song.id), a.id, RatingValue::new(5).unwrap())
        .await
        .unwrap();
    community::rate(&pool, Subject::Song(song.id), b.id, RatingValue::new(2).unwrap())
        .await
        .unwrap();

    let engagement = stats::engagement(&pool, Utc::now()).await.unwrap();
    assert_eq!(engagement.average_song_rating, Some(3.5));
    assert_eq!(engagement.song_ratings, 2);
    assert_eq!(engagement.ratings_per_day, 2.0);
}

#[tokio::test]
async fn test_rollup_is_idempotent() {
    let (_app, pool) = setup().await;
    let (user, _) = login_as(&pool, "regular", false).await;
    let day = Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap();

    let mut signed_in = view(ContentCategory::Home, "/", "10.0.0.1");
    signed_in.user_id = Some(user.id);
    signed_in.session_key = "7".into();
    record_page_view_at(&pool, &signed_in, day + Duration::hours(9)).await.unwrap();
    record_page_view_at(&pool, &signed_in, day + Duration::hours(10)).await.unwrap();
    record_page_view_at(&pool, &view(ContentCategory::Home, "/", "10.0.0.1"), day + Duration::hours(11))
        .await
        .unwrap();
    record_page_view_at(&pool, &view(ContentCategory::Home, "/", "10.0.0.2"), day + Duration::hours(23))
        .await
        .unwrap();
    // next day, not part of the rollup
    record_page_view_at(&pool, &view(ContentCategory::Home, "/", "10.0.0.3"), day + Duration::days(1))
        .await
        .unwrap();

    let first = stats::rollup_day(&pool, day.date_naive()).await.unwrap();
    let second = stats::rollup_day(&pool, day.date_naive()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.total_views, 4);
    assert_eq!(first.unique_ips, 2);
    assert_eq!(first.unique_visitors, 3);
    assert_eq!(first.registered_user_views, 2);
    assert_eq!(first.anonymous_views, 2);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM site_stats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let series = stats::daily_series(&pool, 7, (day + Duration::days(2)).date_naive())
        .await
        .unwrap();
    assert_eq!(series, vec![first]);
}

#[tokio::test]
async fn test_dashboard_requires_staff() {
    let (app, pool) = setup().await;
    let (_user, member) = login_as(&pool, "member", false).await;
    let (_staff, staff) = login_as(&pool, "editor", true).await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;
    let path = song_path(&pool, &song).await;
    request("GET", &path).send(&app).await;

    let anonymous = request("GET", "/stats/").send(&app).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forbidden = request("GET", "/stats/").cookie(&member).send(&app).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let response = request("GET", "/stats/").cookie(&staff).send(&app).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["views"]["total"], 1);
    assert_eq!(body["top_songs"][0]["title"], "295");
    assert_eq!(body["top_songs"][0]["url"], path.as_str());
    assert_eq!(body["totals"]["users"], 2);
    assert!(body["engagement"]["average_song_rating"].is_null());
    // refreshed on every load
    assert_eq!(body["daily"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sitemap_lists_public_content() {
    let (app, pool) = setup().await;
    let song = published_song(&pool, "Sidhu Moose Wala", "295", 1).await;
    let draft = published_song(&pool, "Karan Aujla", "Unreleased", 1).await;
    catalog::update_song(
        &pool,
        draft.id,
        &catalog::SongUpdate {
            is_published: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = request("GET", "/sitemap.xml").send(&app).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["content-type"], "application/xml");

    let xml = response.text();
    assert!(xml.contains(&song_path(&pool, &song).await));
    assert!(xml.contains("/a/karan-aujla/"));
    assert!(!xml.contains(&draft.slug));
}
