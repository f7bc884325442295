use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::models::SiteStats;
use crate::tracking::{parse_target, resolve_target, ContentCategory};

pub const DASHBOARD_TOP_K: i64 = 10;
pub const HOME_TOP_K: i64 = 5;
const DAILY_SERIES_DAYS: i64 = 30;

/// Time range a query looks back over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Since midnight UTC.
    Today,
    Last7Days,
    Last30Days,
    AllTime,
}

impl Window {
    /// Inclusive lower bound relative to `now`; `None` means unbounded.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Window::Today => Some(start_of_day(now.date_naive())),
            Window::Last7Days => Some(now - Duration::days(7)),
            Window::Last30Days => Some(now - Duration::days(30)),
            Window::AllTime => None,
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn lower_bound(window: Window, now: DateTime<Utc>) -> DateTime<Utc> {
    window.since(now).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewCounts {
    pub total: i64,
    pub today: i64,
    pub last_7_days: i64,
    pub last_30_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniqueVisitors {
    pub today: i64,
    pub last_7_days: i64,
    pub last_30_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopContent {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryViews {
    pub category: ContentCategory,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Engagement {
    pub average_song_rating: Option<f64>,
    pub average_artist_rating: Option<f64>,
    pub song_ratings: i64,
    pub artist_ratings: i64,
    pub favorite_songs: i64,
    pub favorite_artists: i64,
    pub total_comments: i64,
    pub days_since_launch: i64,
    pub comments_per_day: f64,
    pub ratings_per_day: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentTotals {
    pub artists: i64,
    pub albums: i64,
    pub songs: i64,
    pub published_songs: i64,
    pub lines: i64,
    pub users: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub generated_at: DateTime<Utc>,
    pub views: ViewCounts,
    pub unique_visitors: UniqueVisitors,
    pub registered_views_today: i64,
    pub anonymous_views_today: i64,
    pub by_category: Vec<CategoryViews>,
    pub top_songs: Vec<TopContent>,
    pub top_artists: Vec<TopContent>,
    pub top_albums: Vec<TopContent>,
    pub engagement: Engagement,
    pub totals: ContentTotals,
    pub daily: Vec<SiteStats>,
}

pub async fn count_views(pool: &SqlitePool, window: Window, now: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_views WHERE created_at >= ?")
        .bind(lower_bound(window, now))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Distinct client IPs seen in the window.
pub async fn count_unique_ips(pool: &SqlitePool, window: Window, now: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT ip_address) FROM page_views WHERE created_at >= ?",
    )
    .bind(lower_bound(window, now))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn view_counts(pool: &SqlitePool, now: DateTime<Utc>) -> Result<ViewCounts> {
    Ok(ViewCounts {
        total: count_views(pool, Window::AllTime, now).await?,
        today: count_views(pool, Window::Today, now).await?,
        last_7_days: count_views(pool, Window::Last7Days, now).await?,
        last_30_days: count_views(pool, Window::Last30Days, now).await?,
    })
}

pub async fn unique_visitors(pool: &SqlitePool, now: DateTime<Utc>) -> Result<UniqueVisitors> {
    Ok(UniqueVisitors {
        today: count_unique_ips(pool, Window::Today, now).await?,
        last_7_days: count_unique_ips(pool, Window::Last7Days, now).await?,
        last_30_days: count_unique_ips(pool, Window::Last30Days, now).await?,
    })
}

/// Most viewed pages of one category, resolved to live content.
///
/// Views that never named an object (the albums index) are not ranked.
/// Paths whose song, artist or album has since been deleted are skipped, so
/// fewer than `limit` entries may come back.
pub async fn top_content(
    pool: &SqlitePool,
    category: ContentCategory,
    window: Window,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<Vec<TopContent>> {
    let rows = sqlx::query(
        r#"
        SELECT url, COUNT(*) AS views
        FROM page_views
        WHERE content_type = ? AND created_at >= ? AND content_id IS NOT NULL
        GROUP BY url
        ORDER BY views DESC, url ASC
        LIMIT ?
        "#,
    )
    .bind(category.as_str())
    .bind(lower_bound(window, now))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut top = Vec::with_capacity(rows.len());
    for row in rows {
        let url: String = row.get("url");
        let views: i64 = row.get("views");

        let Some(target) = parse_target(&url) else {
            continue;
        };
        match resolve_target(pool, target).await? {
            Some((id, title)) => top.push(TopContent { id, title, url, views }),
            None => tracing::debug!("dropping {} from ranking, content is gone", url),
        }
    }

    Ok(top)
}

pub async fn views_by_category(pool: &SqlitePool, window: Window, now: DateTime<Utc>) -> Result<Vec<CategoryViews>> {
    let rows = sqlx::query(
        r#"
        SELECT content_type, COUNT(*) AS views
        FROM page_views
        WHERE created_at >= ?
        GROUP BY content_type
        "#,
    )
    .bind(lower_bound(window, now))
    .fetch_all(pool)
    .await?;

    let mut counts: Vec<CategoryViews> = ContentCategory::ALL
        .into_iter()
        .map(|category| CategoryViews { category, views: 0 })
        .collect();
    for row in rows {
        let raw: String = row.get("content_type");
        let views: i64 = row.get("views");
        let category: ContentCategory = raw.parse()?;
        if let Some(entry) = counts.iter_mut().find(|c| c.category == category) {
            entry.views = views;
        }
    }
    counts.sort_by(|a, b| b.views.cmp(&a.views));
    Ok(counts)
}

/// (registered, anonymous) view counts within the window.
pub async fn audience_split(pool: &SqlitePool, window: Window, now: DateTime<Utc>) -> Result<(i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN user_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS registered,
            COALESCE(SUM(CASE WHEN user_id IS NULL THEN 1 ELSE 0 END), 0) AS anonymous
        FROM page_views
        WHERE created_at >= ?
        "#,
    )
    .bind(lower_bound(window, now))
    .fetch_one(pool)
    .await?;
    Ok((row.get("registered"), row.get("anonymous")))
}

/// Days since the earliest registration, never less than 1.
pub fn days_since(first: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    first
        .map(|first| (now - first).num_days())
        .unwrap_or(0)
        .max(1)
}

pub async fn engagement(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Engagement> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT AVG(rating) FROM song_ratings) AS average_song_rating,
            (SELECT AVG(rating) FROM artist_ratings) AS average_artist_rating,
            (SELECT COUNT(*) FROM song_ratings) AS song_ratings,
            (SELECT COUNT(*) FROM artist_ratings) AS artist_ratings,
            (SELECT COUNT(*) FROM profile_favorite_songs) AS favorite_songs,
            (SELECT COUNT(*) FROM profile_favorite_artists) AS favorite_artists,
            (SELECT COUNT(*) FROM song_comments) + (SELECT COUNT(*) FROM artist_comments) AS total_comments
        "#,
    )
    .fetch_one(pool)
    .await?;

    let first_joined: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT MIN(date_joined) FROM users")
        .fetch_one(pool)
        .await?;
    let days = days_since(first_joined, now);

    let song_ratings: i64 = row.get("song_ratings");
    let artist_ratings: i64 = row.get("artist_ratings");
    let total_comments: i64 = row.get("total_comments");

    Ok(Engagement {
        average_song_rating: row.get("average_song_rating"),
        average_artist_rating: row.get("average_artist_rating"),
        song_ratings,
        artist_ratings,
        favorite_songs: row.get("favorite_songs"),
        favorite_artists: row.get("favorite_artists"),
        total_comments,
        days_since_launch: days,
        comments_per_day: total_comments as f64 / days as f64,
        ratings_per_day: (song_ratings + artist_ratings) as f64 / days as f64,
    })
}

pub async fn content_totals(pool: &SqlitePool) -> Result<ContentTotals> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM artists) AS artists,
            (SELECT COUNT(*) FROM albums) AS albums,
            (SELECT COUNT(*) FROM songs) AS songs,
            (SELECT COUNT(*) FROM songs WHERE is_published = 1) AS published_songs,
            (SELECT COUNT(*) FROM lines) AS lines,
            (SELECT COUNT(*) FROM users) AS users
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ContentTotals {
        artists: row.get("artists"),
        albums: row.get("albums"),
        songs: row.get("songs"),
        published_songs: row.get("published_songs"),
        lines: row.get("lines"),
        users: row.get("users"),
    })
}

/// Computes one UTC day's rollup from the raw page views.
pub async fn compute_day(pool: &SqlitePool, date: NaiveDate) -> Result<SiteStats> {
    let start = start_of_day(date);
    let end = start + Duration::days(1);

    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_views,
            COUNT(DISTINCT COALESCE(ip_address, '') || '|' || session_key) AS unique_visitors,
            COUNT(DISTINCT ip_address) AS unique_ips,
            COALESCE(SUM(CASE WHEN user_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS registered_user_views,
            COALESCE(SUM(CASE WHEN user_id IS NULL THEN 1 ELSE 0 END), 0) AS anonymous_views
        FROM page_views
        WHERE created_at >= ? AND created_at < ?
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;

    Ok(SiteStats {
        date,
        total_views: row.get("total_views"),
        unique_visitors: row.get("unique_visitors"),
        unique_ips: row.get("unique_ips"),
        registered_user_views: row.get("registered_user_views"),
        anonymous_views: row.get("anonymous_views"),
    })
}

/// Recomputes and upserts the SiteStats row for `date`.
pub async fn rollup_day(pool: &SqlitePool, date: NaiveDate) -> Result<SiteStats> {
    let stats = compute_day(pool, date).await?;

    sqlx::query(
        r#"
        INSERT INTO site_stats (
            date, total_views, unique_visitors, unique_ips,
            registered_user_views, anonymous_views
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (date) DO UPDATE SET
            total_views = excluded.total_views,
            unique_visitors = excluded.unique_visitors,
            unique_ips = excluded.unique_ips,
            registered_user_views = excluded.registered_user_views,
            anonymous_views = excluded.anonymous_views
        "#,
    )
    .bind(stats.date)
    .bind(stats.total_views)
    .bind(stats.unique_visitors)
    .bind(stats.unique_ips)
    .bind(stats.registered_user_views)
    .bind(stats.anonymous_views)
    .execute(pool)
    .await
    .with_context(|| format!("failed to store rollup for {}", date))?;

    Ok(stats)
}

/// Stored rollups of the last `days` days, oldest first.
pub async fn daily_series(pool: &SqlitePool, days: i64, today: NaiveDate) -> Result<Vec<SiteStats>> {
    let first = today - Duration::days(days - 1);
    let rows = sqlx::query_as::<_, SiteStats>(
        r#"
        SELECT date, total_views, unique_visitors, unique_ips, registered_user_views, anonymous_views
        FROM site_stats
        WHERE date >= ? AND date <= ?
        ORDER BY date ASC
        "#,
    )
    .bind(first)
    .bind(today)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn calculate_dashboard(pool: &SqlitePool, now: DateTime<Utc>) -> Result<DashboardStats> {
    let views = view_counts(pool, now).await?;
    let unique_visitors = unique_visitors(pool, now).await?;
    let (registered_views_today, anonymous_views_today) = audience_split(pool, Window::Today, now).await?;
    let by_category = views_by_category(pool, Window::Last30Days, now).await?;

    let top_songs = top_content(pool, ContentCategory::Song, Window::Last30Days, DASHBOARD_TOP_K, now).await?;
    let top_artists = top_content(pool, ContentCategory::Artist, Window::Last30Days, DASHBOARD_TOP_K, now).await?;
    let top_albums = top_content(pool, ContentCategory::Album, Window::Last30Days, DASHBOARD_TOP_K, now).await?;

    let engagement = engagement(pool, now).await?;
    let totals = content_totals(pool).await?;
    let daily = daily_series(pool, DAILY_SERIES_DAYS, now.date_naive()).await?;

    Ok(DashboardStats {
        generated_at: now,
        views,
        unique_visitors,
        registered_views_today,
        anonymous_views_today,
        by_category,
        top_songs,
        top_artists,
        top_albums,
        engagement,
        totals,
        daily,
    })
}
