//! Substring search over published songs and their lyric lines.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::db::like_pattern;
use crate::models::SongSummary;
use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};

/// A matching line with enough of its song to link to it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LineHit {
    pub id: i64,
    pub no: i64,
    pub original: String,
    pub romanized: Option<String>,
    pub translation_en: String,
    pub song_title: String,
    pub song_slug: String,
    pub artist_name: String,
    pub artist_slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub songs: Page<SongSummary>,
    pub lines: Page<LineHit>,
}

const SONG_MATCH: &str = r#"
    FROM songs s
    JOIN artists a ON a.id = s.artist_id
    LEFT JOIN albums al ON al.id = s.album_id
    WHERE s.is_published = 1 AND (
        s.title LIKE ?1 ESCAPE '\'
        OR a.name LIKE ?1 ESCAPE '\'
        OR al.title LIKE ?1 ESCAPE '\'
        OR EXISTS (
            SELECT 1 FROM lines l
            WHERE l.song_id = s.id AND (
                l.original LIKE ?1 ESCAPE '\'
                OR l.romanized LIKE ?1 ESCAPE '\'
                OR l.translation_en LIKE ?1 ESCAPE '\'
            )
        )
    )
"#;

const LINE_MATCH: &str = r#"
    FROM lines l
    JOIN songs s ON s.id = l.song_id
    JOIN artists a ON a.id = s.artist_id
    WHERE s.is_published = 1 AND (
        l.original LIKE ?1 ESCAPE '\'
        OR l.romanized LIKE ?1 ESCAPE '\'
        OR l.translation_en LIKE ?1 ESCAPE '\'
    )
"#;

pub async fn search_songs(pool: &SqlitePool, query: &str, page: i64) -> Result<Page<SongSummary>> {
    let pattern = like_pattern(query);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", SONG_MATCH))
        .bind(&pattern)
        .fetch_one(pool)
        .await?;
    let pagination = calculate_pagination(total, page);

    let songs = sqlx::query_as::<_, SongSummary>(&format!(
        r#"
        SELECT s.id, s.title, s.slug, s.year, a.name AS artist_name, a.slug AS artist_slug
        {}
        ORDER BY a.name, s.title, s.id
        LIMIT ?2 OFFSET ?3
        "#,
        SONG_MATCH
    ))
    .bind(&pattern)
    .bind(PAGE_SIZE)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(songs, pagination, total))
}

pub async fn search_lines(pool: &SqlitePool, query: &str, page: i64) -> Result<Page<LineHit>> {
    let pattern = like_pattern(query);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", LINE_MATCH))
        .bind(&pattern)
        .fetch_one(pool)
        .await?;
    let pagination = calculate_pagination(total, page);

    let lines = sqlx::query_as::<_, LineHit>(&format!(
        r#"
        SELECT l.id, l.no, l.original, l.romanized, l.translation_en,
               s.title AS song_title, s.slug AS song_slug,
               a.name AS artist_name, a.slug AS artist_slug
        {}
        ORDER BY a.name, s.title, l.no
        LIMIT ?2 OFFSET ?3
        "#,
        LINE_MATCH
    ))
    .bind(&pattern)
    .bind(PAGE_SIZE)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(lines, pagination, total))
}

/// Runs both searches; a blank query matches nothing.
pub async fn search(pool: &SqlitePool, query: &str, song_page: i64, line_page: i64) -> Result<SearchResults> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(SearchResults {
            query: String::new(),
            songs: Page::empty(),
            lines: Page::empty(),
        });
    }

    Ok(SearchResults {
        query: query.to_string(),
        songs: search_songs(pool, query, song_page).await?,
        lines: search_lines(pool, query, line_page).await?,
    })
}
