//! Comments, ratings, favorites and user profiles.
//!
//! Songs and artists each have their own comment and rating tables; a
//! [`Subject`] picks which pair a call works on.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::models::{Artist, Comment, Rating, SongSummary, UserProfile};

pub const MAX_COMMENT_LENGTH: usize = 2000;

/// What a comment or rating is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Song(i64),
    Artist(i64),
}

impl Subject {
    fn id(self) -> i64 {
        match self {
            Subject::Song(id) | Subject::Artist(id) => id,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Subject::Song(_) => "song_id",
            Subject::Artist(_) => "artist_id",
        }
    }

    fn comments_table(self) -> &'static str {
        match self {
            Subject::Song(_) => "song_comments",
            Subject::Artist(_) => "artist_comments",
        }
    }

    fn ratings_table(self) -> &'static str {
        match self {
            Subject::Song(_) => "song_ratings",
            Subject::Artist(_) => "artist_ratings",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),
    #[error("comment must not be empty")]
    EmptyComment,
    #[error("comment must be at most 2000 characters")]
    CommentTooLong,
}

/// A star rating known to be within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingValue(i64);

impl RatingValue {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (1..=5).contains(&value) {
            Ok(RatingValue(value))
        } else {
            Err(ValidationError::RatingOutOfRange(value))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// Trimmed, non-empty comment text.
pub fn clean_comment(text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyComment);
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ValidationError::CommentTooLong);
    }
    Ok(text.to_string())
}

// ---- comments ----

pub async fn add_comment(pool: &SqlitePool, subject: Subject, user_id: i64, text: &str) -> Result<Comment> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(&format!(
        "INSERT INTO {} ({}, user_id, text, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
        subject.comments_table(),
        subject.column()
    ))
    .bind(subject.id())
    .bind(user_id)
    .bind(text)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"
        SELECT c.id, c.{col} AS subject_id, c.user_id, u.username, c.text, c.created_at, c.updated_at
        FROM {table} c
        JOIN users u ON u.id = c.user_id
        WHERE c.id = ?
        "#,
        col = subject.column(),
        table = subject.comments_table()
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(comment)
}

/// Comments on the subject, newest first.
pub async fn list_comments(pool: &SqlitePool, subject: Subject) -> Result<Vec<Comment>> {
    let comments = sqlx::query_as::<_, Comment>(&format!(
        r#"
        SELECT c.id, c.{col} AS subject_id, c.user_id, u.username, c.text, c.created_at, c.updated_at
        FROM {table} c
        JOIN users u ON u.id = c.user_id
        WHERE c.{col} = ?
        ORDER BY c.created_at DESC, c.id DESC
        "#,
        col = subject.column(),
        table = subject.comments_table()
    ))
    .bind(subject.id())
    .fetch_all(pool)
    .await?;
    Ok(comments)
}

// ---- ratings ----

/// Inserts or overwrites the user's rating in a single statement.
pub async fn rate(pool: &SqlitePool, subject: Subject, user_id: i64, value: RatingValue) -> Result<Rating> {
    let now = Utc::now();
    let rating = sqlx::query_as::<_, Rating>(&format!(
        r#"
        INSERT INTO {table} ({col}, user_id, rating, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT ({col}, user_id)
        DO UPDATE SET rating = excluded.rating, updated_at = excluded.updated_at
        RETURNING id, {col} AS subject_id, user_id, rating, created_at, updated_at
        "#,
        table = subject.ratings_table(),
        col = subject.column()
    ))
    .bind(subject.id())
    .bind(user_id)
    .bind(value.get())
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(rating)
}

pub async fn user_rating(pool: &SqlitePool, subject: Subject, user_id: i64) -> Result<Option<i64>> {
    let rating = sqlx::query_scalar(&format!(
        "SELECT rating FROM {} WHERE {} = ? AND user_id = ?",
        subject.ratings_table(),
        subject.column()
    ))
    .bind(subject.id())
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(rating)
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct RatingSummary {
    /// `None` when nobody has rated yet.
    pub average: Option<f64>,
    pub count: i64,
}

pub async fn rating_summary(pool: &SqlitePool, subject: Subject) -> Result<RatingSummary> {
    let summary = sqlx::query_as::<_, RatingSummary>(&format!(
        "SELECT AVG(rating) AS average, COUNT(*) AS count FROM {} WHERE {} = ?",
        subject.ratings_table(),
        subject.column()
    ))
    .bind(subject.id())
    .fetch_one(pool)
    .await?;
    Ok(summary)
}

// ---- profiles & favorites ----

/// The user's profile, created on first access.
pub async fn get_or_create_profile(pool: &SqlitePool, user_id: i64) -> Result<UserProfile> {
    sqlx::query("INSERT INTO user_profiles (user_id, bio) VALUES (?, '') ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    let profile = sqlx::query_as::<_, UserProfile>("SELECT id, user_id, bio FROM user_profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(profile)
}

pub async fn update_bio(pool: &SqlitePool, user_id: i64, bio: &str) -> Result<UserProfile> {
    let profile = get_or_create_profile(pool, user_id).await?;
    sqlx::query("UPDATE user_profiles SET bio = ? WHERE id = ?")
        .bind(bio.trim())
        .bind(profile.id)
        .execute(pool)
        .await?;
    Ok(UserProfile {
        bio: bio.trim().to_string(),
        ..profile
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteKind {
    Song,
    Artist,
}

impl FavoriteKind {
    fn table(self) -> &'static str {
        match self {
            FavoriteKind::Song => "profile_favorite_songs",
            FavoriteKind::Artist => "profile_favorite_artists",
        }
    }

    fn column(self) -> &'static str {
        match self {
            FavoriteKind::Song => "song_id",
            FavoriteKind::Artist => "artist_id",
        }
    }
}

/// Adds the item to the user's favorites, or removes it if already there.
/// Returns whether the item is a favorite afterwards.
pub async fn toggle_favorite(pool: &SqlitePool, user_id: i64, kind: FavoriteKind, item_id: i64) -> Result<bool> {
    let profile = get_or_create_profile(pool, user_id).await?;

    let removed = sqlx::query(&format!(
        "DELETE FROM {} WHERE profile_id = ? AND {} = ?",
        kind.table(),
        kind.column()
    ))
    .bind(profile.id)
    .bind(item_id)
    .execute(pool)
    .await?;

    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (profile_id, {}) VALUES (?, ?)",
        kind.table(),
        kind.column()
    ))
    .bind(profile.id)
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(true)
}

pub async fn favorite_songs(pool: &SqlitePool, user_id: i64) -> Result<Vec<SongSummary>> {
    let songs = sqlx::query_as::<_, SongSummary>(
        r#"
        SELECT s.id, s.title, s.slug, s.year, ar.name AS artist_name, ar.slug AS artist_slug
        FROM profile_favorite_songs f
        JOIN user_profiles p ON p.id = f.profile_id
        JOIN songs s ON s.id = f.song_id
        JOIN artists ar ON ar.id = s.artist_id
        WHERE p.user_id = ?
        ORDER BY ar.name COLLATE NOCASE, s.title
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

pub async fn favorite_artists(pool: &SqlitePool, user_id: i64) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(
        r#"
        SELECT ar.id, ar.name, ar.slug, ar.image_url, ar.about
        FROM profile_favorite_artists f
        JOIN user_profiles p ON p.id = f.profile_id
        JOIN artists ar ON ar.id = f.artist_id
        WHERE p.user_id = ?
        ORDER BY ar.name COLLATE NOCASE
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(artists)
}

pub async fn is_favorite(pool: &SqlitePool, user_id: i64, kind: FavoriteKind, item_id: i64) -> Result<bool> {
    let found: bool = sqlx::query_scalar(&format!(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM {} f
            JOIN user_profiles p ON p.id = f.profile_id
            WHERE p.user_id = ? AND f.{} = ?
        )
        "#,
        kind.table(),
        kind.column()
    ))
    .bind(user_id)
    .bind(item_id)
    .fetch_one(pool)
    .await?;
    Ok(found)
}

/// Everything a user has written, newest first: (song comments, artist comments).
pub async fn user_comments(pool: &SqlitePool, user_id: i64) -> Result<(Vec<Comment>, Vec<Comment>)> {
    let songs = comments_by_user(pool, Subject::Song(0), user_id).await?;
    let artists = comments_by_user(pool, Subject::Artist(0), user_id).await?;
    Ok((songs, artists))
}

// only the subject kind matters here, not its id
async fn comments_by_user(pool: &SqlitePool, kind: Subject, user_id: i64) -> Result<Vec<Comment>> {
    let comments = sqlx::query_as::<_, Comment>(&format!(
        r#"
        SELECT c.id, c.{col} AS subject_id, c.user_id, u.username, c.text, c.created_at, c.updated_at
        FROM {table} c
        JOIN users u ON u.id = c.user_id
        WHERE c.user_id = ?
        ORDER BY c.created_at DESC, c.id DESC
        "#,
        col = kind.column(),
        table = kind.comments_table()
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(comments)
}

/// Every rating a user has given: (song ratings, artist ratings).
pub async fn user_ratings(pool: &SqlitePool, user_id: i64) -> Result<(Vec<Rating>, Vec<Rating>)> {
    let songs = ratings_by_user(pool, Subject::Song(0), user_id).await?;
    let artists = ratings_by_user(pool, Subject::Artist(0), user_id).await?;
    Ok((songs, artists))
}

async fn ratings_by_user(pool: &SqlitePool, kind: Subject, user_id: i64) -> Result<Vec<Rating>> {
    let ratings = sqlx::query_as::<_, Rating>(&format!(
        r#"
        SELECT id, {col} AS subject_id, user_id, rating, created_at, updated_at
        FROM {table}
        WHERE user_id = ?
        ORDER BY updated_at DESC, id DESC
        "#,
        col = kind.column(),
        table = kind.ratings_table()
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ratings)
}
