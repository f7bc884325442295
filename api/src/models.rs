use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub about: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub artist_id: i64,
    pub slug: String,
    pub year: Option<i64>,
}

/// Album joined with its primary artist, as listed on index pages.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlbumSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub year: Option<i64>,
    pub artist_name: String,
    pub artist_slug: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Song {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub album_id: Option<i64>,
    pub year: Option<i64>,
    pub slug: String,
    pub is_published: bool,
}

/// Song joined with its primary artist.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SongSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub year: Option<i64>,
    pub artist_name: String,
    pub artist_slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Line {
    pub id: i64,
    pub song_id: i64,
    pub no: i64,
    pub original: String,
    pub romanized: Option<String>,
    pub translation_en: String,
}

/// Line contents without identity, as parsed from CSV or admin input.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NewLine {
    pub no: i64,
    pub original: String,
    pub romanized: Option<String>,
    pub translation_en: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
}

/// A comment on either a song or an artist, joined with its author.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub subject_id: i64,
    pub user_id: i64,
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Rating {
    pub id: i64,
    pub subject_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PageView {
    pub id: i64,
    pub content_type: String,
    pub content_id: Option<i64>,
    pub content_title: String,
    pub url: String,
    pub ip_address: Option<String>,
    pub user_id: Option<i64>,
    pub session_key: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SiteStats {
    pub date: NaiveDate,
    pub total_views: i64,
    pub unique_visitors: i64,
    pub unique_ips: i64,
    pub registered_user_views: i64,
    pub anonymous_views: i64,
}
