//! Artists, albums, songs and lyric lines.
//!
//! Slugs are derived once, when a row is first inserted, and are never
//! rewritten by later edits. Deletes rely on the schema's foreign keys for
//! cascading (songs/albums with their artist, lines/comments/ratings with
//! their song).

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;

use crate::models::{Album, AlbumSummary, Artist, Line, NewLine, Song, SongSummary};
use crate::slugs::{unique_slug, SlugTable};

const ARTIST_COLUMNS: &str = "id, name, slug, image_url, about";
const ALBUM_COLUMNS: &str = "id, title, artist_id, slug, year";
const SONG_COLUMNS: &str = "id, artist_id, title, album_id, year, slug, is_published";

/// Missing field stays `None`, explicit `null` becomes `Some(None)`.
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewArtist {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub about: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAlbum {
    pub title: String,
    pub artist_id: i64,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub additional_artist_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub year: Option<Option<i64>>,
    pub additional_artist_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSong {
    pub artist_id: i64,
    pub title: String,
    #[serde(default)]
    pub album_id: Option<i64>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub additional_artist_ids: Vec<i64>,
    #[serde(default)]
    pub featured_artist_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub album_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub year: Option<Option<i64>>,
    pub is_published: Option<bool>,
    pub additional_artist_ids: Option<Vec<i64>>,
    pub featured_artist_ids: Option<Vec<i64>>,
}

// ---- artists ----

pub async fn find_artist_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Artist>> {
    let artist = sqlx::query_as::<_, Artist>(&format!(
        "SELECT {} FROM artists WHERE name = ?",
        ARTIST_COLUMNS
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(artist)
}

pub async fn insert_artist(conn: &mut SqliteConnection, new: &NewArtist) -> Result<Artist> {
    let name = new.name.trim();
    anyhow::ensure!(!name.is_empty(), "artist name must not be empty");

    let slug = unique_slug(conn, SlugTable::Artists, name).await?;
    let artist = sqlx::query_as::<_, Artist>(&format!(
        "INSERT INTO artists (name, slug, image_url, about) VALUES (?, ?, ?, ?) RETURNING {}",
        ARTIST_COLUMNS
    ))
    .bind(name)
    .bind(&slug)
    .bind(&new.image_url)
    .bind(&new.about)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!("created artist '{}' ({})", artist.name, artist.slug);
    Ok(artist)
}

pub async fn get_or_create_artist(conn: &mut SqliteConnection, name: &str) -> Result<Artist> {
    if let Some(existing) = find_artist_by_name(conn, name.trim()).await? {
        return Ok(existing);
    }
    insert_artist(
        conn,
        &NewArtist {
            name: name.to_string(),
            ..Default::default()
        },
    )
    .await
}

pub async fn create_artist(pool: &SqlitePool, new: &NewArtist) -> Result<Artist> {
    let mut conn = pool.acquire().await?;
    insert_artist(&mut conn, new).await
}

pub async fn get_artist(pool: &SqlitePool, id: i64) -> Result<Option<Artist>> {
    let artist = sqlx::query_as::<_, Artist>(&format!(
        "SELECT {} FROM artists WHERE id = ?",
        ARTIST_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(artist)
}

pub async fn get_artist_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Artist>> {
    let artist = sqlx::query_as::<_, Artist>(&format!(
        "SELECT {} FROM artists WHERE slug = ?",
        ARTIST_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(artist)
}

/// All artists A–Z.
pub async fn list_artists(pool: &SqlitePool) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(&format!(
        "SELECT {} FROM artists ORDER BY name COLLATE NOCASE, id",
        ARTIST_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(artists)
}

pub async fn update_artist(
    pool: &SqlitePool,
    id: i64,
    update: &ArtistUpdate,
) -> Result<Option<Artist>> {
    let Some(mut artist) = get_artist(pool, id).await? else {
        return Ok(None);
    };

    if let Some(name) = &update.name {
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "artist name must not be empty");
        artist.name = name.to_string();
    }
    if let Some(image_url) = &update.image_url {
        artist.image_url = image_url.clone();
    }
    if let Some(about) = &update.about {
        artist.about = about.clone();
    }

    sqlx::query("UPDATE artists SET name = ?, image_url = ?, about = ? WHERE id = ?")
        .bind(&artist.name)
        .bind(&artist.image_url)
        .bind(&artist.about)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(Some(artist))
}

/// Deletes the artist together with its primary songs and albums.
pub async fn delete_artist(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM artists WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- albums ----

pub async fn create_album(pool: &SqlitePool, new: &NewAlbum) -> Result<Album> {
    let title = new.title.trim();
    anyhow::ensure!(!title.is_empty(), "album title must not be empty");

    let mut tx = pool.begin().await?;

    let artist_name: String = sqlx::query_scalar("SELECT name FROM artists WHERE id = ?")
        .bind(new.artist_id)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("artist {} not found", new.artist_id))?;

    let slug = unique_slug(&mut tx, SlugTable::Albums, &format!("{}-{}", artist_name, title)).await?;
    let album = sqlx::query_as::<_, Album>(&format!(
        "INSERT INTO albums (title, artist_id, slug, year) VALUES (?, ?, ?, ?) RETURNING {}",
        ALBUM_COLUMNS
    ))
    .bind(title)
    .bind(new.artist_id)
    .bind(&slug)
    .bind(new.year)
    .fetch_one(&mut *tx)
    .await?;

    set_credits(&mut tx, "album_artists", "album_id", album.id, &new.additional_artist_ids).await?;
    tx.commit().await?;

    Ok(album)
}

pub async fn get_album(pool: &SqlitePool, id: i64) -> Result<Option<Album>> {
    let album = sqlx::query_as::<_, Album>(&format!(
        "SELECT {} FROM albums WHERE id = ?",
        ALBUM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(album)
}

pub async fn get_album_by_slugs(
    pool: &SqlitePool,
    artist_slug: &str,
    album_slug: &str,
) -> Result<Option<Album>> {
    let album = sqlx::query_as::<_, Album>(
        r#"
        SELECT al.id, al.title, al.artist_id, al.slug, al.year
        FROM albums al
        JOIN artists ar ON ar.id = al.artist_id
        WHERE ar.slug = ? AND al.slug = ?
        "#,
    )
    .bind(artist_slug)
    .bind(album_slug)
    .fetch_optional(pool)
    .await?;
    Ok(album)
}

/// All albums A–Z with their primary artist.
pub async fn list_albums(pool: &SqlitePool) -> Result<Vec<AlbumSummary>> {
    let albums = sqlx::query_as::<_, AlbumSummary>(
        r#"
        SELECT al.id, al.title, al.slug, al.year,
               ar.name AS artist_name, ar.slug AS artist_slug
        FROM albums al
        JOIN artists ar ON ar.id = al.artist_id
        ORDER BY al.title COLLATE NOCASE, ar.name COLLATE NOCASE
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(albums)
}

pub async fn artist_albums(pool: &SqlitePool, artist_id: i64) -> Result<Vec<Album>> {
    let albums = sqlx::query_as::<_, Album>(&format!(
        "SELECT {} FROM albums WHERE artist_id = ? ORDER BY year DESC, title",
        ALBUM_COLUMNS
    ))
    .bind(artist_id)
    .fetch_all(pool)
    .await?;
    Ok(albums)
}

pub async fn album_additional_artists(pool: &SqlitePool, album_id: i64) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(
        r#"
        SELECT ar.id, ar.name, ar.slug, ar.image_url, ar.about
        FROM album_artists aa
        JOIN artists ar ON ar.id = aa.artist_id
        WHERE aa.album_id = ?
        ORDER BY ar.name COLLATE NOCASE
        "#,
    )
    .bind(album_id)
    .fetch_all(pool)
    .await?;
    Ok(artists)
}

/// Published songs of an album, by year then title.
pub async fn album_songs(pool: &SqlitePool, album_id: i64) -> Result<Vec<SongSummary>> {
    let songs = sqlx::query_as::<_, SongSummary>(
        r#"
        SELECT s.id, s.title, s.slug, s.year, ar.name AS artist_name, ar.slug AS artist_slug
        FROM songs s
        JOIN artists ar ON ar.id = s.artist_id
        WHERE s.album_id = ? AND s.is_published = 1
        ORDER BY s.year, s.title
        "#,
    )
    .bind(album_id)
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

pub async fn update_album(
    pool: &SqlitePool,
    id: i64,
    update: &AlbumUpdate,
) -> Result<Option<Album>> {
    let Some(mut album) = get_album(pool, id).await? else {
        return Ok(None);
    };

    if let Some(title) = &update.title {
        let title = title.trim();
        anyhow::ensure!(!title.is_empty(), "album title must not be empty");
        album.title = title.to_string();
    }
    if let Some(year) = update.year {
        album.year = year;
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE albums SET title = ?, year = ? WHERE id = ?")
        .bind(&album.title)
        .bind(album.year)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if let Some(ids) = &update.additional_artist_ids {
        set_credits(&mut tx, "album_artists", "album_id", id, ids).await?;
    }
    tx.commit().await?;

    Ok(Some(album))
}

/// Deletes the album; its songs stay, detached from it.
pub async fn delete_album(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- songs ----

pub async fn find_song(
    conn: &mut SqliteConnection,
    artist_id: i64,
    title: &str,
) -> Result<Option<Song>> {
    let song = sqlx::query_as::<_, Song>(&format!(
        "SELECT {} FROM songs WHERE artist_id = ? AND title = ? ORDER BY id LIMIT 1",
        SONG_COLUMNS
    ))
    .bind(artist_id)
    .bind(title)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(song)
}

pub async fn insert_song(conn: &mut SqliteConnection, new: &NewSong) -> Result<Song> {
    let title = new.title.trim();
    anyhow::ensure!(!title.is_empty(), "song title must not be empty");

    let artist_name: String = sqlx::query_scalar("SELECT name FROM artists WHERE id = ?")
        .bind(new.artist_id)
        .fetch_optional(&mut *conn)
        .await?
        .with_context(|| format!("artist {} not found", new.artist_id))?;

    let slug = unique_slug(conn, SlugTable::Songs, &format!("{}-{}", artist_name, title)).await?;
    let song = sqlx::query_as::<_, Song>(&format!(
        "INSERT INTO songs (artist_id, title, album_id, year, slug, is_published) VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
        SONG_COLUMNS
    ))
    .bind(new.artist_id)
    .bind(title)
    .bind(new.album_id)
    .bind(new.year)
    .bind(&slug)
    .bind(new.is_published)
    .fetch_one(&mut *conn)
    .await?;

    set_credits(conn, "song_artists", "song_id", song.id, &new.additional_artist_ids).await?;
    set_credits(conn, "song_featured_artists", "song_id", song.id, &new.featured_artist_ids).await?;

    tracing::debug!("created song '{}' ({})", song.title, song.slug);
    Ok(song)
}

pub async fn create_song(pool: &SqlitePool, new: &NewSong) -> Result<Song> {
    let mut tx = pool.begin().await?;
    let song = insert_song(&mut tx, new).await?;
    tx.commit().await?;
    Ok(song)
}

pub async fn get_song(pool: &SqlitePool, id: i64) -> Result<Option<Song>> {
    let song = sqlx::query_as::<_, Song>(&format!(
        "SELECT {} FROM songs WHERE id = ?",
        SONG_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(song)
}

/// Published song addressed by its artist's slug and its own slug.
pub async fn get_published_song_by_slugs(
    pool: &SqlitePool,
    artist_slug: &str,
    song_slug: &str,
) -> Result<Option<Song>> {
    let song = sqlx::query_as::<_, Song>(
        r#"
        SELECT s.id, s.artist_id, s.title, s.album_id, s.year, s.slug, s.is_published
        FROM songs s
        JOIN artists ar ON ar.id = s.artist_id
        WHERE ar.slug = ? AND s.slug = ? AND s.is_published = 1
        "#,
    )
    .bind(artist_slug)
    .bind(song_slug)
    .fetch_optional(pool)
    .await?;
    Ok(song)
}

pub async fn update_song(pool: &SqlitePool, id: i64, update: &SongUpdate) -> Result<Option<Song>> {
    let Some(mut song) = get_song(pool, id).await? else {
        return Ok(None);
    };

    if let Some(title) = &update.title {
        let title = title.trim();
        anyhow::ensure!(!title.is_empty(), "song title must not be empty");
        song.title = title.to_string();
    }
    if let Some(album_id) = update.album_id {
        song.album_id = album_id;
    }
    if let Some(year) = update.year {
        song.year = year;
    }
    if let Some(is_published) = update.is_published {
        song.is_published = is_published;
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE songs SET title = ?, album_id = ?, year = ?, is_published = ? WHERE id = ?")
        .bind(&song.title)
        .bind(song.album_id)
        .bind(song.year)
        .bind(song.is_published)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if let Some(ids) = &update.additional_artist_ids {
        set_credits(&mut tx, "song_artists", "song_id", id, ids).await?;
    }
    if let Some(ids) = &update.featured_artist_ids {
        set_credits(&mut tx, "song_featured_artists", "song_id", id, ids).await?;
    }
    tx.commit().await?;

    Ok(Some(song))
}

/// Deletes the song with its lines, comments, ratings and favorites.
pub async fn delete_song(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn song_additional_artists(pool: &SqlitePool, song_id: i64) -> Result<Vec<Artist>> {
    credited_artists(pool, "song_artists", song_id).await
}

pub async fn song_featured_artists(pool: &SqlitePool, song_id: i64) -> Result<Vec<Artist>> {
    credited_artists(pool, "song_featured_artists", song_id).await
}

async fn credited_artists(pool: &SqlitePool, join_table: &str, song_id: i64) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>(&format!(
        r#"
        SELECT ar.id, ar.name, ar.slug, ar.image_url, ar.about
        FROM {} j
        JOIN artists ar ON ar.id = j.artist_id
        WHERE j.song_id = ?
        ORDER BY ar.name COLLATE NOCASE
        "#,
        join_table
    ))
    .bind(song_id)
    .fetch_all(pool)
    .await?;
    Ok(artists)
}

/// Replaces the artist credits in a join table for one owner row.
async fn set_credits(
    conn: &mut SqliteConnection,
    join_table: &str,
    owner_column: &str,
    owner_id: i64,
    artist_ids: &[i64],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", join_table, owner_column))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT OR IGNORE INTO {} ({}, artist_id) VALUES (?, ?)",
        join_table, owner_column
    );
    for artist_id in artist_ids {
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(*artist_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Published songs where the artist is the primary artist, newest year first.
pub async fn artist_songs(pool: &SqlitePool, artist_id: i64) -> Result<Vec<Song>> {
    let songs = sqlx::query_as::<_, Song>(&format!(
        "SELECT {} FROM songs WHERE artist_id = ? AND is_published = 1 ORDER BY year DESC, title",
        SONG_COLUMNS
    ))
    .bind(artist_id)
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

/// Published songs crediting the artist as additional or featured artist.
pub async fn artist_appearances(pool: &SqlitePool, artist_id: i64) -> Result<Vec<SongSummary>> {
    let songs = sqlx::query_as::<_, SongSummary>(
        r#"
        SELECT s.id, s.title, s.slug, s.year, ar.name AS artist_name, ar.slug AS artist_slug
        FROM songs s
        JOIN artists ar ON ar.id = s.artist_id
        WHERE s.is_published = 1
          AND s.artist_id != ?1
          AND (
            s.id IN (SELECT song_id FROM song_artists WHERE artist_id = ?1)
            OR s.id IN (SELECT song_id FROM song_featured_artists WHERE artist_id = ?1)
          )
        ORDER BY s.year DESC, s.title
        "#,
    )
    .bind(artist_id)
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

/// Home page picks: published songs, newest year first, then title.
pub async fn top_songs(pool: &SqlitePool, limit: i64) -> Result<Vec<SongSummary>> {
    let songs = sqlx::query_as::<_, SongSummary>(
        r#"
        SELECT s.id, s.title, s.slug, s.year, ar.name AS artist_name, ar.slug AS artist_slug
        FROM songs s
        JOIN artists ar ON ar.id = s.artist_id
        WHERE s.is_published = 1
        ORDER BY s.year IS NULL, s.year DESC, s.title
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

/// Every published song, by artist name then title.
pub async fn published_songs(pool: &SqlitePool) -> Result<Vec<SongSummary>> {
    let songs = sqlx::query_as::<_, SongSummary>(
        r#"
        SELECT s.id, s.title, s.slug, s.year, ar.name AS artist_name, ar.slug AS artist_slug
        FROM songs s
        JOIN artists ar ON ar.id = s.artist_id
        WHERE s.is_published = 1
        ORDER BY ar.name COLLATE NOCASE, s.title
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(songs)
}

// ---- lines ----

/// Lines of a song by ascending line number.
pub async fn song_lines(pool: &SqlitePool, song_id: i64) -> Result<Vec<Line>> {
    let lines = sqlx::query_as::<_, Line>(
        "SELECT id, song_id, no, original, romanized, translation_en FROM lines WHERE song_id = ? ORDER BY no",
    )
    .bind(song_id)
    .fetch_all(pool)
    .await?;
    Ok(lines)
}

/// Deletes every line of the song and inserts `lines`; run inside a transaction.
pub async fn replace_lines(
    conn: &mut SqliteConnection,
    song_id: i64,
    lines: &[NewLine],
) -> Result<usize> {
    sqlx::query("DELETE FROM lines WHERE song_id = ?")
        .bind(song_id)
        .execute(&mut *conn)
        .await?;

    for line in lines {
        sqlx::query(
            "INSERT INTO lines (song_id, no, original, romanized, translation_en) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(song_id)
        .bind(line.no)
        .bind(&line.original)
        .bind(&line.romanized)
        .bind(&line.translation_en)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to insert line {} of song {}", line.no, song_id))?;
    }

    Ok(lines.len())
}

pub async fn replace_song_lines(pool: &SqlitePool, song_id: i64, lines: &[NewLine]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let count = replace_lines(&mut tx, song_id, lines).await?;
    tx.commit().await?;
    Ok(count)
}
