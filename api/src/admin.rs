//! Staff-only content management under `/admin/`.
//!
//! Every handler takes a [`StaffUser`], so anonymous callers get 401 and
//! non-staff accounts 403 before any body is read.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::Serialize;

use crate::accounts::{self, StaffUser};
use crate::catalog::{self, AlbumUpdate, ArtistUpdate, NewAlbum, NewArtist, NewSong, SongUpdate};
use crate::error::{AppError, AppResult, OrNotFound};
use crate::models::{Album, Artist, NewLine, Song};
use crate::stats::{self, ContentTotals};
use crate::{AppState, RouterExt};

fn deleted(found: bool) -> AppResult<StatusCode> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// Turns a failed precondition or a dangling reference into a 400.
fn invalid(err: anyhow::Error) -> AppError {
    match err.downcast::<sqlx::Error>() {
        Ok(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            AppError::BadRequest("referenced row does not exist".into())
        }
        Ok(db) => db.into(),
        Err(err) => AppError::BadRequest(err.to_string()),
    }
}

/// Row counts of the main tables.
async fn summary(State(state): State<AppState>, _staff: StaffUser) -> AppResult<Json<ContentTotals>> {
    Ok(Json(stats::content_totals(&state.db).await?))
}

// ---- artists ----

async fn create_artist(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Json(new): Json<NewArtist>,
) -> AppResult<(StatusCode, Json<Artist>)> {
    let artist = catalog::create_artist(&state.db, &new).await.map_err(invalid)?;
    tracing::info!("{} created artist {}", staff.username, artist.slug);
    Ok((StatusCode::CREATED, Json(artist)))
}

async fn update_artist(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(update): Json<ArtistUpdate>,
) -> AppResult<Json<Artist>> {
    let artist = catalog::update_artist(&state.db, id, &update)
        .await
        .map_err(invalid)?
        .or_not_found()?;
    Ok(Json(artist))
}

async fn delete_artist(State(state): State<AppState>, StaffUser(staff): StaffUser, Path(id): Path<i64>) -> AppResult<StatusCode> {
    let found = catalog::delete_artist(&state.db, id).await?;
    if found {
        tracing::info!("{} deleted artist {}", staff.username, id);
    }
    deleted(found)
}

// ---- albums ----

async fn create_album(
    State(state): State<AppState>,
    _staff: StaffUser,
    Json(new): Json<NewAlbum>,
) -> AppResult<(StatusCode, Json<Album>)> {
    let album = catalog::create_album(&state.db, &new).await.map_err(invalid)?;
    Ok((StatusCode::CREATED, Json(album)))
}

async fn update_album(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(update): Json<AlbumUpdate>,
) -> AppResult<Json<Album>> {
    let album = catalog::update_album(&state.db, id, &update)
        .await
        .map_err(invalid)?
        .or_not_found()?;
    Ok(Json(album))
}

async fn delete_album(State(state): State<AppState>, _staff: StaffUser, Path(id): Path<i64>) -> AppResult<StatusCode> {
    deleted(catalog::delete_album(&state.db, id).await?)
}

// ---- songs ----

async fn create_song(
    State(state): State<AppState>,
    _staff: StaffUser,
    Json(new): Json<NewSong>,
) -> AppResult<(StatusCode, Json<Song>)> {
    let song = catalog::create_song(&state.db, &new).await.map_err(invalid)?;
    Ok((StatusCode::CREATED, Json(song)))
}

async fn update_song(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(update): Json<SongUpdate>,
) -> AppResult<Json<Song>> {
    let song = catalog::update_song(&state.db, id, &update)
        .await
        .map_err(invalid)?
        .or_not_found()?;
    Ok(Json(song))
}

async fn delete_song(State(state): State<AppState>, _staff: StaffUser, Path(id): Path<i64>) -> AppResult<StatusCode> {
    deleted(catalog::delete_song(&state.db, id).await?)
}

#[derive(Debug, Serialize)]
struct LinesReplaced {
    song_id: i64,
    lines: usize,
}

async fn replace_lines(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(lines): Json<Vec<NewLine>>,
) -> AppResult<Json<LinesReplaced>> {
    catalog::get_song(&state.db, id).await?.or_not_found()?;

    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = lines.iter().find(|l| !seen.insert(l.no)) {
        return Err(AppError::BadRequest(format!("line number {} appears twice", dup.no)));
    }

    let count = catalog::replace_song_lines(&state.db, id, &lines).await?;
    Ok(Json(LinesReplaced { song_id: id, lines: count }))
}

// ---- users ----

async fn delete_user(State(state): State<AppState>, StaffUser(staff): StaffUser, Path(id): Path<i64>) -> AppResult<StatusCode> {
    if staff.id == id {
        return Err(AppError::BadRequest("staff cannot delete their own account here".into()));
    }
    deleted(accounts::delete_user(&state.db, id).await?)
}

/// Routes mounted under `/admin`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route_with_slash("/summary/", get(summary))
        .route_with_slash("/artists/", post(create_artist))
        .route_with_slash("/artists/:id/", patch(update_artist).delete(delete_artist))
        .route_with_slash("/albums/", post(create_album))
        .route_with_slash("/albums/:id/", patch(update_album).delete(delete_album))
        .route_with_slash("/songs/", post(create_song))
        .route_with_slash("/songs/:id/", patch(update_song).delete(delete_song))
        .route_with_slash("/songs/:id/lines/", put(replace_lines))
        .route_with_slash("/users/:id/", delete(delete_user))
}
