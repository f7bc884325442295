//! Public JSON endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::accounts::{self, CurrentUser, SignupForm, StaffUser};
use crate::catalog;
use crate::community::{self, clean_comment, FavoriteKind, RatingSummary, RatingValue, Subject};
use crate::error::{AppError, AppResult, OrNotFound};
use crate::models::{Album, AlbumSummary, Artist, Comment, Line, Rating, Song, SongSummary, User, UserProfile};
use crate::search::{self, SearchResults};
use crate::stats::{self, DashboardStats, TopContent, Window, HOME_TOP_K};
use crate::tracking::ContentCategory;
use crate::AppState;

// ---- home & indexes ----

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub top_songs: Vec<SongSummary>,
    /// Most viewed songs of the last week.
    pub trending: Vec<TopContent>,
    pub artists: Vec<Artist>,
    pub songs: Vec<SongSummary>,
}

pub async fn home(State(state): State<AppState>) -> AppResult<Json<HomePage>> {
    let top_songs = catalog::top_songs(&state.db, HOME_TOP_K).await?;
    let trending = stats::top_content(&state.db, ContentCategory::Song, Window::Last7Days, HOME_TOP_K, Utc::now())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("failed to load trending songs: {:#}", e);
            Vec::new()
        });
    let artists = catalog::list_artists(&state.db).await?;
    let songs = catalog::published_songs(&state.db).await?;

    Ok(Json(HomePage {
        top_songs,
        trending,
        artists,
        songs,
    }))
}

pub async fn artists_index(State(state): State<AppState>) -> AppResult<Json<Vec<Artist>>> {
    Ok(Json(catalog::list_artists(&state.db).await?))
}

pub async fn albums_index(State(state): State<AppState>) -> AppResult<Json<Vec<AlbumSummary>>> {
    Ok(Json(catalog::list_albums(&state.db).await?))
}

/// Songs are browsed through their artists.
pub async fn songs_index() -> Redirect {
    Redirect::to("/artists/")
}

// ---- detail pages ----

#[derive(Debug, Serialize)]
pub struct AlbumPage {
    pub album: Album,
    pub artist: Artist,
    pub additional_artists: Vec<Artist>,
    pub songs: Vec<SongSummary>,
}

pub async fn album_detail(
    State(state): State<AppState>,
    Path((artist_slug, album_slug)): Path<(String, String)>,
) -> AppResult<Json<AlbumPage>> {
    let album = catalog::get_album_by_slugs(&state.db, &artist_slug, &album_slug)
        .await?
        .or_not_found()?;
    let artist = catalog::get_artist(&state.db, album.artist_id).await?.or_not_found()?;
    let additional_artists = catalog::album_additional_artists(&state.db, album.id).await?;
    let songs = catalog::album_songs(&state.db, album.id).await?;

    Ok(Json(AlbumPage {
        album,
        artist,
        additional_artists,
        songs,
    }))
}

/// What the logged-in viewer has done with a song or artist.
#[derive(Debug, Default, Serialize)]
pub struct ViewerState {
    pub rating: Option<i64>,
    pub is_favorite: bool,
}

async fn viewer_state(
    state: &AppState,
    viewer: Option<&CurrentUser>,
    subject: Subject,
) -> AppResult<Option<ViewerState>> {
    let Some(viewer) = viewer else {
        return Ok(None);
    };
    let (kind, id) = match subject {
        Subject::Song(id) => (FavoriteKind::Song, id),
        Subject::Artist(id) => (FavoriteKind::Artist, id),
    };
    Ok(Some(ViewerState {
        rating: community::user_rating(&state.db, subject, viewer.user.id).await?,
        is_favorite: community::is_favorite(&state.db, viewer.user.id, kind, id).await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct ArtistPage {
    pub artist: Artist,
    pub songs: Vec<Song>,
    pub albums: Vec<Album>,
    pub appearances: Vec<SongSummary>,
    pub year_min: Option<i64>,
    pub year_max: Option<i64>,
    pub comments: Vec<Comment>,
    pub rating: RatingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

pub async fn artist_detail(
    State(state): State<AppState>,
    viewer: Option<CurrentUser>,
    Path(artist_slug): Path<String>,
) -> AppResult<Json<ArtistPage>> {
    let artist = catalog::get_artist_by_slug(&state.db, &artist_slug)
        .await?
        .or_not_found()?;
    let subject = Subject::Artist(artist.id);

    let songs = catalog::artist_songs(&state.db, artist.id).await?;
    let years = songs.iter().filter_map(|s| s.year);
    let year_min = years.clone().min();
    let year_max = years.max();

    let albums = catalog::artist_albums(&state.db, artist.id).await?;
    let appearances = catalog::artist_appearances(&state.db, artist.id).await?;
    let comments = community::list_comments(&state.db, subject).await?;
    let rating = community::rating_summary(&state.db, subject).await?;
    let viewer = viewer_state(&state, viewer.as_ref(), subject).await?;

    Ok(Json(ArtistPage {
        artist,
        songs,
        albums,
        appearances,
        year_min,
        year_max,
        comments,
        rating,
        viewer,
    }))
}

#[derive(Debug, Serialize)]
pub struct SongPage {
    pub song: Song,
    pub artist: Artist,
    pub album: Option<Album>,
    pub additional_artists: Vec<Artist>,
    pub featured_artists: Vec<Artist>,
    pub lines: Vec<Line>,
    pub comments: Vec<Comment>,
    pub rating: RatingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

async fn published_song(state: &AppState, artist_slug: &str, song_slug: &str) -> AppResult<Song> {
    catalog::get_published_song_by_slugs(&state.db, artist_slug, song_slug)
        .await?
        .or_not_found()
}

pub async fn song_detail(
    State(state): State<AppState>,
    viewer: Option<CurrentUser>,
    Path((artist_slug, song_slug)): Path<(String, String)>,
) -> AppResult<Json<SongPage>> {
    let song = published_song(&state, &artist_slug, &song_slug).await?;
    let subject = Subject::Song(song.id);

    let artist = catalog::get_artist(&state.db, song.artist_id).await?.or_not_found()?;
    let album = match song.album_id {
        Some(album_id) => catalog::get_album(&state.db, album_id).await?,
        None => None,
    };
    let additional_artists = catalog::song_additional_artists(&state.db, song.id).await?;
    let featured_artists = catalog::song_featured_artists(&state.db, song.id).await?;
    let lines = catalog::song_lines(&state.db, song.id).await?;
    let comments = community::list_comments(&state.db, subject).await?;
    let rating = community::rating_summary(&state.db, subject).await?;
    let viewer = viewer_state(&state, viewer.as_ref(), subject).await?;

    Ok(Json(SongPage {
        song,
        artist,
        album,
        additional_artists,
        featured_artists,
        lines,
        comments,
        rating,
        viewer,
    }))
}

// ---- comments & ratings ----

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingForm {
    pub rating: i64,
}

async fn post_comment(
    state: &AppState,
    user: &CurrentUser,
    subject: Subject,
    form: &CommentForm,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let text = clean_comment(&form.text)?;
    let comment = community::add_comment(&state.db, subject, user.user.id, &text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn post_rating(state: &AppState, user: &CurrentUser, subject: Subject, value: RatingValue) -> AppResult<Json<Rating>> {
    let rating = community::rate(&state.db, subject, user.user.id, value).await?;
    Ok(Json(rating))
}

pub async fn comment_on_artist(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(artist_slug): Path<String>,
    Json(form): Json<CommentForm>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let artist = catalog::get_artist_by_slug(&state.db, &artist_slug)
        .await?
        .or_not_found()?;
    post_comment(&state, &user, Subject::Artist(artist.id), &form).await
}

pub async fn rate_artist(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(artist_slug): Path<String>,
    Json(form): Json<RatingForm>,
) -> AppResult<Json<Rating>> {
    // validated before touching the store
    let value = RatingValue::new(form.rating)?;
    let artist = catalog::get_artist_by_slug(&state.db, &artist_slug)
        .await?
        .or_not_found()?;
    post_rating(&state, &user, Subject::Artist(artist.id), value).await
}

pub async fn comment_on_song(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((artist_slug, song_slug)): Path<(String, String)>,
    Json(form): Json<CommentForm>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let song = published_song(&state, &artist_slug, &song_slug).await?;
    post_comment(&state, &user, Subject::Song(song.id), &form).await
}

pub async fn rate_song(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((artist_slug, song_slug)): Path<(String, String)>,
    Json(form): Json<RatingForm>,
) -> AppResult<Json<Rating>> {
    let value = RatingValue::new(form.rating)?;
    let song = published_song(&state, &artist_slug, &song_slug).await?;
    post_rating(&state, &user, Subject::Song(song.id), value).await
}

// ---- search ----

fn default_page() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub sp: i64,
    #[serde(default = "default_page")]
    pub lp: i64,
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> AppResult<Json<SearchResults>> {
    Ok(Json(search::search(&state.db, &query.q, query.sp, query.lp).await?))
}

// ---- accounts ----

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

async fn start_session(state: &AppState, jar: CookieJar, user: User) -> AppResult<(CookieJar, Json<User>)> {
    let token = accounts::create_session(&state.db, user.id).await?;
    tracing::debug!("user '{}' logged in", user.username);
    let jar = jar.add(accounts::session_cookie(token, state.config.secure_cookies));
    Ok((jar, Json(user)))
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<SignupForm>,
) -> AppResult<(StatusCode, CookieJar, Json<User>)> {
    form.validate()?;
    if accounts::get_user_by_username(&state.db, form.username.trim())
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("a user with that username already exists".into()));
    }
    let user = accounts::create_user(&state.db, &form).await?;
    let (jar, user) = start_session(&state, jar, user).await?;
    Ok((StatusCode::CREATED, jar, user))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> AppResult<(CookieJar, Json<User>)> {
    let user = accounts::authenticate(&state.db, &form.username, &form.password)
        .await?
        .ok_or(AppError::Unauthorized)?;
    start_session(&state, jar, user).await
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> AppResult<(CookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(accounts::SESSION_COOKIE) {
        accounts::delete_session(&state.db, cookie.value()).await?;
    }
    Ok((jar.remove(accounts::removal_cookie()), StatusCode::NO_CONTENT))
}

// ---- profile & favorites ----

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub user: User,
    pub profile: UserProfile,
    pub favorite_songs: Vec<SongSummary>,
    pub favorite_artists: Vec<Artist>,
    pub song_comments: Vec<Comment>,
    pub artist_comments: Vec<Comment>,
    pub song_ratings: Vec<Rating>,
    pub artist_ratings: Vec<Rating>,
}

pub async fn profile(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<ProfilePage>> {
    let user_id = current.user.id;
    let profile = community::get_or_create_profile(&state.db, user_id).await?;
    let favorite_songs = community::favorite_songs(&state.db, user_id).await?;
    let favorite_artists = community::favorite_artists(&state.db, user_id).await?;
    let (song_comments, artist_comments) = community::user_comments(&state.db, user_id).await?;
    let (song_ratings, artist_ratings) = community::user_ratings(&state.db, user_id).await?;

    Ok(Json(ProfilePage {
        user: current.user,
        profile,
        favorite_songs,
        favorite_artists,
        song_comments,
        artist_comments,
        song_ratings,
        artist_ratings,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub bio: String,
}

pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ProfileForm>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(community::update_bio(&state.db, current.user.id, &form.bio).await?))
}

#[derive(Debug, Serialize)]
pub struct FavoriteToggled {
    pub id: i64,
    pub is_favorite: bool,
}

pub async fn toggle_favorite_song(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(song_id): Path<i64>,
) -> AppResult<Json<FavoriteToggled>> {
    catalog::get_song(&state.db, song_id).await?.or_not_found()?;
    let is_favorite = community::toggle_favorite(&state.db, current.user.id, FavoriteKind::Song, song_id).await?;
    Ok(Json(FavoriteToggled { id: song_id, is_favorite }))
}

pub async fn toggle_favorite_artist(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(artist_id): Path<i64>,
) -> AppResult<Json<FavoriteToggled>> {
    catalog::get_artist(&state.db, artist_id).await?.or_not_found()?;
    let is_favorite = community::toggle_favorite(&state.db, current.user.id, FavoriteKind::Artist, artist_id).await?;
    Ok(Json(FavoriteToggled { id: artist_id, is_favorite }))
}

// ---- stats ----

pub async fn stats_dashboard(State(state): State<AppState>, StaffUser(staff): StaffUser) -> AppResult<Json<DashboardStats>> {
    let now = Utc::now();
    if let Err(e) = stats::rollup_day(&state.db, now.date_naive()).await {
        tracing::warn!("failed to refresh today's rollup: {:#}", e);
    }

    tracing::info!("calculating dashboard stats for {}", staff.username);
    let dashboard = stats::calculate_dashboard(&state.db, now).await?;
    Ok(Json(dashboard))
}

pub async fn health_check() -> &'static str {
    "ok"
}
