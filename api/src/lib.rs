use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use sqlx::sqlite::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod community;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod import;
pub mod models;
pub mod pagination;
pub mod search;
pub mod sitemap;
pub mod slugs;
pub mod stats;
pub mod tracking;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

/// Registers a route under both its trailing-slash and bare spelling.
pub trait RouterExt {
    fn route_with_slash(self, path: &str, method_router: MethodRouter<AppState>) -> Self;
}

impl RouterExt for Router<AppState> {
    fn route_with_slash(self, path: &str, method_router: MethodRouter<AppState>) -> Self {
        let bare = path.trim_end_matches('/');
        if bare.is_empty() || bare == path {
            return self.route(path, method_router);
        }
        self.route(path, method_router.clone()).route(bare, method_router)
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::*;

    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(home))
        .route_with_slash("/charts/", get(home))
        .route_with_slash("/artists/", get(artists_index))
        .route_with_slash("/albums/", get(albums_index))
        .route_with_slash("/albums/:artist/:album/", get(album_detail))
        .route_with_slash("/songs/", get(songs_index))
        .route_with_slash("/a/:artist/", get(artist_detail))
        .route_with_slash("/a/:artist/comments/", post(comment_on_artist))
        .route_with_slash("/a/:artist/rating/", post(rate_artist))
        .route_with_slash("/a/:artist/:song/", get(song_detail))
        .route_with_slash("/a/:artist/:song/comments/", post(comment_on_song))
        .route_with_slash("/a/:artist/:song/rating/", post(rate_song))
        .route_with_slash("/search/", get(search))
        .route_with_slash("/stats/", get(stats_dashboard))
        .route_with_slash("/signup/", post(signup))
        .route_with_slash("/login/", post(login))
        .route_with_slash("/logout/", post(logout))
        .route_with_slash("/profile/", get(profile).post(update_profile))
        .route_with_slash("/favorite/song/:id/", post(toggle_favorite_song))
        .route_with_slash("/favorite/artist/:id/", post(toggle_favorite_artist))
        .route("/sitemap.xml", get(sitemap::sitemap))
        .route("/health", get(health_check))
        .nest("/admin", admin::router())
        .nest_service("/static", static_files)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tracking::track_page_views,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lyricslib_api=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let db = db::init_db(&config)
        .await
        .context("failed to initialize database")?;
    tracing::info!("database initialized");

    if !config.static_dir.is_dir() {
        tracing::warn!(
            "static directory {} does not exist, /static will 404",
            config.static_dir.display()
        );
    }

    let addr = config.bind_addr;
    let app = build_router(AppState::new(db, config));

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
