//! Page-view tracking.
//!
//! [`track_page_views`] wraps the router: after the inner service answers, a
//! qualifying request (GET, 200, not admin/static) is classified by its path and
//! appended to `page_views`. Tracking is best effort; any failure is logged and
//! dropped, and the response is returned untouched.

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::{accounts, catalog, AppState};

/// Request paths under these prefixes are never recorded.
pub const EXCLUDED_PREFIXES: [&str; 2] = ["/admin/", "/static/"];
pub const MAX_USER_AGENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Song,
    Artist,
    Album,
    Home,
    Other,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 5] = [
        ContentCategory::Song,
        ContentCategory::Artist,
        ContentCategory::Album,
        ContentCategory::Home,
        ContentCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Song => "song",
            ContentCategory::Artist => "artist",
            ContentCategory::Album => "album",
            ContentCategory::Home => "home",
            ContentCategory::Other => "other",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ContentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown content category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ContentCategory,
    /// Fixed title for index pages; empty for detail pages.
    pub title: &'static str,
}

impl Classification {
    fn new(category: ContentCategory, title: &'static str) -> Self {
        Self { category, title }
    }
}

pub fn is_excluded(path: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Maps a request path to its content category.
pub fn classify_path(path: &str) -> Classification {
    if path == "/" || path.starts_with("/charts") {
        return Classification::new(ContentCategory::Home, "Home / Charts");
    }
    if path.starts_with("/a/") {
        let segments = path.trim_matches('/').split('/').count();
        return match segments {
            2 => Classification::new(ContentCategory::Artist, ""),
            3 => Classification::new(ContentCategory::Song, ""),
            _ => Classification::new(ContentCategory::Other, ""),
        };
    }
    if path.starts_with("/artists") {
        return Classification::new(ContentCategory::Other, "Artists Index");
    }
    if path.starts_with("/albums") {
        return Classification::new(ContentCategory::Album, "Albums Index");
    }
    if path.starts_with("/songs") {
        return Classification::new(ContentCategory::Other, "Songs Index");
    }
    Classification::new(ContentCategory::Other, "")
}

/// `None` when the request does not qualify for tracking.
pub fn classify(method: &Method, path: &str, status: StatusCode) -> Option<Classification> {
    if *method != Method::GET || status != StatusCode::OK || is_excluded(path) {
        return None;
    }
    Some(classify_path(path))
}

/// A content page addressed by slugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget<'a> {
    Artist { artist: &'a str },
    Song { artist: &'a str, song: &'a str },
    Album { artist: &'a str, album: &'a str },
}

pub fn parse_target(path: &str) -> Option<PathTarget<'_>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    match segments.as_slice() {
        ["a", artist] => Some(PathTarget::Artist { artist: *artist }),
        ["a", artist, song] => Some(PathTarget::Song {
            artist: *artist,
            song: *song,
        }),
        ["albums", artist, album] => Some(PathTarget::Album {
            artist: *artist,
            album: *album,
        }),
        _ => None,
    }
}

/// Looks up the live object behind a path: its id and display title.
pub async fn resolve_target(pool: &SqlitePool, target: PathTarget<'_>) -> Result<Option<(i64, String)>> {
    let resolved = match target {
        PathTarget::Artist { artist } => catalog::get_artist_by_slug(pool, artist)
            .await?
            .map(|a| (a.id, a.name)),
        PathTarget::Song { artist, song } => catalog::get_published_song_by_slugs(pool, artist, song)
            .await?
            .map(|s| (s.id, s.title)),
        PathTarget::Album { artist, album } => catalog::get_album_by_slugs(pool, artist, album)
            .await?
            .map(|a| (a.id, a.title)),
    };
    Ok(resolved)
}

/// First `X-Forwarded-For` entry, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Stored form of a request path. Page paths always end in `/`; file-like
/// paths (`/sitemap.xml`) are kept as they are.
pub fn canonical_path(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or_default();
    if path.ends_with('/') || last.contains('.') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

pub fn truncate_user_agent(user_agent: &str) -> String {
    user_agent.chars().take(MAX_USER_AGENT_CHARS).collect()
}

#[derive(Debug, Clone)]
pub struct NewPageView {
    pub category: ContentCategory,
    pub content_id: Option<i64>,
    pub content_title: String,
    pub url: String,
    pub ip_address: Option<String>,
    pub user_id: Option<i64>,
    pub session_key: String,
    pub user_agent: String,
}

impl NewPageView {
    pub fn anonymous(category: ContentCategory, url: &str, ip_address: Option<&str>) -> Self {
        Self {
            category,
            content_id: None,
            content_title: String::new(),
            url: url.to_string(),
            ip_address: ip_address.map(String::from),
            user_id: None,
            session_key: String::new(),
            user_agent: String::new(),
        }
    }
}

pub async fn record_page_view(pool: &SqlitePool, view: &NewPageView) -> Result<i64> {
    record_page_view_at(pool, view, Utc::now()).await
}

pub async fn record_page_view_at(pool: &SqlitePool, view: &NewPageView, at: DateTime<Utc>) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO page_views (
            content_type, content_id, content_title, url,
            ip_address, user_id, session_key, user_agent, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(view.category.as_str())
    .bind(view.content_id)
    .bind(&view.content_title)
    .bind(&view.url)
    .bind(&view.ip_address)
    .bind(view.user_id)
    .bind(&view.session_key)
    .bind(truncate_user_agent(&view.user_agent))
    .bind(at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// What the middleware keeps from the request before handing it on.
struct RequestFacts {
    method: Method,
    path: String,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
}

async fn capture(pool: &SqlitePool, classification: Classification, facts: &RequestFacts) -> Result<()> {
    let session = accounts::session_from_headers(pool, &facts.headers).await?;

    let mut content_id = None;
    let mut content_title = classification.title.to_string();
    if let Some(target) = parse_target(&facts.path) {
        match resolve_target(pool, target).await {
            Ok(Some((id, title))) => {
                content_id = Some(id);
                content_title = title;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("could not resolve {}: {}", facts.path, e),
        }
    }

    let user_agent = facts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let view = NewPageView {
        category: classification.category,
        content_id,
        content_title,
        url: canonical_path(&facts.path),
        ip_address: client_ip(&facts.headers, facts.peer),
        user_id: session.as_ref().map(|s| s.user.id),
        session_key: session.as_ref().map(|s| s.session_id.to_string()).unwrap_or_default(),
        user_agent: user_agent.to_string(),
    };

    record_page_view(pool, &view).await?;
    Ok(())
}

/// Router middleware recording one page view per qualifying request.
pub async fn track_page_views(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let facts = RequestFacts {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        headers: request.headers().clone(),
        peer: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    };

    let response = next.run(request).await;

    if let Some(classification) = classify(&facts.method, &facts.path, response.status()) {
        if let Err(e) = capture(&state.db, classification, &facts).await {
            tracing::warn!("failed to record page view for {}: {:#}", facts.path, e);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn category(path: &str) -> ContentCategory {
        classify_path(path).category
    }

    #[test]
    fn classifies_home_and_charts() {
        assert_eq!(classify_path("/"), Classification::new(ContentCategory::Home, "Home / Charts"));
        assert_eq!(category("/charts/"), ContentCategory::Home);
        assert_eq!(category("/charts"), ContentCategory::Home);
    }

    #[test]
    fn classifies_artist_and_song_by_segment_count() {
        assert_eq!(category("/a/sidhu-moose-wala/"), ContentCategory::Artist);
        assert_eq!(category("/a/sidhu-moose-wala"), ContentCategory::Artist);
        assert_eq!(category("/a/sidhu-moose-wala/sidhu-moose-wala-295/"), ContentCategory::Song);
        assert_eq!(category("/a/x/y/z/"), ContentCategory::Other);
        assert_eq!(category("/a/"), ContentCategory::Other);
    }

    #[test]
    fn classifies_index_pages() {
        assert_eq!(
            classify_path("/artists/"),
            Classification::new(ContentCategory::Other, "Artists Index")
        );
        assert_eq!(
            classify_path("/albums/"),
            Classification::new(ContentCategory::Album, "Albums Index")
        );
        assert_eq!(category("/albums/ap-dhillon/ap-dhillon-hidden-gems/"), ContentCategory::Album);
        assert_eq!(
            classify_path("/songs/"),
            Classification::new(ContentCategory::Other, "Songs Index")
        );
        assert_eq!(category("/search/"), ContentCategory::Other);
        assert_eq!(category("/profile/"), ContentCategory::Other);
    }

    #[test]
    fn only_successful_gets_outside_excluded_prefixes_qualify() {
        assert!(classify(&Method::GET, "/", StatusCode::OK).is_some());
        assert!(classify(&Method::POST, "/", StatusCode::OK).is_none());
        assert!(classify(&Method::HEAD, "/", StatusCode::OK).is_none());
        assert!(classify(&Method::GET, "/", StatusCode::NOT_FOUND).is_none());
        assert!(classify(&Method::GET, "/", StatusCode::FOUND).is_none());
        assert!(classify(&Method::GET, "/admin/artists/", StatusCode::OK).is_none());
        assert!(classify(&Method::GET, "/static/js/song_page.js", StatusCode::OK).is_none());
        // only the prefix with its trailing slash is excluded
        assert!(classify(&Method::GET, "/administrators", StatusCode::OK).is_some());
    }

    #[test]
    fn parses_slug_targets() {
        assert_eq!(parse_target("/a/karan-aujla/"), Some(PathTarget::Artist { artist: "karan-aujla" }));
        assert_eq!(
            parse_target("/a/karan-aujla/karan-aujla-softly/"),
            Some(PathTarget::Song {
                artist: "karan-aujla",
                song: "karan-aujla-softly"
            })
        );
        assert_eq!(
            parse_target("/albums/ap-dhillon/hidden-gems/"),
            Some(PathTarget::Album {
                artist: "ap-dhillon",
                album: "hidden-gems"
            })
        );
        assert_eq!(parse_target("/albums/"), None);
        assert_eq!(parse_target("/"), None);
        assert_eq!(parse_target("/a//x/"), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), Some("10.0.0.9".to_string()));
        assert_eq!(client_ip(&headers, None), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 70.41.3.18"));
        assert_eq!(client_ip(&headers, Some(peer)), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn paths_are_stored_with_trailing_slash() {
        assert_eq!(canonical_path("/a/karan-aujla/softly"), "/a/karan-aujla/softly/");
        assert_eq!(canonical_path("/a/karan-aujla/softly/"), "/a/karan-aujla/softly/");
        assert_eq!(canonical_path("/"), "/");
        assert_eq!(canonical_path("/charts"), "/charts/");
        assert_eq!(canonical_path("/sitemap.xml"), "/sitemap.xml");
    }

    #[test]
    fn user_agent_is_cut_at_500_chars() {
        let long = "ਮ".repeat(600);
        let cut = truncate_user_agent(&long);
        assert_eq!(cut.chars().count(), MAX_USER_AGENT_CHARS);
        assert_eq!(truncate_user_agent("curl/8.0"), "curl/8.0");
    }

    #[test]
    fn category_roundtrips_through_str() {
        for c in ContentCategory::ALL {
            assert_eq!(c.as_str().parse::<ContentCategory>().unwrap(), c);
        }
        assert!("video".parse::<ContentCategory>().is_err());
    }
}
