use std::borrow::Cow;
use std::fmt::Write;

use anyhow::Result;
use axum::{extract::State, http::header, response::IntoResponse};
use sqlx::sqlite::SqlitePool;

use crate::catalog;
use crate::error::AppResult;
use crate::AppState;

const CHANGEFREQ: &str = "weekly";

/// Escapes the five XML special characters.
fn xml_escape(s: &str) -> Cow<'_, str> {
    if s.contains(['&', '<', '>', '"', '\'']) {
        let mut escaped = String::with_capacity(s.len() + 8);
        for c in s.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&apos;"),
                _ => escaped.push(c),
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub path: String,
    pub priority: f32,
}

/// Artist, album and published song pages.
pub async fn sitemap_entries(pool: &SqlitePool) -> Result<Vec<SitemapEntry>> {
    let mut entries = Vec::new();

    for artist in catalog::list_artists(pool).await? {
        entries.push(SitemapEntry {
            path: format!("/a/{}/", artist.slug),
            priority: 0.6,
        });
    }
    for album in catalog::list_albums(pool).await? {
        entries.push(SitemapEntry {
            path: format!("/albums/{}/{}/", album.artist_slug, album.slug),
            priority: 0.7,
        });
    }
    for song in catalog::published_songs(pool).await? {
        entries.push(SitemapEntry {
            path: format!("/a/{}/{}/", song.artist_slug, song.slug),
            priority: 0.8,
        });
    }

    Ok(entries)
}

pub fn render(base_url: &str, entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        let loc = format!("{}{}", base_url, entry.path);
        // writing into a String cannot fail
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <changefreq>{}</changefreq>\n    <priority>{:.1}</priority>\n  </url>\n",
            xml_escape(&loc),
            CHANGEFREQ,
            entry.priority
        );
    }
    xml.push_str("</urlset>\n");
    xml
}

pub async fn sitemap(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let entries = sitemap_entries(&state.db).await?;
    let xml = render(&state.config.public_base_url, &entries);
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}
