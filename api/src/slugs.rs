//! Slug derivation with uniqueness against a table's `slug` column.

use anyhow::Result;
use sqlx::SqliteConnection;

/// Tables that carry a unique `slug` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Artists,
    Albums,
    Songs,
}

impl SlugTable {
    fn table(self) -> &'static str {
        match self {
            SlugTable::Artists => "artists",
            SlugTable::Albums => "albums",
            SlugTable::Songs => "songs",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            SlugTable::Artists => "artist",
            SlugTable::Albums => "album",
            SlugTable::Songs => "song",
        }
    }
}

/// Lowercase, hyphen-separated, ASCII-transliterated form of `text`.
pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}

pub fn base_slug(table: SlugTable, text: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        table.fallback().to_string()
    } else {
        slug
    }
}

/// First free slug among `base`, `base-2`, `base-3`, ...
pub async fn unique_slug(conn: &mut SqliteConnection, table: SlugTable, text: &str) -> Result<String> {
    let base = base_slug(table, text);
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?)", table.table());

    let mut candidate = base.clone();
    let mut n = 2;
    loop {
        let taken: bool = sqlx::query_scalar(&sql)
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Sidhu Moose Wala"), "sidhu-moose-wala");
        assert_eq!(slugify("Sidhu Moose Wala-295"), "sidhu-moose-wala-295");
        assert_eq!(slugify("  AC/DC  "), "ac-dc");
    }

    #[test]
    fn empty_names_fall_back_to_kind() {
        assert_eq!(base_slug(SlugTable::Songs, "!!!"), "song");
        assert_eq!(base_slug(SlugTable::Artists, ""), "artist");
    }

    #[tokio::test]
    async fn unique_slug_appends_suffix_on_collision() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("INSERT INTO artists (name, slug) VALUES ('Karan Aujla', 'karan-aujla')")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO artists (name, slug) VALUES ('karan aujla!', 'karan-aujla-2')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let slug = unique_slug(&mut conn, SlugTable::Artists, "KARAN AUJLA")
            .await
            .unwrap();
        assert_eq!(slug, "karan-aujla-3");
    }
}
