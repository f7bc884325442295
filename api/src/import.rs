//! CSV lyric import.
//!
//! A CSV carries one song's lines with the header `no,original,romanized,translation_en`
//! (`romanized` may be omitted). The whole import, artist and song included,
//! commits in a single transaction.

use std::collections::{HashMap, HashSet};
use std::io;

use sqlx::sqlite::SqlitePool;

use crate::catalog::{self, NewSong};
use crate::models::{Artist, NewLine, Song};

pub const REQUIRED_HEADERS: [&str; 3] = ["no", "original", "translation_en"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("CSV must include headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open CSV: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ImportError {
    fn from(e: sqlx::Error) -> Self {
        ImportError::Database(e.into())
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub artist: String,
    pub title: String,
    pub year: Option<i64>,
    pub publish: bool,
}

/// Lines accepted from a CSV plus the rows that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLines {
    pub lines: Vec<NewLine>,
    /// 1-based record numbers (header excluded) of skipped rows.
    pub skipped: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub artist: Artist,
    pub song: Song,
    pub song_created: bool,
    pub lines_imported: usize,
    pub rows_skipped: usize,
}

/// Parses lyric lines, checking the header before reading any row.
pub fn parse_lines<R: io::Read>(reader: R) -> Result<ParsedLines, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

    if REQUIRED_HEADERS.iter().any(|h| !columns.contains_key(h)) {
        return Err(ImportError::MissingHeaders(
            REQUIRED_HEADERS.iter().map(|h| h.to_string()).collect(),
        ));
    }

    let no_col = columns["no"];
    let original_col = columns["original"];
    let translation_col = columns["translation_en"];
    let romanized_col = columns.get("romanized").copied();

    let mut parsed = ParsedLines::default();
    let mut seen = HashSet::new();

    for (index, record) in csv_reader.records().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::warn!("skipping row {}: {}", row, e);
                parsed.skipped.push(row);
                continue;
            }
        };

        if record.len() != headers.len() {
            tracing::warn!(
                "skipping row {}: expected {} columns, found {}",
                row,
                headers.len(),
                record.len()
            );
            parsed.skipped.push(row);
            continue;
        }

        let no: i64 = match record[no_col].parse() {
            Ok(no) => no,
            Err(_) => {
                tracing::warn!("skipping row {}: line number '{}' is not an integer", row, &record[no_col]);
                parsed.skipped.push(row);
                continue;
            }
        };

        if !seen.insert(no) {
            tracing::warn!("skipping row {}: line number {} already seen", row, no);
            parsed.skipped.push(row);
            continue;
        }

        let romanized = romanized_col
            .map(|col| record[col].to_string())
            .filter(|text| !text.is_empty());

        parsed.lines.push(NewLine {
            no,
            original: record[original_col].to_string(),
            romanized,
            translation_en: record[translation_col].to_string(),
        });
    }

    Ok(parsed)
}

/// Imports one song's lines, replacing any lines it already had.
///
/// Re-running with the same CSV and options leaves the store unchanged.
pub async fn import_song<R: io::Read>(
    pool: &SqlitePool,
    reader: R,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let parsed = parse_lines(reader)?;

    let mut tx = pool.begin().await?;

    let artist = catalog::get_or_create_artist(&mut tx, &options.artist).await?;

    let (song, song_created) = match catalog::find_song(&mut tx, artist.id, options.title.trim()).await? {
        Some(existing) => {
            let song = sqlx::query_as::<_, Song>(
                r#"
                UPDATE songs SET year = ?, is_published = ?
                WHERE id = ?
                RETURNING id, artist_id, title, album_id, year, slug, is_published
                "#,
            )
            .bind(options.year)
            .bind(options.publish)
            .bind(existing.id)
            .fetch_one(&mut *tx)
            .await?;
            (song, false)
        }
        None => {
            let song = catalog::insert_song(
                &mut tx,
                &NewSong {
                    artist_id: artist.id,
                    title: options.title.clone(),
                    year: options.year,
                    is_published: options.publish,
                    ..Default::default()
                },
            )
            .await?;
            (song, true)
        }
    };

    let lines_imported = catalog::replace_lines(&mut tx, song.id, &parsed.lines).await?;

    tx.commit().await?;

    tracing::info!(
        "imported {} lines for '{}' by {} ({} rows skipped)",
        lines_imported,
        song.title,
        artist.name,
        parsed.skipped.len()
    );

    Ok(ImportReport {
        artist,
        song,
        song_created,
        lines_imported,
        rows_skipped: parsed.skipped.len(),
    })
}
