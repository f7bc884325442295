use anyhow::{Context, Result};
use clap::Parser;
use lyricslib_api::config::Config;
use lyricslib_api::db;
use lyricslib_api::import::{import_song, ImportOptions};
use std::fs::File;
use std::path::PathBuf;

/// Import one song's lyric lines from a CSV file.
#[derive(Parser)]
#[command(name = "import_song", long_about = None)]
struct Args {
    /// CSV with columns no, original, romanized (optional), translation_en
    #[arg(value_name = "CSV")]
    csv_path: PathBuf,

    #[arg(long)]
    artist: String,

    #[arg(long)]
    title: String,

    #[arg(long)]
    year: Option<i64>,

    /// Mark the song as published
    #[arg(long)]
    publish: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("import_song=info,lyricslib_api=info")
        .init();

    let args = Args::parse();

    let file = File::open(&args.csv_path)
        .with_context(|| format!("failed to open {}", args.csv_path.display()))?;

    let config = Config::from_env()?;
    let pool = db::init_db(&config)
        .await
        .context("failed to initialize database")?;
    tracing::info!("database connection established");

    let options = ImportOptions {
        artist: args.artist,
        title: args.title,
        year: args.year,
        publish: args.publish,
    };
    let report = import_song(&pool, file, &options).await?;

    if report.rows_skipped > 0 {
        tracing::warn!("{} malformed rows were skipped", report.rows_skipped);
    }
    println!(
        "Imported {} ({} lines, {})",
        report.song.title,
        report.lines_imported,
        if report.song_created { "new song" } else { "replaced existing lines" }
    );

    Ok(())
}
