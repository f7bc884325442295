use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use lyricslib_api::config::Config;
use lyricslib_api::{accounts, db, stats};
use sqlx::sqlite::SqlitePool;

#[derive(Parser)]
#[command(name = "lyricsctl")]
#[command(about = "lyricslib maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute daily site stats from page views
    Rollup {
        /// Single UTC day to roll up (YYYY-MM-DD)
        #[arg(short, long, conflicts_with = "days")]
        date: Option<NaiveDate>,

        /// Roll up this many days ending today
        #[arg(short = 'n', long, default_value_t = 1)]
        days: i64,
    },

    /// Grant or revoke staff access
    Staff {
        #[arg(value_name = "USERNAME")]
        username: String,

        #[arg(long)]
        revoke: bool,
    },

    /// Print the dashboard summary
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("lyricsctl=info,lyricslib_api=info")
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let pool = db::init_db(&config)
        .await
        .context("failed to initialize database")?;

    match cli.command {
        Commands::Rollup { date, days } => handle_rollup(&pool, date, days).await,
        Commands::Staff { username, revoke } => handle_staff(&pool, &username, !revoke).await,
        Commands::Stats => handle_stats(&pool).await,
    }
}

async fn handle_rollup(pool: &SqlitePool, date: Option<NaiveDate>, days: i64) -> Result<()> {
    let dates: Vec<NaiveDate> = match date {
        Some(date) => vec![date],
        None => {
            if days < 1 {
                bail!("--days must be at least 1");
            }
            let today = Utc::now().date_naive();
            (0..days).rev().map(|back| today - Duration::days(back)).collect()
        }
    };

    for date in dates {
        let row = stats::rollup_day(pool, date).await?;
        println!(
            "{}: {} views, {} visitors, {} ips ({} registered, {} anonymous)",
            row.date,
            row.total_views,
            row.unique_visitors,
            row.unique_ips,
            row.registered_user_views,
            row.anonymous_views
        );
    }

    Ok(())
}

async fn handle_staff(pool: &SqlitePool, username: &str, is_staff: bool) -> Result<()> {
    if !accounts::set_staff(pool, username, is_staff).await? {
        bail!("no user named '{}'", username);
    }
    if is_staff {
        tracing::info!("{} is now staff", username);
    } else {
        tracing::info!("{} is no longer staff", username);
    }
    Ok(())
}

async fn handle_stats(pool: &SqlitePool) -> Result<()> {
    let dashboard = stats::calculate_dashboard(pool, Utc::now()).await?;

    println!("views:");
    println!("  total: {}", dashboard.views.total);
    println!("  today: {}", dashboard.views.today);
    println!("  last 7 days: {}", dashboard.views.last_7_days);
    println!("  last 30 days: {}", dashboard.views.last_30_days);

    println!("unique visitors (ips):");
    println!("  today: {}", dashboard.unique_visitors.today);
    println!("  last 7 days: {}", dashboard.unique_visitors.last_7_days);
    println!("  last 30 days: {}", dashboard.unique_visitors.last_30_days);

    println!("top songs (30 days):");
    for entry in &dashboard.top_songs {
        println!("  {} - {} views", entry.title, entry.views);
    }

    println!("top artists (30 days):");
    for entry in &dashboard.top_artists {
        println!("  {} - {} views", entry.title, entry.views);
    }

    let engagement = &dashboard.engagement;
    let format_avg = |avg: Option<f64>| avg.map(|a| format!("{:.2}", a)).unwrap_or_else(|| "-".into());
    println!("engagement:");
    println!("  average song rating: {}", format_avg(engagement.average_song_rating));
    println!("  average artist rating: {}", format_avg(engagement.average_artist_rating));
    println!(
        "  favorites: {} songs, {} artists",
        engagement.favorite_songs, engagement.favorite_artists
    );
    println!("  comments per day: {:.2}", engagement.comments_per_day);
    println!("  ratings per day: {:.2}", engagement.ratings_per_day);

    let totals = &dashboard.totals;
    println!(
        "content: {} artists, {} albums, {} songs ({} published), {} lines, {} users",
        totals.artists, totals.albums, totals.songs, totals.published_songs, totals.lines, totals.users
    );

    Ok(())
}
