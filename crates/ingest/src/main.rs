use anyhow::{bail, Context, Result};
use congreso_core::Chamber;
use ingest::{init_schema, open_db, record_sync_run, upsert_legislators, ChamberScraper, ScrapeConfig};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATA_DIR: &str = "data";
const DB_FILE: &str = "congreso.db";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let chambers = parse_target(std::env::args().nth(1).as_deref())?;
    let config = ScrapeConfig::from_env();
    let db_path = PathBuf::from(DATA_DIR).join(DB_FILE);

    tracing::info!("Congreso Ingest - Argentine National Congress");
    tracing::info!(db = %db_path.display(), ?config, "settings");

    let mut conn = open_db(&db_path)?;
    init_schema(&conn)?;

    let mut failures = 0;
    for chamber in chambers {
        tracing::info!("--- {} ---", chamber);
        match ingest_chamber(&mut conn, chamber, &config).await {
            Ok(count) => tracing::info!(%chamber, count, "chamber synced"),
            Err(e) => {
                failures += 1;
                tracing::error!(%chamber, error = %e, "failed to sync chamber");
            }
        }
    }

    if failures > 0 {
        tracing::warn!(failures, "ingest finished with failures");
    } else {
        tracing::info!("ingest finished");
    }
    Ok(())
}

fn parse_target(arg: Option<&str>) -> Result<Vec<Chamber>> {
    match arg {
        None | Some("all") => Ok(vec![Chamber::Diputados, Chamber::Senadores]),
        Some(name) => match name.parse::<Chamber>() {
            Ok(chamber) => Ok(vec![chamber]),
            Err(e) => bail!("{} (expected diputados, senadores or all)", e),
        },
    }
}

async fn ingest_chamber(conn: &mut Connection, chamber: Chamber, config: &ScrapeConfig) -> Result<usize> {
    let scraper = ChamberScraper::for_chamber(chamber, config)?;
    let records = scraper
        .scrape(None)
        .await
        .with_context(|| format!("scraping {}", chamber))?;

    let stats = upsert_legislators(conn, &records)?;
    record_sync_run(conn, chamber, &stats)?;
    tracing::info!(%chamber, inserted = stats.inserted, updated = stats.updated, "stored legislators");
    Ok(stats.total())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
