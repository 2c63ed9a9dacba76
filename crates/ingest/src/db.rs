use anyhow::{Context, Result};
use chrono::NaiveDate;
use congreso_core::{Chamber, LegislatorRecord, StoredLegislator};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::loader::UpsertStats;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS legislator (
    id TEXT PRIMARY KEY,
    chamber TEXT NOT NULL,
    upsert_key TEXT NOT NULL,
    slug TEXT NOT NULL,
    display_name TEXT NOT NULL,
    surname TEXT,
    given_name TEXT,
    district TEXT NOT NULL,
    bloc TEXT NOT NULL,
    term TEXT NOT NULL,
    profession TEXT NOT NULL DEFAULT '',
    birth_date TEXT NOT NULL DEFAULT '',
    birth_date_parsed TEXT,
    email TEXT NOT NULL DEFAULT '',
    total_projects INTEGER NOT NULL DEFAULT 0,
    projects_as_sponsor INTEGER,
    projects_as_co_sponsor INTEGER,
    photo_url TEXT NOT NULL,
    profile_url TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    last_synced_at TEXT NOT NULL DEFAULT (datetime('now')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(chamber, upsert_key)
);

CREATE TABLE IF NOT EXISTS sync_run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chamber TEXT NOT NULL,
    synced_at TEXT NOT NULL DEFAULT (datetime('now')),
    inserted INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_legislator_slug ON legislator(chamber, slug);
CREATE INDEX IF NOT EXISTS idx_legislator_district ON legislator(chamber, district);
CREATE INDEX IF NOT EXISTS idx_legislator_projects ON legislator(chamber, total_projects);
"#;

const COLUMNS: &str = "display_name, surname, given_name, district, bloc, term, profession, \
    birth_date, birth_date_parsed, email, total_projects, projects_as_sponsor, \
    projects_as_co_sponsor, photo_url, profile_url, slug, summary, last_synced_at";

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn record_sync_run(conn: &Connection, chamber: Chamber, stats: &UpsertStats) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_run (chamber, inserted, updated) VALUES (?1, ?2, ?3)",
        params![chamber.as_str(), stats.inserted as i64, stats.updated as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Optional equality filters for [`list_legislators`].
#[derive(Clone, Debug, Default)]
pub struct LegislatorFilter {
    pub district: Option<String>,
    pub bloc: Option<String>,
}

fn date_from_column(value: Option<String>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
}

pub(crate) fn date_to_column(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

fn stored_from_row(chamber: Chamber, row: &Row<'_>) -> rusqlite::Result<StoredLegislator> {
    Ok(StoredLegislator {
        record: LegislatorRecord {
            chamber,
            display_name: row.get(0)?,
            surname: row.get(1)?,
            given_name: row.get(2)?,
            district: row.get(3)?,
            bloc: row.get(4)?,
            term: row.get(5)?,
            profession: row.get(6)?,
            birth_date: row.get(7)?,
            birth_date_parsed: date_from_column(row.get(8)?),
            email: row.get(9)?,
            total_projects: row.get(10)?,
            projects_as_sponsor: row.get(11)?,
            projects_as_co_sponsor: row.get(12)?,
            photo_url: row.get(13)?,
            profile_url: row.get(14)?,
            slug: row.get(15)?,
        },
        summary: row.get(16)?,
        last_synced_at: row.get(17)?,
    })
}

/// Legislators of a chamber ordered by name. Empty filter values are ignored.
pub fn list_legislators(
    conn: &Connection,
    chamber: Chamber,
    filter: &LegislatorFilter,
) -> Result<Vec<StoredLegislator>> {
    let district = filter.district.as_deref().filter(|d| !d.trim().is_empty());
    let bloc = filter.bloc.as_deref().filter(|b| !b.trim().is_empty());

    let sql = format!(
        "SELECT {COLUMNS} FROM legislator
         WHERE chamber = ?1
           AND (?2 IS NULL OR district = ?2 COLLATE NOCASE)
           AND (?3 IS NULL OR bloc = ?3 COLLATE NOCASE)
         ORDER BY display_name COLLATE NOCASE"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![chamber.as_str(), district, bloc], |row| stored_from_row(chamber, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Most active legislators first.
pub fn ranking(conn: &Connection, chamber: Chamber, limit: usize) -> Result<Vec<StoredLegislator>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM legislator
         WHERE chamber = ?1
         ORDER BY total_projects DESC, display_name COLLATE NOCASE
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![chamber.as_str(), limit as i64], |row| stored_from_row(chamber, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_legislator(conn: &Connection, chamber: Chamber, slug: &str) -> Result<Option<StoredLegislator>> {
    let sql = format!("SELECT {COLUMNS} FROM legislator WHERE chamber = ?1 AND slug = ?2");
    let found = conn
        .query_row(&sql, params![chamber.as_str(), slug], |row| stored_from_row(chamber, row))
        .optional()?;
    Ok(found)
}

/// Store a generated summary; `false` when the legislator is unknown.
pub fn set_summary(conn: &Connection, chamber: Chamber, slug: &str, summary: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE legislator SET summary = ?3 WHERE chamber = ?1 AND slug = ?2",
        params![chamber.as_str(), slug, summary],
    )?;
    Ok(changed > 0)
}
