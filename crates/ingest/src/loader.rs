use anyhow::Result;
use congreso_core::LegislatorRecord;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::db::date_to_column;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Insert or refresh scraped records in one transaction.
///
/// Records are matched on chamber plus [`LegislatorRecord::upsert_key`]. The
/// stored summary is never touched; `last_synced_at` is refreshed on every
/// write.
pub fn upsert_legislators(conn: &mut Connection, records: &[LegislatorRecord]) -> Result<UpsertStats> {
    let tx = conn.transaction()?;
    let mut stats = UpsertStats::default();

    for record in records {
        let chamber = record.chamber.as_str();
        let key = record.upsert_key();
        let birth_date_parsed = date_to_column(record.birth_date_parsed);

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM legislator WHERE chamber = ?1 AND upsert_key = ?2",
                params![chamber, key],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                tx.execute(
                    r#"UPDATE legislator SET
                        slug = ?2, display_name = ?3, surname = ?4, given_name = ?5,
                        district = ?6, bloc = ?7, term = ?8, profession = ?9,
                        birth_date = ?10, birth_date_parsed = ?11, email = ?12,
                        total_projects = ?13, projects_as_sponsor = ?14,
                        projects_as_co_sponsor = ?15, photo_url = ?16, profile_url = ?17,
                        last_synced_at = datetime('now')
                    WHERE id = ?1"#,
                    params![
                        id,
                        record.slug,
                        record.display_name,
                        record.surname,
                        record.given_name,
                        record.district,
                        record.bloc,
                        record.term,
                        record.profession,
                        record.birth_date,
                        birth_date_parsed,
                        record.email,
                        record.total_projects,
                        record.projects_as_sponsor,
                        record.projects_as_co_sponsor,
                        record.photo_url,
                        record.profile_url,
                    ],
                )?;
                stats.updated += 1;
            }
            None => {
                tx.execute(
                    r#"INSERT INTO legislator (
                        id, chamber, upsert_key, slug, display_name, surname, given_name,
                        district, bloc, term, profession, birth_date, birth_date_parsed, email,
                        total_projects, projects_as_sponsor, projects_as_co_sponsor,
                        photo_url, profile_url)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"#,
                    params![
                        Uuid::new_v4().to_string(),
                        chamber,
                        key,
                        record.slug,
                        record.display_name,
                        record.surname,
                        record.given_name,
                        record.district,
                        record.bloc,
                        record.term,
                        record.profession,
                        record.birth_date,
                        birth_date_parsed,
                        record.email,
                        record.total_projects,
                        record.projects_as_sponsor,
                        record.projects_as_co_sponsor,
                        record.photo_url,
                        record.profile_url,
                    ],
                )?;
                stats.inserted += 1;
            }
        }
    }

    tx.commit()?;
    tracing::info!(inserted = stats.inserted, updated = stats.updated, "upserted legislators");
    Ok(stats)
}

#[cfg(test)]
pub(crate) fn test_record(chamber: congreso_core::Chamber, slug: &str) -> LegislatorRecord {
    LegislatorRecord {
        chamber,
        display_name: format!("Legisladora {slug}"),
        surname: None,
        given_name: None,
        district: "Córdoba".to_string(),
        bloc: "UCR".to_string(),
        term: "2023-2027".to_string(),
        profession: String::new(),
        birth_date: String::new(),
        birth_date_parsed: None,
        email: String::new(),
        total_projects: 0,
        projects_as_sponsor: None,
        projects_as_co_sponsor: None,
        photo_url: format!("https://www.senado.gob.ar/fotos/{slug}.gif"),
        profile_url: format!("https://www.senado.gob.ar/senadores/senador/{slug}"),
        slug: slug.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_legislator, init_schema, open_db, set_summary};
    use congreso_core::Chamber;
    use std::path::PathBuf;

    fn memory_db() -> Connection {
        let conn = open_db(&PathBuf::from(":memory:")).unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let mut conn = memory_db();
        let mut record = test_record(Chamber::Diputados, "jdoe");

        let stats = upsert_legislators(&mut conn, &[record.clone()]).unwrap();
        assert_eq!(stats, UpsertStats { inserted: 1, updated: 0 });

        record.total_projects = 17;
        let stats = upsert_legislators(&mut conn, &[record]).unwrap();
        assert_eq!(stats, UpsertStats { inserted: 0, updated: 1 });
        assert_eq!(stats.total(), 1);

        let stored = get_legislator(&conn, Chamber::Diputados, "jdoe").unwrap().unwrap();
        assert_eq!(stored.record.total_projects, 17);
    }

    #[test]
    fn upsert_preserves_summary() {
        let mut conn = memory_db();
        let record = test_record(Chamber::Senadores, "42");
        upsert_legislators(&mut conn, &[record.clone()]).unwrap();
        set_summary(&conn, Chamber::Senadores, "42", "Texto previo.").unwrap();

        upsert_legislators(&mut conn, &[record]).unwrap();
        let stored = get_legislator(&conn, Chamber::Senadores, "42").unwrap().unwrap();
        assert_eq!(stored.summary, "Texto previo.");
    }

    #[test]
    fn senators_are_keyed_by_profile_url() {
        let mut conn = memory_db();
        let record = test_record(Chamber::Senadores, "42");
        let mut renamed = record.clone();
        renamed.slug = "42-bis".to_string();

        upsert_legislators(&mut conn, &[record]).unwrap();
        let stats = upsert_legislators(&mut conn, &[renamed]).unwrap();
        assert_eq!(stats.updated, 1);
        assert!(get_legislator(&conn, Chamber::Senadores, "42-bis").unwrap().is_some());
    }

    #[test]
    fn same_key_in_both_chambers_is_distinct() {
        let mut conn = memory_db();
        let stats = upsert_legislators(
            &mut conn,
            &[test_record(Chamber::Diputados, "x"), test_record(Chamber::Senadores, "x")],
        )
        .unwrap();
        assert_eq!(stats.inserted, 2);
    }
}
