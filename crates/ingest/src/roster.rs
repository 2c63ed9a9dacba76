//! Roster (list page) parsing for both chambers.
//!
//! Rows are read positionally. A row missing any structurally required field,
//! or whose links leave the chamber's allow-list, is dropped silently.

use congreso_core::{Chamber, LegislatorRecord};
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::html::{element_text, normalize_space, select_all, select_within, slug_from_url, to_absolute_url};
use crate::security::HostAllowList;

const DIPUTADOS_ROWS: &str = "#tablaDiputados tbody tr";
const DIPUTADOS_MIN_CELLS: usize = 5;
const SENADO_ROWS: &str = "#senadoresTabla tbody tr";
const SENADO_MIN_CELLS: usize = 6;
const SENADO_EMPTY_BLOC: &str = "Sin bloque";

/// Split "Surname, Given Names" on the first comma.
///
/// Without a usable comma the first whitespace token is taken as surname.
pub fn split_full_name(full_name: &str) -> (String, String) {
    if let Some((surname, given)) = full_name.split_once(',') {
        let surname = normalize_space(surname);
        let given = normalize_space(given);
        if !surname.is_empty() && !given.is_empty() {
            return (surname, given);
        }
    }

    let normalized = normalize_space(full_name);
    match normalized.split_once(' ') {
        Some((surname, given)) => (surname.to_string(), given.to_string()),
        None => (normalized, String::new()),
    }
}

fn roster_rows<'a>(doc: &'a Html, css: &str) -> Result<Vec<ElementRef<'a>>> {
    let rows = select_all(doc, css);
    if rows.is_empty() {
        return Err(ScrapeError::StructureMissing(css.to_string()));
    }
    Ok(rows)
}

/// Keep `url` only if it is allow-listed.
fn allowed(url: Option<String>, allow: &HostAllowList) -> Option<String> {
    let url = url?;
    if allow.allows(&url) {
        Some(url)
    } else {
        tracing::debug!(url = %url, "skipping link outside allow-list");
        None
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub fn parse_deputies_roster(html: &str, base: &Url, allow: &HostAllowList) -> Vec<LegislatorRecord> {
    let doc = Html::parse_document(html);
    let rows = match roster_rows(&doc, DIPUTADOS_ROWS) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "deputies roster table not found");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut deputies = Vec::new();
    for row in rows {
        let Some(record) = parse_deputy_row(&row, base, allow) else {
            continue;
        };
        if !seen.insert(record.slug.clone()) {
            tracing::debug!(slug = %record.slug, "duplicate roster row");
            continue;
        }
        deputies.push(record);
    }

    tracing::info!(count = deputies.len(), "parsed deputies roster");
    deputies
}

fn parse_deputy_row(row: &ElementRef<'_>, base: &Url, allow: &HostAllowList) -> Option<LegislatorRecord> {
    let cells = select_within(row, "td");
    if cells.len() < DIPUTADOS_MIN_CELLS {
        return None;
    }

    let photo = select_within(&cells[0], "img")
        .first()
        .and_then(|img| to_absolute_url(base, img.value().attr("src")));
    let photo_url = allowed(photo, allow)?;

    let anchor = select_within(&cells[1], "a").into_iter().next()?;
    let full_name = element_text(&anchor);
    let profile_url = allowed(to_absolute_url(base, anchor.value().attr("href")), allow)?;
    let slug = slug_from_url(&profile_url)?;

    let district = non_empty(element_text(&cells[2]))?;
    let bloc = non_empty(element_text(&cells[3]))?;
    let term = non_empty(element_text(&cells[4]))?;

    let (surname, given_name) = split_full_name(&full_name);
    if surname.is_empty() || given_name.is_empty() {
        return None;
    }

    Some(LegislatorRecord {
        chamber: Chamber::Diputados,
        display_name: format!("{} {}", given_name, surname),
        surname: Some(surname),
        given_name: Some(given_name),
        district,
        bloc,
        term,
        profession: String::new(),
        birth_date: String::new(),
        birth_date_parsed: None,
        email: String::new(),
        total_projects: 0,
        projects_as_sponsor: None,
        projects_as_co_sponsor: None,
        photo_url,
        profile_url,
        slug,
    })
}

pub fn parse_senators_roster(html: &str, base: &Url, allow: &HostAllowList) -> Vec<LegislatorRecord> {
    let doc = Html::parse_document(html);
    let rows = match roster_rows(&doc, SENADO_ROWS) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "senators roster table not found");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut senators = Vec::new();
    for row in rows {
        let Some(record) = parse_senator_row(&row, base, allow) else {
            continue;
        };
        if !seen.insert(record.slug.clone()) {
            tracing::debug!(slug = %record.slug, "duplicate roster row");
            continue;
        }
        senators.push(record);
    }

    tracing::info!(count = senators.len(), "parsed senators roster");
    senators
}

fn parse_senator_row(row: &ElementRef<'_>, base: &Url, allow: &HostAllowList) -> Option<LegislatorRecord> {
    let cells = select_within(row, "td");
    if cells.len() < SENADO_MIN_CELLS {
        return None;
    }

    let anchor = select_within(&cells[1], "a").into_iter().next()?;
    let name = non_empty(element_text(&anchor))?;
    let profile_url = allowed(to_absolute_url(base, anchor.value().attr("href")), allow)?;
    let slug = slug_from_url(&profile_url)?;

    let district = non_empty(element_text(&cells[2]))?;
    let bloc = non_empty(element_text(&cells[3])).unwrap_or_else(|| SENADO_EMPTY_BLOC.to_string());
    let term = non_empty(senate_term(&cells[4]))?;
    let email = senate_email(&cells[5]);

    let photo = select_within(&cells[0], "img").into_iter().next().and_then(|img| {
        let attrs = img.value();
        let src = attrs
            .attr("data-src")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| attrs.attr("src"));
        to_absolute_url(base, src)
    });
    let photo_url = allowed(photo, allow)?;

    Some(LegislatorRecord {
        chamber: Chamber::Senadores,
        display_name: name,
        surname: None,
        given_name: None,
        district,
        bloc,
        term,
        profession: String::new(),
        birth_date: String::new(),
        birth_date_parsed: None,
        email,
        total_projects: 0,
        projects_as_sponsor: None,
        projects_as_co_sponsor: None,
        photo_url,
        profile_url,
        slug,
    })
}

/// Start and end dates may sit on separate lines of the cell.
fn senate_term(cell: &ElementRef<'_>) -> String {
    let tokens: Vec<String> = cell
        .text()
        .flat_map(|chunk| chunk.lines())
        .map(normalize_space)
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.len() >= 2 {
        format!("{} - {}", tokens[0], tokens[1])
    } else {
        element_text(cell)
    }
}

fn senate_email(cell: &ElementRef<'_>) -> String {
    let Some(anchor) = select_within(cell, r#"a[href^="mailto:"]"#).into_iter().next() else {
        return String::new();
    };
    let text = element_text(&anchor);
    if !text.is_empty() {
        return text;
    }
    anchor
        .value()
        .attr("href")
        .and_then(|href| href.strip_prefix("mailto:"))
        .map(normalize_space)
        .unwrap_or_default()
}
