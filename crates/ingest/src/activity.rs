//! Legislative project counting.
//!
//! The paginator summary ("123 Proyectos Encontrados") is authoritative when
//! present. Otherwise the rows of the first result page are counted, which
//! undercounts multi-page listings. For the senate the last page is fetched as
//! well and the total is derived from the first and last page sizes.

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use url::Url;

use crate::error::Result;
use crate::fetcher::PageSource;
use crate::html::{select_all, select_first, select_within};

const PAGINATOR_SELECTOR: &str = ".textoPaginador";
const DEPUTY_ROW_SELECTORS: &[&str] = &["table#tablesorter tbody tr", "#listadoDeProyectos tbody tr"];
const SENATE_ROWS: &str = r#"[id="3"] table tr"#;
pub const SENATE_PAGE_PARAM: &str = "ProyectosSenador";

/// Role of a deputy on a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectRole {
    Sponsor,
    CoSponsor,
}

impl ProjectRole {
    pub fn query_value(&self) -> &'static str {
        match self {
            ProjectRole::Sponsor => "firmante",
            ProjectRole::CoSponsor => "cofirmante",
        }
    }
}

fn paginator_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)([\d.]+)\s+proyectos?\s+encontrados?").ok())
        .as_ref()
}

fn senate_page_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(&format!(r"{}=(\d+)", SENATE_PAGE_PARAM)).ok())
        .as_ref()
}

/// Parse "<N> Proyectos Encontrados", with `.` as thousands separator.
pub fn parse_paginator_count(text: &str) -> Option<u32> {
    let caps = paginator_pattern()?.captures(text)?;
    caps[1].replace('.', "").parse().ok()
}

/// Paginator total from the dedicated element, then from the whole page text.
fn paginator_total(doc: &Html) -> Option<u32> {
    let from_element = select_first(doc, PAGINATOR_SELECTOR)
        .and_then(|el| parse_paginator_count(&el.text().collect::<String>()));
    from_element.or_else(|| parse_paginator_count(&doc.root_element().text().collect::<String>()))
}

fn row_count(doc: &Html, selectors: &[&str]) -> u32 {
    selectors
        .iter()
        .map(|css| select_all(doc, css).len())
        .find(|count| *count > 0)
        .unwrap_or(0) as u32
}

/// Count for one deputy listing page: paginator total or first-page rows.
pub fn count_from_listing(html: &str) -> u32 {
    let doc = Html::parse_document(html);
    paginator_total(&doc).unwrap_or_else(|| row_count(&doc, DEPUTY_ROW_SELECTORS))
}

pub fn deputy_projects_url(profile_url: &str, role: ProjectRole) -> String {
    let base = if profile_url.ends_with('/') {
        profile_url.to_string()
    } else {
        format!("{}/", profile_url)
    };
    format!("{}listado-proyectos.html?tipoFirmante={}", base, role.query_value())
}

pub async fn try_count_deputy_projects(
    source: &dyn PageSource,
    profile_url: &str,
    role: ProjectRole,
) -> Result<u32> {
    let url = deputy_projects_url(profile_url, role);
    let html = source.fetch(&url).await?;
    Ok(count_from_listing(&html))
}

/// Like [`try_count_deputy_projects`], but a failure counts as zero.
pub async fn count_deputy_projects(source: &dyn PageSource, profile_url: &str, role: ProjectRole) -> u32 {
    match try_count_deputy_projects(source, profile_url, role).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(url = profile_url, role = role.query_value(), error = %e, "project count unavailable");
            0
        }
    }
}

/// What a senate project page tells us without further requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SenatePage {
    pub paginator_total: Option<u32>,
    pub rows: u32,
    pub last_page: u32,
}

pub fn read_senate_page(html: &str) -> SenatePage {
    let doc = Html::parse_document(html);
    SenatePage {
        paginator_total: paginator_total(&doc),
        rows: senate_rows(&doc),
        last_page: senate_last_page(html),
    }
}

/// Rows carrying at least one data cell. Header rows hold only `th`, and the
/// parser may have moved them into an implicit `tbody`.
fn senate_rows(doc: &Html) -> u32 {
    select_all(doc, SENATE_ROWS)
        .iter()
        .filter(|row| !select_within(row, "td").is_empty())
        .count() as u32
}

/// Highest page number linked from the page, `1` when there is no pagination.
pub fn senate_last_page(html: &str) -> u32 {
    let Some(pattern) = senate_page_pattern() else {
        return 1;
    };
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|page| *page > 0)
        .max()
        .unwrap_or(1)
}

pub fn senate_page_url(profile_url: &str, page: u32) -> Option<String> {
    let mut url = Url::parse(profile_url).ok()?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SENATE_PAGE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(SENATE_PAGE_PARAM, &page.to_string());
    Some(url.to_string())
}

/// Total assuming every page but the last is as full as the first.
pub fn estimate_total(last_page: u32, first_page_rows: u32, last_page_rows: u32) -> u32 {
    last_page
        .saturating_sub(1)
        .saturating_mul(first_page_rows)
        .saturating_add(last_page_rows)
}

pub async fn try_count_senator_projects(source: &dyn PageSource, profile_url: &str) -> Result<u32> {
    let first = read_senate_page(&source.fetch(profile_url).await?);
    if let Some(total) = first.paginator_total {
        return Ok(total);
    }
    if first.last_page <= 1 {
        return Ok(first.rows);
    }

    let Some(last_url) = senate_page_url(profile_url, first.last_page) else {
        return Ok(first.rows);
    };
    match source.fetch(&last_url).await {
        Ok(html) => {
            let last = read_senate_page(&html);
            Ok(estimate_total(first.last_page, first.rows, last.rows))
        }
        Err(e) => {
            tracing::warn!(url = %last_url, error = %e, "last project page unavailable, using first page only");
            Ok(first.rows)
        }
    }
}

pub async fn count_senator_projects(source: &dyn PageSource, profile_url: &str) -> u32 {
    match try_count_senator_projects(source, profile_url).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(url = profile_url, error = %e, "project count unavailable");
            0
        }
    }
}
