//! Profile page parsing.
//!
//! Upstream markup differs between legislator pages, so every field is
//! described by an ordered list of anchors. New markup variants are handled by
//! appending another anchor, not by another parser.

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;
use url::Url;

use crate::html::{element_text, normalize_space, select_all, select_first, to_absolute_url};
use crate::security::HostAllowList;

const MIN_BIRTH_YEAR: i32 = 1900;

/// Where a field value may be found on a profile page.
#[derive(Clone, Copy, Debug)]
pub enum Anchor {
    /// Text of the first element matching a CSS selector.
    Css(&'static str),
    /// Text of the first `<span>` following a `<strong>` whose text contains the label.
    Label(&'static str),
}

pub const PROFESSION_ANCHORS: &[Anchor] = &[
    Anchor::Css(".encabezadoProfesion span"),
    Anchor::Label("Profesión:"),
];

pub const BIRTH_DATE_ANCHORS: &[Anchor] = &[
    Anchor::Css(".encabezadoFecha span"),
    Anchor::Label("Fecha de Nac."),
];

/// Selectors for the profile photo, tried in order; the `src` attribute is used.
pub const PHOTO_SELECTORS: &[&str] = &[
    ".siteDiputadoPerfil .box1 img",
    r#"img[title*="Foto Diputado"]"#,
];

/// Best-effort fields from a profile page; absent values are empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileDetails {
    pub profession: String,
    pub birth_date: String,
    pub birth_date_parsed: Option<NaiveDate>,
    pub photo_url: String,
}

pub fn parse_deputy_profile(html: &str, base: &Url, allow: &HostAllowList) -> ProfileDetails {
    let doc = Html::parse_document(html);

    let profession = find_field(&doc, PROFESSION_ANCHORS).unwrap_or_default();
    let birth_date = find_field(&doc, BIRTH_DATE_ANCHORS).unwrap_or_default();
    let birth_date_parsed = parse_birth_date(&birth_date);

    let photo_url = PHOTO_SELECTORS
        .iter()
        .filter_map(|css| select_first(&doc, css))
        .find_map(|img| to_absolute_url(base, img.value().attr("src")))
        .filter(|url| allow.allows(url))
        .unwrap_or_default();

    ProfileDetails {
        profession,
        birth_date,
        birth_date_parsed,
        photo_url,
    }
}

/// First non-empty value among `anchors`.
pub fn find_field(doc: &Html, anchors: &[Anchor]) -> Option<String> {
    anchors.iter().find_map(|anchor| {
        let value = match anchor {
            Anchor::Css(css) => select_first(doc, css).map(|el| element_text(&el)),
            Anchor::Label(label) => labeled_value(doc, label),
        }?;
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn labeled_value(doc: &Html, label: &str) -> Option<String> {
    select_all(doc, "strong")
        .into_iter()
        .filter(|strong| element_text(strong).contains(label))
        .find_map(|strong| {
            strong
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sibling| sibling.value().name() == "span")
                .map(|span| element_text(&span))
        })
}

fn birth_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").ok())
        .as_ref()
}

/// Parse `DD/MM/YYYY` with a real calendar date and a plausible year.
pub fn parse_birth_date(text: &str) -> Option<NaiveDate> {
    let text = normalize_space(text);
    let caps = birth_date_pattern()?.captures(&text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;

    if !(MIN_BIRTH_YEAR..=Utc::now().year()).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DIPUTADOS_HOSTS;

    fn base() -> Url {
        Url::parse("https://www.diputados.gov.ar").unwrap()
    }

    #[test]
    fn reads_primary_anchors() {
        let html = r#"<div class="siteDiputadoPerfil">
              <div class="box1"><img src="/img/fotos/jdoe_medium.jpg"></div>
              <p class="encabezadoProfesion">Profesión: <span> Abogado </span></p>
              <p class="encabezadoFecha">Fecha de Nac.: <span>05/03/1975</span></p>
            </div>"#;

        let details = parse_deputy_profile(html, &base(), &DIPUTADOS_HOSTS);
        assert_eq!(details.profession, "Abogado");
        assert_eq!(details.birth_date, "05/03/1975");
        assert_eq!(details.birth_date_parsed, NaiveDate::from_ymd_opt(1975, 3, 5));
        assert_eq!(details.photo_url, "https://www.diputados.gov.ar/img/fotos/jdoe_medium.jpg");
    }

    #[test]
    fn falls_back_to_labeled_spans() {
        let html = r#"<div>
              <img title="Foto Diputado Juan Doe" src="https://www4.hcdn.gob.ar/fotos/jdoe.jpg">
              <p><strong>Profesión:</strong> <span>Docente</span></p>
              <p><strong>Fecha de Nac.:</strong><em>x</em><span>1 de mayo</span></p>
            </div>"#;

        let details = parse_deputy_profile(html, &base(), &DIPUTADOS_HOSTS);
        assert_eq!(details.profession, "Docente");
        assert_eq!(details.birth_date, "1 de mayo");
        assert_eq!(details.birth_date_parsed, None);
        assert_eq!(details.photo_url, "https://www4.hcdn.gob.ar/fotos/jdoe.jpg");
    }

    #[test]
    fn missing_fields_are_empty() {
        let details = parse_deputy_profile("<html><body></body></html>", &base(), &DIPUTADOS_HOSTS);
        assert_eq!(details, ProfileDetails::default());
    }

    #[test]
    fn foreign_photo_is_ignored() {
        let html = r#"<div class="siteDiputadoPerfil"><div class="box1">
              <img src="https://cdn.evil.example.com/x.jpg"></div></div>"#;
        let details = parse_deputy_profile(html, &base(), &DIPUTADOS_HOSTS);
        assert!(details.photo_url.is_empty());
    }

    #[test]
    fn birth_date_requires_strict_plausible_format() {
        assert_eq!(parse_birth_date("7/9/1962"), NaiveDate::from_ymd_opt(1962, 9, 7));
        assert_eq!(parse_birth_date("31/02/1980"), None);
        assert_eq!(parse_birth_date("01/01/1850"), None);
        assert_eq!(parse_birth_date("01/01/2999"), None);
        assert_eq!(parse_birth_date("1980-01-01"), None);
        assert_eq!(parse_birth_date(""), None);
    }
}
