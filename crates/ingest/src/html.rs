//! Text and URL helpers shared by the page parsers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Collapse whitespace runs to a single space and trim.
pub fn normalize_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text content of an element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    normalize_space(&element.text().collect::<String>())
}

/// Parse a selector known at compile time.
///
/// Selector literals in this crate are fixed strings, so a parse failure is
/// a programming error; it is logged and treated as "matches nothing".
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::error!(selector = css, error = ?e, "invalid selector");
            None
        }
    }
}

/// First element of `doc` matching `css`.
pub fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    doc.select(&sel).next()
}

pub fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => doc.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Elements matching `css` below `element`.
pub fn select_within<'a>(element: &ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => element.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Resolve `href` against `base`; empty or unparseable input yields `None`.
pub fn to_absolute_url(base: &Url, href: Option<&str>) -> Option<String> {
    let href = href.map(str::trim).filter(|h| !h.is_empty())?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Last non-empty path segment of an absolute URL.
pub fn slug_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_space("  Buenos\n\t Aires  "), "Buenos Aires");
        assert_eq!(normalize_space("\n \t"), "");
    }

    #[test]
    fn resolves_relative_urls() {
        let base = Url::parse("https://www.diputados.gov.ar").unwrap();
        assert_eq!(
            to_absolute_url(&base, Some("/diputados/jdoe/")).as_deref(),
            Some("https://www.diputados.gov.ar/diputados/jdoe/")
        );
        assert_eq!(
            to_absolute_url(&base, Some("https://www4.hcdn.gob.ar/a.jpg")).as_deref(),
            Some("https://www4.hcdn.gob.ar/a.jpg")
        );
        assert_eq!(to_absolute_url(&base, Some("   ")), None);
        assert_eq!(to_absolute_url(&base, None), None);
    }

    #[test]
    fn slug_is_last_non_empty_segment() {
        assert_eq!(
            slug_from_url("https://www.diputados.gov.ar/diputados/jdoe/").as_deref(),
            Some("jdoe")
        );
        assert_eq!(
            slug_from_url("https://www.senado.gob.ar/senadores/senador/1234").as_deref(),
            Some("1234")
        );
        assert_eq!(slug_from_url("https://www.senado.gob.ar/"), None);
    }

    #[test]
    fn element_text_is_normalized() {
        let doc = Html::parse_fragment("<p> Juan \n <b>Pérez</b> </p>");
        let p = select_first(&doc, "p").unwrap();
        assert_eq!(element_text(&p), "Juan Pérez");
    }
}
