//! Canned pages for offline tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, ScrapeError};
use crate::fetcher::PageSource;

/// In-memory [`PageSource`]: unknown URLs fail like a 404 after retries.
#[derive(Default)]
pub struct StubSource {
    pages: HashMap<String, String>,
    live: HashSet<String>,
    panics: HashSet<String>,
    slow: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
    slow_in_flight: AtomicUsize,
    slow_peak: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// Make `url` answer probes successfully.
    pub fn live(mut self, url: &str) -> Self {
        self.live.insert(url.to_string());
        self
    }

    /// Fetching `url` panics instead of returning.
    pub fn panic_on(mut self, url: &str) -> Self {
        self.panics.insert(url.to_string());
        self
    }

    /// Fetching `url` takes `delay` and counts towards [`Self::peak_slow_fetches`].
    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.slow.insert(url.to_string(), delay);
        self
    }

    /// Most slow fetches that were ever running at the same time.
    pub fn peak_slow_fetches(&self) -> usize {
        self.slow_peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageSource for StubSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if self.panics.contains(url) {
            panic!("stub panic for {url}");
        }
        match self.slow.get(url) {
            Some(delay) => {
                let now = self.slow_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.slow_peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(*delay).await;
                self.slow_in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            None => tokio::task::yield_now().await,
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::network(url, "HTTP 404 Not Found"))
    }

    async fn probe(&self, url: &str) -> bool {
        self.live.contains(url)
    }
}

/// `n` rows for a project listing table.
pub fn listing_rows(n: usize) -> String {
    (1..=n)
        .map(|i| format!("<tr><td>{i}-D-2024</td><td>Proyecto de ley {i}</td></tr>"))
        .collect()
}

/// Senate profile page with `rows` projects and links up to `last_page`.
pub fn senate_projects_page(rows: usize, last_page: u32) -> String {
    let links: String = (2..=last_page)
        .map(|p| format!(r#"<a href="?ProyectosSenador={p}">{p}</a> "#))
        .collect();
    format!(
        r#"<html><body><div id="3"><table>
             <thead><tr><th>Expediente</th><th>Tipo</th></tr></thead>
             <tbody>{}</tbody></table>
           <div class="paginacion">{links}</div></div></body></html>"#,
        listing_rows(rows)
    )
}

/// Lower-chamber roster page with one well-formed row per `(slug, "SURNAME, Given")`.
pub fn deputies_roster(entries: &[(&str, &str)]) -> String {
    let rows: String = entries
        .iter()
        .map(|(slug, name)| {
            format!(
                r#"<tr><td><img src="/img/fotos/{slug}_small.jpg"></td>
                   <td><a href="/diputados/{slug}/">{name}</a></td>
                   <td>Mendoza</td><td>FRENTE PRO</td><td>2023-2027</td></tr>"#
            )
        })
        .collect();
    format!(r#"<html><body><table id="tablaDiputados"><tbody>{rows}</tbody></table></body></html>"#)
}

/// Upper-chamber roster page with one row per `(id, name)`.
pub fn senators_roster(entries: &[(&str, &str)]) -> String {
    let rows: String = entries
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<tr><td><img data-src="/bundles/senadosenadores/images/fsena/{id}.gif"></td>
                   <td><a href="/senadores/senador/{id}">{name}</a></td>
                   <td>SALTA</td><td>Unión Cívica Radical</td><td>2019-2025</td>
                   <td><a href="mailto:s{id}@senado.gob.ar">s{id}@senado.gob.ar</a></td></tr>"#
            )
        })
        .collect();
    format!(r#"<html><body><table id="senadoresTabla"><tbody>{rows}</tbody></table></body></html>"#)
}

/// Lower-chamber profile page.
pub fn deputy_profile(profession: &str, birth_date: &str) -> String {
    format!(
        r#"<html><body><div class="siteDiputadoPerfil">
             <div class="box1"><img src="/img/fotos/perfil.jpg"></div>
             <p class="encabezadoProfesion">Profesión: <span>{profession}</span></p>
             <p class="encabezadoFecha">Fecha de Nac.: <span>{birth_date}</span></p>
           </div></body></html>"#
    )
}
