use async_trait::async_trait;
use congreso_core::{Chamber, LegislatorRecord};
use url::Url;

use crate::enrich::{enrich_deputy, enrich_senator, Enrichment};
use crate::fetcher::PageSource;
use crate::roster::{parse_deputies_roster, parse_senators_roster};
use crate::security::{HostAllowList, DIPUTADOS_HOSTS, SENADO_HOSTS};

pub const DIPUTADOS_BASE_URL: &str = "https://www.diputados.gov.ar";
pub const DIPUTADOS_ROSTER_URL: &str = "https://www.diputados.gov.ar/diputados/";
pub const SENADO_BASE_URL: &str = "https://www.senado.gob.ar";
pub const SENADO_ROSTER_URL: &str = "https://www.senado.gob.ar/senadores/listados/listaSenadoRes";

/// What differs between the two chamber websites.
#[async_trait]
pub trait ChamberSite: Send + Sync + 'static {
    fn chamber(&self) -> Chamber;

    fn roster_url(&self) -> &str;

    fn allow_list(&self) -> &HostAllowList;

    /// Basic records from the roster page, in page order.
    fn parse_roster(&self, html: &str) -> Vec<LegislatorRecord>;

    async fn enrich(&self, source: &dyn PageSource, record: LegislatorRecord) -> Enrichment;
}

fn parse_base(url: &str) -> Url {
    match Url::parse(url) {
        Ok(base) => base,
        // Both base URLs are literals above.
        Err(e) => unreachable!("invalid base url {url}: {e}"),
    }
}

pub struct DiputadosSite {
    base: Url,
}

impl DiputadosSite {
    pub fn new() -> Self {
        Self {
            base: parse_base(DIPUTADOS_BASE_URL),
        }
    }
}

impl Default for DiputadosSite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChamberSite for DiputadosSite {
    fn chamber(&self) -> Chamber {
        Chamber::Diputados
    }

    fn roster_url(&self) -> &str {
        DIPUTADOS_ROSTER_URL
    }

    fn allow_list(&self) -> &HostAllowList {
        &DIPUTADOS_HOSTS
    }

    fn parse_roster(&self, html: &str) -> Vec<LegislatorRecord> {
        parse_deputies_roster(html, &self.base, &DIPUTADOS_HOSTS)
    }

    async fn enrich(&self, source: &dyn PageSource, record: LegislatorRecord) -> Enrichment {
        enrich_deputy(source, &self.base, &DIPUTADOS_HOSTS, record).await
    }
}

pub struct SenadoSite {
    base: Url,
}

impl SenadoSite {
    pub fn new() -> Self {
        Self {
            base: parse_base(SENADO_BASE_URL),
        }
    }
}

impl Default for SenadoSite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChamberSite for SenadoSite {
    fn chamber(&self) -> Chamber {
        Chamber::Senadores
    }

    fn roster_url(&self) -> &str {
        SENADO_ROSTER_URL
    }

    fn allow_list(&self) -> &HostAllowList {
        &SENADO_HOSTS
    }

    fn parse_roster(&self, html: &str) -> Vec<LegislatorRecord> {
        parse_senators_roster(html, &self.base, &SENADO_HOSTS)
    }

    async fn enrich(&self, source: &dyn PageSource, record: LegislatorRecord) -> Enrichment {
        enrich_senator(source, &SENADO_HOSTS, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sites_stay_inside_their_allow_lists() {
        let diputados = DiputadosSite::new();
        let senado = SenadoSite::new();
        assert!(diputados.allow_list().allows(diputados.roster_url()));
        assert!(senado.allow_list().allows(senado.roster_url()));
        assert!(!senado.allow_list().allows(diputados.roster_url()));
    }
}
