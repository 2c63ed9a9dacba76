pub mod activity;
pub mod chamber;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod html;
pub mod loader;
pub mod photo;
pub mod profile;
pub mod progress;
pub mod roster;
pub mod scrape;
pub mod security;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{count_deputy_projects, count_senator_projects, ProjectRole};
pub use chamber::{ChamberSite, DiputadosSite, SenadoSite};
pub use config::ScrapeConfig;
pub use db::{
    get_legislator, init_schema, list_legislators, open_db, ranking, record_sync_run, set_summary,
    LegislatorFilter,
};
pub use enrich::Enrichment;
pub use error::ScrapeError;
pub use fetcher::{HttpFetcher, PageSource};
pub use loader::{upsert_legislators, UpsertStats};
pub use progress::ProgressSender;
pub use roster::{parse_deputies_roster, parse_senators_roster};
pub use scrape::ChamberScraper;
pub use security::{HostAllowList, DIPUTADOS_HOSTS, SENADO_HOSTS};
pub use summary::{
    fallback_summary, is_legacy_summary, summarize, GeminiGenerator, Summary, SummaryError,
    SummaryGenerator, SummaryInput, SummarySource,
};
