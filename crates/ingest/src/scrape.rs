//! Chamber-wide scrape: roster fetch, per-legislator fan-out, progress.

use congreso_core::{Chamber, LegislatorRecord, ProgressEvent};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::chamber::{ChamberSite, DiputadosSite, SenadoSite};
use crate::config::ScrapeConfig;
use crate::enrich::Enrichment;
use crate::error::{Result, ScrapeError};
use crate::fetcher::{HttpFetcher, PageSource};
use crate::progress::ProgressSender;

pub struct ChamberScraper {
    site: Arc<dyn ChamberSite>,
    source: Arc<dyn PageSource>,
    concurrency: usize,
}

impl ChamberScraper {
    pub fn new(site: Arc<dyn ChamberSite>, source: Arc<dyn PageSource>, concurrency: usize) -> Self {
        Self {
            site,
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Scraper for `chamber` talking to the real website.
    pub fn for_chamber(chamber: Chamber, config: &ScrapeConfig) -> Result<Self> {
        let (site, concurrency): (Arc<dyn ChamberSite>, usize) = match chamber {
            Chamber::Diputados => (Arc::new(DiputadosSite::new()), config.diputados_concurrency),
            Chamber::Senadores => (Arc::new(SenadoSite::new()), config.senado_concurrency),
        };
        let fetcher = HttpFetcher::new(config, *site.allow_list())?;
        Ok(Self::new(site, Arc::new(fetcher), concurrency))
    }

    pub fn chamber(&self) -> Chamber {
        self.site.chamber()
    }

    /// Scrape every legislator of the chamber, in roster order.
    ///
    /// With `progress`, legislators are processed one at a time so events
    /// arrive index by index; without it they run `concurrency` at a time.
    /// Only a roster that cannot be fetched or yields no rows is an error.
    pub async fn scrape(&self, progress: Option<&ProgressSender>) -> Result<Vec<LegislatorRecord>> {
        let chamber = self.chamber();
        let roster = self.load_roster().await?;
        let total = roster.len();
        tracing::info!(%chamber, total, "roster loaded");

        let records = match progress {
            Some(progress) => {
                progress.emit(ProgressEvent::list_loaded(chamber, total)).await;
                self.run_sequential(roster, progress).await
            }
            None => self.run_pooled(roster).await,
        };

        tracing::info!(%chamber, count = records.len(), "scrape finished");
        Ok(records)
    }

    async fn load_roster(&self) -> Result<Vec<LegislatorRecord>> {
        let url = self.site.roster_url();
        let html = self.source.fetch(url).await.map_err(|e| {
            tracing::error!(chamber = %self.chamber(), error = %e, "roster fetch failed");
            ScrapeError::UpstreamUnavailable(e.to_string())
        })?;

        let roster = self.site.parse_roster(&html);
        if roster.is_empty() {
            tracing::error!(chamber = %self.chamber(), url, "roster has no usable rows");
            return Err(ScrapeError::UpstreamUnavailable(format!(
                "no legislators found at {}",
                url
            )));
        }
        Ok(roster)
    }

    /// Enrich on its own task so a panic stays confined to this legislator.
    async fn enrich_isolated(&self, record: LegislatorRecord) -> Enrichment {
        let site = Arc::clone(&self.site);
        let source = Arc::clone(&self.source);
        let fallback = record.clone();

        match tokio::spawn(async move { site.enrich(source.as_ref(), record).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(slug = %fallback.slug, error = %e, "enrichment task aborted");
                Enrichment {
                    record: fallback,
                    failure: Some(format!("enrichment aborted: {}", e)),
                }
            }
        }
    }

    async fn run_sequential(
        &self,
        roster: Vec<LegislatorRecord>,
        progress: &ProgressSender,
    ) -> Vec<LegislatorRecord> {
        let total = roster.len();
        let mut records = Vec::with_capacity(total);

        for (i, record) in roster.into_iter().enumerate() {
            let index = i + 1;
            progress.emit(ProgressEvent::start(index, total, &record)).await;

            let outcome = self.enrich_isolated(record).await;
            let event = match &outcome.failure {
                Some(reason) => ProgressEvent::error(index, total, &outcome.record, reason.clone()),
                None => ProgressEvent::done(index, total, &outcome.record),
            };
            progress.emit(event).await;
            records.push(outcome.record);
        }
        records
    }

    async fn run_pooled(&self, roster: Vec<LegislatorRecord>) -> Vec<LegislatorRecord> {
        let mut outcomes: Vec<(usize, Enrichment)> = stream::iter(roster.into_iter().enumerate())
            .map(|(i, record)| async move { (i, self.enrich_isolated(record).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(i, _)| *i);
        outcomes
            .into_iter()
            .map(|(_, outcome)| {
                if let Some(reason) = &outcome.failure {
                    tracing::warn!(slug = %outcome.record.slug, reason = %reason, "legislator kept with roster data only");
                }
                outcome.record
            })
            .collect()
    }
}
