//! Per-legislator enrichment.
//!
//! Sub-requests for one legislator run concurrently and settle independently:
//! whatever fails falls back to its empty default. Only when every sub-request
//! fails is the outcome reported as a failure, and even then the roster record
//! is kept.

use congreso_core::LegislatorRecord;
use url::Url;

use crate::activity::{try_count_deputy_projects, try_count_senator_projects, ProjectRole};
use crate::fetcher::PageSource;
use crate::photo::resolve_photo_url;
use crate::profile::{parse_deputy_profile, ProfileDetails};
use crate::security::HostAllowList;

/// Outcome of enriching one roster record.
#[derive(Clone, Debug)]
pub struct Enrichment {
    pub record: LegislatorRecord,
    /// Set when nothing beyond the roster data could be obtained.
    pub failure: Option<String>,
}

impl Enrichment {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Absorb a sub-request failure into its default value, remembering the reason.
fn settle<T: Default>(
    outcome: crate::error::Result<T>,
    what: &str,
    record: &LegislatorRecord,
    failures: &mut Vec<String>,
) -> T {
    match outcome {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                chamber = %record.chamber,
                slug = %record.slug,
                error = %e,
                "{} unavailable",
                what
            );
            failures.push(format!("{}: {}", what, e));
            T::default()
        }
    }
}

pub async fn enrich_deputy(
    source: &dyn PageSource,
    base: &Url,
    allow: &HostAllowList,
    mut record: LegislatorRecord,
) -> Enrichment {
    let profile_url = record.profile_url.clone();
    let (detail, sponsor, co_sponsor) = tokio::join!(
        source.fetch(&profile_url),
        try_count_deputy_projects(source, &profile_url, ProjectRole::Sponsor),
        try_count_deputy_projects(source, &profile_url, ProjectRole::CoSponsor),
    );

    let mut failures = Vec::new();
    let details = match settle(detail.map(Some), "profile", &record, &mut failures) {
        Some(html) => parse_deputy_profile(&html, base, allow),
        None => ProfileDetails::default(),
    };
    let sponsor: u32 = settle(sponsor, "sponsored projects", &record, &mut failures);
    let co_sponsor: u32 = settle(co_sponsor, "co-sponsored projects", &record, &mut failures);

    record.photo_url = resolve_photo_url(source, &details.photo_url, &record.photo_url, allow).await;
    record.profession = details.profession;
    record.birth_date = details.birth_date;
    record.birth_date_parsed = details.birth_date_parsed;
    record.projects_as_sponsor = Some(sponsor);
    record.projects_as_co_sponsor = Some(co_sponsor);
    record.total_projects = sponsor.saturating_add(co_sponsor);

    let failure = (failures.len() == 3).then(|| failures.join("; "));
    Enrichment { record, failure }
}

/// The senate roster already carries every biographical field it publishes,
/// so only the project count and photo are looked up.
pub async fn enrich_senator(
    source: &dyn PageSource,
    allow: &HostAllowList,
    mut record: LegislatorRecord,
) -> Enrichment {
    let mut failures = Vec::new();
    let count = try_count_senator_projects(source, &record.profile_url).await;
    record.total_projects = settle(count, "projects", &record, &mut failures);
    record.photo_url = resolve_photo_url(source, "", &record.photo_url, allow).await;

    let failure = (!failures.is_empty()).then(|| failures.join("; "));
    Enrichment { record, failure }
}
