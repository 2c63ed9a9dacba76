use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub const PROJECT_NAME: &str = "congreso";
pub const PROJECT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus<'a> {
    pub status: &'a str,
    pub service: &'a str,
    pub version: &'a str,
}

pub fn health_status(service: &'static str) -> HealthStatus<'static> {
    HealthStatus {
        status: "ok",
        service,
        version: PROJECT_VERSION,
    }
}

/// One of the two legislative bodies, each scraped from its own website.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    Diputados,
    Senadores,
}

impl Chamber {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::Diputados => "diputados",
            Chamber::Senadores => "senadores",
        }
    }

    /// Role label used in generated text.
    pub fn role_label(&self) -> &'static str {
        match self {
            Chamber::Diputados => "diputada o diputado nacional",
            Chamber::Senadores => "senadora o senador nacional",
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chamber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diputados" | "diputado" => Ok(Chamber::Diputados),
            "senadores" | "senador" | "senado" => Ok(Chamber::Senadores),
            other => Err(format!("unknown chamber '{}'", other)),
        }
    }
}

/// A legislator as scraped from a chamber website.
///
/// Built from a roster row with empty detail fields, then filled in by the
/// per-legislator enrichment. Counts are unsigned so they can never go
/// negative; missing data is represented by `0` or an empty string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LegislatorRecord {
    pub chamber: Chamber,
    pub display_name: String,
    /// Lower chamber only; the upper chamber publishes a single name field.
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub district: String,
    pub bloc: String,
    pub term: String,
    pub profession: String,
    /// Verbatim text from the profile page.
    pub birth_date: String,
    pub birth_date_parsed: Option<NaiveDate>,
    pub email: String,
    pub total_projects: u32,
    pub projects_as_sponsor: Option<u32>,
    pub projects_as_co_sponsor: Option<u32>,
    pub photo_url: String,
    pub profile_url: String,
    pub slug: String,
}

impl LegislatorRecord {
    /// Natural key used by the store: slug for deputies, profile link for senators.
    pub fn upsert_key(&self) -> &str {
        match self.chamber {
            Chamber::Diputados => &self.slug,
            Chamber::Senadores => &self.profile_url,
        }
    }
}

/// A record as persisted, with the fields owned by the store.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StoredLegislator {
    #[serde(flatten)]
    pub record: LegislatorRecord,
    pub summary: String,
    pub last_synced_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeputyRef {
    pub surname: String,
    pub given_name: String,
    pub slug: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenatorRef {
    pub name: String,
    pub profile_url: String,
}

/// Lifecycle events reported while a chamber is scraped.
///
/// Indices are 1-based; `total` is the roster size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    #[serde(rename = "list_loaded")]
    DeputiesListLoaded { total: usize },
    DeputyStart {
        index: usize,
        total: usize,
        deputy: DeputyRef,
    },
    DeputyDone {
        index: usize,
        total: usize,
        deputy: DeputyRef,
        total_projects: u32,
        profession: String,
        birth_date: String,
    },
    DeputyError {
        index: usize,
        total: usize,
        deputy: DeputyRef,
        error: String,
    },
    SenatorsListLoaded { total: usize },
    SenatorStart {
        index: usize,
        total: usize,
        senator: SenatorRef,
    },
    SenatorDone {
        index: usize,
        total: usize,
        senator: SenatorRef,
        total_projects: u32,
    },
    SenatorError {
        index: usize,
        total: usize,
        senator: SenatorRef,
        error: String,
    },
}

impl ProgressEvent {
    pub fn list_loaded(chamber: Chamber, total: usize) -> Self {
        match chamber {
            Chamber::Diputados => ProgressEvent::DeputiesListLoaded { total },
            Chamber::Senadores => ProgressEvent::SenatorsListLoaded { total },
        }
    }

    pub fn start(index: usize, total: usize, record: &LegislatorRecord) -> Self {
        match record.chamber {
            Chamber::Diputados => ProgressEvent::DeputyStart {
                index,
                total,
                deputy: deputy_ref(record),
            },
            Chamber::Senadores => ProgressEvent::SenatorStart {
                index,
                total,
                senator: senator_ref(record),
            },
        }
    }

    pub fn done(index: usize, total: usize, record: &LegislatorRecord) -> Self {
        match record.chamber {
            Chamber::Diputados => ProgressEvent::DeputyDone {
                index,
                total,
                deputy: deputy_ref(record),
                total_projects: record.total_projects,
                profession: record.profession.clone(),
                birth_date: record.birth_date.clone(),
            },
            Chamber::Senadores => ProgressEvent::SenatorDone {
                index,
                total,
                senator: senator_ref(record),
                total_projects: record.total_projects,
            },
        }
    }

    pub fn error(index: usize, total: usize, record: &LegislatorRecord, error: String) -> Self {
        match record.chamber {
            Chamber::Diputados => ProgressEvent::DeputyError {
                index,
                total,
                deputy: deputy_ref(record),
                error,
            },
            Chamber::Senadores => ProgressEvent::SenatorError {
                index,
                total,
                senator: senator_ref(record),
                error,
            },
        }
    }

    /// Position of a per-legislator event; `None` for list events.
    pub fn index(&self) -> Option<usize> {
        match self {
            ProgressEvent::DeputiesListLoaded { .. } | ProgressEvent::SenatorsListLoaded { .. } => {
                None
            }
            ProgressEvent::DeputyStart { index, .. }
            | ProgressEvent::DeputyDone { index, .. }
            | ProgressEvent::DeputyError { index, .. }
            | ProgressEvent::SenatorStart { index, .. }
            | ProgressEvent::SenatorDone { index, .. }
            | ProgressEvent::SenatorError { index, .. } => Some(*index),
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self,
            ProgressEvent::DeputyStart { .. } | ProgressEvent::SenatorStart { .. }
        )
    }

    /// `done` or `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::DeputyDone { .. }
                | ProgressEvent::DeputyError { .. }
                | ProgressEvent::SenatorDone { .. }
                | ProgressEvent::SenatorError { .. }
        )
    }
}

fn deputy_ref(record: &LegislatorRecord) -> DeputyRef {
    DeputyRef {
        surname: record.surname.clone().unwrap_or_default(),
        given_name: record.given_name.clone().unwrap_or_default(),
        slug: record.slug.clone(),
    }
}

fn senator_ref(record: &LegislatorRecord) -> SenatorRef {
    SenatorRef {
        name: record.display_name.clone(),
        profile_url: record.profile_url.clone(),
    }
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse<'a> {
    pub service: &'a str,
    pub project: &'a str,
    pub version: &'a str,
}
