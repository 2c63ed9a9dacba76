use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use congreso_core::{Chamber, StoredLegislator};
use ingest::{
    get_legislator, is_legacy_summary, list_legislators, ranking, set_summary, summarize,
    LegislatorFilter, SummaryInput, SummarySource,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{parse_chamber, ApiError, ApiResult, AppState};

const DEFAULT_RANKING_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub district: Option<String>,
    pub bloc: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RankingQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LegislatorList {
    pub chamber: Chamber,
    pub count: usize,
    pub legislators: Vec<StoredLegislator>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
    /// `cached`, `gemini`, `fallback` or `legacy`.
    pub source: &'static str,
    pub cached: bool,
    pub persisted: bool,
}

fn db_error(e: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    tracing::error!(error = %e, "database query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new("storage_error", "database query failed")),
    )
}

fn not_found(chamber: Chamber, slug: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("not_found", &format!("no legislator '{}' in {}", slug, chamber))),
    )
}

#[utoipa::path(
    get,
    path = "/v1/legislators/{chamber}",
    tag = "legislators",
    params(
        ("chamber" = String, Path, description = "diputados or senadores"),
        ("district" = Option<String>, Query, description = "Case-insensitive district match"),
        ("bloc" = Option<String>, Query, description = "Case-insensitive bloc match")
    ),
    responses(
        (status = 200, description = "Stored legislators ordered by name", body = LegislatorList),
        (status = 400, description = "Unknown chamber", body = ApiError)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Path(chamber): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<LegislatorList>> {
    let chamber = parse_chamber(&chamber)?;
    let filter = LegislatorFilter {
        district: query.district,
        bloc: query.bloc,
    };
    let legislators = {
        let conn = state.db.lock().await;
        list_legislators(&conn, chamber, &filter).map_err(db_error)?
    };
    Ok(Json(LegislatorList {
        chamber,
        count: legislators.len(),
        legislators,
    }))
}

pub async fn detail(
    State(state): State<AppState>,
    Path((chamber, slug)): Path<(String, String)>,
) -> ApiResult<Json<StoredLegislator>> {
    let chamber = parse_chamber(&chamber)?;
    let conn = state.db.lock().await;
    match get_legislator(&conn, chamber, &slug).map_err(db_error)? {
        Some(legislator) => Ok(Json(legislator)),
        None => Err(not_found(chamber, &slug)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/ranking/{chamber}",
    tag = "legislators",
    params(
        ("chamber" = String, Path, description = "diputados or senadores"),
        ("limit" = Option<usize>, Query, description = "1 to 100, default 10")
    ),
    responses(
        (status = 200, description = "Legislators with the most projects", body = LegislatorList),
        (status = 422, description = "Limit out of range", body = ApiError)
    )
)]
pub async fn top(
    State(state): State<AppState>,
    Path(chamber): Path<String>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<Json<LegislatorList>> {
    let chamber = parse_chamber(&chamber)?;
    if let Err(e) = query.validate() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError::from_validation(e)),
        ));
    }

    let limit = query.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
    let legislators = {
        let conn = state.db.lock().await;
        ranking(&conn, chamber, limit).map_err(db_error)?
    };
    Ok(Json(LegislatorList {
        chamber,
        count: legislators.len(),
        legislators,
    }))
}

/// Return the stored summary, or generate one and store it.
///
/// Fallback text is returned but not stored, so a later request can still
/// get a generated summary. A stored summary from a retired template is
/// regenerated and kept only if generation fails.
pub async fn summary(
    State(state): State<AppState>,
    Path((chamber, slug)): Path<(String, String)>,
) -> ApiResult<Json<SummaryResponse>> {
    let chamber = parse_chamber(&chamber)?;
    let stored = {
        let conn = state.db.lock().await;
        get_legislator(&conn, chamber, &slug).map_err(db_error)?
    }
    .ok_or_else(|| not_found(chamber, &slug))?;

    let existing = stored.summary.trim().to_string();
    if !existing.is_empty() && !is_legacy_summary(&existing) {
        counter!("summary_requests_total", "source" => "cached").increment(1);
        return Ok(Json(SummaryResponse {
            summary: existing,
            source: "cached",
            cached: true,
            persisted: true,
        }));
    }

    let input = SummaryInput::from_record(&stored.record);
    let generated = summarize(state.summarizer.as_deref(), &input).await;

    let response = match generated.source {
        SummarySource::Gemini => {
            let conn = state.db.lock().await;
            set_summary(&conn, chamber, &slug, &generated.text).map_err(db_error)?;
            SummaryResponse {
                summary: generated.text,
                source: "gemini",
                cached: false,
                persisted: true,
            }
        }
        SummarySource::Fallback if !existing.is_empty() => SummaryResponse {
            summary: existing,
            source: "legacy",
            cached: true,
            persisted: true,
        },
        SummarySource::Fallback => SummaryResponse {
            summary: generated.text,
            source: "fallback",
            cached: false,
            persisted: false,
        },
    };

    counter!("summary_requests_total", "source" => response.source).increment(1);
    Ok(Json(response))
}
