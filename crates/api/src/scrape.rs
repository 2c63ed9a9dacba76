//! Admin endpoints that run a chamber scrape and store the result.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use congreso_core::{new_request_id, Chamber, LegislatorRecord, ProgressEvent};
use ingest::{record_sync_run, upsert_legislators, ChamberScraper, ProgressSender, UpsertStats};
use metrics::counter;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use utoipa::ToSchema;

use crate::{parse_chamber, ApiError, ApiResult, AppState};

const PROGRESS_BUFFER: usize = 64;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScrapeResponse {
    pub request_id: String,
    pub chamber: Chamber,
    pub scraped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub synced_at: String,
}

#[derive(Debug, Serialize)]
struct StartPayload {
    request_id: String,
    chamber: Chamber,
}

#[derive(Debug, Serialize)]
struct StreamDone {
    #[serde(flatten)]
    result: ScrapeResponse,
    /// Legislators kept with roster data only.
    failed: usize,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

fn scraper_for(state: &AppState, chamber: Chamber) -> ApiResult<Arc<ChamberScraper>> {
    state.scrapers.get(&chamber).cloned().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new("scraper_unavailable", &format!("no scraper configured for {}", chamber))),
        )
    })
}

fn scrape_permit(state: &AppState, chamber: Chamber) -> ApiResult<OwnedSemaphorePermit> {
    state.scrape_permits.clone().try_acquire_owned().map_err(|_| {
        tracing::warn!(%chamber, "scrape refused, too many running");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::new("scrape_in_progress", "too many scrapes running, retry later")),
        )
    })
}

async fn store(state: &AppState, chamber: Chamber, records: &[LegislatorRecord]) -> anyhow::Result<UpsertStats> {
    let mut conn = state.db.lock().await;
    let stats = upsert_legislators(&mut conn, records)?;
    record_sync_run(&conn, chamber, &stats)?;
    Ok(stats)
}

fn storage_error(e: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    tracing::error!(error = %e, "failed to store scraped legislators");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new("storage_error", &e.to_string())),
    )
}

#[utoipa::path(
    post,
    path = "/v1/admin/scrape/{chamber}",
    tag = "admin",
    params(("chamber" = String, Path, description = "diputados or senadores")),
    responses(
        (status = 200, description = "Scrape stored", body = ScrapeResponse),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 429, description = "Too many failed attempts or scrapes running", body = ApiError),
        (status = 502, description = "Roster page unavailable", body = ApiError)
    )
)]
pub async fn scrape_chamber(
    State(state): State<AppState>,
    Path(chamber): Path<String>,
) -> ApiResult<Json<ScrapeResponse>> {
    let chamber = parse_chamber(&chamber)?;
    let scraper = scraper_for(&state, chamber)?;
    let _permit = scrape_permit(&state, chamber)?;
    counter!("scrape_runs_total", "chamber" => chamber.as_str(), "mode" => "json").increment(1);

    let records = scraper.scrape(None).await.map_err(|e| {
        counter!("scrape_failures_total", "chamber" => chamber.as_str()).increment(1);
        tracing::error!(%chamber, error = %e, "scrape failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(ApiError::new("upstream_unavailable", &e.to_string())),
        )
    })?;

    let stats = store(&state, chamber, &records).await.map_err(storage_error)?;
    tracing::info!(%chamber, scraped = records.len(), inserted = stats.inserted, updated = stats.updated, "scrape stored");

    Ok(Json(ScrapeResponse {
        request_id: new_request_id(),
        chamber,
        scraped: records.len(),
        inserted: stats.inserted,
        updated: stats.updated,
        synced_at: Utc::now().to_rfc3339(),
    }))
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!(event = name, error = %e, "failed to encode event");
            None
        }
    }
}

async fn send(tx: &mpsc::Sender<Event>, name: &str, payload: &impl Serialize) {
    if let Some(event) = sse_event(name, payload) {
        // A closed stream means the client left; the scrape still completes.
        let _ = tx.send(event).await;
    }
}

/// Stream a scrape as server-sent events: `start`, one `progress` per
/// [`ProgressEvent`], then a single `done` or `error`.
pub async fn stream_scrape(
    State(state): State<AppState>,
    Path(chamber): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let chamber = parse_chamber(&chamber)?;
    let scraper = scraper_for(&state, chamber)?;
    let permit = scrape_permit(&state, chamber)?;
    counter!("scrape_runs_total", "chamber" => chamber.as_str(), "mode" => "stream").increment(1);

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    tokio::spawn(run_streaming_scrape(state, chamber, scraper, tx, permit));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn run_streaming_scrape(
    state: AppState,
    chamber: Chamber,
    scraper: Arc<ChamberScraper>,
    tx: mpsc::Sender<Event>,
    _permit: OwnedSemaphorePermit,
) {
    let request_id = new_request_id();
    send(&tx, "start", &StartPayload { request_id: request_id.clone(), chamber }).await;

    let (progress, mut progress_rx) = ProgressSender::channel(PROGRESS_BUFFER);
    let forward_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        let mut failed: usize = 0;
        while let Some(event) = progress_rx.recv().await {
            if matches!(event, ProgressEvent::DeputyError { .. } | ProgressEvent::SenatorError { .. }) {
                failed += 1;
            }
            send(&forward_tx, "progress", &event).await;
        }
        failed
    });

    let outcome = scraper.scrape(Some(&progress)).await;
    drop(progress);
    let failed = forwarder.await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "progress forwarder stopped");
        0
    });

    match outcome {
        Ok(records) => match store(&state, chamber, &records).await {
            Ok(stats) => {
                let done = StreamDone {
                    result: ScrapeResponse {
                        request_id,
                        chamber,
                        scraped: records.len(),
                        inserted: stats.inserted,
                        updated: stats.updated,
                        synced_at: Utc::now().to_rfc3339(),
                    },
                    failed,
                };
                send(&tx, "done", &done).await;
            }
            Err(e) => {
                tracing::error!(%chamber, error = %e, "failed to store streamed scrape");
                send(&tx, "error", &ErrorPayload { message: e.to_string() }).await;
            }
        },
        Err(e) => {
            counter!("scrape_failures_total", "chamber" => chamber.as_str()).increment(1);
            tracing::error!(%chamber, error = %e, "streamed scrape failed");
            send(&tx, "error", &ErrorPayload { message: e.to_string() }).await;
        }
    }
}
