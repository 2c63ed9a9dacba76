use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use congreso_core::{
    health_status, Chamber, HealthStatus, VersionResponse, PROJECT_NAME, PROJECT_VERSION,
};
use ingest::{init_schema, open_db, ChamberScraper, GeminiGenerator, ScrapeConfig, SummaryGenerator};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{env, net::SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::limit::ConcurrencyLimitLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::ToSchema;

mod attempts;
mod auth;
mod legislators;
mod scrape;

use attempts::AttemptTracker;
use auth::admin_auth_middleware;

const SERVICE_NAME: &str = "congreso-api";
const DB_FILE: &str = "congreso.db";
const SUMMARY_TIMEOUT: Duration = Duration::from_secs(30);
/// Admin requests handled at once. A streamed scrape gives its slot back once
/// the response headers are out, so this does not bound running scrapes.
const MAX_CONCURRENT_ADMIN_REQUESTS: usize = 4;
/// Scrapes hit the upstream sites hard; never run more than this many at once.
pub const MAX_CONCURRENT_SCRAPES: usize = 2;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    pub scrapers: Arc<HashMap<Chamber, Arc<ChamberScraper>>>,
    pub summarizer: Option<Arc<dyn SummaryGenerator>>,
    pub attempts: Arc<AttemptTracker>,
    pub metrics: Option<PrometheusHandle>,
    /// One permit per running scrape, held until the scrape finishes.
    pub scrape_permits: Arc<Semaphore>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cfg = AppConfig::from_env();
    let metrics = init_metrics();

    let db_path = PathBuf::from(&cfg.data_dir).join(DB_FILE);
    let conn = open_db(&db_path)
        .and_then(|conn| init_schema(&conn).map(|_| conn))
        .unwrap_or_else(|e| panic!("failed to open database {}: {e:#}", db_path.display()));

    let scrape_config = ScrapeConfig::from_env();
    let scrapers: HashMap<Chamber, Arc<ChamberScraper>> = [Chamber::Diputados, Chamber::Senadores]
        .into_iter()
        .map(|chamber| {
            let scraper = ChamberScraper::for_chamber(chamber, &scrape_config)
                .unwrap_or_else(|e| panic!("failed to build {chamber} scraper: {e}"));
            (chamber, Arc::new(scraper))
        })
        .collect();

    let summarizer = load_summarizer(&cfg);
    if summarizer.is_none() {
        tracing::warn!("GEMINI_API_KEY not set, summaries use the fallback text");
    }
    if cfg.admin_api_keys.is_empty() {
        tracing::warn!("ADMIN_API_KEYS not set, admin endpoints reject every request");
    }

    let state = AppState {
        config: cfg.clone(),
        db: Arc::new(tokio::sync::Mutex::new(conn)),
        scrapers: Arc::new(scrapers),
        summarizer,
        attempts: Arc::new(AttemptTracker::default()),
        metrics: Some(metrics),
        scrape_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_SCRAPES)),
    };

    let app = build_router(state);
    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .expect("BIND_ADDR must be a valid socket address, e.g. 0.0.0.0:3000");

    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {cfg:?}: {e}. Hint: set BIND_ADDR=127.0.0.1:3101"));

    tracing::info!(
        %addr,
        service = SERVICE_NAME,
        project = PROJECT_NAME,
        env = %cfg.run_env,
        "listening"
    );

    axum::serve(listener, app)
        .await
        .expect("server error while serving requests");
}

fn load_summarizer(cfg: &AppConfig) -> Option<Arc<dyn SummaryGenerator>> {
    let key = cfg.gemini_api_key.as_deref()?;
    match GeminiGenerator::new(key, SUMMARY_TIMEOUT) {
        Ok(generator) => Some(Arc::new(generator)),
        Err(e) => {
            tracing::warn!(error = %e, "summary generator unavailable");
            None
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/v1/version", get(version))
        .route("/v1/legislators/:chamber", get(legislators::list))
        .route("/v1/legislators/:chamber/:slug", get(legislators::detail))
        .route("/v1/legislators/:chamber/:slug/summary", post(legislators::summary))
        .route("/v1/ranking/:chamber", get(legislators::top));

    // Admin routes (require API key)
    let admin_routes = Router::new()
        .route("/v1/admin/scrape/:chamber", post(scrape::scrape_chamber))
        .route("/v1/admin/scrape/:chamber/stream", get(scrape::stream_scrape))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_ADMIN_REQUESTS))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_metrics() -> PrometheusHandle {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health check", body = HealthStatus)
    )
)]
async fn health() -> Json<HealthStatus<'static>> {
    Json(health_status(SERVICE_NAME))
}

#[utoipa::path(
    get,
    path = "/v1/version",
    tag = "health",
    responses(
        (status = 200, description = "Version info", body = VersionResponse)
    )
)]
async fn version() -> Json<VersionResponse<'static>> {
    Json(VersionResponse {
        service: SERVICE_NAME,
        project: PROJECT_NAME,
        version: PROJECT_VERSION,
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::OK, "# metrics recorder not installed\n".to_string()),
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub run_env: String,
    pub data_dir: String,
    pub admin_api_keys: Vec<String>,
    pub gemini_api_key: Option<String>,
}

impl AppConfig {
    fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".to_string()),
            run_env: env::var("RUN_ENV").unwrap_or_else(|_| "local".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            admin_api_keys: env::var("ADMIN_API_KEYS")
                .map(|keys| parse_key_list(&keys))
                .unwrap_or_default(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
        }
    }
}

fn parse_key_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("run_env", &self.run_env)
            .field("data_dir", &self.data_dir)
            .field("admin_api_keys", &self.admin_api_keys.len())
            .field("gemini_api_key", &self.gemini_api_key.is_some())
            .finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub message: String,
    pub details: Vec<String>,
}

impl ApiError {
    pub fn new(message: &str, detail: &str) -> Self {
        ApiError {
            message: message.to_string(),
            details: vec![detail.to_string()],
        }
    }

    fn from_validation(err: validator::ValidationErrors) -> Self {
        let details = err
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| format!("{}: {}", field, e.code)))
            .collect::<Vec<_>>();
        ApiError {
            message: "invalid_request".to_string(),
            details,
        }
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn parse_chamber(value: &str) -> ApiResult<Chamber> {
    value.parse::<Chamber>().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("unknown_chamber", &e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use ingest::{DiputadosSite, PageSource, ScrapeError};
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "test-admin-key";
    const ROSTER_URL: &str = "https://www.diputados.gov.ar/diputados/";

    struct FakeSource {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::network(url, "HTTP 404"))
        }

        async fn probe(&self, _url: &str) -> bool {
            false
        }
    }

    fn roster_html() -> String {
        let rows: String = [("aalvarez", "ALVAREZ, Ana"), ("bbenitez", "BENITEZ, Bruno")]
            .iter()
            .map(|(slug, name)| {
                format!(
                    r#"<tr><td><img src="/img/{slug}_small.jpg"></td>
                       <td><a href="/diputados/{slug}/">{name}</a></td>
                       <td>SALTA</td><td>UCR</td><td>2023-2027</td></tr>"#
                )
            })
            .collect();
        format!(r#"<table id="tablaDiputados"><tbody>{rows}</tbody></table>"#)
    }

    fn test_state(pages: &[(&str, String)]) -> AppState {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let source = FakeSource {
            pages: pages.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
        };
        let scraper = ChamberScraper::new(Arc::new(DiputadosSite::new()), Arc::new(source), 2);
        let mut scrapers = HashMap::new();
        scrapers.insert(Chamber::Diputados, Arc::new(scraper));

        AppState {
            config: AppConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                run_env: "test".to_string(),
                data_dir: "data".to_string(),
                admin_api_keys: vec![ADMIN_KEY.to_string()],
                gemini_api_key: None,
            },
            db: Arc::new(tokio::sync::Mutex::new(conn)),
            scrapers: Arc::new(scrapers),
            summarizer: None,
            attempts: Arc::new(AttemptTracker::default()),
            metrics: None,
            scrape_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_SCRAPES)),
        }
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("user-agent", "router-test");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let app = build_router(test_state(&[]));
        let res = app.oneshot(request("GET", "/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_chamber_is_bad_request() {
        let app = build_router(test_state(&[]));
        let res = app
            .oneshot(request("GET", "/v1/legislators/cabildo", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "unknown_chamber");
    }

    #[tokio::test]
    async fn scrape_requires_api_key() {
        let app = build_router(test_state(&[(ROSTER_URL, roster_html())]));
        let res = app
            .clone()
            .oneshot(request("POST", "/v1/admin/scrape/diputados", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn repeated_failures_are_throttled() {
        let app = build_router(test_state(&[(ROSTER_URL, roster_html())]));
        for _ in 0..attempts::MAX_FAILED_ATTEMPTS {
            let res = app
                .clone()
                .oneshot(request("POST", "/v1/admin/scrape/diputados", Some("wrong")))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
        let res = app
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some(ADMIN_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn scrape_stores_roster_and_lists_it() {
        let app = build_router(test_state(&[(ROSTER_URL, roster_html())]));
        let res = app
            .clone()
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some(ADMIN_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["scraped"], 2);
        assert_eq!(body["inserted"], 2);

        let res = app
            .clone()
            .oneshot(request("GET", "/v1/legislators/diputados?district=salta", None))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["legislators"][0]["slug"], "aalvarez");
        assert_eq!(body["legislators"][0]["total_projects"], 0);

        let res = app
            .clone()
            .oneshot(request("GET", "/v1/legislators/diputados/bbenitez", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["display_name"], "Bruno BENITEZ");

        let res = app
            .oneshot(request("GET", "/v1/ranking/diputados?limit=1", None))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["count"], 1);
    }

    #[tokio::test]
    async fn unavailable_roster_is_bad_gateway() {
        let state = test_state(&[]);
        let app = build_router(state.clone());
        let res = app
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some(ADMIN_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

        let conn = state.db.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM legislator", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn stream_reports_progress_then_done() {
        let app = build_router(test_state(&[(ROSTER_URL, roster_html())]));
        let res = app
            .oneshot(request("GET", "/v1/admin/scrape/diputados/stream", Some(ADMIN_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: start"));
        assert!(text.contains(r#""type":"list_loaded""#));
        assert_eq!(text.matches("event: progress").count(), 5);
        assert!(text.contains("event: done"));
        assert!(text.contains(r#""failed":2"#));
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn scrapes_beyond_the_cap_are_refused() {
        let state = test_state(&[(ROSTER_URL, roster_html())]);
        let app = build_router(state.clone());
        // Stand-ins for streamed scrapes still running after their headers went out.
        let held = state
            .scrape_permits
            .clone()
            .acquire_many_owned(MAX_CONCURRENT_SCRAPES as u32)
            .await
            .unwrap();

        for (method, uri) in [
            ("GET", "/v1/admin/scrape/diputados/stream"),
            ("POST", "/v1/admin/scrape/diputados"),
        ] {
            let res = app
                .clone()
                .oneshot(request(method, uri, Some(ADMIN_KEY)))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(body_json(res).await["message"], "scrape_in_progress");
        }

        drop(held);
        let res = app
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some(ADMIN_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.scrape_permits.available_permits(), MAX_CONCURRENT_SCRAPES);
    }

    #[tokio::test]
    async fn stream_roster_failure_is_single_error() {
        let app = build_router(test_state(&[]));
        let res = app
            .oneshot(request("GET", "/v1/admin/scrape/diputados/stream", Some(ADMIN_KEY)))
            .await
            .unwrap();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.matches("event: error").count(), 1);
        assert!(!text.contains("event: progress"));
        assert!(!text.contains("event: done"));
    }

    #[tokio::test]
    async fn summary_falls_back_and_is_not_stored() {
        let state = test_state(&[(ROSTER_URL, roster_html())]);
        let app = build_router(state);
        app.clone()
            .oneshot(request("POST", "/v1/admin/scrape/diputados", Some(ADMIN_KEY)))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(request("POST", "/v1/legislators/diputados/aalvarez/summary", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["persisted"], false);
        assert!(body["summary"]
            .as_str()
            .unwrap()
            .starts_with("Ana ALVAREZ es diputada o diputado nacional por la provincia de Salta e integra el bloque UCR"));

        let res = app
            .oneshot(request("POST", "/v1/legislators/diputados/nadie/summary", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn key_list_is_trimmed() {
        assert_eq!(parse_key_list(" a, ,b "), vec!["a".to_string(), "b".to_string()]);
        assert!(parse_key_list("").is_empty());
    }
}
