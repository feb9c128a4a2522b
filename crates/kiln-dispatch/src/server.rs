//! HTTP ticket service handing out sequence indices to remote workers.
//!
//! Endpoints:
//! - `GET /`: health probe
//! - `GET /assign?case_name=..&seq=..`: next index for the case, or `null`
//! - `PUT /complete` (form `case_name`, `index`): mark an index as done
//!
//! Assigned indices stay in flight until completed and are never handed out
//! twice. The ledger is written to `<data_dir>/ledger.json` after every
//! change, and the public URL to `<data_dir>/url.txt` while serving.

use crate::error::{DispatchError, DispatchResult};
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use kiln_store::{JsonDocument, SerdeFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub const URL_FILE: &str = "url.txt";
pub const LEDGER_FILE: &str = "ledger.json";

/// Progress of one case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLedger {
    pub total_length: usize,
    pub in_flight: BTreeSet<usize>,
    pub completed: BTreeSet<usize>,
}

impl CaseLedger {
    fn new(total_length: usize) -> Self {
        Self { total_length, ..Self::default() }
    }

    /// Lowest index neither in flight nor completed, now marked in flight.
    fn assign(&mut self) -> Option<usize> {
        let index = (0..self.total_length).find(|i| !self.in_flight.contains(i) && !self.completed.contains(i))?;
        self.in_flight.insert(index);
        Some(index)
    }

    fn complete(&mut self, index: usize) {
        self.in_flight.remove(&index);
        self.completed.insert(index);
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total_length - self.completed.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub cases: BTreeMap<String, CaseLedger>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Wipe the ledger on startup.
    pub reset: bool,
    /// URL advertised in `url.txt`. Defaults to `http://<bound address>`.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            data_dir: PathBuf::from("tickets"),
            reset: false,
            public_url: None,
        }
    }
}

#[derive(Clone)]
struct AppState {
    ledger: Arc<Mutex<Ledger>>,
    doc: Arc<JsonDocument<SerdeFormat<Ledger>>>,
}

impl AppState {
    /// Apply `f` to a copy of the ledger and commit it once it is on disk.
    ///
    /// The guard is held across the write so mutations stay serialized; a
    /// failed write leaves the served ledger untouched.
    async fn mutate<R>(&self, f: impl FnOnce(&mut Ledger) -> Result<R, ApiError>) -> Result<R, ApiError> {
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let out = f(&mut next)?;

        let doc = Arc::clone(&self.doc);
        let written = tokio::task::spawn_blocking(move || doc.write(&next).map(|()| next))
            .await
            .map_err(|e| ApiError::Internal(format!("ledger writer failed: {e}")))?;
        *ledger = written.map_err(|e| {
            error!(error = %e, "failed to persist ledger");
            ApiError::Internal(e.to_string())
        })?;
        Ok(out)
    }
}

#[derive(Debug)]
enum ApiError {
    SeqMismatch { case_name: String, expected: usize, got: usize },
    UnknownCase(String),
    IndexOutOfRange { case_name: String, index: usize, total_length: usize },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::SeqMismatch { case_name, expected, got } => (
                StatusCode::CONFLICT,
                format!("case `{case_name}` has length {expected}, request says {got}"),
            ),
            Self::UnknownCase(case_name) => (StatusCode::NOT_FOUND, format!("unknown case `{case_name}`")),
            Self::IndexOutOfRange { case_name, index, total_length } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("index {index} out of range for case `{case_name}` of length {total_length}"),
            ),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        warn!(status = %status, message = %message, "request rejected");
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub cases: usize,
}

#[derive(Debug, Deserialize)]
struct AssignParams {
    case_name: String,
    seq: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteParams {
    pub case_name: String,
    pub index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteAck {
    pub case_name: String,
    pub index: usize,
    pub remaining: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let cases = state.ledger.lock().await.cases.len();
    Json(Health { status: "ok".to_string(), cases })
}

async fn assign(
    State(state): State<AppState>,
    Query(params): Query<AssignParams>,
) -> Result<Json<Option<usize>>, ApiError> {
    let AssignParams { case_name, seq } = params;
    let index = state.mutate(|ledger| {
        let case = ledger.cases.entry(case_name.clone()).or_insert_with(|| {
            info!(case = %case_name, total_length = seq, "case created");
            CaseLedger::new(seq)
        });
        if case.total_length != seq {
            return Err(ApiError::SeqMismatch { case_name: case_name.clone(), expected: case.total_length, got: seq });
        }
        Ok(case.assign())
    })
    .await?;

    debug!(case = %case_name, index = ?index, "assigned");
    Ok(Json(index))
}

async fn complete(
    State(state): State<AppState>,
    Form(params): Form<CompleteParams>,
) -> Result<Json<CompleteAck>, ApiError> {
    let CompleteParams { case_name, index } = params;
    let remaining = state.mutate(|ledger| {
        let Some(case) = ledger.cases.get_mut(&case_name) else {
            return Err(ApiError::UnknownCase(case_name.clone()));
        };
        if index >= case.total_length {
            return Err(ApiError::IndexOutOfRange {
                case_name: case_name.clone(),
                index,
                total_length: case.total_length,
            });
        }
        case.complete(index);
        Ok(case.remaining())
    })
    .await?;

    debug!(case = %case_name, index, remaining, "completed");
    Ok(Json(CompleteAck { case_name, index, remaining }))
}

/// The ticket service bound to a data directory.
pub struct TicketServer {
    config: ServerConfig,
    state: AppState,
}

impl TicketServer {
    /// Load (or reset) the ledger and clear any stale `url.txt`.
    pub fn open(config: ServerConfig) -> DispatchResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        remove_url_file(&config.data_dir)?;

        let doc = JsonDocument::<SerdeFormat<Ledger>>::serde(config.data_dir.join(LEDGER_FILE));
        let ledger = if config.reset { doc.reset()? } else { doc.load(false)? };
        info!(
            data_dir = %config.data_dir.display(),
            cases = ledger.cases.len(),
            reset = config.reset,
            "ticket ledger loaded"
        );

        Ok(Self { config, state: AppState { ledger: Arc::new(Mutex::new(ledger)), doc: Arc::new(doc) } })
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn url_file(&self) -> PathBuf {
        self.config.data_dir.join(URL_FILE)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(health))
            .route("/assign", get(assign))
            .route("/complete", put(complete))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> DispatchResult<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> DispatchResult<()> {
        let local_addr: SocketAddr = listener.local_addr()?;
        let url = self.config.public_url.clone().unwrap_or_else(|| format!("http://{local_addr}"));
        let url_file = self.url_file();
        std::fs::write(&url_file, &url)?;
        info!(%url, addr = %local_addr, url_file = %url_file.display(), "ticket server listening");

        let router = self.router();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        remove_url_file(&self.config.data_dir)?;
        served?;
        info!("ticket server stopped");
        Ok(())
    }
}

fn remove_url_file(data_dir: &Path) -> DispatchResult<()> {
    match std::fs::remove_file(data_dir.join(URL_FILE)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DispatchError::Io(e)),
    }
}
