use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use plinko_core::{
    drop_once, verify_drop, Autoplay, AutoplayPlan, AutoplayStep, CancelToken, DropOutcome, EngineParams, GameState,
    PlinkoError, SeedHistoryEntry, Settings, Verification,
};
use plinko_shared::{
    ApiError, AutoplayRequest, AutoplayResponse, ClientSeedRequest, CommitmentResponse, DropApiRequest, DropLogEntry,
    DropResponse, ErrorBody, RotateResponse, SessionView, SqliteStore, VerifyRequest,
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 1000;

pub struct AppState {
    session: Mutex<GameState>,
    params: EngineParams,
    store: Option<SqliteStore>,
    api_key: String,
    autoplay: Mutex<Option<CancelToken>>,
    autoplay_delay: Duration,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        session: GameState,
        params: EngineParams,
        store: Option<SqliteStore>,
        api_key: String,
        autoplay_delay: Duration,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            params,
            store,
            api_key,
            autoplay: Mutex::new(None),
            autoplay_delay,
        }
    }

    /// Writes the session (and the drop, if any) to storage. Called with the
    /// session lock held so saves land in the order drops were played.
    /// Failures are logged and never surface to the player.
    async fn persist(&self, session: &GameState, outcome: Option<&DropOutcome>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Some(outcome) = outcome {
            if let Err(err) = store.log_drop(outcome).await {
                warn!(error = %err, drop_index = outcome.drop_index, "failed to log drop");
            }
        }
        if let Err(err) = store.save(&session.to_saved()).await {
            warn!(error = %err, "failed to save game");
        }
    }

    pub async fn save_now(&self) {
        let session = self.session.lock().await;
        self.persist(&session, None).await;
    }

    async fn autoplay_running(&self) -> bool {
        self.autoplay.lock().await.is_some()
    }
}

pub struct HttpError(ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<PlinkoError> for HttpError {
    fn from(err: PlinkoError) -> Self {
        if let PlinkoError::Persistence(msg) = &err {
            warn!(error = %msg, "storage error");
        }
        Self(err.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type HttpResult<T> = Result<Json<T>, HttpError>;

fn session_view(session: &GameState, params: &EngineParams, autoplay_running: bool) -> SessionView {
    SessionView {
        balance: session.balance,
        settings: session.settings.clone(),
        server_seed_hash: session.seeds.server_seed_hash().to_string(),
        client_seed: session.seeds.client_seed().to_string(),
        nonce: session.seeds.nonce(),
        drop_index: session.seeds.drop_index(),
        totals: session.totals.clone(),
        autoplay_running,
        digest_backend: params.digester.name().to_string(),
    }
}

async fn route_state(State(state): State<SharedState>) -> Json<SessionView> {
    let running = state.autoplay_running().await;
    let session = state.session.lock().await;
    Json(session_view(&session, &state.params, running))
}

async fn route_commitment(State(state): State<SharedState>) -> Json<CommitmentResponse> {
    let session = state.session.lock().await;
    Json(CommitmentResponse {
        server_seed_hash: session.seeds.server_seed_hash().to_string(),
        nonce: session.seeds.nonce(),
        drop_index: session.seeds.drop_index(),
    })
}

async fn route_client_seed(
    State(state): State<SharedState>,
    Json(req): Json<ClientSeedRequest>,
) -> HttpResult<CommitmentResponse> {
    // used verbatim, any string is a valid client seed
    let mut session = state.session.lock().await;
    info!(client_seed = ?req.client_seed, "client seed changed");
    session.seeds.set_client_seed(req.client_seed);
    state.persist(&session, None).await;
    Ok(Json(CommitmentResponse {
        server_seed_hash: session.seeds.server_seed_hash().to_string(),
        nonce: session.seeds.nonce(),
        drop_index: session.seeds.drop_index(),
    }))
}

async fn route_settings(State(state): State<SharedState>, Json(settings): Json<Settings>) -> HttpResult<SessionView> {
    state.params.paytable.table(settings.risk, settings.rows)?;
    if !settings.bet.is_finite() || settings.bet <= 0.0 {
        return Err(ApiError::Invalid(format!("bet must be a positive amount, got {}", settings.bet)).into());
    }
    let running = state.autoplay_running().await;
    let mut session = state.session.lock().await;
    session.settings = settings;
    state.persist(&session, None).await;
    Ok(Json(session_view(&session, &state.params, running)))
}

async fn route_drop(State(state): State<SharedState>, Json(req): Json<DropApiRequest>) -> HttpResult<DropResponse> {
    let mut session = state.session.lock().await;
    let outcome = drop_once(&mut session, &state.params, &req.into())?;
    state.persist(&session, Some(&outcome)).await;
    Ok(Json(DropResponse {
        outcome,
        balance: session.balance,
        server_seed_hash: session.seeds.server_seed_hash().to_string(),
        nonce: session.seeds.nonce(),
        drop_index: session.seeds.drop_index(),
    }))
}

async fn route_autoplay(
    State(state): State<SharedState>,
    Json(req): Json<AutoplayRequest>,
) -> Result<(StatusCode, Json<AutoplayResponse>), HttpError> {
    let plan: AutoplayPlan = req.into();
    {
        let session = state.session.lock().await;
        let risk = plan.request.risk.unwrap_or(session.settings.risk);
        let rows = plan.request.rows.unwrap_or(session.settings.rows);
        state.params.paytable.table(risk, rows)?;
    }

    let cancel = {
        let mut slot = state.autoplay.lock().await;
        if slot.is_some() {
            return Err(ApiError::Conflict("autoplay already running".into()).into());
        }
        let token = CancelToken::new();
        *slot = Some(token.clone());
        token
    };
    info!(drops = plan.drops, "autoplay started");
    tokio::spawn(run_autoplay_task(state.clone(), plan, cancel));
    Ok((StatusCode::ACCEPTED, Json(AutoplayResponse { running: true })))
}

/// Plays the plan one drop per lock acquisition. Each drop is committed and
/// persisted before the lock is released, so manual drops interleave safely.
async fn run_autoplay_task(state: SharedState, plan: AutoplayPlan, cancel: CancelToken) {
    let mut autoplay = Autoplay::new(plan, cancel);
    loop {
        let finished = {
            let mut session = state.session.lock().await;
            match autoplay.step(&mut session, &state.params) {
                AutoplayStep::Dropped(outcome) => {
                    state.persist(&session, Some(&outcome)).await;
                    false
                }
                AutoplayStep::Finished(_) => true,
            }
        };
        if finished {
            break;
        }
        if state.autoplay_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(state.autoplay_delay).await;
        }
    }
    state.autoplay.lock().await.take();
}

async fn route_autoplay_cancel(State(state): State<SharedState>) -> Json<AutoplayResponse> {
    let slot = state.autoplay.lock().await;
    if let Some(token) = slot.as_ref() {
        token.cancel();
        info!("autoplay cancel requested");
    }
    Json(AutoplayResponse { running: slot.is_some() })
}

async fn route_history(State(state): State<SharedState>) -> Json<Vec<DropOutcome>> {
    let session = state.session.lock().await;
    Json(session.history.iter().cloned().collect())
}

async fn route_seeds(State(state): State<SharedState>) -> Json<Vec<SeedHistoryEntry>> {
    let session = state.session.lock().await;
    Json(session.seeds.history().to_vec())
}

#[derive(Debug, Deserialize)]
struct DropsQuery {
    limit: Option<i64>,
}

/// Empty when running without storage.
async fn route_drops(State(state): State<SharedState>, Query(query): Query<DropsQuery>) -> HttpResult<Vec<DropLogEntry>> {
    let Some(store) = &state.store else {
        return Ok(Json(Vec::new()));
    };
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    Ok(Json(store.recent_drops(limit).await?))
}

async fn route_verify(State(state): State<SharedState>, Json(req): Json<VerifyRequest>) -> HttpResult<Verification> {
    let input = req.into_input()?;
    Ok(Json(verify_drop(&state.params, &input)?))
}

async fn route_rotate_seed(
    State(state): State<SharedState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> HttpResult<RotateResponse> {
    if bearer.token() != state.api_key {
        return Err(ApiError::Unauthorized.into());
    }
    let mut session = state.session.lock().await;
    let rotation = session.seeds.rotate(Utc::now());
    state.persist(&session, None).await;
    Ok(Json(RotateResponse {
        revealed: rotation.revealed,
        server_seed_hash: rotation.server_seed_hash,
    }))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/state", get(route_state))
        .route("/commitment", get(route_commitment))
        .route("/client-seed", put(route_client_seed))
        .route("/settings", put(route_settings))
        .route("/drop", post(route_drop))
        .route("/autoplay", post(route_autoplay))
        .route("/autoplay/cancel", post(route_autoplay_cancel))
        .route("/history", get(route_history))
        .route("/seeds", get(route_seeds))
        .route("/drops", get(route_drops))
        .route("/verify", post(route_verify))
        .route("/admin/rotate-seed", post(route_rotate_seed))
        .with_state(state)
}
