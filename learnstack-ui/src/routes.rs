//! HTTP route handlers for the UI API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use learnstack::core::types::{GateVerdict, Protocol};
use learnstack::io::prompt::PromptComposer;
use learnstack::io::service::{GenerateRequest, ServiceError};
use learnstack::session::{
    PendingTurn, PendingVerification, Session, SessionError, SessionSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::{AppState, ChangeEvent};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session).post(start_session))
        .route("/chat", post(chat))
        .route("/gate", post(open_gate).delete(dismiss_gate))
        .route("/gate/verify", post(verify_gate))
}

/// JSON error body with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn no_session() -> Self {
        Self::new(StatusCode::NOT_FOUND, "no session; POST /api/session first")
    }

    fn task_failed(err: tokio::task::JoinError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    fn replaced() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "the session was replaced while the request was running",
        )
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::MissingCredential | SessionError::GateUnsupported => {
                StatusCode::BAD_REQUEST
            }
            SessionError::NoGate => StatusCode::NOT_FOUND,
            SessionError::Busy
            | SessionError::GateBusy
            | SessionError::GateAlreadyApproved
            | SessionError::NoPendingApproval
            | SessionError::StaleGate(_)
            | SessionError::StaleReply => StatusCode::CONFLICT,
            SessionError::VerificationFailed(_) => StatusCode::BAD_GATEWAY,
            SessionError::Prompt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct StartSessionBody {
    goal: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    protocol: Option<Protocol>,
}

/// POST /api/session - start (or replace) the session.
async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let goal = body.goal.trim();
    if goal.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "goal must be non-empty"));
    }
    let api_key = state
        .config
        .resolve_api_key(body.api_key.as_deref())
        .ok_or(SessionError::MissingCredential)?;
    let protocol = body.protocol.unwrap_or(state.config.protocol);
    let session = Session::new(goal, api_key, protocol).with_composer(PromptComposer::new(
        state.config.source_context_limit_chars,
    ));
    let snapshot = session.snapshot();

    let mut slot = state.slot.lock().await;
    slot.generation += 1;
    slot.session = Some(session);
    info!(generation = slot.generation, %protocol, "session started");
    drop(slot);

    state.notify(ChangeEvent::SessionStarted);
    Ok(Json(snapshot))
}

/// GET /api/session - current snapshot.
async fn get_session(State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    let slot = state.slot.lock().await;
    let session = slot.session.as_ref().ok_or_else(ApiError::no_session)?;
    Ok(Json(session.snapshot()))
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    context: Option<String>,
}

/// POST /api/chat - run one turn.
///
/// The remote call and the completion run on a detached task, so a client
/// that disconnects mid-turn cannot leave the session loading.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let (generation, pending, len) = {
        let mut slot = state.slot.lock().await;
        let generation = slot.generation;
        let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
        let pending = session.begin_turn(&body.message, body.context.as_deref())?;
        (generation, pending, session.transcript().len())
    };
    state.notify(ChangeEvent::TranscriptAppended { len });

    tokio::spawn(run_turn(state, generation, pending))
        .await
        .map_err(ApiError::task_failed)?
        .map(Json)
}

async fn run_turn(
    state: AppState,
    generation: u64,
    pending: PendingTurn,
) -> Result<SessionSnapshot, ApiError> {
    let result = generate(&state, pending.request().clone()).await;

    let mut slot = state.slot.lock().await;
    if slot.generation != generation {
        return Err(ApiError::replaced());
    }
    let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
    let outcome = session.complete_turn(pending, result)?;
    let snapshot = session.snapshot();
    drop(slot);

    if outcome.state_changed {
        state.notify(ChangeEvent::StateChanged);
    }
    state.notify(ChangeEvent::TranscriptAppended {
        len: snapshot.transcript.len(),
    });
    Ok(snapshot)
}

#[derive(Debug, Deserialize)]
struct OpenGateBody {
    node_id: String,
}

/// POST /api/gate - open a gate on an eligible parent node.
async fn open_gate(
    State(state): State<AppState>,
    Json(body): Json<OpenGateBody>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut slot = state.slot.lock().await;
    let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
    let opened = session.select_node(&body.node_id)?.is_some();
    let snapshot = session.snapshot();
    drop(slot);

    if opened {
        state.notify(ChangeEvent::GateChanged);
    }
    Ok(Json(snapshot))
}

/// DELETE /api/gate - dismiss the open gate.
async fn dismiss_gate(State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut slot = state.slot.lock().await;
    let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
    session.dismiss_gate()?;
    let snapshot = session.snapshot();
    drop(slot);

    state.notify(ChangeEvent::GateChanged);
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    synthesis: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    verdict: GateVerdict,
    snapshot: SessionSnapshot,
}

/// POST /api/gate/verify - judge a synthesis; an approval pops the stack
/// after the configured delay. Completion is detached like `chat`.
async fn verify_gate(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let (generation, pending) = {
        let mut slot = state.slot.lock().await;
        let generation = slot.generation;
        let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
        (generation, session.begin_gate_verification(&body.synthesis)?)
    };
    state.notify(ChangeEvent::GateChanged);

    tokio::spawn(run_verification(state, generation, pending))
        .await
        .map_err(ApiError::task_failed)?
        .map(Json)
}

async fn run_verification(
    state: AppState,
    generation: u64,
    pending: PendingVerification,
) -> Result<VerifyResponse, ApiError> {
    let result = generate(&state, pending.request().clone()).await;

    let mut slot = state.slot.lock().await;
    if slot.generation != generation {
        return Err(ApiError::replaced());
    }
    let session = slot.session.as_mut().ok_or_else(ApiError::no_session)?;
    let verdict = session.complete_gate_verification(pending, result);
    let snapshot = session.snapshot();
    drop(slot);

    state.notify(ChangeEvent::GateChanged);
    let verdict = verdict?;
    if verdict.approved {
        schedule_gate_close(state, generation);
    }
    Ok(VerifyResponse { verdict, snapshot })
}

/// Apply an approved gate after `gate_close_delay` so the verdict stays
/// visible for a moment.
fn schedule_gate_close(state: AppState, generation: u64) {
    let delay = state.config.gate_close_delay();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut slot = state.slot.lock().await;
        if slot.generation != generation {
            return;
        }
        let Some(session) = slot.session.as_mut() else {
            return;
        };
        let result = session.finish_gate();
        let len = session.transcript().len();
        drop(slot);

        match result {
            Ok(topic) => {
                info!(%topic, "gate closed");
                state.notify(ChangeEvent::StateChanged);
            }
            Err(err) => warn!(error = %err, "approved gate not applied"),
        }
        state.notify(ChangeEvent::GateChanged);
        state.notify(ChangeEvent::TranscriptAppended { len });
    });
}

/// Run the blocking service call off the async runtime.
async fn generate(state: &AppState, request: GenerateRequest) -> Result<String, ServiceError> {
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.generate(&request))
        .await
        .unwrap_or_else(|err| Err(ServiceError::Transport(err.to_string())))
}
