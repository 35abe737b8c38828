use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use database::{AgentRole, CallStatus, Database, WalletTransaction};
use dialer::{
    Actor, BatchDispatcher, BulkOutcome, CallReport, CallResultRecorder, EngineConfig,
    EngineError, HolidayTable, NextBatchResponse,
};
use wallet::{
    AdjustOperation, BalanceSnapshot, TopUpClaim, WalletConfig, WalletError, WalletService,
};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<BatchDispatcher>,
    recorder: Arc<CallResultRecorder>,
    wallet: Arc<WalletService>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let addr = env::var("DIALER_API_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:dialer.db?mode=rwc".to_string());
    let bank_prefixes: Vec<String> = env::var("BANK_SENDER_PREFIXES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let holidays = match env::var("DIALER_HOLIDAYS") {
        Ok(csv) => HolidayTable::from_csv(&csv),
        Err(_) => HolidayTable::default(),
    };

    if bank_prefixes.is_empty() {
        warn!("BANK_SENDER_PREFIXES is empty; no inbound SMS will be treated as a bank message");
    }

    let db = Database::connect(&db_url).await.expect("database connection failed");
    db.migrate().await.expect("migrations failed");

    let engine_config = EngineConfig::tehran();
    let state = AppState {
        dispatcher: Arc::new(BatchDispatcher::new(
            db.clone(),
            engine_config.clone(),
            Arc::new(holidays),
        )),
        recorder: Arc::new(CallResultRecorder::new(db.clone(), engine_config)),
        wallet: Arc::new(WalletService::new(db, WalletConfig::tehran(bank_prefixes))),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/dialer/next-batch", get(next_batch))
        .route("/api/dialer/report-result", post(report_result))
        .route("/api/dialer/reset-number", post(reset_number))
        .route("/api/dialer/bulk-reset", post(bulk_reset))
        .route("/api/dialer/bulk-status", post(bulk_status))
        .route("/api/dialer/delete-number", post(delete_number))
        .route("/api/sms/webhook", get(sms_webhook))
        .route("/api/wallet/:company/adjust", post(wallet_adjust))
        .route("/api/wallet/:company/match-topup", post(wallet_match_topup))
        .route("/api/wallet/:company/transactions", get(wallet_transactions))
        .with_state(state);

    let addr: SocketAddr = addr.parse().expect("Invalid DIALER_API_ADDR");
    info!(%addr, "Dialer API listening");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[derive(Debug, Serialize)]
struct Health {
    status: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct NextBatchQuery {
    company: String,
    size: Option<i64>,
}

async fn next_batch(
    State(state): State<AppState>,
    Query(query): Query<NextBatchQuery>,
) -> Result<Json<NextBatchResponse>, ApiError> {
    let response = state
        .dispatcher
        .fetch_next_batch(&query.company, query.size)
        .await?;
    Ok(Json(response))
}

/// Caller identity on dialer mutations. Agents may only touch numbers
/// reserved to their tenant; the bulk and purge operations are admin-only.
#[derive(Debug, Deserialize)]
struct ActorPayload {
    #[serde(default)]
    agent_id: Option<i64>,
    role: AgentRole,
}

impl ActorPayload {
    fn actor(&self) -> Actor {
        Actor {
            agent_id: self.agent_id,
            role: self.role,
        }
    }
}

/// Result report from the dialer. The dialer hardware reports with full
/// capability; an agent UI passes `actor` and is held to ownership rules.
#[derive(Debug, Deserialize)]
struct ReportResultRequest {
    company: String,
    #[serde(default)]
    actor: Option<ActorPayload>,
    #[serde(flatten)]
    report: CallReport,
}

async fn report_result(
    State(state): State<AppState>,
    Json(request): Json<ReportResultRequest>,
) -> Result<Json<database::Number>, ApiError> {
    let actor = request
        .actor
        .as_ref()
        .map(ActorPayload::actor)
        .unwrap_or_else(Actor::admin);
    let number = state
        .recorder
        .record_result(&request.company, &request.report, &actor)
        .await?;
    Ok(Json(number))
}

#[derive(Debug, Deserialize)]
struct ResetNumberRequest {
    number_id: i64,
    actor: ActorPayload,
}

async fn reset_number(
    State(state): State<AppState>,
    Json(request): Json<ResetNumberRequest>,
) -> Result<Json<database::Number>, ApiError> {
    let number = state
        .recorder
        .reset_number(request.number_id, &request.actor.actor())
        .await?;
    Ok(Json(number))
}

#[derive(Debug, Deserialize)]
struct BulkResetRequest {
    ids: Vec<i64>,
    actor: ActorPayload,
}

async fn bulk_reset(
    State(state): State<AppState>,
    Json(request): Json<BulkResetRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let outcome = state
        .recorder
        .bulk_reset(&request.ids, &request.actor.actor())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct BulkStatusRequest {
    ids: Vec<i64>,
    status: CallStatus,
    #[serde(default)]
    note: Option<String>,
    actor: ActorPayload,
}

async fn bulk_status(
    State(state): State<AppState>,
    Json(request): Json<BulkStatusRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let outcome = state
        .recorder
        .bulk_update_status(
            &request.ids,
            request.status,
            request.note.as_deref(),
            &request.actor.actor(),
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct DeleteNumberRequest {
    number_id: i64,
    actor: ActorPayload,
}

async fn delete_number(
    State(state): State<AppState>,
    Json(request): Json<DeleteNumberRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .recorder
        .delete_number(request.number_id, &request.actor.actor())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// SMS gateway callback. Gateways deliver via GET with the message in the
/// query string; ingestion always stores, so this never 404s on content.
#[derive(Debug, Deserialize)]
struct SmsWebhookQuery {
    from: String,
    #[serde(default)]
    to: Option<String>,
    body: String,
}

#[derive(Debug, Serialize)]
struct SmsWebhookResponse {
    ok: bool,
    stored: bool,
    id: i64,
}

async fn sms_webhook(
    State(state): State<AppState>,
    Query(query): Query<SmsWebhookQuery>,
) -> Result<Json<SmsWebhookResponse>, ApiError> {
    let sms = state
        .wallet
        .ingest(&query.from, query.to.as_deref(), &query.body)
        .await?;
    Ok(Json(SmsWebhookResponse {
        ok: true,
        stored: true,
        id: sms.id,
    }))
}

#[derive(Debug, Deserialize)]
struct AdjustRequest {
    amount_toman: i64,
    operation: AdjustOperation,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    agent_id: Option<i64>,
}

async fn wallet_adjust(
    State(state): State<AppState>,
    Path(company): Path<String>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let snapshot = state
        .wallet
        .manual_adjust(
            &company,
            request.amount_toman,
            request.operation,
            request.note,
            request.agent_id,
        )
        .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct MatchTopUpRequest {
    #[serde(flatten)]
    claim: TopUpClaim,
    #[serde(default)]
    agent_id: Option<i64>,
}

async fn wallet_match_topup(
    State(state): State<AppState>,
    Path(company): Path<String>,
    Json(request): Json<MatchTopUpRequest>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let snapshot = state
        .wallet
        .match_and_charge(&company, &request.claim, request.agent_id)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct TransactionsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TransactionsResponse {
    total: i64,
    transactions: Vec<WalletTransaction>,
}

async fn wallet_transactions(
    State(state): State<AppState>,
    Path(company): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let (transactions, total) = state
        .wallet
        .list_transactions(
            &company,
            query.limit.unwrap_or(50).clamp(1, 500),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;
    Ok(Json(TransactionsResponse {
        total,
        transactions,
    }))
}

#[derive(Debug)]
enum ApiError {
    Engine(EngineError),
    Wallet(WalletError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError::Wallet(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Engine(err) => match err {
                EngineError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
                EngineError::PermissionDenied(m) => {
                    (StatusCode::FORBIDDEN, "permission_denied", m.clone())
                }
                EngineError::InvalidState(m) => {
                    (StatusCode::BAD_REQUEST, "invalid_state", m.clone())
                }
                EngineError::Validation(m) => (StatusCode::BAD_REQUEST, "validation", m.clone()),
                EngineError::Database(e) => {
                    warn!(error = %e, "engine database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "internal error".to_string(),
                    )
                }
            },
            ApiError::Wallet(err) => match err {
                WalletError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
                WalletError::Validation(m) => (StatusCode::BAD_REQUEST, "validation", m.clone()),
                WalletError::NoMatch(m) => (StatusCode::CONFLICT, "no_match", m.clone()),
                WalletError::AmbiguousMatch { candidates } => (
                    StatusCode::CONFLICT,
                    "ambiguous_match",
                    format!("{candidates} candidate messages"),
                ),
                WalletError::Database(e) => {
                    warn!(error = %e, "wallet database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "internal error".to_string(),
                    )
                }
            },
        };

        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_failures_map_to_conflict() {
        let resp = ApiError::Wallet(WalletError::NoMatch("none".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp =
            ApiError::Wallet(WalletError::AmbiguousMatch { candidates: 2 }).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (
                EngineError::PermissionDenied("x".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                EngineError::InvalidState("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::Validation("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::Engine(err).into_response().status(), expected);
        }
    }
}
