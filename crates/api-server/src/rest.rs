//! REST handlers — the call sites that consume the governance facade.
//!
//! Decision-to-HTTP mapping: RateLimited → 429 + `Retry-After`,
//! InsufficientBalance → 402, Duplicate → 200 in the same shape as a fresh
//! ingestion (retried webhook senders must see idempotent success), Admitted
//! → 200 with the created resource. Every governed response carries the
//! `X-RateLimit-*` headers.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use botline_core::config::PricingConfig;
use botline_core::event_bus::{make_event, EventSink, EventType};
use botline_core::types::{Bot, DirectMessage, FeedItem};
use botline_governance::scope::scopes;
use botline_governance::{fingerprint, AdmitDecision, Decision, GovernanceError, Governor};
use botline_store::InsertOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Maximum username length.
const MAX_USERNAME_LEN: usize = 64;

/// Maximum feed post / message body length.
const MAX_CONTENT_LEN: usize = 4096;

/// Maximum single administrative top-up. Keeps balances far from the point
/// where a Redis `INCRBY` could wrap.
const MAX_CREDIT_AMOUNT: i64 = 1_000_000;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<Governor>,
    pub events: Arc<dyn EventSink>,
    pub pricing: PricingConfig,
    pub node_id: String,
    pub start_time: Instant,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedPostRequest {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub from: String,
    pub to: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: i64,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub bot: Bot,
    pub balance: i64,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub success: bool,
    pub item: FeedItem,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: DirectMessage,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub username: String,
    pub balance: i64,
}

#[derive(Serialize)]
struct RateLimitedBody {
    success: bool,
    error: String,
    #[serde(rename = "retryAfter")]
    retry_after: u64,
}

#[derive(Serialize)]
struct InsufficientBalanceBody {
    success: bool,
    error: String,
    required: i64,
    balance: i64,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Decision plumbing
// ---------------------------------------------------------------------------

/// Rate-limit headers carried on every governed response.
fn rate_limit_headers(limits: &AdmitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limits.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(limits.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(limits.reset_at_secs()));
    headers
}

fn rate_limited(limits: &AdmitDecision, retry_after_secs: u64) -> Response {
    let mut headers = rate_limit_headers(limits);
    headers.insert("Retry-After", HeaderValue::from(retry_after_secs));
    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(RateLimitedBody {
            success: false,
            error: "rate_limited".to_string(),
            retry_after: retry_after_secs,
        }),
    )
        .into_response()
}

fn payment_required(limits: &AdmitDecision, required: i64, balance: i64) -> Response {
    (
        StatusCode::PAYMENT_REQUIRED,
        rate_limit_headers(limits),
        Json(InsufficientBalanceBody {
            success: false,
            error: "insufficient_balance".to_string(),
            required,
            balance,
        }),
    )
        .into_response()
}

fn bad_request(msg: &str) -> Response {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            success: false,
            error: msg.to_string(),
        }),
    )
        .into_response()
}

fn governance_error(e: GovernanceError) -> Response {
    match e {
        GovernanceError::StorageUnavailable(cause) => {
            error!(error = %cause, "Governance storage unavailable");
            metrics::counter!("api.storage_unavailable").increment(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    success: false,
                    error: "storage_unavailable".to_string(),
                }),
            )
                .into_response()
        }
        GovernanceError::UnknownScope(name) => {
            error!(scope = %name, "Handler referenced an unconfigured scope");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    success: false,
                    error: "internal_error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Caller identifier for IP-keyed limiter scopes. Honors `X-Forwarded-For`
/// from the fronting proxy, then the socket peer address, so direct clients
/// each get their own bucket and cannot opt out by omitting the header.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("'username' must not be empty");
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err("'username' exceeds maximum length");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("'username' may only contain alphanumerics, '-' and '_'");
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), &'static str> {
    if content.trim().is_empty() {
        return Err("content must not be empty");
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err("content exceeds maximum length");
    }
    Ok(())
}

/// Hand a charged fee back when the governed action cannot complete. A
/// failed refund is logged for reconciliation; the response stands.
async fn refund_fee(state: &AppState, bot: &str, amount: i64) {
    if amount == 0 {
        return;
    }
    if let Err(e) = state.governor.credit(bot, amount).await {
        error!(bot = bot, amount = amount, error = %e, "Failed to refund fee");
    }
}

/// Emit a platform event without ever blocking the response path. Sink
/// failures are the fan-out collaborator's problem, never the debit's.
fn emit_event(state: &AppState, event_type: EventType, bot: &str, item_id: Option<Uuid>) {
    let events = state.events.clone();
    let event = make_event(event_type, bot, item_id);
    tokio::spawn(async move {
        events.emit(event);
    });
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/bots — register a bot and open its token account.
/// Rate limited per caller IP; no fee.
pub async fn register_bot(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if let Err(msg) = validate_username(&request.username) {
        warn!(username = %request.username, error = msg, "Registration validation failed");
        return bad_request(msg);
    }

    let identifier = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let decision = match state
        .governor
        .authorize_and_charge(scopes::REGISTRATION, &identifier, &request.username, 0, None)
        .await
    {
        Ok(decision) => decision,
        Err(e) => return governance_error(e),
    };

    let limits = *decision.limits();
    if let Decision::RateLimited { retry_after_secs, .. } = decision {
        return rate_limited(&limits, retry_after_secs);
    }
    // Unbilled and unfingerprinted: anything not rate limited is admitted.

    let created = match state
        .governor
        .open_account(&request.username, state.pricing.starting_balance)
        .await
    {
        Ok(created) => created,
        Err(e) => return governance_error(e),
    };
    if !created {
        return (
            StatusCode::CONFLICT,
            rate_limit_headers(&limits),
            Json(ErrorBody {
                success: false,
                error: "username_taken".to_string(),
            }),
        )
            .into_response();
    }

    emit_event(&state, EventType::BotRegistered, &request.username, None);

    let bot = Bot {
        username: request.username,
        display_name: request.display_name,
        created_at: Utc::now(),
    };
    (
        StatusCode::OK,
        rate_limit_headers(&limits),
        Json(RegisterResponse {
            success: true,
            bot,
            balance: state.pricing.starting_balance,
        }),
    )
        .into_response()
}

/// Shared ingestion path for feed posts and webhook deliveries: authorize,
/// charge, then persist under the fingerprint's unique constraint.
async fn ingest_content(
    state: &AppState,
    scope: &'static str,
    bot: &str,
    content: &str,
    event_type: EventType,
) -> Response {
    if let Err(msg) = validate_username(bot) {
        return bad_request(msg);
    }
    if let Err(msg) = validate_content(content) {
        return bad_request(msg);
    }

    let fee = state.pricing.feed_post_cost;
    let hash = fingerprint(bot, content);

    let decision = match state
        .governor
        .authorize_and_charge(scope, bot, bot, fee, Some(&hash))
        .await
    {
        Ok(decision) => decision,
        Err(e) => return governance_error(e),
    };

    let limits = *decision.limits();
    match decision {
        Decision::RateLimited { retry_after_secs, .. } => rate_limited(&limits, retry_after_secs),
        Decision::InsufficientBalance { required, actual, .. } => {
            payment_required(&limits, required, actual)
        }
        // Replayed delivery: answer exactly like a fresh success.
        Decision::Duplicate { prior, .. } => (
            StatusCode::OK,
            rate_limit_headers(&limits),
            Json(ItemResponse {
                success: true,
                item: prior,
            }),
        )
            .into_response(),
        Decision::Admitted { .. } => {
            let item = FeedItem {
                id: Uuid::new_v4(),
                bot: bot.to_string(),
                content: content.to_string(),
                fingerprint: hash.clone(),
                created_at: Utc::now(),
            };

            match state
                .governor
                .commit_ingest(&hash, item.clone(), bot, fee)
                .await
            {
                Ok(InsertOutcome::Created) => {
                    emit_event(state, event_type, bot, Some(item.id));
                    (
                        StatusCode::OK,
                        rate_limit_headers(&limits),
                        Json(ItemResponse {
                            success: true,
                            item,
                        }),
                    )
                        .into_response()
                }
                // Lost the insert race; the facade already refunded the fee.
                Ok(InsertOutcome::Duplicate(prior)) => (
                    StatusCode::OK,
                    rate_limit_headers(&limits),
                    Json(ItemResponse {
                        success: true,
                        item: prior,
                    }),
                )
                    .into_response(),
                Err(e) => governance_error(e),
            }
        }
    }
}

/// POST /v1/feed — publish to the public activity feed.
pub async fn post_feed(
    State(state): State<AppState>,
    Json(request): Json<FeedPostRequest>,
) -> Response {
    ingest_content(
        &state,
        scopes::FEED_POST,
        &request.username,
        &request.content,
        EventType::FeedPosted,
    )
    .await
}

/// POST /v1/webhooks/ingest — idempotent ingestion of webhook deliveries.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Json(request): Json<FeedPostRequest>,
) -> Response {
    ingest_content(
        &state,
        scopes::WEBHOOK_INGEST,
        &request.username,
        &request.content,
        EventType::WebhookIngested,
    )
    .await
}

/// POST /v1/messages — send a direct message. Billed, not fingerprinted:
/// sending the same text twice is two deliberate messages.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Response {
    if let Err(msg) = validate_username(&request.from) {
        return bad_request(msg);
    }
    if let Err(msg) = validate_username(&request.to) {
        return bad_request(msg);
    }
    if let Err(msg) = validate_content(&request.body) {
        return bad_request(msg);
    }

    let decision = match state
        .governor
        .authorize_and_charge(
            scopes::DIRECT_MESSAGE,
            &request.from,
            &request.from,
            state.pricing.direct_message_cost,
            None,
        )
        .await
    {
        Ok(decision) => decision,
        Err(e) => return governance_error(e),
    };

    let limits = *decision.limits();
    match decision {
        Decision::RateLimited { retry_after_secs, .. } => rate_limited(&limits, retry_after_secs),
        Decision::InsufficientBalance { required, actual, .. } => {
            payment_required(&limits, required, actual)
        }
        Decision::Admitted { .. } | Decision::Duplicate { .. } => {
            // Recipient lookup happens only after admission: probing for
            // usernames spends rate budget like any other governed write.
            // The charge is handed back when the message cannot be sent.
            match state.governor.balance(&request.to).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    refund_fee(&state, &request.from, state.pricing.direct_message_cost).await;
                    return (
                        StatusCode::NOT_FOUND,
                        rate_limit_headers(&limits),
                        Json(ErrorBody {
                            success: false,
                            error: "unknown_recipient".to_string(),
                        }),
                    )
                        .into_response();
                }
                Err(e) => {
                    refund_fee(&state, &request.from, state.pricing.direct_message_cost).await;
                    return governance_error(e);
                }
            }

            // Delivery and storage belong to the messaging collaborator;
            // the governed part ends once the fee is charged.
            let message = DirectMessage {
                id: Uuid::new_v4(),
                from: request.from.clone(),
                to: request.to,
                body: request.body,
                created_at: Utc::now(),
            };
            emit_event(&state, EventType::MessageSent, &request.from, Some(message.id));
            (
                StatusCode::OK,
                rate_limit_headers(&limits),
                Json(MessageResponse {
                    success: true,
                    message,
                }),
            )
                .into_response()
        }
    }
}

/// GET /v1/bots/:username/balance — current spendable balance.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    match state.governor.balance(&username).await {
        Ok(Some(balance)) => (
            StatusCode::OK,
            Json(BalanceResponse {
                success: true,
                username,
                balance,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                success: false,
                error: "unknown_bot".to_string(),
            }),
        )
            .into_response(),
        Err(e) => governance_error(e),
    }
}

/// POST /v1/bots/:username/credits — administrative balance top-up.
pub async fn credit_account(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(request): Json<CreditRequest>,
) -> Response {
    if request.amount <= 0 {
        return bad_request("'amount' must be positive");
    }
    if request.amount > MAX_CREDIT_AMOUNT {
        return bad_request("'amount' exceeds maximum top-up");
    }

    match state.governor.balance(&username).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    success: false,
                    error: "unknown_bot".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => return governance_error(e),
    }

    if let Err(e) = state.governor.credit(&username, request.amount).await {
        return governance_error(e);
    }

    match state.governor.balance(&username).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(BalanceResponse {
                success: true,
                username,
                balance: balance.unwrap_or(0),
            }),
        )
            .into_response(),
        Err(e) => governance_error(e),
    }
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
