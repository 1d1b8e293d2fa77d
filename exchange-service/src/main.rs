//! Exchange HTTP/WebSocket service — the thin ingress that exercises the
//! matching/ledger/risk/idempotency/outbox/fan-out core from a real
//! transport. Wire formats and routing live here; everything that determines
//! correctness lives in `pipeline` and below.

mod config;
mod error;
mod types;
mod websocket;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use config::ExchangeConfig;
use error::AppError;
use fanout::MarketFanout;
use idempotency::IdempotencyStore;
use ledger::Ledger;
use outbox::{NullEventBus, Outbox, OutboxPublisher};
use pipeline::{event_type_registry, OrderPipeline, PlaceOrderRequest};
use risk::RiskGate;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use types::*;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<OrderPipeline>,
    fanout: Arc<MarketFanout>,
}

#[tokio::main]
async fn main() {
    config::init_logging();
    let config = ExchangeConfig::default();

    let ledger = Arc::new(Ledger::new());
    let risk = Arc::new(RiskGate::new(config.risk.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency.clone()));
    let outbox = Arc::new(Outbox::new());
    let fanout = MarketFanout::new(config.fanout.clone());

    let pipeline = Arc::new(OrderPipeline::new(
        config.symbols.clone(),
        ledger,
        risk.clone(),
        idempotency.clone(),
        outbox.clone(),
        fanout.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let publisher = Arc::new(OutboxPublisher::new(
        outbox,
        Arc::new(NullEventBus),
        Arc::new(event_type_registry()),
        config.outbox.clone(),
    ));
    tokio::spawn(publisher.run(shutdown_rx.clone()));
    tokio::spawn(fanout.clone().run_heartbeat(shutdown_rx.clone()));
    tokio::spawn(run_reaper(risk, idempotency, config.reaper_interval_secs, shutdown_rx.clone()));

    let state = AppState { pipeline, fanout };

    let app = Router::new()
        .route("/health", get(websocket::health))
        .route("/orders", post(place_order))
        .route("/orders/:symbol/:order_id", axum::routing::delete(cancel_order))
        .route("/orderbook/:symbol", get(get_orderbook))
        .route("/wallets/deposit", post(deposit))
        .route("/wallets/balances", get(balances))
        .route("/ws/subscribe", get(websocket::subscribe))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await.unwrap();
    info!(addr = %config.listen_addr, "exchange service listening");

    axum::serve(listener, app).await.unwrap();

    let _ = shutdown_tx.send(true);
}

/// Periodically sweeps `RiskGate`'s idle per-client rate-limit windows and
/// `IdempotencyStore`'s expired entries, so memory for clients that stop
/// sending requests doesn't accumulate indefinitely between lazy purges.
async fn run_reaper(
    risk: Arc<RiskGate>,
    idempotency: Arc<IdempotencyStore>,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = chrono::Utc::now();
                risk.purge_idle_clients(now);
                idempotency.purge_expired(now);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn require_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingHeader(name))
}

/// `Json<T>`'s own extractor rejects malformed bodies before the handler
/// runs, bypassing `AppError`'s response shape and the idempotency cache
/// entirely. Extracting raw bytes and parsing explicitly routes every shape
/// error through the same path as a pipeline error.
async fn place_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let client_id = require_header(&headers, "X-Client-Id")?.to_string();
    let idempotency_key = require_header(&headers, "Idempotency-Key")?.to_string();
    let now = chrono::Utc::now();

    if let Some(cached) = state.pipeline.idempotency_lookup(&client_id, &idempotency_key, now) {
        let status = StatusCode::from_u16(cached.status_code).unwrap_or(StatusCode::OK);
        return Ok((status, Json(cached.payload)).into_response());
    }

    let body: PlaceOrderBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            let app_err = AppError::InvalidBody(err.to_string());
            let payload = serde_json::json!({ "errors": [app_err.to_string()] });
            state.pipeline.idempotency_store_error(&client_id, &idempotency_key, 400, payload, now);
            return Err(app_err);
        }
    };

    let request = PlaceOrderRequest {
        client_id,
        idempotency_key,
        symbol: body.symbol,
        side: body.side,
        order_type: body.order_type,
        quantity: body.quantity,
        price: body.price,
    };

    let response = state.pipeline.place_order(request)?;
    Ok((StatusCode::OK, Json(OrderHttpResponse::from(response))).into_response())
}

async fn cancel_order(
    Path((symbol, order_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let order_id = uuid::Uuid::parse_str(&order_id)
        .map_err(|_| AppError::InvalidBody("order id must be a UUID".to_string()))?;
    let found = state.pipeline.cancel_order(&symbol, orderbook::OrderId(order_id));
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::OrderNotFound)
    }
}

async fn get_orderbook(
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
    State(state): State<AppState>,
) -> Result<Json<OrderBookHttpResponse>, AppError> {
    let snapshot = state
        .pipeline
        .orderbook_snapshot(&symbol, query.depth.unwrap_or(10))
        .ok_or_else(|| AppError::InvalidBody(format!("unknown symbol: {symbol}")))?;
    Ok(Json(OrderBookHttpResponse::from(snapshot)))
}

async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let client_id = require_header(&headers, "X-Client-Id")?;
    let body: DepositBody =
        serde_json::from_slice(&body).map_err(|err| AppError::InvalidBody(err.to_string()))?;
    state.pipeline.deposit(client_id, &body.asset, body.amount)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn balances(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BalanceView>>, AppError> {
    let client_id = require_header(&headers, "X-Client-Id")?;
    let balances = state
        .pipeline
        .balances(client_id)
        .into_iter()
        .map(|(asset, balance)| BalanceView { asset, available: balance.available, reserved: balance.reserved })
        .collect();
    Ok(Json(balances))
}
