use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocket, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, select, sync::broadcast::Sender};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::{
    errors::{PriceError, StoreError},
    marketplace::PriceSource,
    portfolio::{to_holdings, HoldingRecord, HoldingStore, NewHolding},
    valuation::Valuator,
    AppEvent,
};

pub struct ServerState<S, P> {
    store: S,
    valuator: Valuator<P>,
    app_tx: Sender<AppEvent>,
}

impl<S, P> ServerState<S, P> {
    pub fn new(store: S, valuator: Valuator<P>, app_tx: Sender<AppEvent>) -> Self {
        Self {
            store,
            valuator,
            app_tx,
        }
    }
}

type SharedServerState<S, P> = Arc<ServerState<S, P>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortfolioValue {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Store(StoreError),
    Price(PriceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Store(err) => {
                error!("Holdings store error : {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error accessing portfolio data",
                )
                    .into_response()
            }
            ApiError::Price(err) => {
                error!("Valuation error : {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error computing portfolio value",
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        ApiError::Price(err)
    }
}

pub fn router<S, P>(state: ServerState<S, P>) -> Router
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    Router::new()
        .route("/portfolio", get(list_holdings::<S, P>))
        .route("/portfolio/add", post(add_holding::<S, P>))
        .route("/portfolio/value", get(portfolio_value::<S, P>))
        .route("/ws", any(ws_handler::<S, P>))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

pub async fn start<S, P>(address: String, state: ServerState<S, P>) -> Result<()>
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    let listener = TcpListener::bind(address).await?;
    serve(listener, router(state)).await
}

async fn list_holdings<S, P>(
    State(state): State<SharedServerState<S, P>>,
) -> Result<Json<Vec<HoldingRecord>>, ApiError>
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    let records = state.store.list_all_holdings().await?;
    Ok(Json(records))
}

async fn add_holding<S, P>(
    State(state): State<SharedServerState<S, P>>,
    payload: Result<Json<NewHolding>, JsonRejection>,
) -> Result<(StatusCode, Json<HoldingRecord>), ApiError>
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    let Json(holding) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if holding.symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }

    let record = state.store.insert_holding(holding).await?;
    if state
        .app_tx
        .send(AppEvent::HoldingAdded(record.clone()))
        .is_err()
    {
        debug!("No subscribers for added holding {}", record.id);
    }

    Ok((StatusCode::CREATED, Json(record)))
}

async fn portfolio_value<S, P>(
    State(state): State<SharedServerState<S, P>>,
) -> Result<Json<PortfolioValue>, ApiError>
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    let records = state.store.list_all_holdings().await?;
    let total_value = state.valuator.valuate(&to_holdings(&records)).await?;
    Ok(Json(PortfolioValue { total_value }))
}

async fn ws_handler<S, P>(
    ws: WebSocketUpgrade,
    State(state): State<SharedServerState<S, P>>,
) -> impl IntoResponse
where
    S: HoldingStore + Send + Sync + 'static,
    P: PriceSource + Send + Sync + 'static,
{
    let app_tx = state.app_tx.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, app_tx))
}

async fn handle_socket(socket: WebSocket, app_tx: Sender<AppEvent>) {
    let mut app_rx = app_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::task::spawn(async move {
        loop {
            match app_rx.recv().await {
                Ok(event) => {
                    let msg = match serde_json::ser::to_string(&event) {
                        Ok(msg) => msg,
                        Err(err) => {
                            error!("Failed to encode event : {}", err);
                            continue;
                        }
                    };
                    if sender
                        .send(axum::extract::ws::Message::Text(msg.into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Websocket subscriber lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    let mut recv_task = tokio::task::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            debug!("Received websocket message : {:?}", msg);
        }
    });

    select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }
}
