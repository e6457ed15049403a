//! API routes and handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::errors::BetRejection;
use crate::domain::wager::Direction;
use crate::ports::balance::BalanceBook;
use crate::ports::repository::RoundRepository;
use crate::usecases::bet_ledger::PlaceBetError;
use crate::usecases::round_scheduler::RoundScheduler;

/// Shared handler state.
pub struct ApiState<B: BalanceBook, R: RoundRepository> {
    pub scheduler: Arc<RoundScheduler<B, R>>,
    pub balances: Arc<B>,
}

impl<B: BalanceBook, R: RoundRepository> Clone for ApiState<B, R> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            balances: Arc::clone(&self.balances),
        }
    }
}

/// Body of `POST /bets`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetRequest {
    pub participant_id: String,
    pub direction: Direction,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    participant_id: String,
    balance: u64,
}

/// Build the API router.
pub fn router<B: BalanceBook, R: RoundRepository>(state: ApiState<B, R>) -> Router {
    Router::new()
        .route("/bets", post(place_bet::<B, R>))
        .route("/round", get(current_round::<B, R>))
        .route("/balances/:id", get(balance::<B, R>))
        .route("/stats/:id", get(stats::<B, R>))
        .with_state(state)
}

const fn rejection_status(rejection: BetRejection) -> StatusCode {
    match rejection {
        BetRejection::InsufficientFunds { .. } | BetRejection::InvalidAmount { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        BetRejection::RoundNotAcceptingBets | BetRejection::DuplicateWager => StatusCode::CONFLICT,
    }
}

async fn place_bet<B: BalanceBook, R: RoundRepository>(
    State(state): State<ApiState<B, R>>,
    Json(request): Json<PlaceBetRequest>,
) -> Response {
    if request.participant_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_participant" })),
        )
            .into_response();
    }

    match state
        .scheduler
        .place_bet(&request.participant_id, request.direction, request.amount)
        .await
    {
        Ok(wager) => (StatusCode::CREATED, Json(wager)).into_response(),
        Err(PlaceBetError::Rejected(rejection)) => (
            rejection_status(rejection),
            Json(json!({
                "error": rejection.label(),
                "message": rejection.to_string(),
                "detail": rejection,
            })),
        )
            .into_response(),
        Err(PlaceBetError::Balance(e)) => {
            error!(error = %e, "Bet placement failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "balance_unavailable" })),
            )
                .into_response()
        }
    }
}

async fn current_round<B: BalanceBook, R: RoundRepository>(
    State(state): State<ApiState<B, R>>,
) -> Response {
    let Some(current) = state.scheduler.round_view() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no_active_round" })),
        )
            .into_response();
    };
    let last_settled = state.scheduler.last_settled().await;
    Json(json!({ "current": current, "last_settled": last_settled })).into_response()
}

async fn balance<B: BalanceBook, R: RoundRepository>(
    State(state): State<ApiState<B, R>>,
    Path(participant_id): Path<String>,
) -> Response {
    match state.balances.balance(&participant_id).await {
        Ok(balance) => Json(BalanceResponse {
            participant_id,
            balance,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Balance lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn stats<B: BalanceBook, R: RoundRepository>(
    State(state): State<ApiState<B, R>>,
    Path(participant_id): Path<String>,
) -> Response {
    match state.scheduler.stats(&participant_id).await {
        Some(stats) => Json(json!({
            "participant_id": participant_id,
            "win_rate": stats.win_rate(),
            "stats": stats,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown_participant" })),
        )
            .into_response(),
    }
}

/// Axum server for the bets/round API.
pub struct ApiServer {
    router: Router,
    bind_address: String,
}

impl ApiServer {
    pub fn new<B: BalanceBook, R: RoundRepository>(state: ApiState<B, R>, bind_address: String) -> Self {
        Self {
            router: router(state),
            bind_address,
        }
    }

    /// Serve until shutdown.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("API server started");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
