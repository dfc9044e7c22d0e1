//! Application definition, including all HTTP route handlers.
//!
//! Route handlers are bundled via [`setup`] into an [`axum::Router`], which can then be run
//! using [`run`] at the configured port (see [`config`][`super::config`]).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;
use tracing::Level;
use types_rs::arena::{
    api::{BattleSummary, CastVoteRequest, VoteReceipt, VoterStats, VoterVotes},
    BattleId, InvalidBattle, NewBattle, Tally, VoterId,
};

use crate::{
    config::{Config, MAX_REQUEST_SIZE},
    error::{Error, Result},
    identity::{Admin, Voter},
    state::AppState,
    store::BattleStore,
};

/// Prepares the application to be run within an HTTP server.
///
/// Run the application with [`run`] with the result of this function.
pub fn setup<S: BattleStore>(state: AppState<S>) -> Router {
    let _entered = tracing::span!(Level::DEBUG, "Setting up application").entered();
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/battles", get(list_battles::<S>))
        .route("/api/battles/:battle_id", get(get_battle::<S>))
        .route("/api/battles/:battle_id/tally", get(get_tally::<S>))
        .route("/api/battles/:battle_id/votes", post(cast_vote::<S>))
        .route("/api/voters/:voter_id/votes", get(get_voter_votes::<S>))
        .route("/api/voters/:voter_id/stats", get(get_voter_stats::<S>))
        .route("/api/admin/battles", post(create_battle::<S>))
        .route(
            "/api/admin/battles/:battle_id/deactivate",
            post(deactivate_battle::<S>),
        )
        .route(
            "/api/admin/battles/:battle_id/reconcile",
            post(reconcile_battle::<S>),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create and run an HTTP server using the provided application at the port
/// from [`config`][`super::config`]. Returns once a shutdown signal arrives
/// and in-flight requests have finished.
pub async fn run(app: Router, config: &Config) -> color_eyre::Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    tracing::info!("Server listening at http://{addr}/");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// The `:battle_id` path segment. A segment that is not a battle id names no
/// battle, so it is reported as [`Error::MalformedBattleId`] rather than with
/// axum's plain-text rejection.
struct BattlePath(BattleId);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for BattlePath {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let Path(segment) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| Error::MalformedBattleId(rejection.body_text()))?;

        segment
            .parse()
            .map(Self)
            .map_err(|_| Error::MalformedBattleId(segment))
    }
}

/// Always responds with a successful status. Used to check whether the server
/// is running.
async fn get_status() -> impl IntoResponse {
    StatusCode::OK
}

async fn list_battles<S: BattleStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<BattleSummary>>> {
    let now = OffsetDateTime::now_utc();
    let battles = state.store().list_active_battles().await?;

    Ok(Json(
        battles
            .into_iter()
            .map(|battle| BattleSummary::new(battle, now))
            .collect(),
    ))
}

async fn get_battle<S: BattleStore>(
    State(state): State<AppState<S>>,
    BattlePath(battle_id): BattlePath,
) -> Result<Json<BattleSummary>> {
    let battle = state
        .store()
        .get_battle(battle_id)
        .await?
        .ok_or(Error::BattleNotFound(battle_id))?;

    Ok(Json(BattleSummary::new(battle, OffsetDateTime::now_utc())))
}

async fn get_tally<S: BattleStore>(
    State(state): State<AppState<S>>,
    BattlePath(battle_id): BattlePath,
) -> Result<Json<Tally>> {
    Ok(Json(state.store().get_tally(battle_id).await?))
}

async fn cast_vote<S: BattleStore>(
    State(state): State<AppState<S>>,
    BattlePath(battle_id): BattlePath,
    Voter(voter_id): Voter,
    body: std::result::Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteReceipt>)> {
    // A body without a usable `choice` is an invalid choice, not a bad request.
    let choice = match body {
        Ok(Json(CastVoteRequest { choice })) => choice,
        Err(rejection) => {
            tracing::debug!("Unreadable vote body: {rejection}");
            String::new()
        }
    };

    let receipt = state.votes.cast_vote(battle_id, &voter_id, &choice).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn get_voter_votes<S: BattleStore>(
    State(state): State<AppState<S>>,
    Path(voter_id): Path<VoterId>,
) -> Result<Json<VoterVotes>> {
    let votes = state.store().votes_by_voter(&voter_id).await?;

    Ok(Json(
        votes
            .into_iter()
            .map(|vote| (vote.battle_id, vote.choice))
            .collect(),
    ))
}

async fn get_voter_stats<S: BattleStore>(
    State(state): State<AppState<S>>,
    Path(voter_id): Path<VoterId>,
) -> Result<Json<VoterStats>> {
    let store = state.store();
    let battles = store.list_active_battles().await?;
    let user_votes = store.votes_by_voter(&voter_id).await?;
    let user_points = store.voter_points(&voter_id).await?;

    Ok(Json(VoterStats {
        total_battles: battles.len() as u64,
        total_votes: battles.iter().map(|battle| battle.tally.total()).sum(),
        user_votes: user_votes.len() as u64,
        user_points,
    }))
}

async fn create_battle<S: BattleStore>(
    _admin: Admin,
    State(state): State<AppState<S>>,
    body: std::result::Result<Json<NewBattle>, JsonRejection>,
) -> Result<(StatusCode, Json<BattleSummary>)> {
    let Json(new_battle) =
        body.map_err(|rejection| InvalidBattle::Malformed(rejection.body_text()))?;
    let now = OffsetDateTime::now_utc();
    new_battle.validate(now)?;

    let battle = state
        .store()
        .create_battle(new_battle.into_battle(now))
        .await?;
    tracing::info!(battle_id = %battle.id, title = %battle.title, "Created battle");

    Ok((StatusCode::CREATED, Json(BattleSummary::new(battle, now))))
}

async fn deactivate_battle<S: BattleStore>(
    _admin: Admin,
    State(state): State<AppState<S>>,
    BattlePath(battle_id): BattlePath,
) -> Result<Json<BattleSummary>> {
    let battle = state.store().deactivate_battle(battle_id).await?;
    tracing::info!(%battle_id, "Deactivated battle");

    Ok(Json(BattleSummary::new(battle, OffsetDateTime::now_utc())))
}

async fn reconcile_battle<S: BattleStore>(
    _admin: Admin,
    State(state): State<AppState<S>>,
    BattlePath(battle_id): BattlePath,
) -> Result<Json<Tally>> {
    Ok(Json(state.store().reconcile_tally(battle_id).await?))
}
