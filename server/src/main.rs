//! Entry point: argument parsing, tracing, store and service startup, and
//! the two websocket endpoints.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use blade2_server::game::{GameHandle, GameServer};
use blade2_server::matchmaking::{MatchmakingHandle, MatchmakingQueue};
use blade2_server::persistence::{SqliteStore, Store};
use blade2_server::stats::StatsClient;
use blade2_server::gatekeeper;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 20000)]
    port: u16,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "blade2.db")]
    database: PathBuf,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn Store>,
    matchmaking: MatchmakingHandle,
    game: GameHandle,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&args.database)
            .with_context(|| format!("failed to open database {}", args.database.display()))?,
    );
    let stats = StatsClient::from_env();

    let matchmaking = MatchmakingQueue::spawn(store.clone());
    let game = GameServer::spawn(store.clone(), stats);

    let app = Router::new()
        .route("/matchmaking", get(matchmaking_handler))
        .route("/game", get(game_handler))
        .route("/healthz", get(healthz))
        .with_state(AppState {
            store,
            matchmaking,
            game,
        });

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Blade II Online game server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn matchmaking_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        gatekeeper::handle_matchmaking(socket, state.store, state.matchmaking)
    })
}

async fn game_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| gatekeeper::handle_game(socket, state.store, state.game))
}

async fn healthz() -> &'static str {
    "ok"
}
