//! The game service: a single serializer task owning every active match.
//!
//! Clients arrive pre-authenticated and pre-validated from the gatekeeper.
//! The tick seats new arrivals (starting the match once both seats fill),
//! moves pending disconnects through a one-tick barrier, ticks every
//! playing match, and then finalizes the disconnects decided on the
//! previous iteration: reason mapping, the single result write, stats
//! reporting, and connection teardown.

mod client;
mod matches;

pub use client::GClient;
pub use matches::Match;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocket;
use blade2_execution::{generate_cards, initialize_cards, MatchState};
use blade2_types::{B2Code, Command, Payload, Phase, Player};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, DisconnectRequest};
use crate::game::matches::{CARD_DRAW_DELAY, TURN_MAX_WAIT};
use crate::persistence::Store;
use crate::stats::{MatchWinner, StatsClient};
use crate::{POLL_TIME, SERVICE_BUFFER_SIZE};

/// Reserved match ID whose games never touch persistence or stats.
const DEBUG_MATCH_ID: u64 = 20;

/// Cheap handle for feeding the game serializer.
#[derive(Clone)]
pub struct GameHandle {
    pub(crate) connect: mpsc::Sender<GClient>,
    pub(crate) disconnect: mpsc::Sender<DisconnectRequest>,
    pub(crate) broadcast: mpsc::Sender<Payload>,
    pub(crate) commands: mpsc::Sender<Command>,
}

impl GameHandle {
    /// Wraps an admitted websocket as a game client and submits it for
    /// seating.
    #[allow(clippy::too_many_arguments)]
    pub fn add_client(
        &self,
        socket: WebSocket,
        db_id: u64,
        public_id: String,
        display_name: String,
        avatar: u8,
        match_id: u64,
    ) {
        let connection = Connection::spawn(socket, db_id, Some(match_id), self.disconnect.clone());
        let client = GClient::new(db_id, public_id, display_name, avatar, match_id, connection);
        if let Err(mpsc::error::TrySendError::Full(client)) = self.connect.try_send(client) {
            warn!(db_id, match_id, "game connect channel full, dropping client");
            client.connection.close(Payload::new(
                B2Code::UnknownConnectionError,
                "Game service unavailable",
            ));
        }
    }

    pub fn broadcast(&self, payload: Payload) {
        let _ = self.broadcast.try_send(payload);
    }

    pub fn command(&self, command: Command) {
        let _ = self.commands.try_send(command);
    }
}

/// The game service state, owned by its serializer task.
pub struct GameServer {
    store: Arc<dyn Store>,
    stats: StatsClient,
    rng: StdRng,

    matches: HashMap<u64, Match>,

    /// Removals produced by match ticks, finalized on the next iteration.
    deferred_removals: Vec<DisconnectRequest>,

    connect_rx: mpsc::Receiver<GClient>,
    disconnect_rx: mpsc::Receiver<DisconnectRequest>,
    broadcast_rx: mpsc::Receiver<Payload>,
    commands_rx: mpsc::Receiver<Command>,
}

impl GameServer {
    pub fn new(
        store: Arc<dyn Store>,
        stats: StatsClient,
        rng: StdRng,
    ) -> (GameServer, GameHandle) {
        let (connect_tx, connect_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (commands_tx, commands_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);

        let server = GameServer {
            store,
            stats,
            rng,
            matches: HashMap::new(),
            deferred_removals: Vec::new(),
            connect_rx,
            disconnect_rx,
            broadcast_rx,
            commands_rx,
        };
        let handle = GameHandle {
            connect: connect_tx,
            disconnect: disconnect_tx,
            broadcast: broadcast_tx,
            commands: commands_tx,
        };
        (server, handle)
    }

    /// Starts the serializer task and returns its handle.
    pub fn spawn(store: Arc<dyn Store>, stats: StatsClient) -> GameHandle {
        let (server, handle) = GameServer::new(store, stats, StdRng::from_entropy());
        tokio::spawn(server.run());
        handle
    }

    async fn run(mut self) {
        loop {
            let start = Instant::now();
            self.tick(start);
            match POLL_TIME.checked_sub(start.elapsed()) {
                Some(remaining) => tokio::time::sleep(remaining).await,
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// One serializer iteration.
    pub fn tick(&mut self, now: Instant) {
        while let Ok(client) = self.connect_rx.try_recv() {
            self.seat_client(client, now);
        }
        while let Ok(payload) = self.broadcast_rx.try_recv() {
            for m in self.matches.values() {
                m.broadcast(payload.clone());
            }
        }
        while let Ok(command) = self.commands_rx.try_recv() {
            info!(kind = ?command.kind, data = %command.data, "processing command");
        }

        // Barrier: everything queued before this point is finalized this
        // tick; removals produced below wait for the next one.
        let mut immediate = std::mem::take(&mut self.deferred_removals);
        while let Ok(request) = self.disconnect_rx.try_recv() {
            immediate.push(request);
        }

        let mut produced = Vec::new();
        for m in self.matches.values_mut() {
            if m.phase == Phase::Play {
                produced.extend(m.tick(now));
            }
        }
        self.deferred_removals.extend(produced);

        for request in immediate {
            self.handle_removal(request);
        }
    }

    /// Seats an arriving client in its match, creating the match on first
    /// arrival and starting it when both seats fill.
    fn seat_client(&mut self, client: GClient, now: Instant) {
        let match_id = client.match_id;
        let total = self.matches.len();

        let Some(m) = self.matches.get_mut(&match_id) else {
            client.send(Payload::new(B2Code::MatchJoined, "Joined match"));
            info!(
                public_id = %client.public_id,
                match_id,
                total = self.matches.len() + 1,
                "client joined match"
            );
            self.matches.insert(match_id, Match::new(match_id, client));
            return;
        };

        if m.phase >= Phase::Play {
            client.connection.close(Payload::new(
                B2Code::MatchFull,
                "Attempted to join a match which already has both clients registered",
            ));
            return;
        }

        // A reconnect by a seated user replaces the old connection; anyone
        // else takes an empty seat. Never seat the same user twice.
        let seat = if let Some(seat) = m.seat_of(client.db_id) {
            let old = match seat {
                Player::P1 => m.client1.replace(client),
                _ => m.client2.replace(client),
            };
            if let Some(old) = old {
                old.connection.close(Payload::new(
                    B2Code::MatchMultipleConnections,
                    "Removing old connection from same client",
                ));
            }
            seat
        } else if m.client1.is_none() {
            m.client1 = Some(client);
            Player::P1
        } else if m.client2.is_none() {
            m.client2 = Some(client);
            Player::P2
        } else {
            client.connection.close(Payload::new(
                B2Code::MatchFull,
                "Attempted to join a match which already has both clients registered",
            ));
            return;
        };

        if let Some(seated) = m.client(seat) {
            seated.send(Payload::new(B2Code::MatchJoined, "Joined match"));
            info!(
                public_id = %seated.public_id,
                match_id,
                total,
                "client joined match"
            );
        }

        if m.both_seated() {
            self.start_match(match_id, now);
        }
    }

    /// Deals the cards, publishes the opening state to both clients, and
    /// arms the first turn timer.
    fn start_match(&mut self, match_id: u64, now: Instant) {
        let dealt = generate_cards(&mut self.rng);
        let initialized = initialize_cards(&dealt);

        let Some(m) = self.matches.get_mut(&match_id) else {
            return;
        };
        m.state = MatchState::new(initialized);
        m.phase = Phase::Play;
        m.turn_deadline = Some(now + TURN_MAX_WAIT + CARD_DRAW_DELAY);

        m.send_card_data(&dealt.serialized_decks());
        m.send_player_data();
        m.send_opponent_data();

        info!(match_id, total = self.matches.len(), "match started");

        if match_id == DEBUG_MATCH_ID {
            return;
        }
        let store = self.store.clone();
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || store.set_match_start(match_id)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(%err, match_id, "failed to update match phase"),
                Err(err) => error!(%err, match_id, "match start task failed"),
            }
        });
    }

    /// Finalizes one disconnect request: reason mapping, the single result
    /// write, and connection teardown for one or both seats.
    fn handle_removal(&mut self, request: DisconnectRequest) {
        let Some(match_id) = request.match_id else {
            return;
        };
        let Some(m) = self.matches.get_mut(&match_id) else {
            debug!(db_id = request.db_id, match_id, "disconnect for unknown match");
            return;
        };
        let Some(seat) = m.seat_of(request.db_id) else {
            debug!(db_id = request.db_id, match_id, "disconnect for unseated client");
            return;
        };
        if m.client(seat).map(|c| c.connection.uuid()) != Some(request.uuid) {
            // The request refers to a connection that has since been
            // replaced; the live match is left intact.
            debug!(db_id = request.db_id, match_id, "ignoring stale disconnect");
            return;
        }

        // A gracefully finished match ignores everything except its own
        // terminal notifications.
        if m.phase == Phase::Finished
            && m.result_recorded
            && request.reason != B2Code::MatchWin
            && request.reason != B2Code::MatchDraw
        {
            return;
        }

        if request.reason == B2Code::MatchLoss {
            error!(match_id, "declare the winner instead of setting a loss");
            return;
        }

        let other_seat = seat.other();
        let started = m.phase > Phase::WaitingForPlayers;

        let (initiator_payload, other_payload) = match request.reason {
            B2Code::UnknownConnectionError => {
                // A broken transport forfeits the match; the survivor wins.
                if started {
                    if let Some(db_id) = m.client(other_seat).map(|c| c.db_id) {
                        m.winner = db_id;
                    }
                }
                (
                    Payload::new(B2Code::MatchForfeit, "Post-forfeit quit"),
                    Payload::new(B2Code::MatchForfeit, "Opponent forfeited the match"),
                )
            }
            B2Code::MatchForfeit => (
                Payload::new(B2Code::MatchForfeit, "Post-forfeit quit"),
                Payload::new(B2Code::MatchForfeit, "Opponent forfeited the match"),
            ),
            B2Code::MatchIllegalMove => (
                Payload::new(B2Code::MatchIllegalMove, "Post-illegal move forfeit quit"),
                Payload::new(B2Code::MatchForfeit, "Opponent forfeited the match"),
            ),
            B2Code::MatchTimeOut => (
                Payload::new(B2Code::MatchTimeOut, "Timed out"),
                Payload::new(B2Code::MatchForfeit, "Opponent timed out"),
            ),
            B2Code::MatchWin => (
                Payload::new(B2Code::MatchWin, "Victory"),
                Payload::new(B2Code::MatchLoss, "Defeat"),
            ),
            reason => (
                Payload::new(reason, request.message.clone()),
                Payload::new(reason, request.message),
            ),
        };

        if started && !m.result_recorded && match_id != DEBUG_MATCH_ID {
            let seats = (
                m.client(Player::P1).map(|c| c.db_id),
                m.client(Player::P2).map(|c| c.db_id),
            );
            if let (Some(player1), Some(player2)) = seats {
                m.result_recorded = true;
                let winner_db = m.winner;

                if let Err(err) = self.store.set_match_result(match_id, winner_db) {
                    error!(%err, match_id, "failed to update match result");
                }

                let winner = if winner_db == player1 {
                    MatchWinner::Player1
                } else if winner_db == player2 {
                    MatchWinner::Player2
                } else {
                    MatchWinner::Draw
                };
                let stats = self.stats.clone();
                tokio::spawn(async move {
                    stats.update_match_stats(player1, player2, winner).await;
                });
            }
        }

        if let Some(initiator) = m.client(seat) {
            initiator.connection.close(initiator_payload);
        }

        if started {
            m.phase = Phase::Finished;
            if let Some(other) = m.client(other_seat) {
                other.connection.close(other_payload);
            }
            self.matches.remove(&match_id);
            info!(match_id, total = self.matches.len(), "match ended");
        } else {
            m.clear_seat(seat);
            info!(match_id, "client left, match still waiting for players");
        }
    }

    /// Test visibility into the match map.
    #[cfg(test)]
    pub(crate) fn matches(&self) -> &HashMap<u64, Match> {
        &self.matches
    }

    #[cfg(test)]
    pub(crate) fn matches_mut(&mut self) -> &mut HashMap<u64, Match> {
        &mut self.matches
    }
}
