//! The matchmaking service: a single serializer task owning the queue of
//! waiting players.
//!
//! All mutation arrives over four bounded channels (connect, disconnect,
//! broadcast, commands) and is applied on the 250 ms tick: drain the
//! channels, process stale-protected removals in admission order, drain
//! every client's inbound queue, pair waiting clients first-come
//! first-served, then poll the ready checks. On mutual accept a match row
//! is created and both clients are dismissed so they can reconnect to the
//! game service with the new match ID.

mod client;
mod pair;

pub use client::MmClient;
pub use pair::{ClientPair, PairSlot};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocket;
use blade2_types::{B2Code, Command, Payload};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, DisconnectRequest};
use crate::persistence::Store;
use crate::{POLL_TIME, SERVICE_BUFFER_SIZE};

/// Maximum time to wait for both accepts of a ready check.
const READY_CHECK_TIME: Duration = Duration::from_secs(20);

/// Cheap handle for feeding the matchmaking serializer.
#[derive(Clone)]
pub struct MatchmakingHandle {
    pub(crate) connect: mpsc::Sender<MmClient>,
    pub(crate) disconnect: mpsc::Sender<DisconnectRequest>,
    pub(crate) broadcast: mpsc::Sender<Payload>,
    pub(crate) commands: mpsc::Sender<Command>,
}

impl MatchmakingHandle {
    /// Wraps an admitted websocket as a queue client and submits it to the
    /// serializer.
    pub fn add_client(&self, socket: WebSocket, db_id: u64, public_id: String, mmr: i32) {
        let connection = Connection::spawn(socket, db_id, None, self.disconnect.clone());
        let client = MmClient::new(db_id, public_id, mmr, connection);
        if let Err(mpsc::error::TrySendError::Full(client)) = self.connect.try_send(client) {
            warn!(db_id, "matchmaking connect channel full, dropping client");
            client.connection.close(Payload::new(
                B2Code::UnknownConnectionError,
                "Matchmaking service unavailable",
            ));
        }
    }

    /// Queues a notice for every connected client.
    pub fn broadcast(&self, payload: Payload) {
        let _ = self.broadcast.try_send(payload);
    }

    /// Queues an ops command.
    pub fn command(&self, command: Command) {
        let _ = self.commands.try_send(command);
    }
}

/// The queue itself, owned by its serializer task.
pub struct MatchmakingQueue {
    store: Arc<dyn Store>,

    /// Everyone currently matchmaking, by database ID.
    queue: HashMap<u64, MmClient>,
    /// Database IDs in admission order.
    join_order: Vec<u64>,
    next_order_index: u64,

    /// Pairs currently undergoing or awaiting a ready check.
    pairs: Vec<ClientPair>,

    /// Removals accumulated this tick, processed at the next tick start.
    pending_removals: Vec<DisconnectRequest>,

    connect_rx: mpsc::Receiver<MmClient>,
    disconnect_rx: mpsc::Receiver<DisconnectRequest>,
    broadcast_rx: mpsc::Receiver<Payload>,
    commands_rx: mpsc::Receiver<Command>,
}

impl MatchmakingQueue {
    pub fn new(store: Arc<dyn Store>) -> (MatchmakingQueue, MatchmakingHandle) {
        let (connect_tx, connect_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);
        let (commands_tx, commands_rx) = mpsc::channel(SERVICE_BUFFER_SIZE);

        let queue = MatchmakingQueue {
            store,
            queue: HashMap::new(),
            join_order: Vec::new(),
            next_order_index: 0,
            pairs: Vec::new(),
            pending_removals: Vec::new(),
            connect_rx,
            disconnect_rx,
            broadcast_rx,
            commands_rx,
        };
        let handle = MatchmakingHandle {
            connect: connect_tx,
            disconnect: disconnect_tx,
            broadcast: broadcast_tx,
            commands: commands_tx,
        };
        (queue, handle)
    }

    /// Starts the serializer task and returns its handle.
    pub fn spawn(store: Arc<dyn Store>) -> MatchmakingHandle {
        let (queue, handle) = MatchmakingQueue::new(store);
        tokio::spawn(queue.run());
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
        self.drain_channels();
        self.process_removals();

        for client in self.queue.values_mut() {
            client.tick(now);
        }

        self.matchmake(now);
        self.poll_ready_checks(now);
    }

    fn drain_channels(&mut self) {
        while let Ok(client) = self.connect_rx.try_recv() {
            self.admit(client);
        }
        while let Ok(request) = self.disconnect_rx.try_recv() {
            self.pending_removals.push(request);
        }
        while let Ok(payload) = self.broadcast_rx.try_recv() {
            for client in self.queue.values() {
                client.send(payload.clone());
            }
        }
        while let Ok(command) = self.commands_rx.try_recv() {
            info!(kind = ?command.kind, data = %command.data, "processing command");
        }
    }

    /// Adds a freshly authenticated client, evicting any previous connection
    /// for the same user. The replacement inherits the old admission order.
    fn admit(&mut self, mut client: MmClient) {
        if let Some(old) = self.queue.remove(&client.db_id) {
            client.order_index = old.order_index;
            old.connection.close(Payload::new(
                B2Code::MatchMultipleConnections,
                "Removing old connection from same client",
            ));
        } else {
            client.order_index = self.next_order_index;
            self.next_order_index += 1;
            self.join_order.push(client.db_id);
        }

        client.send(Payload::new(B2Code::JoinedQueue, "Added to matchmaking queue"));
        info!(
            public_id = %client.public_id,
            total = self.queue.len() + 1,
            "client joined the matchmaking queue"
        );
        self.queue.insert(client.db_id, client);
    }

    /// Applies pending removals in admission order. A request only takes
    /// effect if it refers to the connection currently in the queue, so a
    /// removal racing a reconnect cannot evict the fresh connection.
    fn process_removals(&mut self) {
        if self.pending_removals.is_empty() {
            return;
        }
        let mut removals = std::mem::take(&mut self.pending_removals);
        removals.sort_by_key(|request| {
            self.queue
                .get(&request.db_id)
                .map(|client| client.order_index)
                .unwrap_or(u64::MAX)
        });

        for request in removals {
            let Some(client) = self.queue.get(&request.db_id) else {
                continue;
            };
            if client.connection.uuid() != request.uuid {
                debug!(db_id = request.db_id, "ignoring removal for stale connection");
                continue;
            }

            let client = self.queue.remove(&request.db_id).expect("client present");
            client
                .connection
                .close(Payload::new(request.reason, request.message));
            self.join_order.retain(|db_id| *db_id != request.db_id);
            info!(
                public_id = %client.public_id,
                total = self.queue.len(),
                "client left the matchmaking queue"
            );
        }
    }

    /// Pairs waiting clients two at a time in admission order. First come,
    /// first served; clients already in a ready check are skipped.
    fn matchmake(&mut self, now: Instant) {
        let eligible: Vec<u64> = self
            .join_order
            .iter()
            .copied()
            .filter(|db_id| {
                self.queue
                    .get(db_id)
                    .is_some_and(|client| !client.is_ready_checking)
            })
            .collect();

        for chunk in eligible.chunks(2) {
            let [first, second] = chunk else {
                break;
            };
            self.start_ready_check(*first, *second, now);
        }
    }

    fn start_ready_check(&mut self, first: u64, second: u64, now: Instant) {
        let mut slots = [PairSlot {
            db_id: 0,
            uuid: uuid::Uuid::nil(),
        }; 2];

        for (slot, db_id) in slots.iter_mut().zip([first, second]) {
            let client = self.queue.get_mut(&db_id).expect("paired client present");
            client.is_ready_checking = true;
            client.send(Payload::new(B2Code::MatchMakingGameFound, ""));
            *slot = PairSlot {
                db_id,
                uuid: client.connection.uuid(),
            };
        }

        self.pairs.push(ClientPair::new(slots[0], slots[1], now));
        debug!(first, second, "ready check started");
    }

    fn poll_ready_checks(&mut self, now: Instant) {
        let pairs = std::mem::take(&mut self.pairs);
        for pair in pairs {
            if !self.poll_ready_check(&pair, now) {
                self.pairs.push(pair);
            }
        }
    }

    /// Advances one pair's ready check. Returns true when the pair is done
    /// and should be dropped from the list.
    fn poll_ready_check(&mut self, pair: &ClientPair, now: Instant) -> bool {
        let timed_out = now.saturating_duration_since(pair.ready_start) > READY_CHECK_TIME;
        let first_valid = self.ready_valid(&pair.slots[0], pair.ready_start);
        let second_valid = self.ready_valid(&pair.slots[1], pair.ready_start);

        if (first_valid && second_valid) || timed_out {
            if timed_out && !(first_valid && second_valid) {
                // Partial failure: non-confirming clients are removed, the
                // confirming one goes back in the pool keeping its place.
                for (slot, valid) in pair.slots.iter().zip([first_valid, second_valid]) {
                    if valid {
                        if let Some(client) = self.pair_client_mut(slot) {
                            client.is_ready_checking = false;
                            client.ready = false;
                            client.send(Payload::new(B2Code::OpponentDidNotAccept, ""));
                        }
                    } else {
                        self.pending_removals.push(DisconnectRequest {
                            db_id: slot.db_id,
                            match_id: None,
                            uuid: slot.uuid,
                            reason: B2Code::ReadyCheckFailed,
                            message: String::new(),
                        });
                    }
                }
                return true;
            }

            // Both confirmed: create the match row and dismiss the pair.
            match self
                .store
                .create_match(pair.slots[0].db_id, pair.slots[1].db_id)
            {
                Ok(match_id) => {
                    let confirmation =
                        Payload::new(B2Code::MatchConfirmed, match_id.to_string());
                    for slot in &pair.slots {
                        if let Some(client) = self.pair_client(slot) {
                            client.send(confirmation.clone());
                        }
                        self.pending_removals.push(DisconnectRequest {
                            db_id: slot.db_id,
                            match_id: None,
                            uuid: slot.uuid,
                            reason: B2Code::Info,
                            message: "Match found - closing connection".to_string(),
                        });
                    }
                    info!(match_id, "match confirmed");
                }
                Err(err) => {
                    error!(%err, "failed to create a match");
                    for slot in &pair.slots {
                        self.pending_removals.push(DisconnectRequest {
                            db_id: slot.db_id,
                            match_id: None,
                            uuid: slot.uuid,
                            reason: B2Code::ReadyCheckFailed,
                            message: String::new(),
                        });
                    }
                }
            }
            return true;
        }

        if first_valid != second_valid {
            // One side accepted: tell the other, once.
            let (valid, other) = if first_valid {
                (&pair.slots[0], &pair.slots[1])
            } else {
                (&pair.slots[1], &pair.slots[0])
            };
            let already_relayed = self
                .pair_client(valid)
                .map(|client| client.accept_relayed)
                .unwrap_or(true);
            if !already_relayed {
                if let Some(client) = self.pair_client_mut(valid) {
                    client.accept_relayed = true;
                }
                if let Some(client) = self.pair_client(other) {
                    client.send(Payload::new(B2Code::OpponentAccepted, ""));
                }
            }
        }

        false
    }

    /// The queue entry a pair slot refers to, unless the user reconnected
    /// since the pair was formed.
    fn pair_client(&self, slot: &PairSlot) -> Option<&MmClient> {
        self.queue
            .get(&slot.db_id)
            .filter(|client| client.connection.uuid() == slot.uuid)
    }

    fn pair_client_mut(&mut self, slot: &PairSlot) -> Option<&mut MmClient> {
        self.queue
            .get_mut(&slot.db_id)
            .filter(|client| client.connection.uuid() == slot.uuid)
    }

    fn ready_valid(&self, slot: &PairSlot, ready_start: Instant) -> bool {
        self.pair_client(slot).is_some_and(|client| {
            client.ready
                && client.ready_time.is_some_and(|accepted| {
                    accepted.saturating_duration_since(ready_start) <= READY_CHECK_TIME
                })
        })
    }

    /// Test visibility into the queue contents.
    #[cfg(test)]
    pub(crate) fn queued(&self) -> &HashMap<u64, MmClient> {
        &self.queue
    }

    #[cfg(test)]
    pub(crate) fn join_order(&self) -> &[u64] {
        &self.join_order
    }
}
