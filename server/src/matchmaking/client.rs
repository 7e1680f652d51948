//! A client sitting in the matchmaking queue.

use std::time::Instant;

use blade2_types::{B2Code, Payload};

use crate::connection::Connection;

/// A queued, authenticated player.
pub struct MmClient {
    pub db_id: u64,
    pub public_id: String,
    pub mmr: i32,

    /// Admission order, inherited by a replacement connection for the same
    /// user so a reconnect keeps its place in line.
    pub order_index: u64,

    /// Ready-check state.
    pub ready: bool,
    pub ready_time: Option<Instant>,
    pub is_ready_checking: bool,
    /// Whether the opponent has already been told this client accepted.
    pub accept_relayed: bool,

    pub connection: Connection,
}

impl MmClient {
    pub fn new(db_id: u64, public_id: String, mmr: i32, connection: Connection) -> MmClient {
        MmClient {
            db_id,
            public_id,
            mmr,
            order_index: 0,
            ready: false,
            ready_time: None,
            is_ready_checking: false,
            accept_relayed: false,
            connection,
        }
    }

    /// Drains this client's inbound queue, recording a ready-check accept
    /// when one arrives.
    pub fn tick(&mut self, now: Instant) {
        while let Some(payload) = self.connection.poll_inbound() {
            if payload.b2code() == Some(B2Code::MatchMakingAccept) {
                self.ready = true;
                self.ready_time = Some(now);
            }
        }
    }

    pub fn send(&self, payload: Payload) {
        self.connection.send(payload);
    }
}
