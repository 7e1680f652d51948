//! A pair of queued clients undergoing a ready check.

use std::time::Instant;

use uuid::Uuid;

/// One side of a pair. The UUID pins the pair to the connection it was
/// formed with: if the user reconnects mid-check, the dangling side simply
/// never validates and the pair dissolves at the timeout.
#[derive(Clone, Copy, Debug)]
pub struct PairSlot {
    pub db_id: u64,
    pub uuid: Uuid,
}

/// Two matched clients and the instant their ready check started.
#[derive(Clone, Copy, Debug)]
pub struct ClientPair {
    pub slots: [PairSlot; 2],
    pub ready_start: Instant,
}

impl ClientPair {
    pub fn new(first: PairSlot, second: PairSlot, ready_start: Instant) -> ClientPair {
        ClientPair {
            slots: [first, second],
            ready_start,
        }
    }
}
