//! A client seated (or being seated) in a match.

use blade2_types::Payload;

use crate::connection::Connection;

/// An authenticated, match-validated player connection.
pub struct GClient {
    pub db_id: u64,
    pub public_id: String,
    pub display_name: String,
    pub avatar: u8,
    pub match_id: u64,
    pub connection: Connection,
}

impl GClient {
    pub fn new(
        db_id: u64,
        public_id: String,
        display_name: String,
        avatar: u8,
        match_id: u64,
        connection: Connection,
    ) -> GClient {
        GClient {
            db_id,
            public_id,
            display_name,
            avatar,
            match_id,
            connection,
        }
    }

    pub fn send(&self, payload: Payload) {
        self.connection.send(payload);
    }
}
