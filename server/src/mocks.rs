//! In-memory persistence mock for service and gatekeeper tests.
//!
//! Records every match-start and match-result call so tests can assert on
//! exactly-once behavior, and supports injected `createMatch` failure for
//! the ready-check error path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::persistence::{AuthError, Store, StoreError};

struct UserRow {
    db_id: u64,
    token: String,
    banned: bool,
    expired: bool,
    mmr: i32,
    display_name: String,
    avatar: u8,
}

struct MatchRow {
    player1: u64,
    player2: u64,
    started: bool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRow>,
    matches: HashMap<u64, MatchRow>,
    next_match_id: u64,
    match_starts: Vec<u64>,
    match_results: Vec<(u64, u64)>,
}

/// A `Store` backed by hash maps, with call recording.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_create_match: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: Mutex::new(Inner {
                next_match_id: 1,
                ..Inner::default()
            }),
            fail_create_match: AtomicBool::new(false),
        }
    }

    pub fn with_user(self, public_id: &str, db_id: u64, token: &str) -> Self {
        self.inner.lock().unwrap().users.insert(
            public_id.to_string(),
            UserRow {
                db_id,
                token: token.to_string(),
                banned: false,
                expired: false,
                mmr: 1000,
                display_name: format!("player-{db_id}"),
                avatar: 0,
            },
        );
        self
    }

    pub fn banned(self, public_id: &str) -> Self {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(public_id) {
            user.banned = true;
        }
        self
    }

    pub fn expired(self, public_id: &str) -> Self {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(public_id) {
            user.expired = true;
        }
        self
    }

    pub fn with_match(self, match_id: u64, player1: u64, player2: u64) -> Self {
        self.inner.lock().unwrap().matches.insert(
            match_id,
            MatchRow {
                player1,
                player2,
                started: false,
            },
        );
        self
    }

    /// Makes subsequent `create_match` calls fail.
    pub fn with_create_match_failure(self) -> Self {
        self.fail_create_match.store(true, Ordering::SeqCst);
        self
    }

    /// Every `(match_id, winner)` recorded so far.
    pub fn match_results(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().match_results.clone()
    }

    pub fn match_starts(&self) -> Vec<u64> {
        self.inner.lock().unwrap().match_starts.clone()
    }

    pub fn created_match_ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<u64> = inner.matches.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl Store for MemoryStore {
    fn validate_auth(&self, public_id: &str, token: &str) -> Result<u64, AuthError> {
        let inner = self.inner.lock().unwrap();
        let Some(user) = inner.users.get(public_id) else {
            return Err(AuthError::BadCredentials);
        };
        if user.banned {
            return Err(AuthError::Banned);
        }
        if user.token != token {
            return Err(AuthError::BadCredentials);
        }
        if user.expired {
            return Err(AuthError::Expired);
        }
        Ok(user.db_id)
    }

    fn mmr(&self, db_id: u64) -> Result<i32, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .values()
            .find(|user| user.db_id == db_id)
            .map(|user| user.mmr)
            .ok_or(StoreError::NotFound)
    }

    fn display_and_avatar(&self, db_id: u64) -> Result<(String, u8), StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .values()
            .find(|user| user.db_id == db_id)
            .map(|user| (user.display_name.clone(), user.avatar))
            .ok_or(StoreError::NotFound)
    }

    fn create_match(&self, player1: u64, player2: u64) -> Result<u64, StoreError> {
        if self.fail_create_match.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected create failure".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        while inner.matches.contains_key(&inner.next_match_id) {
            inner.next_match_id += 1;
        }
        let match_id = inner.next_match_id;
        inner.next_match_id += 1;
        inner.matches.insert(
            match_id,
            MatchRow {
                player1,
                player2,
                started: false,
            },
        );
        Ok(match_id)
    }

    fn validate_match(&self, db_id: u64, match_id: u64) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.matches.get(&match_id).is_some_and(|row| {
            !row.started && (row.player1 == db_id || row.player2 == db_id)
        }))
    }

    fn set_match_start(&self, match_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.matches.get_mut(&match_id) {
            row.started = true;
        }
        inner.match_starts.push(match_id);
        Ok(())
    }

    fn set_match_result(&self, match_id: u64, winner_db_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.match_results.push((match_id, winner_db_id));
        Ok(())
    }
}
