//! The persistence collaborator: a narrow store interface plus the SQLite
//! implementation used in production.
//!
//! The services only ever see the [`Store`] trait; everything else about the
//! database is private to this module. All calls are synchronous; async
//! call sites wrap them in `spawn_blocking`.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::params;
use thiserror::Error;

/// Minimum remaining validity on an auth token before it is considered
/// expired. Avoids races when a token rotates mid-handshake.
const AUTH_EXPIRY_GRACE: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("database failure: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Why an auth check failed. Each variant maps to its own close code at the
/// gatekeeper.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credentials are invalid")]
    BadCredentials,
    #[error("user is banned")]
    Banned,
    #[error("auth token is expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The persistence calls the services depend on.
pub trait Store: Send + Sync {
    /// Checks the credentials and returns the user's database ID.
    fn validate_auth(&self, public_id: &str, token: &str) -> Result<u64, AuthError>;

    /// Current MMR for the user.
    fn mmr(&self, db_id: u64) -> Result<i32, StoreError>;

    /// Display name and avatar ID for the user. Failure here is non-fatal
    /// to admission.
    fn display_and_avatar(&self, db_id: u64) -> Result<(String, u8), StoreError>;

    /// Creates a match row for the two players and returns its ID.
    fn create_match(&self, player1: u64, player2: u64) -> Result<u64, StoreError>;

    /// True if the match exists, has not started, and the user is one of its
    /// participants.
    fn validate_match(&self, db_id: u64, match_id: u64) -> Result<bool, StoreError>;

    /// Marks the match as started.
    fn set_match_start(&self, match_id: u64) -> Result<(), StoreError>;

    /// Records the final result. A winner of zero means a draw.
    fn set_match_result(&self, match_id: u64, winner_db_id: u64) -> Result<(), StoreError>;
}

/// SQLite-backed store. The connection is serialized behind a mutex; every
/// query is a short point lookup or single-row write.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        let conn = rusqlite::Connection::open(path)?;
        init_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<SqliteStore, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().expect("store connection poisoned")
    }

    /// Inserts a user with a profile and token, for tests and local setup.
    #[cfg(any(test, feature = "mocks"))]
    pub fn seed_user(
        &self,
        public_id: &str,
        display_name: &str,
        banned: bool,
        mmr: i32,
        avatar: u8,
        token: &str,
        token_validity: Duration,
    ) -> Result<u64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (public_id, display_name, banned) VALUES (?1, ?2, ?3)",
            params![public_id, display_name, banned as i64],
        )?;
        let db_id = conn.last_insert_rowid() as u64;
        conn.execute(
            "INSERT INTO profiles (user_id, mmr, avatar) VALUES (?1, ?2, ?3)",
            params![db_id as i64, mmr, avatar as i64],
        )?;
        let expires_at = unix_now() + token_validity.as_secs() as i64;
        conn.execute(
            "INSERT INTO tokens (user_id, token, expires_at) VALUES (?1, ?2, ?3)",
            params![db_id as i64, token, expires_at],
        )?;
        Ok(db_id)
    }
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS users (
             id INTEGER PRIMARY KEY,
             public_id TEXT NOT NULL UNIQUE,
             display_name TEXT NOT NULL,
             banned INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS profiles (
             user_id INTEGER PRIMARY KEY REFERENCES users(id),
             mmr INTEGER NOT NULL DEFAULT 0,
             avatar INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS tokens (
             user_id INTEGER NOT NULL REFERENCES users(id),
             token TEXT NOT NULL,
             expires_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS matches (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             player1 INTEGER NOT NULL,
             player2 INTEGER NOT NULL,
             phase INTEGER NOT NULL DEFAULT 0,
             winner INTEGER NOT NULL DEFAULT 0,
             started_at INTEGER,
             ended_at INTEGER
         );",
    )?;
    Ok(())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Store for SqliteStore {
    fn validate_auth(&self, public_id: &str, token: &str) -> Result<u64, AuthError> {
        let conn = self.lock();

        let (db_id, banned): (i64, i64) = conn
            .query_row(
                "SELECT id, banned FROM users WHERE public_id = ?1",
                params![public_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|err| match StoreError::from(err) {
                StoreError::NotFound => AuthError::BadCredentials,
                other => AuthError::Store(other),
            })?;

        if banned != 0 {
            return Err(AuthError::Banned);
        }

        let expires_at: i64 = conn
            .query_row(
                "SELECT expires_at FROM tokens WHERE user_id = ?1 AND token = ?2",
                params![db_id, token],
                |row| row.get(0),
            )
            .map_err(|err| match StoreError::from(err) {
                StoreError::NotFound => AuthError::BadCredentials,
                other => AuthError::Store(other),
            })?;

        if expires_at - unix_now() <= AUTH_EXPIRY_GRACE.as_secs() as i64 {
            return Err(AuthError::Expired);
        }

        Ok(db_id as u64)
    }

    fn mmr(&self, db_id: u64) -> Result<i32, StoreError> {
        let conn = self.lock();
        let mmr = conn.query_row(
            "SELECT mmr FROM profiles WHERE user_id = ?1",
            params![db_id as i64],
            |row| row.get(0),
        )?;
        Ok(mmr)
    }

    fn display_and_avatar(&self, db_id: u64) -> Result<(String, u8), StoreError> {
        let conn = self.lock();
        let (name, avatar): (String, i64) = conn.query_row(
            "SELECT u.display_name, p.avatar FROM users u
             JOIN profiles p ON p.user_id = u.id
             WHERE u.id = ?1",
            params![db_id as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((name, avatar as u8))
    }

    fn create_match(&self, player1: u64, player2: u64) -> Result<u64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO matches (player1, player2, phase) VALUES (?1, ?2, 0)",
            params![player1 as i64, player2 as i64],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    fn validate_match(&self, db_id: u64, match_id: u64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM matches
             WHERE id = ?1 AND phase = 0 AND (player1 = ?2 OR player2 = ?2)",
            params![match_id as i64, db_id as i64],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn set_match_start(&self, match_id: u64) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE matches SET phase = 1, started_at = ?1 WHERE id = ?2",
            params![unix_now(), match_id as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn set_match_result(&self, match_id: u64, winner_db_id: u64) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE matches SET phase = 2, winner = ?1, ended_at = ?2 WHERE id = ?3",
            params![winner_db_id as i64, unix_now(), match_id as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
