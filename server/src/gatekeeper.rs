//! Admission handling for raw websocket connections, before they are
//! packaged and handed to a service.
//!
//! Both endpoints share the auth handshake: one frame carrying
//! `"<publicId>:<token>"` inside the admission window, acknowledged,
//! validated against the store, then confirmed. The game endpoint reads a
//! second frame naming the match to join and checks the authenticated user
//! is a participant of a match that has not started. Any failure closes the
//! connection with the most specific code; nothing reaches a service core
//! until admission has fully succeeded.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use blade2_types::{B2Code, Payload};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::game::GameHandle;
use crate::matchmaking::MatchmakingHandle;
use crate::persistence::{AuthError, Store, StoreError};

/// Maximum time from connection to completed admission.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Delimiter between the public ID and token in an auth message.
const AUTH_DELIMITER: char = ':';

/// Time to let a farewell drain before the socket is dropped.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

enum ReadError {
    TimedOut,
    Transport(String),
}

/// Admits a connection to the matchmaking service: auth, MMR fetch, hand
/// off.
pub async fn handle_matchmaking(
    mut socket: WebSocket,
    store: Arc<dyn Store>,
    matchmaking: MatchmakingHandle,
) {
    let deadline = Instant::now() + CONNECTION_TIMEOUT;

    let payload = match read_payload(&mut socket, deadline).await {
        Ok(payload) => payload,
        Err(ReadError::TimedOut) => {
            discard(socket, Payload::new(B2Code::AuthNotReceived, "Auth not received")).await;
            return;
        }
        Err(ReadError::Transport(message)) => {
            discard(socket, Payload::new(B2Code::UnknownConnectionError, message)).await;
            return;
        }
    };

    send(&mut socket, Payload::new(B2Code::AuthReceived, "")).await;
    let (db_id, public_id) = match check_auth(&store, payload).await {
        Ok(identity) => identity,
        Err((code, message)) => {
            debug!(%message, "matchmaking admission failed");
            discard(socket, Payload::new(code, message)).await;
            return;
        }
    };
    send(&mut socket, Payload::new(B2Code::AuthSuccess, "")).await;

    let mmr = {
        let store = store.clone();
        match blocking(move || store.mmr(db_id)).await {
            Ok(mmr) => mmr,
            Err(err) => {
                discard(
                    socket,
                    Payload::new(B2Code::UnknownConnectionError, err.to_string()),
                )
                .await;
                return;
            }
        }
    };

    matchmaking.add_client(socket, db_id, public_id, mmr);
}

/// Admits a connection to the game service: auth, match validation, player
/// data fetch, hand off.
pub async fn handle_game(mut socket: WebSocket, store: Arc<dyn Store>, game: GameHandle) {
    let deadline = Instant::now() + CONNECTION_TIMEOUT;

    let payload = match read_payload(&mut socket, deadline).await {
        Ok(payload) => payload,
        Err(ReadError::TimedOut) => {
            discard(socket, Payload::new(B2Code::AuthNotReceived, "Auth not received")).await;
            return;
        }
        Err(ReadError::Transport(message)) => {
            discard(socket, Payload::new(B2Code::UnknownConnectionError, message)).await;
            return;
        }
    };

    send(&mut socket, Payload::new(B2Code::AuthReceived, "")).await;
    let (db_id, public_id) = match check_auth(&store, payload).await {
        Ok(identity) => identity,
        Err((code, message)) => {
            debug!(%message, "game admission failed");
            discard(socket, Payload::new(code, message)).await;
            return;
        }
    };
    send(&mut socket, Payload::new(B2Code::AuthSuccess, "")).await;

    // The match ID must arrive inside the same admission window.
    let payload = match read_payload(&mut socket, deadline).await {
        Ok(payload) => payload,
        Err(ReadError::TimedOut) => {
            discard(
                socket,
                Payload::new(B2Code::MatchIdNotReceived, "Match ID not received"),
            )
            .await;
            return;
        }
        Err(ReadError::Transport(message)) => {
            discard(socket, Payload::new(B2Code::UnknownConnectionError, message)).await;
            return;
        }
    };

    send(&mut socket, Payload::new(B2Code::MatchIdReceived, "")).await;
    let match_id = match validate_match(&store, db_id, payload).await {
        Ok(match_id) => match_id,
        Err((code, message)) => {
            debug!(%message, "match validation failed");
            discard(socket, Payload::new(code, message)).await;
            return;
        }
    };
    send(&mut socket, Payload::new(B2Code::MatchIdConfirmed, "")).await;

    // Missing profile data is not worth refusing a valid connection over.
    let (display_name, avatar) = {
        let store = store.clone();
        match blocking(move || store.display_and_avatar(db_id)).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(db_id, %err, "failed to fetch display name and avatar");
                ("<unknown>".to_string(), 0)
            }
        }
    };

    game.add_client(socket, db_id, public_id, display_name, avatar, match_id);
}

/// Extracts and validates credentials from an auth payload. The error side
/// carries the close code to answer with.
async fn check_auth(
    store: &Arc<dyn Store>,
    payload: Payload,
) -> Result<(u64, String), (B2Code, String)> {
    if payload.b2code() != Some(B2Code::AuthRequest) {
        return Err((
            B2Code::AuthExpected,
            "Auth expected but received something else".to_string(),
        ));
    }

    let mut parts = payload.message.split(AUTH_DELIMITER);
    let (Some(public_id), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err((B2Code::AuthBadFormat, "Auth bad format".to_string()));
    };
    let public_id = public_id.to_string();
    let token = token.to_string();

    let checked = {
        let store = store.clone();
        let public_id = public_id.clone();
        tokio::task::spawn_blocking(move || store.validate_auth(&public_id, &token)).await
    };

    match checked {
        Ok(Ok(db_id)) => Ok((db_id, public_id)),
        Ok(Err(AuthError::Banned)) => Err((B2Code::AuthBanned, "User is banned".to_string())),
        Ok(Err(AuthError::Expired)) => Err((B2Code::AuthExpired, "Token is expired".to_string())),
        Ok(Err(AuthError::BadCredentials)) => Err((
            B2Code::AuthBadCredentials,
            "Credentials invalid".to_string(),
        )),
        Ok(Err(AuthError::Store(err))) => Err((B2Code::AuthBadCredentials, err.to_string())),
        Err(err) => Err((B2Code::UnknownConnectionError, err.to_string())),
    }
}

/// Checks that the payload names a joinable match the user participates in.
async fn validate_match(
    store: &Arc<dyn Store>,
    db_id: u64,
    payload: Payload,
) -> Result<u64, (B2Code, String)> {
    if payload.b2code() != Some(B2Code::MatchId) {
        return Err((
            B2Code::MatchIdExpected,
            "Match ID expected but received something else".to_string(),
        ));
    }

    let match_id: u64 = payload.message.parse().map_err(|_| {
        (
            B2Code::MatchIdBadFormat,
            "Match ID format invalid or missing".to_string(),
        )
    })?;

    let valid = {
        let store = store.clone();
        blocking(move || store.validate_match(db_id, match_id)).await
    };

    match valid {
        Ok(true) => Ok(match_id),
        Ok(false) => Err((
            B2Code::MatchInvalid,
            "Could not find a valid match with the specified details".to_string(),
        )),
        Err(err) => Err((B2Code::MatchInvalid, err.to_string())),
    }
}

async fn blocking<T: Send + 'static>(
    call: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, StoreError> {
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| StoreError::Database(err.to_string()))?
}

/// Reads one application frame, skipping control frames, until `deadline`.
async fn read_payload(socket: &mut WebSocket, deadline: Instant) -> Result<Payload, ReadError> {
    loop {
        match timeout_at(deadline, socket.recv()).await {
            Err(_) => return Err(ReadError::TimedOut),
            Ok(None) => return Err(ReadError::Transport("connection closed".to_string())),
            Ok(Some(Err(err))) => return Err(ReadError::Transport(err.to_string())),
            Ok(Some(Ok(Message::Text(text)))) => return Ok(Payload::from_bytes(text.as_bytes())),
            Ok(Some(Ok(Message::Binary(bytes)))) => return Ok(Payload::from_bytes(&bytes)),
            Ok(Some(Ok(_))) => continue,
        }
    }
}

/// Writes a payload, ignoring failures: an unreachable peer is about to be
/// dropped anyway.
async fn send(socket: &mut WebSocket, payload: Payload) {
    let _ = socket.send(Message::Text(payload.to_json())).await;
}

/// Sends a farewell, lets it drain briefly, then drops the socket.
async fn discard(mut socket: WebSocket, payload: Payload) {
    let _ = socket.send(Message::Text(payload.to_json())).await;
    tokio::time::sleep(CLOSE_WAIT).await;
    let _ = socket.send(Message::Close(None)).await;
}
