//! Websocket payload envelope and message code families.
//!
//! Every application frame is a JSON object `{"code": u16, "message": "..."}`.
//! Codes are grouped in families of one hundred: connection (100), auth
//! (200), matchmaking (300) and match (400). Code `0` is a neutral
//! informational code used for farewells that carry no error meaning.

use serde::{Deserialize, Serialize};

/// The payload of a single websocket frame.
///
/// Unknown or malformed payloads deserialize to the default (code 0, empty
/// message) rather than failing the connection; the services decide what to
/// do with frames they do not understand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl Payload {
    pub fn new(code: B2Code, message: impl Into<String>) -> Self {
        Self {
            code: code as u16,
            message: message.into(),
        }
    }

    /// The typed code, if this payload carries a known one.
    pub fn b2code(&self) -> Option<B2Code> {
        B2Code::try_from(self.code).ok()
    }

    /// Lenient decode used by the read pump: bad JSON becomes the default
    /// payload instead of an error, matching the tolerant wire contract.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        // Serializing a u16 + String cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Application-level message codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum B2Code {
    /// Generic all-purpose code. Avoid unless the message can be safely
    /// ignored by the receiver.
    Info = 0,

    // Connection.
    ConnectionTimeOut = 100,
    UnknownConnectionError = 101,
    LatencyUpdate = 102,

    // Auth.
    AuthRequest = 200,
    AuthBadFormat = 201,
    AuthBadCredentials = 202,
    AuthExpired = 203,
    AuthBanned = 204,
    AuthReceived = 205,
    AuthExpected = 206,
    AuthNotReceived = 207,
    AuthSuccess = 208,

    // Matchmaking.
    MatchMakingGameFound = 300,
    MatchMakingAccept = 301,
    MatchConfirmed = 302,
    ReadyCheckFailed = 303,
    JoinedQueue = 304,
    OpponentAccepted = 305,
    OpponentDidNotAccept = 306,

    // Match admission.
    MatchId = 400,
    MatchIdExpected = 401,
    MatchIdBadFormat = 402,
    MatchInvalid = 403,
    MatchExpired = 404,
    MatchIdReceived = 405,
    MatchIdNotReceived = 406,
    MatchIdConfirmed = 407,
    MatchMultipleConnections = 408,
    MatchFull = 409,
    MatchJoined = 410,

    // Match play.
    MatchIllegalMove = 411,
    MatchRelayMessage = 412,
    MatchMove = 413,
    MatchData = 414,
    MatchForfeit = 415,
    MatchMutualTimeout = 416,
    MatchTimeOut = 417,
    MatchWin = 418,
    MatchDraw = 419,
    MatchLoss = 420,
}

impl TryFrom<u16> for B2Code {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use B2Code::*;
        Ok(match value {
            0 => Info,
            100 => ConnectionTimeOut,
            101 => UnknownConnectionError,
            102 => LatencyUpdate,
            200 => AuthRequest,
            201 => AuthBadFormat,
            202 => AuthBadCredentials,
            203 => AuthExpired,
            204 => AuthBanned,
            205 => AuthReceived,
            206 => AuthExpected,
            207 => AuthNotReceived,
            208 => AuthSuccess,
            300 => MatchMakingGameFound,
            301 => MatchMakingAccept,
            302 => MatchConfirmed,
            303 => ReadyCheckFailed,
            304 => JoinedQueue,
            305 => OpponentAccepted,
            306 => OpponentDidNotAccept,
            400 => MatchId,
            401 => MatchIdExpected,
            402 => MatchIdBadFormat,
            403 => MatchInvalid,
            404 => MatchExpired,
            405 => MatchIdReceived,
            406 => MatchIdNotReceived,
            407 => MatchIdConfirmed,
            408 => MatchMultipleConnections,
            409 => MatchFull,
            410 => MatchJoined,
            411 => MatchIllegalMove,
            412 => MatchRelayMessage,
            413 => MatchMove,
            414 => MatchData,
            415 => MatchForfeit,
            416 => MatchMutualTimeout,
            417 => MatchTimeOut,
            418 => MatchWin,
            419 => MatchDraw,
            420 => MatchLoss,
            _ => return Err(()),
        })
    }
}

/// Ops command kinds delivered on each service's commands channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandKind {
    BroadcastMessage = 0,
    DropAll = 1,
    ChangePollTime = 2,
}

/// An ops command with its accompanying data string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub data: String,
}
