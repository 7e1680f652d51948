//! Match-stats reporting against the Blade II Online REST API.
//!
//! A single PATCH per finished match, fire-and-forget: failures are logged
//! and never retried. The client is disabled cleanly when the environment
//! does not configure an endpoint, which is the normal state for local
//! development.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

/// Path of the profiles endpoint, versioned like the rest of the API.
const PROFILES_ENDPOINT: &str = "v1/profiles";

/// The winner of a match as the stats API encodes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchWinner {
    Draw = 0,
    Player1 = 1,
    Player2 = 2,
}

#[derive(Serialize)]
struct StatsUpdateRequest {
    player1id: u64,
    player2id: u64,
    winner: u8,
}

struct StatsEndpoint {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

/// Handle to the stats collaborator. Cloneable and cheap to pass to the
/// services.
#[derive(Clone, Default)]
pub struct StatsClient {
    endpoint: Option<Arc<StatsEndpoint>>,
}

impl StatsClient {
    /// Reads `BLADE2_API_URL`, `BLADE2_API_USERNAME` and
    /// `BLADE2_API_PASSWORD`. Returns a disabled client when the URL is not
    /// set.
    pub fn from_env() -> StatsClient {
        let Ok(base) = std::env::var("BLADE2_API_URL") else {
            debug!("stats API not configured, match stats updates disabled");
            return StatsClient::disabled();
        };
        let username = std::env::var("BLADE2_API_USERNAME").unwrap_or_default();
        let password = std::env::var("BLADE2_API_PASSWORD").unwrap_or_default();

        StatsClient {
            endpoint: Some(Arc::new(StatsEndpoint {
                http: reqwest::Client::new(),
                url: format!("{}/{}", base.trim_end_matches('/'), PROFILES_ENDPOINT),
                username,
                password,
            })),
        }
    }

    pub fn disabled() -> StatsClient {
        StatsClient { endpoint: None }
    }

    /// Sends the MMR/win-loss update for a finished match.
    pub async fn update_match_stats(&self, player1: u64, player2: u64, winner: MatchWinner) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };

        let body = StatsUpdateRequest {
            player1id: player1,
            player2id: player2,
            winner: winner as u8,
        };

        let response = endpoint
            .http
            .patch(&endpoint.url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == reqwest::StatusCode::NO_CONTENT => {
                info!(player1, player2, winner = winner as u8, "match stats updated");
            }
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                error!(%status, detail, "stats update rejected");
            }
            Err(err) => {
                error!(%err, "failed to send stats update");
            }
        }
    }
}
