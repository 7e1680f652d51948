//! One live match: seats, phase, the rules state machine, and the turn
//! timer.

use std::time::{Duration, Instant};

use blade2_execution::{CardTable, MatchEnd, MatchState, Move, MoveOutcome};
use blade2_types::{B2Code, MatchInstruction, Payload, Phase, Player};
use tracing::debug;

use crate::connection::DisconnectRequest;
use crate::game::client::GClient;

/// Delimiter for client data payloads (display name, public ID, avatar).
const CLIENT_DATA_DELIMITER: char = '.';

/// Maximum time to wait for a move before the turn times out.
pub(crate) const TURN_MAX_WAIT: Duration = Duration::from_millis(21_000);

/// Extra first-turn allowance covering the client-side deal animation.
pub(crate) const CARD_DRAW_DELAY: Duration = Duration::from_millis(15_000);

/// Extra allowance when a tied board is being cleared client side.
const TIED_SCORE_ADDITIONAL_WAIT: Duration = Duration::from_millis(4_500);

/// Extra allowance for the blast animation.
const BLAST_CARD_ADDITIONAL_WAIT: Duration = Duration::from_millis(4_500);

/// A match under the game service's authority.
pub struct Match {
    pub id: u64,
    pub client1: Option<GClient>,
    pub client2: Option<GClient>,
    pub state: MatchState,
    pub phase: Phase,
    /// Database ID of the winner; zero until decided (and for draws).
    pub winner: u64,
    /// Set once the result has been written, making later disconnect
    /// requests for this match idempotent.
    pub result_recorded: bool,
    /// When the current turn forfeits; `None` while no turn is running.
    pub turn_deadline: Option<Instant>,
}

impl Match {
    /// A new match waiting for its second player.
    pub fn new(id: u64, client: GClient) -> Match {
        Match {
            id,
            client1: Some(client),
            client2: None,
            state: MatchState::new(CardTable::default()),
            phase: Phase::WaitingForPlayers,
            winner: 0,
            result_recorded: false,
            turn_deadline: None,
        }
    }

    pub fn client(&self, player: Player) -> Option<&GClient> {
        match player {
            Player::P1 => self.client1.as_ref(),
            Player::P2 => self.client2.as_ref(),
            Player::Undecided => None,
        }
    }

    fn client_mut(&mut self, player: Player) -> Option<&mut GClient> {
        match player {
            Player::P1 => self.client1.as_mut(),
            Player::P2 => self.client2.as_mut(),
            Player::Undecided => None,
        }
    }

    /// The seat a user occupies, if any.
    pub fn seat_of(&self, db_id: u64) -> Option<Player> {
        if self.client1.as_ref().is_some_and(|c| c.db_id == db_id) {
            Some(Player::P1)
        } else if self.client2.as_ref().is_some_and(|c| c.db_id == db_id) {
            Some(Player::P2)
        } else {
            None
        }
    }

    pub fn both_seated(&self) -> bool {
        self.client1.is_some() && self.client2.is_some()
    }

    pub fn clear_seat(&mut self, player: Player) {
        match player {
            Player::P1 => self.client1 = None,
            Player::P2 => self.client2 = None,
            Player::Undecided => {}
        }
    }

    pub fn broadcast(&self, payload: Payload) {
        if let Some(client) = &self.client1 {
            client.send(payload.clone());
        }
        if let Some(client) = &self.client2 {
            client.send(payload);
        }
    }

    /// Sends the opening deal to both clients. Each sees
    /// `"<ownIndex>.<p1deckHex>.<p2deckHex>"`.
    pub fn send_card_data(&self, serialized_decks: &str) {
        for (player, own_index) in [(Player::P1, '0'), (Player::P2, '1')] {
            if let Some(client) = self.client(player) {
                let mut data = String::with_capacity(serialized_decks.len() + 2);
                data.push(own_index);
                data.push(CLIENT_DATA_DELIMITER);
                data.push_str(serialized_decks);
                client.send(match_data(MatchInstruction::Cards, &data));
            }
        }
    }

    /// Sends each player their own display name and avatar.
    pub fn send_player_data(&self) {
        for player in [Player::P1, Player::P2] {
            if let Some(client) = self.client(player) {
                let data = format!(
                    "{}{}{}",
                    client.display_name, CLIENT_DATA_DELIMITER, client.avatar
                );
                client.send(match_data(MatchInstruction::PlayerData, &data));
            }
        }
    }

    /// Sends each player the opponent's display name, public ID and avatar.
    pub fn send_opponent_data(&self) {
        for player in [Player::P1, Player::P2] {
            let (Some(client), Some(opponent)) = (self.client(player), self.client(player.other()))
            else {
                continue;
            };
            let data = format!(
                "{name}{d}{pid}{d}{avatar}",
                name = opponent.display_name,
                pid = opponent.public_id,
                avatar = opponent.avatar,
                d = CLIENT_DATA_DELIMITER,
            );
            client.send(match_data(MatchInstruction::OpponentData, &data));
        }
    }

    /// One tick of a playing match: drain both clients' inbound queues, then
    /// check the turn timer. Returns the removal requests this tick decided
    /// on; the service processes them on its next iteration.
    pub fn tick(&mut self, now: Instant) -> Vec<DisconnectRequest> {
        let mut removals = Vec::new();

        for player in [Player::P1, Player::P2] {
            self.tick_client(player, now, &mut removals);
            if self.phase != Phase::Play {
                // The drain above ended the match; never re-enter a finished
                // state machine.
                return removals;
            }
        }

        self.check_turn_timer(now, &mut removals);
        removals
    }

    fn tick_client(&mut self, player: Player, now: Instant, removals: &mut Vec<DisconnectRequest>) {
        loop {
            let frame = match self.client_mut(player) {
                Some(client) => match client.connection.poll_inbound() {
                    Some(frame) => frame,
                    None => return,
                },
                None => return,
            };

            match frame.b2code() {
                Some(B2Code::MatchMove) => {
                    self.state.clear_waiting(player);
                    let applied = Move::parse(&frame.message)
                        .map_err(|err| err.to_string())
                        .and_then(|mv| {
                            self.state
                                .apply_move(player, &mv)
                                .map_err(|err| err.to_string())
                        });

                    match applied {
                        Ok(outcome) => {
                            // The opponent replays the move locally.
                            self.forward(player.other(), frame);
                            match outcome {
                                MoveOutcome::AwaitingOpposingDraw => {}
                                MoveOutcome::Continued {
                                    scores_tied,
                                    used_blast,
                                } => self.rearm_turn_timer(now, scores_tied, used_blast),
                                MoveOutcome::Ended(MatchEnd::Winner(winner)) => {
                                    if let Some(db_id) =
                                        self.client(winner).map(|c| c.db_id)
                                    {
                                        self.winner = db_id;
                                        removals.push(self.removal(
                                            winner,
                                            B2Code::MatchWin,
                                            "",
                                        ));
                                    }
                                    self.phase = Phase::Finished;
                                    return;
                                }
                                MoveOutcome::Ended(MatchEnd::Draw) => {
                                    removals.push(self.removal(Player::P1, B2Code::MatchDraw, ""));
                                    self.phase = Phase::Finished;
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            debug!(match_id = self.id, %err, "illegal move");
                            self.condemn(player, B2Code::MatchIllegalMove, removals);
                            return;
                        }
                    }
                }
                Some(B2Code::MatchForfeit) => {
                    self.condemn(player, B2Code::MatchForfeit, removals);
                    return;
                }
                Some(B2Code::MatchRelayMessage) => {
                    self.forward(player.other(), frame);
                }
                _ => {}
            }
        }
    }

    /// Ends the match against `player`, awarding the win to the other seat.
    fn condemn(&mut self, player: Player, reason: B2Code, removals: &mut Vec<DisconnectRequest>) {
        if let Some(db_id) = self.client(player.other()).map(|c| c.db_id) {
            self.winner = db_id;
        }
        removals.push(self.removal(player, reason, ""));
        self.phase = Phase::Finished;
    }

    fn check_turn_timer(&mut self, now: Instant, removals: &mut Vec<DisconnectRequest>) {
        let Some(deadline) = self.turn_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        self.turn_deadline = None;

        let p1_waiting = self.state.is_waiting(Player::P1);
        let p2_waiting = self.state.is_waiting(Player::P2);

        if p1_waiting && p2_waiting {
            removals.push(self.removal(
                Player::P1,
                B2Code::MatchMutualTimeout,
                "Both players timed out",
            ));
        } else if p1_waiting {
            if let Some(db_id) = self.client(Player::P2).map(|c| c.db_id) {
                self.winner = db_id;
            }
            removals.push(self.removal(Player::P1, B2Code::MatchTimeOut, "Player 1 timed out"));
        } else {
            if let Some(db_id) = self.client(Player::P1).map(|c| c.db_id) {
                self.winner = db_id;
            }
            removals.push(self.removal(Player::P2, B2Code::MatchTimeOut, "Player 2 timed out"));
        }

        self.phase = Phase::Finished;
    }

    /// The next turn's allowance: the base wait plus the laggier client's
    /// round trip, plus animation time for a board clear or a blast.
    fn rearm_turn_timer(&mut self, now: Instant, scores_tied: bool, used_blast: bool) {
        let mut wait = TURN_MAX_WAIT + self.max_latency();
        if scores_tied {
            wait += TIED_SCORE_ADDITIONAL_WAIT;
        } else if used_blast {
            wait += BLAST_CARD_ADDITIONAL_WAIT;
        }
        self.turn_deadline = Some(now + wait);
    }

    fn max_latency(&self) -> Duration {
        let c1 = self
            .client1
            .as_ref()
            .map(|c| c.connection.latency())
            .unwrap_or_default();
        let c2 = self
            .client2
            .as_ref()
            .map(|c| c.connection.latency())
            .unwrap_or_default();
        c1.max(c2)
    }

    fn forward(&self, player: Player, frame: Payload) {
        if let Some(client) = self.client(player) {
            client.send(frame);
        }
    }

    fn removal(&self, player: Player, reason: B2Code, message: &str) -> DisconnectRequest {
        let client = self.client(player).expect("removal target seated");
        DisconnectRequest {
            db_id: client.db_id,
            match_id: Some(self.id),
            uuid: client.connection.uuid(),
            reason,
            message: message.to_string(),
        }
    }
}

/// Packages a match instruction and its data as a `MatchData` payload:
/// `"<instruction>:<data>"`.
fn match_data(instruction: MatchInstruction, data: &str) -> Payload {
    Payload::new(
        B2Code::MatchData,
        format!("{}:{}", instruction as u8, data),
    )
}
