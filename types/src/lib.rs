//! Shared wire types for the Blade II Online backend.
//!
//! Everything here is plain data: the `{code, message}` payload envelope that
//! travels over the websocket, the numeric code families used by both
//! services, the match instruction set, and the card identifiers. No I/O and
//! no clocks; the `blade2-execution` and `blade2-server` crates build on
//! these.

pub mod card;
pub mod instruction;
pub mod protocol;

pub use card::Card;
pub use instruction::MatchInstruction;
pub use protocol::{B2Code, Command, CommandKind, Payload};

/// Seat identifier inside a match. `Undecided` doubles as "no player" for
/// turn tracking when the board was just cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Player {
    Undecided = 0,
    P1 = 1,
    P2 = 2,
}

impl Player {
    /// The opposite seat. `Undecided` has no opposite and is returned as is.
    pub fn other(self) -> Player {
        match self {
            Player::P1 => Player::P2,
            Player::P2 => Player::P1,
            Player::Undecided => Player::Undecided,
        }
    }

    /// Zero-based index for seat-keyed arrays. Panics on `Undecided`.
    pub fn index(self) -> usize {
        match self {
            Player::P1 => 0,
            Player::P2 => 1,
            Player::Undecided => panic!("Undecided has no seat index"),
        }
    }
}

/// Match lifecycle phase, ordered so `phase >= Play` means "no more seats".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    WaitingForPlayers = 0,
    Play = 1,
    Finished = 2,
}
