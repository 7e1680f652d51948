//! Parsing of client move strings.
//!
//! A move frame's message has the form `"<instruction>:<data>"` with exactly
//! one colon. The instruction must be a base-10 number in the move range
//! (0..=11); the data part may be empty and its meaning depends on the
//! instruction (a Blast carries the targeted card's identifier).

use blade2_types::MatchInstruction;
use thiserror::Error;

/// Delimiter between the instruction code and its data.
pub const PAYLOAD_DELIMITER: char = ':';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("serialized move format invalid")]
    Format,
    #[error("move instruction code invalid")]
    Instruction,
}

/// A parsed client move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub instruction: MatchInstruction,
    pub payload: String,
}

impl Move {
    /// Parses a move from its wire form.
    pub fn parse(message: &str) -> Result<Move, MoveParseError> {
        let (code, payload) = message
            .split_once(PAYLOAD_DELIMITER)
            .ok_or(MoveParseError::Format)?;

        if code.is_empty() || payload.contains(PAYLOAD_DELIMITER) {
            return Err(MoveParseError::Format);
        }

        let code: u8 = code.parse().map_err(|_| MoveParseError::Instruction)?;
        let instruction =
            MatchInstruction::try_from(code).map_err(|_| MoveParseError::Instruction)?;
        if !instruction.is_move() {
            return Err(MoveParseError::Instruction);
        }

        Ok(Move {
            instruction,
            payload: payload.to_string(),
        })
    }
}
