//! Match instruction codes carried inside `MatchData`/`MatchMove` payloads.
//!
//! Move payloads use the form `"<instruction>:<data>"`. Instructions 1..=11
//! name a card selection; the board state determines where the card is taken
//! from and where it ends up. Higher values are server-to-client data and
//! error markers.

use crate::card::Card;

/// Instruction range that represents a card selection.
const CARD_INSTRUCTION_MIN: u8 = 1;
const CARD_INSTRUCTION_MAX: u8 = 11;

/// Offset between a card instruction and the card it names.
const CARD_INSTRUCTION_OFFSET: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchInstruction {
    /// Noop marker.
    None = 0,

    // Card selections.
    CardElliotsOrbalStaff = 1,
    CardFiesTwinGunswords = 2,
    CardAlisasOrbalBow = 3,
    CardJusisSword = 4,
    CardMachiasOrbalShotgun = 5,
    CardGaiusSpear = 6,
    CardLaurasGreatsword = 7,
    CardBolt = 8,
    CardMirror = 9,
    CardBlast = 10,
    CardForce = 11,

    // Exchanged between client and server.
    Forfeit = 12,
    Message = 13,

    // Server to client only.
    Cards = 14,
    PlayerData = 15,
    OpponentData = 16,
    ConnectionProgress = 17,
    ConnectionClosed = 18,

    // Error markers, grouped so clients can test `>= ConnectionError`.
    ConnectionError = 19,
    AuthError = 20,
    MatchCheckError = 21,
    MatchSetupError = 22,
    MatchIllegalMove = 23,
    MatchMutualTimeOut = 24,
    MatchTimeOut = 25,
}

impl MatchInstruction {
    /// The card this instruction names. Instructions outside the card range
    /// fall back to the default card, mirroring the lenient wire contract.
    pub fn to_card(self) -> Card {
        let raw = self as u8;
        if (CARD_INSTRUCTION_MIN..=CARD_INSTRUCTION_MAX).contains(&raw) {
            Card::try_from(raw - CARD_INSTRUCTION_OFFSET).unwrap_or(Card::ElliotsOrbalStaff)
        } else {
            Card::ElliotsOrbalStaff
        }
    }

    /// Whether this instruction is a legal move instruction (0..=11).
    pub fn is_move(self) -> bool {
        self as u8 <= CARD_INSTRUCTION_MAX
    }
}

impl TryFrom<u8> for MatchInstruction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MatchInstruction::*;
        Ok(match value {
            0 => None,
            1 => CardElliotsOrbalStaff,
            2 => CardFiesTwinGunswords,
            3 => CardAlisasOrbalBow,
            4 => CardJusisSword,
            5 => CardMachiasOrbalShotgun,
            6 => CardGaiusSpear,
            7 => CardLaurasGreatsword,
            8 => CardBolt,
            9 => CardMirror,
            10 => CardBlast,
            11 => CardForce,
            12 => Forfeit,
            13 => Message,
            14 => Cards,
            15 => PlayerData,
            16 => OpponentData,
            17 => ConnectionProgress,
            18 => ConnectionClosed,
            19 => ConnectionError,
            20 => AuthError,
            21 => MatchCheckError,
            22 => MatchSetupError,
            23 => MatchIllegalMove,
            24 => MatchMutualTimeOut,
            25 => MatchTimeOut,
            _ => return Err(()),
        })
    }
}
