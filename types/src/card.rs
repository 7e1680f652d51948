//! Card identifiers and their score values.
//!
//! Cards are encoded as `0..=21`:
//! - `0..=6` are the seven basic weapon cards with natural values 1..=7;
//! - `7..=10` are the four effect cards (value 1 when played as an ordinary
//!   card);
//! - `11..=21` are the bolted ("inactive") variants, obtained by adding
//!   [`BOLT_OFFSET`] to the active card. Bolted cards contribute 0 to a
//!   player's score.

/// Offset between an active card and its bolted variant.
pub const BOLT_OFFSET: u8 = 11;

/// Score value of every effect card when it resolves as an ordinary card.
const EFFECT_CARD_VALUE: u8 = 1;

/// A single Blade II card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Card {
    // Basic cards.
    ElliotsOrbalStaff = 0,
    FiesTwinGunswords = 1,
    AlisasOrbalBow = 2,
    JusisSword = 3,
    MachiasOrbalShotgun = 4,
    GaiusSpear = 5,
    LaurasGreatsword = 6,

    // Effect cards.
    Bolt = 7,
    Mirror = 8,
    Blast = 9,
    Force = 10,

    // Bolted basic cards.
    InactiveElliotsOrbalStaff = 11,
    InactiveFiesTwinGunswords = 12,
    InactiveAlisasOrbalBow = 13,
    InactiveJusisSword = 14,
    InactiveMachiasOrbalShotgun = 15,
    InactiveGaiusSpear = 16,
    InactiveLaurasGreatsword = 17,

    // Bolted effect cards.
    InactiveBolt = 18,
    InactiveMirror = 19,
    InactiveBlast = 20,
    InactiveForce = 21,
}

impl Card {
    /// Point value of this card if it were played on the field. Effect cards
    /// are worth 1, bolted cards are worth 0.
    pub fn value(self) -> u8 {
        let raw = self as u8;
        if self < Card::Bolt {
            raw + 1
        } else if self <= Card::Force {
            EFFECT_CARD_VALUE
        } else {
            0
        }
    }

    /// Whether this card is a bolted (inactive) variant.
    pub fn is_bolted(self) -> bool {
        self > Card::Force
    }

    /// Whether this card is one of the four active effect cards. Only
    /// meaningful for cards in a hand, which never holds bolted cards.
    pub fn is_effect(self) -> bool {
        (Card::Bolt..=Card::Force).contains(&self)
    }

    /// The bolted variant of an active card. Bolted cards are unchanged.
    pub fn bolted(self) -> Card {
        if self.is_bolted() {
            self
        } else {
            Card::try_from(self as u8 + BOLT_OFFSET).unwrap_or(self)
        }
    }

    /// The active variant of a bolted card. Active cards are unchanged.
    pub fn unbolted(self) -> Card {
        if self.is_bolted() {
            Card::try_from(self as u8 - BOLT_OFFSET).unwrap_or(self)
        } else {
            self
        }
    }

    /// Value of this card once unbolted; active cards report their value as
    /// is. Used when judging whether a Rod play could close a score gap.
    pub fn unbolted_value(self) -> u8 {
        self.unbolted().value()
    }
}

impl TryFrom<u8> for Card {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Card::*;
        Ok(match value {
            0 => ElliotsOrbalStaff,
            1 => FiesTwinGunswords,
            2 => AlisasOrbalBow,
            3 => JusisSword,
            4 => MachiasOrbalShotgun,
            5 => GaiusSpear,
            6 => LaurasGreatsword,
            7 => Bolt,
            8 => Mirror,
            9 => Blast,
            10 => Force,
            11 => InactiveElliotsOrbalStaff,
            12 => InactiveFiesTwinGunswords,
            13 => InactiveAlisasOrbalBow,
            14 => InactiveJusisSword,
            15 => InactiveMachiasOrbalShotgun,
            16 => InactiveGaiusSpear,
            17 => InactiveLaurasGreatsword,
            18 => InactiveBolt,
            19 => InactiveMirror,
            20 => InactiveBlast,
            21 => InactiveForce,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_cards_have_natural_values() {
        assert_eq!(Card::ElliotsOrbalStaff.value(), 1);
        assert_eq!(Card::FiesTwinGunswords.value(), 2);
        assert_eq!(Card::AlisasOrbalBow.value(), 3);
        assert_eq!(Card::JusisSword.value(), 4);
        assert_eq!(Card::MachiasOrbalShotgun.value(), 5);
        assert_eq!(Card::GaiusSpear.value(), 6);
        assert_eq!(Card::LaurasGreatsword.value(), 7);
    }

    #[test]
    fn effect_cards_are_worth_one() {
        for card in [Card::Bolt, Card::Mirror, Card::Blast, Card::Force] {
            assert_eq!(card.value(), 1);
            assert!(card.is_effect());
        }
    }

    #[test]
    fn bolted_cards_are_worth_nothing() {
        for raw in 11..=21u8 {
            let card = Card::try_from(raw).unwrap();
            assert!(card.is_bolted());
            assert_eq!(card.value(), 0);
        }
    }

    #[test]
    fn bolting_round_trips() {
        let card = Card::GaiusSpear;
        assert_eq!(card.bolted(), Card::InactiveGaiusSpear);
        assert_eq!(card.bolted().unbolted(), card);
        assert_eq!(card.bolted().unbolted_value(), 6);
        // Already-bolted and already-active cards are unchanged.
        assert_eq!(Card::InactiveForce.bolted(), Card::InactiveForce);
        assert_eq!(Card::Force.unbolted(), Card::Force);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert!(Card::try_from(22).is_err());
        assert!(Card::try_from(255).is_err());
    }
}
