//! The authoritative per-match state machine.
//!
//! [`MatchState::apply_move`] validates and resolves one client move,
//! recomputes both scores, and reports whether the match continues, is still
//! waiting for the opposing opening draw, or has ended. Turn timing and
//! client notification live in the server crate; this module is pure state.

use crate::cards::CardTable;
use crate::moves::Move;
use blade2_types::{Card, Player};
use thiserror::Error;

/// Why a move was rejected. Any rejection costs the offender the match.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidMove {
    #[error("move made out of turn")]
    OutOfTurn,
    #[error("required card is not available in the expected zone")]
    CardUnavailable,
    #[error("blast target is invalid or missing")]
    BadBlastTarget,
}

/// Terminal verdict of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchEnd {
    Winner(Player),
    Draw,
}

/// Result of a successfully applied move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// First opening draw resolved; the other player still has to draw.
    /// The turn timer is not rearmed for this.
    AwaitingOpposingDraw,
    /// The match continues. The flags feed the turn timer: a tied score and
    /// a resolved blast each grant the clients extra animation time.
    Continued { scores_tied: bool, used_blast: bool },
    /// The match is over.
    Ended(MatchEnd),
}

/// Full mutable state of one running match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchState {
    /// Whose turn it is. `Undecided` while the board is cleared and both
    /// players owe a draw to the field.
    pub turn: Player,
    pub cards: CardTable,
    /// Scores by seat index, recomputed after every resolved move.
    pub scores: [u16; 2],
    /// Whether each seat owes the server a move (feeds turn timeouts).
    pub waiting: [bool; 2],
}

impl MatchState {
    /// A fresh match over an initialized card table: board cleared, both
    /// players drawing.
    pub fn new(cards: CardTable) -> Self {
        Self {
            turn: Player::Undecided,
            cards,
            scores: [0, 0],
            waiting: [true, true],
        }
    }

    pub fn score(&self, player: Player) -> u16 {
        self.scores[player.index()]
    }

    pub fn is_waiting(&self, player: Player) -> bool {
        self.waiting[player.index()]
    }

    /// Marks a move as received from `player`, stopping the turn timer from
    /// counting them as absent while the move is validated.
    pub fn clear_waiting(&mut self, player: Player) {
        self.waiting[player.index()] = false;
    }

    /// Validates and resolves one move from `player`.
    pub fn apply_move(&mut self, player: Player, mv: &Move) -> Result<MoveOutcome, InvalidMove> {
        if self.turn != player && self.turn != Player::Undecided {
            return Err(InvalidMove::OutOfTurn);
        }

        let in_card = mv.instruction.to_card();
        let mut used_blast = false;
        let mut update_turn = false;

        if self.turn == Player::Undecided {
            // Board was just cleared (or the match just started): the only
            // legal action is a draw to the field, from the deck top if the
            // deck still has cards, otherwise from the hand.
            let (target, opposite) = self.cards.split_mut(player);
            let drawn = if let Some(&top) = target.deck.last() {
                if top != in_card {
                    return Err(InvalidMove::CardUnavailable);
                }
                target.deck.pop().unwrap()
            } else {
                remove_first(&mut target.hand, in_card).ok_or(InvalidMove::CardUnavailable)?
            };
            target.field.push(drawn);
            self.waiting[player.index()] = false;

            if target.field.len() == 1 && opposite.field.len() == 1 {
                update_turn = true;
            } else {
                return Ok(MoveOutcome::AwaitingOpposingDraw);
            }
        } else {
            let (target, opposite) = self.cards.split_mut(player);

            remove_first(&mut target.hand, in_card).ok_or(InvalidMove::CardUnavailable)?;

            // Classify the card in context: each effect only activates when
            // its precondition holds, otherwise the card resolves as an
            // ordinary one-point play.
            let used_rod = in_card == Card::ElliotsOrbalStaff
                && target.field.last().is_some_and(|c| c.is_bolted());
            let used_bolt =
                in_card == Card::Bolt && opposite.field.last().is_some_and(|c| !c.is_bolted());
            let used_mirror = in_card == Card::Mirror
                && !target.field.is_empty()
                && !opposite.field.is_empty();
            used_blast = in_card == Card::Blast && !opposite.hand.is_empty();
            let ordinary = !used_rod && !used_bolt && !used_mirror && !used_blast;

            // An ordinary (or force) play replaces a flipped top card: the
            // bolted card leaves the field for the discard pile first.
            if ordinary && target.field.last().is_some_and(|c| c.is_bolted()) {
                let removed = target.field.pop().unwrap();
                target.discard.push(removed);
            }

            if used_blast {
                let named: u8 = mv
                    .payload
                    .parse()
                    .map_err(|_| InvalidMove::BadBlastTarget)?;
                let blasted = Card::try_from(named).map_err(|_| InvalidMove::BadBlastTarget)?;
                remove_first(&mut opposite.hand, blasted)
                    .ok_or(InvalidMove::BadBlastTarget)?;
                opposite.discard.push(blasted);
                target.discard.push(in_card);
            } else if used_rod {
                if let Some(last) = target.field.last_mut() {
                    *last = last.unbolted();
                }
                target.discard.push(in_card);
            } else if used_bolt {
                if let Some(last) = opposite.field.last_mut() {
                    *last = last.bolted();
                }
                target.discard.push(in_card);
            } else if used_mirror {
                std::mem::swap(&mut target.field, &mut opposite.field);
                target.discard.push(in_card);
            } else {
                // Ordinary play, including a Force (whose doubling is
                // applied by the score function) and effect cards whose
                // preconditions did not hold.
                target.field.push(in_card);
            }

            if used_blast {
                // A blast does not pass the turn: the mover owes another
                // move.
                self.waiting[player.index()] = true;
            } else {
                update_turn = true;
            }
        }

        self.recompute_scores();

        // The end conditions are only meaningful once a turn order exists;
        // opening draws cannot end a match.
        if self.turn != Player::Undecided {
            if let Some(end) = self.check_match_end(used_blast) {
                return Ok(MoveOutcome::Ended(end));
            }
        }

        if update_turn {
            self.waiting = [false, false];
            if self.scores[0] == self.scores[1] {
                // Tied: clear the board into the discards and wait for both
                // players to draw again.
                self.turn = Player::Undecided;
                self.waiting = [true, true];
                for player in [Player::P1, Player::P2] {
                    let side = self.cards.side_mut(player);
                    let mut field = std::mem::take(&mut side.field);
                    side.discard.append(&mut field);
                }
            } else if self.scores[0] < self.scores[1] {
                self.turn = Player::P1;
                self.waiting[0] = true;
            } else {
                self.turn = Player::P2;
                self.waiting[1] = true;
            }
        }

        Ok(MoveOutcome::Continued {
            scores_tied: self.scores[0] == self.scores[1],
            used_blast,
        })
    }

    fn recompute_scores(&mut self) {
        self.scores = [
            calculate_score(&self.cards.side(Player::P1).field),
            calculate_score(&self.cards.side(Player::P2).field),
        ];
    }

    /// Checks whether the match just ended, given whether the resolved move
    /// was an activated blast (which does not pass the turn and therefore
    /// has its own edge cases).
    fn check_match_end(&self, used_blast: bool) -> Option<MatchEnd> {
        if self.is_drawn() {
            return Some(MatchEnd::Draw);
        }
        if self.player_has_won(Player::P1, used_blast) {
            return Some(MatchEnd::Winner(Player::P1));
        }
        if self.player_has_won(Player::P2, used_blast) {
            return Some(MatchEnd::Winner(Player::P2));
        }
        None
    }

    /// Both players out of deck and hand with equal scores.
    fn is_drawn(&self) -> bool {
        let p1 = self.cards.side(Player::P1);
        let p2 = self.cards.side(Player::P2);
        p1.deck.is_empty()
            && p2.deck.is_empty()
            && p1.hand.is_empty()
            && p2.hand.is_empty()
            && self.scores[0] == self.scores[1]
    }

    /// Whether `player` has won against the opposite seat, per the current
    /// scores and the opposite player's remaining options.
    fn player_has_won(&self, player: Player, used_blast: bool) -> bool {
        let target_score = self.scores[player.index()];
        let target_field = &self.cards.side(player).field;

        let opposite = self.cards.side(player.other());
        let opposite_score = self.scores[player.other().index()];

        // `turn` has not advanced yet, so it still names the mover.
        let is_opposite_players_turn = self.turn != player;

        // A hand with nothing but effect cards cannot raise a score and is
        // an automatic loss.
        if !opposite.hand.is_empty() && opposite.hand.iter().all(|c| c.is_effect()) {
            return true;
        }

        // Tied with nothing left to break the tie. The draw state is checked
        // before this, so the target side still has resources here.
        if target_score == opposite_score
            && opposite.deck.is_empty()
            && opposite.hand.is_empty()
        {
            return true;
        }

        // A blast that emptied the opposing hand leaves them unable to
        // continue.
        if used_blast && opposite.hand.is_empty() {
            return true;
        }

        if target_score > opposite_score {
            let gap = target_score - opposite_score;

            // The opposite player moved on their own turn and still trails:
            // they failed to beat the score. Blasts are exempt because they
            // do not end the mover's turn.
            if is_opposite_players_turn && !used_blast {
                return true;
            }

            // With an empty hand there is no counter to the latest move.
            if opposite.hand.is_empty() {
                return true;
            }

            // From here, any playable response that closes the gap keeps the
            // match alive.
            if opposite.hand.iter().any(|c| u16::from(c.value()) >= gap) {
                return false;
            }

            if opposite.hand.contains(&Card::ElliotsOrbalStaff) {
                if let Some(&last) = opposite.field.last() {
                    if last.is_bolted() {
                        if last == Card::InactiveForce {
                            if opposite_score * 2 >= target_score {
                                return false;
                            }
                        } else if u16::from(last.unbolted_value()) >= gap {
                            return false;
                        }
                    }
                }
            }

            if opposite.hand.contains(&Card::Bolt)
                && target_field.last().is_some_and(|c| !c.is_bolted())
            {
                return false;
            }

            if opposite.hand.contains(&Card::Mirror) {
                return false;
            }

            if opposite.hand.contains(&Card::Blast) {
                return false;
            }

            if opposite.hand.contains(&Card::Force) && opposite_score * 2 > target_score {
                return false;
            }

            return true;
        }

        false
    }
}

/// Field score: active card values summed, with a Force anywhere past the
/// first slot doubling the running total instead of adding one. Bolted cards
/// contribute nothing.
pub fn calculate_score(field: &[Card]) -> u16 {
    let mut total: u16 = 0;
    for (index, card) in field.iter().enumerate() {
        if card.is_bolted() {
            continue;
        }
        if *card == Card::Force && index > 0 {
            total *= 2;
        } else {
            total += u16::from(card.value());
        }
    }
    total
}

/// Removes the first card equal to `card`, without preserving order. Returns
/// the removed card. Never use on a deck, whose order is meaningful.
fn remove_first(cards: &mut Vec<Card>, card: Card) -> Option<Card> {
    let index = cards.iter().position(|c| *c == card)?;
    Some(cards.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::PlayerCards;
    use blade2_types::MatchInstruction;
    use Card::*;

    fn mv(instruction: MatchInstruction, payload: &str) -> Move {
        Move {
            instruction,
            payload: payload.to_string(),
        }
    }

    fn card_move(card: Card) -> Move {
        mv(
            MatchInstruction::try_from(card as u8 + 1).expect("card instruction"),
            "",
        )
    }

    /// Builds a decided-turn state from explicit zones, with scores derived
    /// from the fields.
    fn decided(turn: Player, p1: PlayerCards, p2: PlayerCards) -> MatchState {
        let mut state = MatchState::new(CardTable::default());
        *state.cards.side_mut(Player::P1) = p1;
        *state.cards.side_mut(Player::P2) = p2;
        state.turn = turn;
        state.recompute_scores();
        state.waiting = [false, false];
        state.waiting[turn.index()] = true;
        state
    }

    fn side(deck: &[Card], hand: &[Card], field: &[Card]) -> PlayerCards {
        PlayerCards {
            deck: deck.to_vec(),
            hand: hand.to_vec(),
            field: field.to_vec(),
            discard: Vec::new(),
        }
    }

    #[test]
    fn score_sums_active_values() {
        assert_eq!(calculate_score(&[JusisSword, GaiusSpear]), 10);
        assert_eq!(calculate_score(&[]), 0);
    }

    #[test]
    fn score_skips_bolted_cards() {
        assert_eq!(
            calculate_score(&[JusisSword, InactiveGaiusSpear, InactiveForce]),
            4
        );
    }

    #[test]
    fn force_doubles_running_total_but_not_as_opener() {
        assert_eq!(calculate_score(&[JusisSword, Force]), 8);
        assert_eq!(calculate_score(&[JusisSword, Force, Force]), 16);
        // A force drawn straight onto an empty field counts as one point.
        assert_eq!(calculate_score(&[Force, JusisSword]), 5);
    }

    #[test]
    fn opening_draw_comes_from_the_deck_top() {
        let mut state = MatchState::new(CardTable::default());
        state.cards.side_mut(Player::P1).deck = vec![JusisSword, LaurasGreatsword];
        state.cards.side_mut(Player::P2).deck = vec![GaiusSpear, MachiasOrbalShotgun];

        let outcome = state
            .apply_move(Player::P1, &card_move(LaurasGreatsword))
            .expect("first draw");
        assert_eq!(outcome, MoveOutcome::AwaitingOpposingDraw);
        assert_eq!(state.cards.side(Player::P1).field, vec![LaurasGreatsword]);
        assert_eq!(state.cards.side(Player::P1).deck, vec![JusisSword]);
        assert!(!state.is_waiting(Player::P1));
        assert!(state.is_waiting(Player::P2));
        // Scores are not published until both players have drawn.
        assert_eq!(state.scores, [0, 0]);
    }

    #[test]
    fn opening_draw_must_name_the_deck_top() {
        let mut state = MatchState::new(CardTable::default());
        state.cards.side_mut(Player::P1).deck = vec![JusisSword, LaurasGreatsword];

        let err = state
            .apply_move(Player::P1, &card_move(JusisSword))
            .unwrap_err();
        assert_eq!(err, InvalidMove::CardUnavailable);
    }

    #[test]
    fn opening_draw_falls_back_to_the_hand_when_the_deck_is_empty() {
        let mut state = MatchState::new(CardTable::default());
        state.cards.side_mut(Player::P1).hand = vec![Mirror, GaiusSpear];
        state.cards.side_mut(Player::P2).deck = vec![JusisSword];

        state
            .apply_move(Player::P1, &card_move(GaiusSpear))
            .expect("hand draw");
        assert_eq!(state.cards.side(Player::P1).field, vec![GaiusSpear]);
        assert_eq!(state.cards.side(Player::P1).hand, vec![Mirror]);
    }

    #[test]
    fn tied_opening_draws_clear_the_board() {
        let mut state = MatchState::new(CardTable::default());
        state.cards.side_mut(Player::P1).deck = vec![JusisSword, LaurasGreatsword];
        state.cards.side_mut(Player::P1).hand = vec![Bolt, GaiusSpear];
        state.cards.side_mut(Player::P2).deck = vec![GaiusSpear, LaurasGreatsword];
        state.cards.side_mut(Player::P2).hand = vec![Mirror, JusisSword];

        state
            .apply_move(Player::P1, &card_move(LaurasGreatsword))
            .expect("p1 draw");
        let outcome = state
            .apply_move(Player::P2, &card_move(LaurasGreatsword))
            .expect("p2 draw");

        assert_eq!(
            outcome,
            MoveOutcome::Continued {
                scores_tied: true,
                used_blast: false
            }
        );
        assert_eq!(state.turn, Player::Undecided);
        assert!(state.cards.side(Player::P1).field.is_empty());
        assert!(state.cards.side(Player::P2).field.is_empty());
        assert_eq!(state.cards.side(Player::P1).discard, vec![LaurasGreatsword]);
        assert_eq!(state.cards.side(Player::P2).discard, vec![LaurasGreatsword]);
        assert!(state.is_waiting(Player::P1));
        assert!(state.is_waiting(Player::P2));
    }

    #[test]
    fn unequal_opening_draws_give_the_turn_to_the_lower_score() {
        let mut state = MatchState::new(CardTable::default());
        state.cards.side_mut(Player::P1).deck = vec![LaurasGreatsword];
        state.cards.side_mut(Player::P1).hand = vec![GaiusSpear, Bolt];
        state.cards.side_mut(Player::P2).deck = vec![JusisSword];
        state.cards.side_mut(Player::P2).hand = vec![LaurasGreatsword, Mirror];

        state
            .apply_move(Player::P1, &card_move(LaurasGreatsword))
            .expect("p1 draw");
        let outcome = state
            .apply_move(Player::P2, &card_move(JusisSword))
            .expect("p2 draw");

        assert_eq!(
            outcome,
            MoveOutcome::Continued {
                scores_tied: false,
                used_blast: false
            }
        );
        assert_eq!(state.turn, Player::P2);
        assert!(state.is_waiting(Player::P2));
        assert!(!state.is_waiting(Player::P1));
        assert_eq!(state.scores, [7, 4]);
    }

    #[test]
    fn moves_out_of_turn_are_rejected() {
        let state_template = decided(
            Player::P1,
            side(&[], &[JusisSword, GaiusSpear], &[FiesTwinGunswords]),
            side(&[], &[LaurasGreatsword, Mirror], &[AlisasOrbalBow]),
        );

        let mut state = state_template.clone();
        let err = state
            .apply_move(Player::P2, &card_move(LaurasGreatsword))
            .unwrap_err();
        assert_eq!(err, InvalidMove::OutOfTurn);
    }

    #[test]
    fn playing_a_card_that_is_not_in_hand_is_rejected() {
        let mut state = decided(
            Player::P1,
            side(&[], &[JusisSword], &[FiesTwinGunswords]),
            side(&[], &[LaurasGreatsword, Mirror], &[AlisasOrbalBow]),
        );
        let err = state
            .apply_move(Player::P1, &card_move(LaurasGreatsword))
            .unwrap_err();
        assert_eq!(err, InvalidMove::CardUnavailable);
    }

    #[test]
    fn ordinary_play_passes_the_turn_to_the_lower_score() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[GaiusSpear, FiesTwinGunswords], &[FiesTwinGunswords]),
            side(&[JusisSword], &[LaurasGreatsword, Mirror], &[AlisasOrbalBow]),
        );

        let outcome = state
            .apply_move(Player::P1, &card_move(GaiusSpear))
            .expect("play");
        assert_eq!(
            outcome,
            MoveOutcome::Continued {
                scores_tied: false,
                used_blast: false
            }
        );
        assert_eq!(state.scores, [8, 3]);
        assert_eq!(state.turn, Player::P2);
        assert!(state.is_waiting(Player::P2));
    }

    #[test]
    fn bolt_flips_the_opposing_top_card() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[Bolt, GaiusSpear], &[FiesTwinGunswords, JusisSword]),
            side(&[JusisSword], &[LaurasGreatsword, Mirror], &[AlisasOrbalBow, GaiusSpear]),
        );

        state.apply_move(Player::P1, &card_move(Bolt)).expect("bolt");
        assert_eq!(
            state.cards.side(Player::P2).field,
            vec![AlisasOrbalBow, InactiveGaiusSpear]
        );
        assert_eq!(state.cards.side(Player::P1).discard, vec![Bolt]);
        // Opponent dropped to 3 points and now trails, so the turn is theirs.
        assert_eq!(state.scores, [6, 3]);
        assert_eq!(state.turn, Player::P2);
    }

    #[test]
    fn rod_unbolts_the_own_top_card() {
        let mut state = decided(
            Player::P1,
            side(
                &[JusisSword],
                &[ElliotsOrbalStaff, GaiusSpear],
                &[FiesTwinGunswords, InactiveLaurasGreatsword],
            ),
            side(&[JusisSword], &[LaurasGreatsword, Mirror], &[GaiusSpear]),
        );

        state
            .apply_move(Player::P1, &card_move(ElliotsOrbalStaff))
            .expect("rod");
        assert_eq!(
            state.cards.side(Player::P1).field,
            vec![FiesTwinGunswords, LaurasGreatsword]
        );
        assert_eq!(state.cards.side(Player::P1).discard, vec![ElliotsOrbalStaff]);
        assert_eq!(state.scores, [9, 6]);
        assert_eq!(state.turn, Player::P2);
    }

    #[test]
    fn rod_without_a_bolted_top_is_an_ordinary_one_point_play() {
        let mut state = decided(
            Player::P1,
            side(
                &[JusisSword],
                &[ElliotsOrbalStaff, GaiusSpear],
                &[GaiusSpear],
            ),
            side(&[JusisSword], &[LaurasGreatsword, Mirror], &[LaurasGreatsword]),
        );

        state
            .apply_move(Player::P1, &card_move(ElliotsOrbalStaff))
            .expect("staff as ordinary card");
        // The staff lands on the field as a one-point card, tying the scores
        // and clearing the board.
        assert_eq!(state.turn, Player::Undecided);
        assert_eq!(
            state.cards.side(Player::P1).discard,
            vec![GaiusSpear, ElliotsOrbalStaff]
        );
        assert_eq!(state.cards.side(Player::P2).discard, vec![LaurasGreatsword]);
    }

    #[test]
    fn mirror_swaps_the_fields() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[Mirror, GaiusSpear], &[FiesTwinGunswords]),
            side(
                &[JusisSword],
                &[LaurasGreatsword, Bolt],
                &[AlisasOrbalBow, JusisSword],
            ),
        );

        state
            .apply_move(Player::P1, &card_move(Mirror))
            .expect("mirror");
        assert_eq!(
            state.cards.side(Player::P1).field,
            vec![AlisasOrbalBow, JusisSword]
        );
        assert_eq!(state.cards.side(Player::P2).field, vec![FiesTwinGunswords]);
        assert_eq!(state.scores, [7, 2]);
        assert_eq!(state.turn, Player::P2);
    }

    #[test]
    fn blast_discards_the_named_card_and_keeps_the_turn() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[Blast, GaiusSpear], &[FiesTwinGunswords]),
            side(
                &[JusisSword],
                &[LaurasGreatsword, Mirror],
                &[AlisasOrbalBow, JusisSword],
            ),
        );

        let outcome = state
            .apply_move(
                Player::P1,
                &mv(MatchInstruction::CardBlast, &(Mirror as u8).to_string()),
            )
            .expect("blast");

        assert_eq!(
            outcome,
            MoveOutcome::Continued {
                scores_tied: false,
                used_blast: true
            }
        );
        assert_eq!(state.cards.side(Player::P2).hand, vec![LaurasGreatsword]);
        assert_eq!(state.cards.side(Player::P2).discard, vec![Mirror]);
        assert_eq!(state.cards.side(Player::P1).discard, vec![Blast]);
        // Turn unchanged: the blaster owes another move.
        assert_eq!(state.turn, Player::P1);
        assert!(state.is_waiting(Player::P1));
    }

    #[test]
    fn blast_with_a_bad_payload_is_rejected() {
        let template = decided(
            Player::P1,
            side(&[JusisSword], &[Blast, GaiusSpear], &[FiesTwinGunswords]),
            side(&[JusisSword], &[LaurasGreatsword], &[AlisasOrbalBow, JusisSword]),
        );

        let mut state = template.clone();
        let err = state
            .apply_move(Player::P1, &mv(MatchInstruction::CardBlast, ""))
            .unwrap_err();
        assert_eq!(err, InvalidMove::BadBlastTarget);

        let mut state = template.clone();
        let err = state
            .apply_move(
                Player::P1,
                &mv(MatchInstruction::CardBlast, &(Mirror as u8).to_string()),
            )
            .unwrap_err();
        assert_eq!(err, InvalidMove::BadBlastTarget);
    }

    #[test]
    fn ordinary_play_replaces_a_bolted_top_card() {
        let mut state = decided(
            Player::P1,
            side(
                &[JusisSword],
                &[GaiusSpear, FiesTwinGunswords],
                &[FiesTwinGunswords, InactiveLaurasGreatsword],
            ),
            side(&[JusisSword], &[LaurasGreatsword, Mirror], &[LaurasGreatsword]),
        );

        state
            .apply_move(Player::P1, &card_move(GaiusSpear))
            .expect("replace bolted top");
        assert_eq!(
            state.cards.side(Player::P1).field,
            vec![FiesTwinGunswords, GaiusSpear]
        );
        assert_eq!(
            state.cards.side(Player::P1).discard,
            vec![InactiveLaurasGreatsword]
        );
        assert_eq!(state.scores, [8, 7]);
    }

    #[test]
    fn tie_after_a_move_clears_the_board() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[JusisSword, GaiusSpear, FiesTwinGunswords], &[AlisasOrbalBow]),
            side(&[JusisSword], &[LaurasGreatsword, Mirror, Bolt], &[LaurasGreatsword]),
        );

        let outcome = state
            .apply_move(Player::P1, &card_move(JusisSword))
            .expect("tie");
        assert_eq!(
            outcome,
            MoveOutcome::Continued {
                scores_tied: true,
                used_blast: false
            }
        );
        assert_eq!(state.turn, Player::Undecided);
        assert!(state.cards.side(Player::P1).field.is_empty());
        assert!(state.cards.side(Player::P2).field.is_empty());
        assert_eq!(
            state.cards.side(Player::P1).discard,
            vec![AlisasOrbalBow, JusisSword]
        );
        assert_eq!(state.cards.side(Player::P2).discard, vec![LaurasGreatsword]);
        assert!(state.is_waiting(Player::P1));
        assert!(state.is_waiting(Player::P2));
    }

    #[test]
    fn failing_to_beat_the_score_on_your_own_turn_loses() {
        let mut state = decided(
            Player::P2,
            side(&[JusisSword], &[GaiusSpear], &[LaurasGreatsword]),
            side(&[JusisSword], &[FiesTwinGunswords, GaiusSpear], &[AlisasOrbalBow]),
        );

        let outcome = state
            .apply_move(Player::P2, &card_move(FiesTwinGunswords))
            .expect("losing move");
        assert_eq!(outcome, MoveOutcome::Ended(MatchEnd::Winner(Player::P1)));
    }

    #[test]
    fn unanswerable_lead_wins_immediately() {
        // P2's only answers are low cards; no effects, no rod target.
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[LaurasGreatsword, GaiusSpear], &[FiesTwinGunswords]),
            side(&[JusisSword], &[ElliotsOrbalStaff, FiesTwinGunswords], &[AlisasOrbalBow]),
        );

        let outcome = state
            .apply_move(Player::P1, &card_move(LaurasGreatsword))
            .expect("winning move");
        assert_eq!(outcome, MoveOutcome::Ended(MatchEnd::Winner(Player::P1)));
    }

    #[test]
    fn feasible_counters_keep_the_match_alive() {
        // Base position: P1 moves to 9 against P2's 3, gap 6.
        let base_p1 = side(&[JusisSword], &[LaurasGreatsword, GaiusSpear], &[FiesTwinGunswords]);

        // A big enough hand card answers.
        let mut state = decided(
            Player::P1,
            base_p1.clone(),
            side(&[JusisSword], &[LaurasGreatsword], &[AlisasOrbalBow]),
        );
        assert!(matches!(
            state.apply_move(Player::P1, &card_move(LaurasGreatsword)),
            Ok(MoveOutcome::Continued { .. })
        ));

        // A mirror always answers.
        let mut state = decided(
            Player::P1,
            base_p1.clone(),
            side(&[JusisSword], &[ElliotsOrbalStaff, Mirror], &[AlisasOrbalBow]),
        );
        assert!(matches!(
            state.apply_move(Player::P1, &card_move(LaurasGreatsword)),
            Ok(MoveOutcome::Continued { .. })
        ));

        // A blast always answers.
        let mut state = decided(
            Player::P1,
            base_p1.clone(),
            side(&[JusisSword], &[ElliotsOrbalStaff, Blast], &[AlisasOrbalBow]),
        );
        assert!(matches!(
            state.apply_move(Player::P1, &card_move(LaurasGreatsword)),
            Ok(MoveOutcome::Continued { .. })
        ));

        // A bolt answers while the leader's top card is active.
        let mut state = decided(
            Player::P1,
            base_p1.clone(),
            side(&[JusisSword], &[ElliotsOrbalStaff, Bolt], &[AlisasOrbalBow]),
        );
        assert!(matches!(
            state.apply_move(Player::P1, &card_move(LaurasGreatsword)),
            Ok(MoveOutcome::Continued { .. })
        ));

        // A rod answers when the bolted top card would close the gap.
        let mut state = decided(
            Player::P1,
            base_p1.clone(),
            side(
                &[JusisSword],
                &[ElliotsOrbalStaff, FiesTwinGunswords],
                &[AlisasOrbalBow, InactiveLaurasGreatsword],
            ),
        );
        assert!(matches!(
            state.apply_move(Player::P1, &card_move(LaurasGreatsword)),
            Ok(MoveOutcome::Continued { .. })
        ));
    }

    #[test]
    fn effect_only_hand_is_an_automatic_loss() {
        let mut state = decided(
            Player::P1,
            side(&[JusisSword], &[FiesTwinGunswords, GaiusSpear], &[FiesTwinGunswords]),
            side(&[JusisSword], &[Bolt, Mirror], &[AlisasOrbalBow]),
        );

        let outcome = state
            .apply_move(Player::P1, &card_move(FiesTwinGunswords))
            .expect("move");
        assert_eq!(outcome, MoveOutcome::Ended(MatchEnd::Winner(Player::P1)));
    }

    #[test]
    fn blast_into_an_empty_hand_ends_the_match() {
        let mut state = decided(
            Player::P1,
            side(&[], &[Blast, GaiusSpear], &[FiesTwinGunswords]),
            side(&[JusisSword], &[Mirror], &[AlisasOrbalBow, JusisSword]),
        );

        let outcome = state
            .apply_move(
                Player::P1,
                &mv(MatchInstruction::CardBlast, &(Mirror as u8).to_string()),
            )
            .expect("blast");
        assert_eq!(outcome, MoveOutcome::Ended(MatchEnd::Winner(Player::P1)));
        assert!(state.cards.side(Player::P2).hand.is_empty());
    }

    #[test]
    fn exhausted_tie_is_a_draw() {
        let mut state = decided(
            Player::P2,
            side(&[], &[], &[LaurasGreatsword]),
            side(&[], &[LaurasGreatsword], &[InactiveGaiusSpear]),
        );

        let outcome = state
            .apply_move(Player::P2, &card_move(LaurasGreatsword))
            .expect("final move");
        assert_eq!(outcome, MoveOutcome::Ended(MatchEnd::Draw));
    }

    #[test]
    fn cards_are_conserved_across_moves() {
        let mut state = decided(
            Player::P1,
            side(
                &[JusisSword, LaurasGreatsword],
                &[Bolt, GaiusSpear, FiesTwinGunswords],
                &[FiesTwinGunswords, JusisSword],
            ),
            side(
                &[JusisSword, AlisasOrbalBow],
                &[LaurasGreatsword, Mirror, GaiusSpear],
                &[AlisasOrbalBow, GaiusSpear],
            ),
        );
        let totals = [
            state.cards.side(Player::P1).total(),
            state.cards.side(Player::P2).total(),
        ];

        state.apply_move(Player::P1, &card_move(Bolt)).expect("bolt");
        state
            .apply_move(Player::P2, &card_move(GaiusSpear))
            .expect("answer");

        assert_eq!(state.cards.side(Player::P1).total(), totals[0]);
        assert_eq!(state.cards.side(Player::P2).total(), totals[1]);
    }
}
