//! Round- and battle-resolution rules.
//!
//! This module is a pure decision kernel: given the resolved rounds of a
//! battle it answers whether the battle is over and who won. It performs no
//! I/O and holds no mutable state, so every caller observes the same answer
//! for the same round list.
//!
//! ## Completion
//!
//! A battle completes as soon as either seat accumulates
//! [`RulesConfig::wins_required`] round wins (scanning rounds in order and
//! stopping at the threshold), or when [`RulesConfig::max_rounds`] rounds
//! have been played. If the maximum is reached without either seat hitting
//! the threshold, the seat with strictly more wins takes the battle; an
//! exact tie falls to the configured [`TieBreak`] seat.

use cardclash_types::{Move, Round, Side};

/// Which seat takes a battle that is tied after the final round. The
/// reference policy awards ties to player 1; it is explicit configuration
/// rather than an accident of evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    Player1,
    Player2,
}

impl TieBreak {
    fn side(&self) -> Side {
        match self {
            TieBreak::Player1 => Side::Player1,
            TieBreak::Player2 => Side::Player2,
        }
    }
}

/// Battle thresholds. `wins_required` round wins end the battle early;
/// `max_rounds` bounds its length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RulesConfig {
    pub wins_required: u32,
    pub max_rounds: u32,
    pub tie_break: TieBreak,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            wins_required: 3,
            max_rounds: 5,
            tie_break: TieBreak::Player1,
        }
    }
}

impl RulesConfig {
    /// Validate the thresholds: the win requirement must be reachable within
    /// the round bound.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.wins_required == 0 {
            return Err("wins_required must be greater than zero");
        }
        if self.max_rounds < self.wins_required {
            return Err("max_rounds must be at least wins_required");
        }
        Ok(())
    }
}

/// Outcome of a single round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    Draw,
    Winner(Side),
}

/// Cumulative round wins per seat. Draws count for neither.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WinTally {
    pub player1: u32,
    pub player2: u32,
}

impl WinTally {
    pub fn wins(&self, side: Side) -> u32 {
        match side {
            Side::Player1 => self.player1,
            Side::Player2 => self.player2,
        }
    }

    fn record(&mut self, outcome: RoundOutcome) {
        match outcome {
            RoundOutcome::Draw => {}
            RoundOutcome::Winner(Side::Player1) => self.player1 += 1,
            RoundOutcome::Winner(Side::Player2) => self.player2 += 1,
        }
    }
}

/// The rules engine. Cheap to clone; construct once per process with a
/// validated config and share it.
#[derive(Clone, Debug)]
pub struct Rules {
    config: RulesConfig,
}

impl Default for Rules {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}

impl Rules {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn wins_required(&self) -> u32 {
        self.config.wins_required
    }

    pub fn max_rounds(&self) -> u32 {
        self.config.max_rounds
    }

    /// Resolve one exchange of moves: equal moves draw, otherwise the fixed
    /// dominance cycle (rock > scissors > paper > rock) decides.
    pub fn resolve_round(player1_move: Move, player2_move: Move) -> RoundOutcome {
        if player1_move == player2_move {
            return RoundOutcome::Draw;
        }
        if player1_move.beats() == player2_move {
            RoundOutcome::Winner(Side::Player1)
        } else {
            RoundOutcome::Winner(Side::Player2)
        }
    }

    /// Cumulative win counts over the full round list.
    pub fn tally(&self, rounds: &[Round]) -> WinTally {
        let mut tally = WinTally::default();
        for round in rounds {
            tally.record(Self::resolve_round(round.player1_move, round.player2_move));
        }
        tally
    }

    /// Whether the battle is over: a seat reached the win threshold (scanned
    /// in order, stopping at the first crossing) or the round bound is
    /// exhausted.
    pub fn is_battle_complete(&self, rounds: &[Round]) -> bool {
        if rounds.len() as u32 >= self.config.max_rounds {
            return true;
        }
        let mut tally = WinTally::default();
        for round in rounds {
            tally.record(Self::resolve_round(round.player1_move, round.player2_move));
            if tally.player1 >= self.config.wins_required
                || tally.player2 >= self.config.wins_required
            {
                return true;
            }
        }
        false
    }

    /// The winning seat, or `None` while the battle is still undecidable.
    /// Player 1 is checked first so a malformed over-long round list cannot
    /// produce two winners.
    pub fn battle_winner(&self, rounds: &[Round]) -> Option<Side> {
        let tally = self.tally(rounds);
        if tally.player1 >= self.config.wins_required {
            return Some(Side::Player1);
        }
        if tally.player2 >= self.config.wins_required {
            return Some(Side::Player2);
        }
        if rounds.len() as u32 >= self.config.max_rounds {
            return Some(match tally.player1.cmp(&tally.player2) {
                std::cmp::Ordering::Greater => Side::Player1,
                std::cmp::Ordering::Less => Side::Player2,
                std::cmp::Ordering::Equal => self.config.tie_break.side(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardclash_types::BattleId;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn battle_id() -> BattleId {
        Uuid::from_u128(1)
    }

    fn rounds_from(moves: &[(Move, Move)]) -> Vec<Round> {
        moves
            .iter()
            .enumerate()
            .map(|(index, (player1_move, player2_move))| Round {
                battle_id: battle_id(),
                round_number: index as u32 + 1,
                player1_move: *player1_move,
                player2_move: *player2_move,
            })
            .collect()
    }

    #[test]
    fn test_equal_moves_draw() {
        for mv in Move::ALL {
            assert_eq!(Rules::resolve_round(mv, mv), RoundOutcome::Draw);
        }
    }

    #[test]
    fn test_dominance_relation() {
        assert_eq!(
            Rules::resolve_round(Move::Rock, Move::Scissors),
            RoundOutcome::Winner(Side::Player1)
        );
        assert_eq!(
            Rules::resolve_round(Move::Scissors, Move::Rock),
            RoundOutcome::Winner(Side::Player2)
        );
        assert_eq!(
            Rules::resolve_round(Move::Scissors, Move::Paper),
            RoundOutcome::Winner(Side::Player1)
        );
        assert_eq!(
            Rules::resolve_round(Move::Paper, Move::Rock),
            RoundOutcome::Winner(Side::Player1)
        );
        assert_eq!(
            Rules::resolve_round(Move::Rock, Move::Paper),
            RoundOutcome::Winner(Side::Player2)
        );
    }

    #[test]
    fn test_no_move_dominates_the_cycle() {
        // Every move wins exactly one matchup and loses exactly one.
        for mv in Move::ALL {
            let wins = Move::ALL
                .iter()
                .filter(|other| Rules::resolve_round(mv, **other) == RoundOutcome::Winner(Side::Player1))
                .count();
            let losses = Move::ALL
                .iter()
                .filter(|other| Rules::resolve_round(mv, **other) == RoundOutcome::Winner(Side::Player2))
                .count();
            assert_eq!(wins, 1);
            assert_eq!(losses, 1);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(RulesConfig::default().validate().is_ok());

        let zero_wins = RulesConfig {
            wins_required: 0,
            ..RulesConfig::default()
        };
        assert!(zero_wins.validate().is_err());

        let unreachable = RulesConfig {
            wins_required: 3,
            max_rounds: 2,
            tie_break: TieBreak::Player1,
        };
        assert!(unreachable.validate().is_err());
    }

    #[test]
    fn test_three_straight_wins_completes_battle() {
        let rules = Rules::default();
        let rounds = rounds_from(&[
            (Move::Rock, Move::Scissors),
            (Move::Rock, Move::Scissors),
            (Move::Rock, Move::Scissors),
        ]);
        assert!(!rules.is_battle_complete(&rounds[..2]));
        assert_eq!(rules.battle_winner(&rounds[..2]), None);
        assert!(rules.is_battle_complete(&rounds));
        assert_eq!(rules.battle_winner(&rounds), Some(Side::Player1));
    }

    #[test]
    fn test_draws_do_not_count_toward_threshold() {
        let rules = Rules::default();
        let rounds = rounds_from(&[
            (Move::Rock, Move::Rock),
            (Move::Paper, Move::Paper),
            (Move::Scissors, Move::Scissors),
            (Move::Rock, Move::Rock),
        ]);
        assert!(!rules.is_battle_complete(&rounds));
        assert_eq!(rules.battle_winner(&rounds), None);
        assert_eq!(rules.tally(&rounds), WinTally::default());
    }

    #[test]
    fn test_max_rounds_completes_battle() {
        let rules = Rules::default();
        // 2-2 with one draw: undecided at 4 rounds, forced at 5.
        let rounds = rounds_from(&[
            (Move::Rock, Move::Scissors),
            (Move::Scissors, Move::Rock),
            (Move::Paper, Move::Rock),
            (Move::Rock, Move::Paper),
            (Move::Rock, Move::Rock),
        ]);
        assert!(!rules.is_battle_complete(&rounds[..4]));
        assert!(rules.is_battle_complete(&rounds));
    }

    #[test]
    fn test_tie_at_max_rounds_falls_to_configured_seat() {
        let tied = rounds_from(&[
            (Move::Rock, Move::Scissors),
            (Move::Scissors, Move::Rock),
            (Move::Paper, Move::Rock),
            (Move::Rock, Move::Paper),
            (Move::Rock, Move::Rock),
        ]);

        let rules = Rules::default();
        assert_eq!(rules.battle_winner(&tied), Some(Side::Player1));

        let player2_favored = Rules::new(RulesConfig {
            tie_break: TieBreak::Player2,
            ..RulesConfig::default()
        });
        assert_eq!(player2_favored.battle_winner(&tied), Some(Side::Player2));
    }

    #[test]
    fn test_strictly_more_wins_at_max_rounds() {
        let rules = Rules::default();
        // Player 2 takes two rounds, player 1 one, two draws.
        let rounds = rounds_from(&[
            (Move::Rock, Move::Paper),
            (Move::Scissors, Move::Rock),
            (Move::Rock, Move::Scissors),
            (Move::Paper, Move::Paper),
            (Move::Rock, Move::Rock),
        ]);
        assert!(rules.is_battle_complete(&rounds));
        assert_eq!(rules.battle_winner(&rounds), Some(Side::Player2));
    }

    #[test]
    fn test_winner_is_stable_once_threshold_reached() {
        let rules = Rules::default();
        // Player 1 reaches three wins; a trailing player-2 win must not
        // change the verdict.
        let rounds = rounds_from(&[
            (Move::Rock, Move::Scissors),
            (Move::Rock, Move::Scissors),
            (Move::Rock, Move::Scissors),
            (Move::Rock, Move::Paper),
        ]);
        assert!(rules.is_battle_complete(&rounds[..3]));
        assert_eq!(rules.battle_winner(&rounds), Some(Side::Player1));
    }

    fn arbitrary_move() -> impl Strategy<Value = Move> {
        prop_oneof![
            Just(Move::Rock),
            Just(Move::Paper),
            Just(Move::Scissors),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolution_is_antisymmetric(a in arbitrary_move(), b in arbitrary_move()) {
            let forward = Rules::resolve_round(a, b);
            let backward = Rules::resolve_round(b, a);
            match forward {
                RoundOutcome::Draw => prop_assert_eq!(backward, RoundOutcome::Draw),
                RoundOutcome::Winner(side) => {
                    prop_assert_eq!(backward, RoundOutcome::Winner(side.opponent()))
                }
            }
        }

        #[test]
        fn prop_draw_iff_equal(a in arbitrary_move(), b in arbitrary_move()) {
            prop_assert_eq!(Rules::resolve_round(a, b) == RoundOutcome::Draw, a == b);
        }
    }
}
