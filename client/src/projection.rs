//! Client-side battle state projection.
//!
//! A view-model mirroring the server's battle state for a single viewer.
//! The server is the source of truth: the projection re-derives win counts
//! from the authoritative round list whenever it changes (debounced to
//! collapse bursts of updates) and tolerates stale or duplicate updates by
//! ignoring anything older than what it already holds.
//!
//! The projection never reads a wall clock. Callers pass the current time
//! in milliseconds to every mutation and drive pending work (debounced
//! recomputes, error expiry, scheduled retries) through [`tick`], which
//! returns the effects that came due. This keeps the state machine
//! deterministic and directly testable.
//!
//! [`tick`]: BattleProjection::tick

use cardclash_engine::rules::{RoundOutcome, Rules};
use cardclash_types::{
    Battle, BattleId, BattleStatus, ErrorCategory, Move, MoveOutcome, Round, Settlement, Side,
    UserId,
};

/// How long an error stays on screen before auto-expiring.
pub const ERROR_DISPLAY_MS: u64 = 3_000;

/// Debounce window for win recomputation and reset requests.
pub const DEBOUNCE_MS: u64 = 100;

/// A move stuck in `loading` is released after this long.
pub const MOVE_TIMEOUT_MS: u64 = 5_000;

/// Bound on automatic retries for network-category errors.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between automatic retries; grows linearly with the attempt.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Effect that came due during a [`BattleProjection::tick`] call. The host
/// application decides what a retry actually re-issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Retry { attempt: u32 },
}

#[derive(Clone, Debug)]
pub struct BattleProjection {
    battle_id: BattleId,
    viewer: Side,
    rounds: Vec<Round>,

    current_round: u32,
    player_wins: u32,
    opponent_wins: u32,
    is_complete: bool,
    loading: bool,
    current_move: Option<Move>,
    show_round_result: bool,
    card_transferred: bool,
    error: Option<String>,

    recompute_due: Option<u64>,
    reset_due: Option<u64>,
    move_deadline: Option<u64>,
    error_expires_at: Option<u64>,
    retry_due: Option<u64>,
    retry_count: u32,
}

impl BattleProjection {
    /// Build a projection for `viewer` from a battle snapshot. An unknown
    /// viewer is oriented as seat 1.
    pub fn new(battle: &Battle, viewer: &UserId, rounds: &[Round], now_ms: u64) -> Self {
        let mut projection = Self {
            battle_id: battle.id,
            viewer: battle.side_of(viewer).unwrap_or(Side::Player1),
            rounds: rounds.to_vec(),
            current_round: rounds.len() as u32 + 1,
            player_wins: 0,
            opponent_wins: 0,
            is_complete: battle.status == BattleStatus::Completed,
            loading: false,
            current_move: None,
            show_round_result: false,
            card_transferred: false,
            error: None,
            recompute_due: None,
            reset_due: None,
            move_deadline: None,
            error_expires_at: None,
            retry_due: None,
            retry_count: 0,
        };
        projection.schedule_recompute(now_ms);
        projection
    }

    // Read side.

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn player_wins(&self) -> u32 {
        self.player_wins
    }

    pub fn opponent_wins(&self) -> u32 {
        self.opponent_wins
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether a deferred recompute is pending. Mirrors the original
    /// view-model's "updating" flag.
    pub fn is_updating(&self) -> bool {
        self.recompute_due.is_some()
    }

    pub fn current_move(&self) -> Option<Move> {
        self.current_move
    }

    pub fn show_round_result(&self) -> bool {
        self.show_round_result
    }

    pub fn card_transferred(&self) -> bool {
        self.card_transferred
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// A move may be submitted when nothing is in flight and the battle is
    /// still open. This mirrors server-side enforcement; it never replaces
    /// it.
    pub fn is_valid_move(&self) -> bool {
        !self.loading && !self.is_updating() && !self.is_complete
    }

    // Mutation entry points.

    /// Record an optimistic move submission. Returns false (and changes
    /// nothing) when the guard rejects it.
    pub fn request_move(&mut self, mv: Move, now_ms: u64) -> bool {
        if !self.is_valid_move() {
            return false;
        }
        self.current_move = Some(mv);
        self.loading = true;
        self.show_round_result = false;
        self.move_deadline = Some(now_ms + MOVE_TIMEOUT_MS);
        true
    }

    /// Fold in the server's reply to a move submission.
    pub fn apply_outcome(&mut self, outcome: &MoveOutcome, now_ms: u64) {
        self.loading = false;
        self.move_deadline = None;

        if let (true, Some(opponent_move)) = (outcome.is_resolved(), outcome.opponent_move) {
            let player_move = outcome.player_move;
            // Local optimistic append; a later apply_rounds with the
            // authoritative list supersedes it.
            if outcome.round == self.rounds.len() as u32 + 1 {
                let (player1_move, player2_move) = match self.viewer {
                    Side::Player1 => (player_move, opponent_move),
                    Side::Player2 => (opponent_move, player_move),
                };
                self.rounds.push(Round {
                    battle_id: self.battle_id,
                    round_number: outcome.round,
                    player1_move,
                    player2_move,
                });
                self.current_round = self.rounds.len() as u32 + 1;
            }
            self.show_round_result = true;
            self.schedule_recompute(now_ms);
        }
        if outcome.complete {
            self.is_complete = true;
        }
    }

    /// Replace the local round list with the authoritative one. Stale
    /// updates (shorter than what is already known) are ignored; duplicates
    /// are absorbed without re-triggering the round result.
    pub fn apply_rounds(&mut self, rounds: &[Round], now_ms: u64) {
        if rounds.len() < self.rounds.len() {
            return;
        }
        let last_changed = self.rounds.last() != rounds.last();
        self.rounds = rounds.to_vec();
        self.current_round = self.rounds.len() as u32 + 1;
        if last_changed {
            self.show_round_result = true;
            self.loading = false;
            self.move_deadline = None;
        }
        self.schedule_recompute(now_ms);
    }

    pub fn apply_settlement(&mut self, settlement: &Settlement) {
        self.is_complete = true;
        self.loading = false;
        self.move_deadline = None;
        self.card_transferred = settlement.card_transferred;
    }

    /// Display an error. Network-category errors additionally schedule a
    /// bounded auto-retry with a linearly growing delay.
    pub fn report_error(
        &mut self,
        message: impl Into<String>,
        category: ErrorCategory,
        now_ms: u64,
    ) {
        self.error = Some(message.into());
        self.error_expires_at = Some(now_ms + ERROR_DISPLAY_MS);
        self.loading = false;
        self.move_deadline = None;

        if category.is_retryable() && self.retry_count < MAX_RETRY_ATTEMPTS {
            self.retry_count += 1;
            self.retry_due = Some(now_ms + RETRY_BASE_DELAY_MS * u64::from(self.retry_count));
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_expires_at = None;
        self.retry_due = None;
        self.retry_count = 0;
    }

    /// Request a local reset, debounced so bursts collapse into one. Clears
    /// only this projection; server state is untouched.
    pub fn request_reset(&mut self, now_ms: u64) {
        self.reset_due = Some(now_ms + DEBOUNCE_MS);
    }

    pub fn reveal_round_result(&mut self) {
        self.show_round_result = true;
    }

    pub fn hide_round_result(&mut self) {
        self.show_round_result = false;
    }

    /// Run everything that came due by `now_ms` and return the effects the
    /// host should act on.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Signal> {
        let mut signals = Vec::new();

        if self.reset_due.is_some_and(|due| now_ms >= due) {
            self.reset_due = None;
            self.perform_reset();
        }

        if self.recompute_due.is_some_and(|due| now_ms >= due) {
            self.recompute_due = None;
            self.recompute_wins();
        }

        if self.move_deadline.is_some_and(|due| now_ms >= due) {
            // The submission never came back; release the guard.
            self.move_deadline = None;
            self.loading = false;
            self.current_move = None;
        }

        if self.error_expires_at.is_some_and(|due| now_ms >= due) {
            self.error_expires_at = None;
            self.error = None;
        }

        if self.retry_due.is_some_and(|due| now_ms >= due) {
            self.retry_due = None;
            self.error = None;
            signals.push(Signal::Retry {
                attempt: self.retry_count,
            });
        }

        signals
    }

    fn schedule_recompute(&mut self, now_ms: u64) {
        // Re-arming the deadline collapses a burst into the final update.
        self.recompute_due = Some(now_ms + DEBOUNCE_MS);
    }

    fn recompute_wins(&mut self) {
        let mut player_wins = 0;
        let mut opponent_wins = 0;
        for round in &self.rounds {
            match Rules::resolve_round(round.player1_move, round.player2_move) {
                RoundOutcome::Draw => {}
                RoundOutcome::Winner(side) if side == self.viewer => player_wins += 1,
                RoundOutcome::Winner(_) => opponent_wins += 1,
            }
        }
        self.player_wins = player_wins;
        self.opponent_wins = opponent_wins;

        if !self.check_consistency() {
            self.error = Some("battle state out of sync".to_string());
        }
    }

    fn perform_reset(&mut self) {
        self.rounds.clear();
        self.current_round = 1;
        self.player_wins = 0;
        self.opponent_wins = 0;
        self.is_complete = false;
        self.loading = false;
        self.current_move = None;
        self.show_round_result = false;
        self.card_transferred = false;
        self.error = None;
        self.recompute_due = None;
        self.move_deadline = None;
        self.error_expires_at = None;
        self.retry_due = None;
        self.retry_count = 0;
    }

    fn check_consistency(&self) -> bool {
        self.current_round >= 1
            && (self.player_wins + self.opponent_wins) as usize <= self.rounds.len()
    }
}
