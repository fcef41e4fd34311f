//! Data-access gateway.
//!
//! [`BattleStore`] is the only seam through which the battle subsystem
//! touches persistence. Implementations are expected to make every single
//! write atomic for its record; cross-record consistency (round numbering,
//! settlement ordering) is the orchestrator's responsibility. The gateway
//! performs no retries: failures surface as [`StoreError`] and callers
//! decide what is worth retrying via [`StoreError::is_transient`].
//!
//! Implementations must reject a duplicate `(battle_id, round_number)` pair
//! with [`StoreError::DuplicateRound`]. In-process move serialization makes
//! that unreachable for a single orchestrator; the constraint is the
//! authoritative guard when several processes share one store.

use std::future::Future;

use cardclash_types::{
    Battle, BattleId, BattleStatus, Card, CardId, NewBattle, QueueEntry, Round, StoreError, UserId,
};

pub type StoreResult<T> = Result<T, StoreError>;

pub trait BattleStore: Clone + Send + Sync + 'static {
    // Queue operations.

    /// The player's waiting entry, if any. A player has at most one.
    fn queue_entry(
        &self,
        player: &UserId,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    /// Admit the player to the queue. Re-admitting a waiting player returns
    /// the existing entry unchanged.
    fn enqueue(&self, player: &UserId) -> impl Future<Output = StoreResult<QueueEntry>> + Send;

    /// Remove the player's entry. Removing an absent entry is not an error.
    fn dequeue(&self, player: &UserId) -> impl Future<Output = StoreResult<()>> + Send;

    /// The longest-waiting entry belonging to someone other than `exclude`,
    /// by admission stamp (strict FIFO).
    fn oldest_waiting_opponent(
        &self,
        exclude: &UserId,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    // Battle operations.

    fn battle(&self, battle: &BattleId) -> impl Future<Output = StoreResult<Option<Battle>>> + Send;

    /// Persist a new battle with an assigned id, status `Active`, no winner.
    fn create_battle(&self, new: NewBattle) -> impl Future<Output = StoreResult<Battle>> + Send;

    /// Transition a battle's status, optionally recording the winner in the
    /// same write. Status is monotonic: a completed battle never changes.
    fn set_battle_status(
        &self,
        battle: &BattleId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// The player's current `Active` battle, if any.
    fn active_battle_for(
        &self,
        player: &UserId,
    ) -> impl Future<Output = StoreResult<Option<Battle>>> + Send;

    // Round operations.

    /// All rounds of a battle, ordered by round number.
    fn rounds(&self, battle: &BattleId) -> impl Future<Output = StoreResult<Vec<Round>>> + Send;

    /// Append one round. Rounds are immutable once written; a duplicate
    /// round number is rejected with [`StoreError::DuplicateRound`].
    fn append_round(&self, round: Round) -> impl Future<Output = StoreResult<()>> + Send;

    // Card operations.

    fn card(&self, card: &CardId) -> impl Future<Output = StoreResult<Option<Card>>> + Send;

    /// A uniformly random card owned by `owner`, or `None` if they own
    /// nothing.
    fn random_card_owned_by(
        &self,
        owner: &UserId,
    ) -> impl Future<Output = StoreResult<Option<Card>>> + Send;

    /// Reassign ownership of a card. Atomic for the single card record.
    fn transfer_card(
        &self,
        card: &CardId,
        new_owner: &UserId,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}
