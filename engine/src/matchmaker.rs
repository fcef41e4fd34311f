//! Matchmaking queue service.
//!
//! Queue membership and opponent discovery. A joining player is matched
//! against the longest-waiting other entry (strict FIFO, no weighting); when
//! nobody is waiting the player is paired with the reserved computer
//! opponent immediately, so a queued player never waits indefinitely.
//!
//! Queue entries are destroyed on `leave_queue` and when a human match is
//! made (both sides' entries, so the opponent cannot be matched twice). A
//! player paired with the computer keeps their entry and remains matchable
//! by the next human joiner.

use std::future::Future;

use cardclash_types::{Battle, BattleError, NewBattle, UserId, COMPUTER_USER_ID};
use tracing::{debug, info};

use crate::custodian::Custodian;
use crate::store::BattleStore;

/// Identity collaborator: supplies the currently signed-in user, if any.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> impl Future<Output = Option<UserId>> + Send;
}

/// Auth provider with a fixed answer. Used by tests and by hosts that
/// authenticate before reaching the battle subsystem.
#[derive(Clone, Copy, Debug)]
pub struct StaticAuth {
    user: Option<UserId>,
}

impl StaticAuth {
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<UserId> {
        self.user
    }
}

pub struct Matchmaker<S, A> {
    store: S,
    custodian: Custodian<S>,
    auth: A,
}

impl<S: BattleStore, A: AuthProvider> Matchmaker<S, A> {
    pub fn new(store: S, auth: A) -> Self {
        Self {
            custodian: Custodian::new(store.clone()),
            store,
            auth,
        }
    }

    async fn require_auth(&self) -> Result<(), BattleError> {
        match self.auth.current_user().await {
            Some(_) => Ok(()),
            None => Err(BattleError::AuthenticationRequired),
        }
    }

    /// Enter the queue and immediately try to match. Joining while already
    /// queued is an idempotent re-entry that just retries the match.
    pub async fn join_queue(&self, player: &UserId) -> Result<Option<Battle>, BattleError> {
        self.require_auth().await?;

        // A battle requires a stake; reject before touching the queue.
        self.custodian
            .validate_stakes(player, &COMPUTER_USER_ID)
            .await?;

        if self.store.queue_entry(player).await?.is_some() {
            debug!(%player, "already queued; retrying match");
            return self.find_match(player).await;
        }

        self.store.enqueue(player).await?;
        self.find_match(player).await
    }

    /// Leave the queue. Removing an absent entry is not an error.
    pub async fn leave_queue(&self, player: &UserId) -> Result<(), BattleError> {
        self.require_auth().await?;
        self.store.dequeue(player).await?;
        Ok(())
    }

    /// Pair the player with the longest-waiting opponent, or with the
    /// computer when the queue holds nobody else.
    pub async fn find_match(&self, player: &UserId) -> Result<Option<Battle>, BattleError> {
        let stake = self.custodian.random_card(player).await?;

        let Some(opponent) = self.store.oldest_waiting_opponent(player).await? else {
            let battle = self
                .store
                .create_battle(NewBattle::against_computer(*player, stake.id))
                .await?;
            info!(battle = %battle.id, %player, "no opponent waiting; created computer battle");
            return Ok(Some(battle));
        };

        let opponent_stake = self
            .custodian
            .random_card(&opponent.player_id)
            .await
            .map_err(|err| match err {
                BattleError::NoCardsAvailable { player } => {
                    BattleError::OpponentHasNoCards { player }
                }
                other => other,
            })?;

        let battle = self
            .store
            .create_battle(NewBattle::versus(
                *player,
                stake.id,
                opponent.player_id,
                opponent_stake.id,
            ))
            .await?;

        // Both entries go, not just the caller's, so the opponent cannot be
        // matched a second time.
        self.store.dequeue(player).await?;
        self.store.dequeue(&opponent.player_id).await?;

        info!(battle = %battle.id, %player, opponent = %opponent.player_id, "matched from queue");
        Ok(Some(battle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use cardclash_types::{BattleStatus, COMPUTER_CARD_ID};
    use uuid::Uuid;

    fn user(n: u128) -> UserId {
        Uuid::from_u128(n)
    }

    fn matchmaker_for(store: &MemoryStore, player: UserId) -> Matchmaker<MemoryStore, StaticAuth> {
        Matchmaker::new(store.clone(), StaticAuth::signed_in(player))
    }

    #[tokio::test]
    async fn test_join_requires_authentication() {
        let store = MemoryStore::with_seed(1);
        let matchmaker = Matchmaker::new(store.clone(), StaticAuth::anonymous());
        let player = user(1);
        store.put_card(&player);

        assert!(matches!(
            matchmaker.join_queue(&player).await,
            Err(BattleError::AuthenticationRequired)
        ));
        assert!(matches!(
            matchmaker.leave_queue(&player).await,
            Err(BattleError::AuthenticationRequired)
        ));
        assert_eq!(store.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_join_with_no_cards_leaves_queue_untouched() {
        let store = MemoryStore::with_seed(1);
        let player = user(1);
        let matchmaker = matchmaker_for(&store, player);

        assert!(matches!(
            matchmaker.join_queue(&player).await,
            Err(BattleError::NoCardsAvailable { player: p }) if p == player
        ));
        assert_eq!(store.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_creates_computer_battle_immediately() {
        let store = MemoryStore::with_seed(1);
        let player = user(1);
        let stake = store.put_card(&player);
        let matchmaker = matchmaker_for(&store, player);

        let battle = matchmaker.join_queue(&player).await.unwrap().unwrap();
        assert_eq!(battle.player1_id, player);
        assert_eq!(battle.player2_id, COMPUTER_USER_ID);
        assert_eq!(battle.player1_card_id, stake.id);
        assert_eq!(battle.player2_card_id, COMPUTER_CARD_ID);
        assert_eq!(battle.status, BattleStatus::Active);
        assert!(battle.is_computer_battle());
    }

    #[tokio::test]
    async fn test_match_is_fifo_and_dequeues_both_sides() {
        let store = MemoryStore::with_seed(1);
        let (first, second, joiner) = (user(1), user(2), user(3));
        for player in [first, second, joiner] {
            store.put_card(&player);
        }
        // Seed two waiting entries in admission order.
        store.enqueue(&first).await.unwrap();
        store.enqueue(&second).await.unwrap();

        let matchmaker = matchmaker_for(&store, joiner);
        let battle = matchmaker.join_queue(&joiner).await.unwrap().unwrap();

        assert_eq!(battle.player1_id, joiner);
        assert_eq!(battle.player2_id, first);
        assert!(!battle.is_computer_battle());
        assert_eq!(battle.status, BattleStatus::Active);

        // The matched pair is gone; the second waiter is still queued.
        assert_eq!(store.queue_len(), 1);
        assert!(store.queue_entry(&second).await.unwrap().is_some());
        assert!(store.queue_entry(&joiner).await.unwrap().is_none());
        assert!(store.queue_entry(&first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent_and_retries_match() {
        let store = MemoryStore::with_seed(1);
        let player = user(1);
        store.put_card(&player);
        let matchmaker = matchmaker_for(&store, player);

        matchmaker.join_queue(&player).await.unwrap();
        assert_eq!(store.queue_len(), 1);

        // Second join does not duplicate the entry and still yields a battle.
        let battle = matchmaker.join_queue(&player).await.unwrap().unwrap();
        assert!(battle.is_computer_battle());
        assert_eq!(store.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_leave_queue_is_idempotent() {
        let store = MemoryStore::with_seed(1);
        let player = user(1);
        store.put_card(&player);
        let matchmaker = matchmaker_for(&store, player);

        matchmaker.join_queue(&player).await.unwrap();
        matchmaker.leave_queue(&player).await.unwrap();
        // Second removal of an absent entry succeeds quietly.
        matchmaker.leave_queue(&player).await.unwrap();
        assert_eq!(store.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_cardless_opponent_fails_the_match() {
        let store = MemoryStore::with_seed(1);
        let (waiter, joiner) = (user(1), user(2));
        store.put_card(&joiner);
        // The waiter got queued and then lost their last card.
        store.enqueue(&waiter).await.unwrap();

        let matchmaker = matchmaker_for(&store, joiner);
        assert!(matches!(
            matchmaker.join_queue(&joiner).await,
            Err(BattleError::OpponentHasNoCards { player }) if player == waiter
        ));

        // Neither entry was consumed by the failed match.
        assert!(store.queue_entry(&waiter).await.unwrap().is_some());
        assert!(store.queue_entry(&joiner).await.unwrap().is_some());
    }
}
