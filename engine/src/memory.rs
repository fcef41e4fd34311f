//! In-memory [`BattleStore`] implementation.
//!
//! Backs the arena service and the test suite. Cheap to clone: every clone
//! shares the same state, so one store can be handed to the matchmaker, the
//! orchestrator, and the custodian at once. The store enforces the record
//! invariants a production database would carry as constraints: one queue
//! entry per player, gapless append-only rounds with a unique
//! `(battle_id, round_number)` pair, and monotonic battle status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cardclash_types::{
    Battle, BattleId, BattleStatus, Card, CardId, NewBattle, QueueEntry, Round, StoreError, UserId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use uuid::Uuid;

use crate::store::{BattleStore, StoreResult};

struct Inner {
    queue: HashMap<UserId, QueueEntry>,
    battles: HashMap<BattleId, Battle>,
    rounds: HashMap<BattleId, Vec<Round>>,
    cards: HashMap<CardId, Card>,
    admissions: u64,
    rng: StdRng,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic random-card selection for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: HashMap::new(),
                battles: HashMap::new(),
                rounds: HashMap::new(),
                cards: HashMap::new(),
                admissions: 0,
                rng,
            })),
        }
    }

    /// Mint a card owned by `owner`. Inventory management proper lives
    /// outside the battle subsystem; this exists so the arena service and
    /// tests can seed collections.
    pub fn put_card(&self, owner: &UserId) -> Card {
        let card = Card {
            id: Uuid::new_v4(),
            owner_id: *owner,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.cards.insert(card.id, card.clone());
        card
    }

    pub fn grant_cards(&self, owner: &UserId, count: usize) -> Vec<Card> {
        (0..count).map(|_| self.put_card(owner)).collect()
    }

    pub fn card_count(&self, owner: &UserId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .cards
            .values()
            .filter(|card| card.owner_id == *owner)
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

impl BattleStore for MemoryStore {
    async fn queue_entry(&self, player: &UserId) -> StoreResult<Option<QueueEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.queue.get(player).cloned())
    }

    async fn enqueue(&self, player: &UserId) -> StoreResult<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.queue.get(player) {
            return Ok(existing.clone());
        }
        inner.admissions += 1;
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            player_id: *player,
            created_at: inner.admissions,
        };
        inner.queue.insert(*player, entry.clone());
        Ok(entry)
    }

    async fn dequeue(&self, player: &UserId) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.remove(player);
        Ok(())
    }

    async fn oldest_waiting_opponent(&self, exclude: &UserId) -> StoreResult<Option<QueueEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .queue
            .values()
            .filter(|entry| entry.player_id != *exclude)
            .min_by_key(|entry| entry.created_at)
            .cloned())
    }

    async fn battle(&self, battle: &BattleId) -> StoreResult<Option<Battle>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.battles.get(battle).cloned())
    }

    async fn create_battle(&self, new: NewBattle) -> StoreResult<Battle> {
        let battle = Battle {
            id: Uuid::new_v4(),
            player1_id: new.player1_id,
            player2_id: new.player2_id,
            player1_card_id: new.player1_card_id,
            player2_card_id: new.player2_card_id,
            status: BattleStatus::Active,
            winner_id: None,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.battles.insert(battle.id, battle.clone());
        inner.rounds.insert(battle.id, Vec::new());
        Ok(battle)
    }

    async fn set_battle_status(
        &self,
        battle: &BattleId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .battles
            .get_mut(battle)
            .ok_or_else(|| StoreError::Constraint {
                reason: format!("battle {battle} does not exist"),
            })?;
        if record.status == BattleStatus::Completed {
            return Err(StoreError::Constraint {
                reason: format!("battle {battle} is already completed"),
            });
        }
        record.status = status;
        record.winner_id = winner;
        Ok(())
    }

    async fn active_battle_for(&self, player: &UserId) -> StoreResult<Option<Battle>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .battles
            .values()
            .filter(|battle| battle.status == BattleStatus::Active)
            .find(|battle| battle.side_of(player).is_some())
            .cloned())
    }

    async fn rounds(&self, battle: &BattleId) -> StoreResult<Vec<Round>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rounds.get(battle).cloned().unwrap_or_default())
    }

    async fn append_round(&self, round: Round) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let rounds = inner
            .rounds
            .get_mut(&round.battle_id)
            .ok_or_else(|| StoreError::Constraint {
                reason: format!("battle {} does not exist", round.battle_id),
            })?;
        if rounds
            .iter()
            .any(|existing| existing.round_number == round.round_number)
        {
            return Err(StoreError::DuplicateRound {
                battle: round.battle_id,
                round_number: round.round_number,
            });
        }
        let expected = rounds.len() as u32 + 1;
        if round.round_number != expected {
            return Err(StoreError::Constraint {
                reason: format!(
                    "round {} for battle {} leaves a gap (expected {expected})",
                    round.round_number, round.battle_id
                ),
            });
        }
        rounds.push(round);
        Ok(())
    }

    async fn card(&self, card: &CardId) -> StoreResult<Option<Card>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.cards.get(card).cloned())
    }

    async fn random_card_owned_by(&self, owner: &UserId) -> StoreResult<Option<Card>> {
        let mut inner = self.inner.lock().unwrap();
        let owned: Vec<CardId> = inner
            .cards
            .values()
            .filter(|card| card.owner_id == *owner)
            .map(|card| card.id)
            .collect();
        let Some(id) = owned.choose(&mut inner.rng).copied() else {
            return Ok(None);
        };
        Ok(inner.cards.get(&id).cloned())
    }

    async fn transfer_card(&self, card: &CardId, new_owner: &UserId) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .cards
            .get_mut(card)
            .ok_or_else(|| StoreError::Constraint {
                reason: format!("card {card} does not exist"),
            })?;
        record.owner_id = *new_owner;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardclash_types::Move;

    fn user(n: u128) -> UserId {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_player() {
        let store = MemoryStore::with_seed(1);
        let player = user(1);
        let first = store.enqueue(&player).await.unwrap();
        let second = store.enqueue(&player).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_absent_player_is_ok() {
        let store = MemoryStore::with_seed(1);
        store.dequeue(&user(1)).await.unwrap();
        store.dequeue(&user(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_oldest_waiting_opponent_is_fifo_and_excludes_self() {
        let store = MemoryStore::with_seed(1);
        let (a, b, c) = (user(1), user(2), user(3));
        store.enqueue(&a).await.unwrap();
        store.enqueue(&b).await.unwrap();
        store.enqueue(&c).await.unwrap();

        let opponent = store.oldest_waiting_opponent(&a).await.unwrap().unwrap();
        assert_eq!(opponent.player_id, b);

        // The longest-waiting entry is the caller's own: it must be skipped.
        let opponent = store.oldest_waiting_opponent(&b).await.unwrap().unwrap();
        assert_eq!(opponent.player_id, a);

        store.dequeue(&a).await.unwrap();
        store.dequeue(&b).await.unwrap();
        assert!(store.oldest_waiting_opponent(&c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_round_rejects_duplicates_and_gaps() {
        let store = MemoryStore::with_seed(1);
        let card = store.put_card(&user(1));
        let other = store.put_card(&user(2));
        let battle = store
            .create_battle(NewBattle::versus(user(1), card.id, user(2), other.id))
            .await
            .unwrap();

        let round = Round {
            battle_id: battle.id,
            round_number: 1,
            player1_move: Move::Rock,
            player2_move: Move::Paper,
        };
        store.append_round(round.clone()).await.unwrap();

        assert!(matches!(
            store.append_round(round.clone()).await,
            Err(StoreError::DuplicateRound { round_number: 1, .. })
        ));

        let gap = Round {
            round_number: 3,
            ..round
        };
        assert!(matches!(
            store.append_round(gap).await,
            Err(StoreError::Constraint { .. })
        ));

        let rounds = store.rounds(&battle.id).await.unwrap();
        assert_eq!(rounds.len(), 1);
    }

    #[tokio::test]
    async fn test_battle_status_is_monotonic() {
        let store = MemoryStore::with_seed(1);
        let card = store.put_card(&user(1));
        let other = store.put_card(&user(2));
        let battle = store
            .create_battle(NewBattle::versus(user(1), card.id, user(2), other.id))
            .await
            .unwrap();

        store
            .set_battle_status(&battle.id, BattleStatus::Completed, Some(user(1)))
            .await
            .unwrap();
        assert!(matches!(
            store
                .set_battle_status(&battle.id, BattleStatus::Active, None)
                .await,
            Err(StoreError::Constraint { .. })
        ));

        let stored = store.battle(&battle.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BattleStatus::Completed);
        assert_eq!(stored.winner_id, Some(user(1)));
        stored.validate_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_active_battle_for_ignores_completed_battles() {
        let store = MemoryStore::with_seed(1);
        let card = store.put_card(&user(1));
        let other = store.put_card(&user(2));
        let battle = store
            .create_battle(NewBattle::versus(user(1), card.id, user(2), other.id))
            .await
            .unwrap();

        assert_eq!(
            store.active_battle_for(&user(1)).await.unwrap().unwrap().id,
            battle.id
        );
        assert_eq!(
            store.active_battle_for(&user(2)).await.unwrap().unwrap().id,
            battle.id
        );
        assert!(store.active_battle_for(&user(3)).await.unwrap().is_none());

        store
            .set_battle_status(&battle.id, BattleStatus::Completed, Some(user(1)))
            .await
            .unwrap();
        assert!(store.active_battle_for(&user(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_random_card_comes_from_owner_collection() {
        let store = MemoryStore::with_seed(7);
        let owner = user(1);
        let owned = store.grant_cards(&owner, 3);
        store.grant_cards(&user(2), 2);

        for _ in 0..10 {
            let card = store.random_card_owned_by(&owner).await.unwrap().unwrap();
            assert!(owned.iter().any(|c| c.id == card.id));
            assert_eq!(card.owner_id, owner);
        }
        assert!(store
            .random_card_owned_by(&user(9))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_transfer_card_updates_owner() {
        let store = MemoryStore::with_seed(1);
        let card = store.put_card(&user(1));
        store.transfer_card(&card.id, &user(2)).await.unwrap();
        let stored = store.card(&card.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, user(2));
        assert_eq!(store.card_count(&user(1)), 0);
        assert_eq!(store.card_count(&user(2)), 1);
    }
}
