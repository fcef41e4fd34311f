//! Test doubles and fixtures for the battle engine.
//!
//! Available to dependents through the `mocks` feature so service-level
//! tests can reuse the same fault injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cardclash_types::{
    Battle, BattleId, BattleStatus, Card, CardId, Move, NewBattle, QueueEntry, Round, StoreError,
    UserId,
};
use uuid::Uuid;

use crate::memory::MemoryStore;
use crate::orchestrator::ComputerOpponent;
use crate::store::{BattleStore, StoreResult};

/// Computer opponent that always plays the same move.
pub struct FixedOpponent(pub Move);

impl ComputerOpponent for FixedOpponent {
    fn choose(&self) -> Move {
        self.0
    }
}

pub fn user(n: u128) -> UserId {
    Uuid::from_u128(n)
}

/// Seed a human-vs-human battle: both players get a card, which is staked.
pub async fn human_battle(store: &MemoryStore, player1: UserId, player2: UserId) -> Battle {
    let stake1 = store.put_card(&player1);
    let stake2 = store.put_card(&player2);
    store
        .create_battle(NewBattle::versus(player1, stake1.id, player2, stake2.id))
        .await
        .expect("create battle")
}

/// Seed a battle against the computer for `player`.
pub async fn computer_battle(store: &MemoryStore, player: UserId) -> Battle {
    let stake = store.put_card(&player);
    store
        .create_battle(NewBattle::against_computer(player, stake.id))
        .await
        .expect("create battle")
}

/// Store wrapper that fails the next N operations with a transient error.
#[derive(Clone)]
pub struct FlakyStore<S> {
    inner: S,
    failures_remaining: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` store operations fail with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Total store operations observed, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(StoreError::unavailable("injected outage"));
        }
        Ok(())
    }
}

impl<S: BattleStore> BattleStore for FlakyStore<S> {
    async fn queue_entry(&self, player: &UserId) -> StoreResult<Option<QueueEntry>> {
        self.check()?;
        self.inner.queue_entry(player).await
    }

    async fn enqueue(&self, player: &UserId) -> StoreResult<QueueEntry> {
        self.check()?;
        self.inner.enqueue(player).await
    }

    async fn dequeue(&self, player: &UserId) -> StoreResult<()> {
        self.check()?;
        self.inner.dequeue(player).await
    }

    async fn oldest_waiting_opponent(&self, exclude: &UserId) -> StoreResult<Option<QueueEntry>> {
        self.check()?;
        self.inner.oldest_waiting_opponent(exclude).await
    }

    async fn battle(&self, battle: &BattleId) -> StoreResult<Option<Battle>> {
        self.check()?;
        self.inner.battle(battle).await
    }

    async fn create_battle(&self, new: NewBattle) -> StoreResult<Battle> {
        self.check()?;
        self.inner.create_battle(new).await
    }

    async fn set_battle_status(
        &self,
        battle: &BattleId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.set_battle_status(battle, status, winner).await
    }

    async fn active_battle_for(&self, player: &UserId) -> StoreResult<Option<Battle>> {
        self.check()?;
        self.inner.active_battle_for(player).await
    }

    async fn rounds(&self, battle: &BattleId) -> StoreResult<Vec<Round>> {
        self.check()?;
        self.inner.rounds(battle).await
    }

    async fn append_round(&self, round: Round) -> StoreResult<()> {
        self.check()?;
        self.inner.append_round(round).await
    }

    async fn card(&self, card: &CardId) -> StoreResult<Option<Card>> {
        self.check()?;
        self.inner.card(card).await
    }

    async fn random_card_owned_by(&self, owner: &UserId) -> StoreResult<Option<Card>> {
        self.check()?;
        self.inner.random_card_owned_by(owner).await
    }

    async fn transfer_card(&self, card: &CardId, new_owner: &UserId) -> StoreResult<()> {
        self.check()?;
        self.inner.transfer_card(card, new_owner).await
    }
}

#[derive(Default)]
struct ProbeState {
    in_flight: HashMap<BattleId, usize>,
    max_in_flight: HashMap<BattleId, usize>,
    global_in_flight: usize,
    global_max: usize,
}

/// Store wrapper that measures round-access overlap. Round reads and writes
/// are slowed by `delay` to widen any race window, and the maximum number of
/// simultaneous accessors is recorded per battle and globally.
#[derive(Clone)]
pub struct ProbeStore<S> {
    inner: S,
    delay: Duration,
    state: Arc<Mutex<ProbeState>>,
    battle_fetches: Arc<AtomicUsize>,
}

impl<S> ProbeStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            state: Arc::new(Mutex::new(ProbeState::default())),
            battle_fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Peak number of simultaneous round accesses for one battle.
    pub fn max_in_flight(&self, battle: &BattleId) -> usize {
        let state = self.state.lock().unwrap();
        state.max_in_flight.get(battle).copied().unwrap_or(0)
    }

    /// Peak number of simultaneous round accesses across all battles.
    pub fn global_max_in_flight(&self) -> usize {
        self.state.lock().unwrap().global_max
    }

    /// Number of battle-record reads that reached the store (cache misses).
    pub fn battle_fetches(&self) -> usize {
        self.battle_fetches.load(Ordering::SeqCst)
    }

    fn enter(&self, battle: BattleId) {
        let mut state = self.state.lock().unwrap();
        let entry = state.in_flight.entry(battle).or_insert(0);
        *entry += 1;
        let current = *entry;
        let max = state.max_in_flight.entry(battle).or_insert(0);
        *max = (*max).max(current);
        state.global_in_flight += 1;
        state.global_max = state.global_max.max(state.global_in_flight);
    }

    fn exit(&self, battle: BattleId) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.in_flight.get_mut(&battle) {
            *entry -= 1;
        }
        state.global_in_flight -= 1;
    }
}

impl<S: BattleStore> BattleStore for ProbeStore<S> {
    async fn queue_entry(&self, player: &UserId) -> StoreResult<Option<QueueEntry>> {
        self.inner.queue_entry(player).await
    }

    async fn enqueue(&self, player: &UserId) -> StoreResult<QueueEntry> {
        self.inner.enqueue(player).await
    }

    async fn dequeue(&self, player: &UserId) -> StoreResult<()> {
        self.inner.dequeue(player).await
    }

    async fn oldest_waiting_opponent(&self, exclude: &UserId) -> StoreResult<Option<QueueEntry>> {
        self.inner.oldest_waiting_opponent(exclude).await
    }

    async fn battle(&self, battle: &BattleId) -> StoreResult<Option<Battle>> {
        self.battle_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.battle(battle).await
    }

    async fn create_battle(&self, new: NewBattle) -> StoreResult<Battle> {
        self.inner.create_battle(new).await
    }

    async fn set_battle_status(
        &self,
        battle: &BattleId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> StoreResult<()> {
        self.inner.set_battle_status(battle, status, winner).await
    }

    async fn active_battle_for(&self, player: &UserId) -> StoreResult<Option<Battle>> {
        self.inner.active_battle_for(player).await
    }

    async fn rounds(&self, battle: &BattleId) -> StoreResult<Vec<Round>> {
        self.enter(*battle);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.rounds(battle).await;
        self.exit(*battle);
        result
    }

    async fn append_round(&self, round: Round) -> StoreResult<()> {
        let battle = round.battle_id;
        self.enter(battle);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.append_round(round).await;
        self.exit(battle);
        result
    }

    async fn card(&self, card: &CardId) -> StoreResult<Option<Card>> {
        self.inner.card(card).await
    }

    async fn random_card_owned_by(&self, owner: &UserId) -> StoreResult<Option<Card>> {
        self.inner.random_card_owned_by(owner).await
    }

    async fn transfer_card(&self, card: &CardId, new_owner: &UserId) -> StoreResult<()> {
        self.inner.transfer_card(card, new_owner).await
    }
}
