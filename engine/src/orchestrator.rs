//! Battle orchestrator: the per-battle move-submission state machine.
//!
//! The orchestrator owns the only mutable coordination state in the
//! subsystem and is the sole linearization point for round creation:
//!
//! - a **gate map** holding one async mutex per battle id. At most one
//!   move-submission is in flight per battle; a second submission for the
//!   same id waits for the first to finish before starting its own
//!   read-compute-append cycle. Battles with different ids never wait on
//!   each other. The gate also carries the per-round pending sub-state for
//!   human battles (each seat submits independently; the round is appended
//!   only once both moves are present).
//! - a **snapshot cache** of battle records with a short TTL, never
//!   authoritative past it, invalidated eagerly at settlement.
//!
//! Transient gateway failures are retried up to [`RetryPolicy::max_attempts`]
//! with a fixed backoff before surfacing as `DataAccessFailure`. Domain
//! errors are never retried.
//!
//! Both structures coordinate calls within a single process only. Any
//! deployment running several orchestrators against one store relies on the
//! store's `(battle_id, round_number)` uniqueness constraint as the
//! authoritative second guard.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use cardclash_types::{
    Battle, BattleError, BattleId, BattleSnapshot, BattleStatus, CardId, Move, MoveOutcome,
    MoveState, Round, Settlement, Side, UserId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::custodian::Custodian;
use crate::rules::Rules;
use crate::store::BattleStore;

/// Bounded retry for transient gateway failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Supplies the computer seat's move.
pub trait ComputerOpponent: Send + Sync {
    fn choose(&self) -> Move;
}

/// Uniformly random computer opponent.
pub struct RandomOpponent {
    rng: StdMutex<StdRng>,
}

impl RandomOpponent {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: StdMutex::new(rng),
        }
    }
}

impl Default for RandomOpponent {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputerOpponent for RandomOpponent {
    fn choose(&self) -> Move {
        let mut rng = self.rng.lock().unwrap();
        Move::ALL[rng.gen_range(0..Move::ALL.len())]
    }
}

/// Moves collected for the round currently being assembled in a human
/// battle. Lives inside the battle gate, so access is already serialized.
#[derive(Debug, Default)]
struct PendingRound {
    round_number: u32,
    player1_move: Option<Move>,
    player2_move: Option<Move>,
}

impl PendingRound {
    fn reset(&mut self, round_number: u32) {
        *self = PendingRound {
            round_number,
            ..PendingRound::default()
        };
    }

    fn submit(&mut self, side: Side, mv: Move) {
        match side {
            Side::Player1 => self.player1_move = Some(mv),
            Side::Player2 => self.player2_move = Some(mv),
        }
    }

    fn both(&self) -> Option<(Move, Move)> {
        Some((self.player1_move?, self.player2_move?))
    }
}

type Gate = AsyncMutex<PendingRound>;

struct CachedBattle {
    battle: Battle,
    fetched_at: Instant,
}

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

pub struct Orchestrator<S, C = RandomOpponent> {
    store: S,
    custodian: Custodian<S>,
    rules: Rules,
    computer: C,
    retry: RetryPolicy,
    cache_ttl: Duration,
    gates: StdMutex<HashMap<BattleId, Arc<Gate>>>,
    cache: StdMutex<HashMap<BattleId, CachedBattle>>,
}

impl<S: BattleStore> Orchestrator<S, RandomOpponent> {
    pub fn new(store: S, rules: Rules) -> Self {
        Self::with_computer_opponent(store, rules, RandomOpponent::new())
    }
}

impl<S: BattleStore, C: ComputerOpponent> Orchestrator<S, C> {
    pub fn with_computer_opponent(store: S, rules: Rules, computer: C) -> Self {
        Self {
            custodian: Custodian::new(store.clone()),
            store,
            rules,
            computer,
            retry: RetryPolicy::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            gates: StdMutex::new(HashMap::new()),
            cache: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Submit one move. Serialized per battle id; see the module docs for
    /// the resolution protocol. A failed submission leaves the battle
    /// unchanged: no partial round is ever written.
    pub async fn make_move(
        &self,
        battle_id: BattleId,
        player_id: UserId,
        player_move: Move,
    ) -> Result<MoveOutcome, BattleError> {
        let gate = self.gate(battle_id);
        let mut pending = gate.lock().await;

        let battle = self.load_battle(battle_id).await?;
        if battle.status == BattleStatus::Completed {
            return Err(BattleError::BattleAlreadyCompleted { battle: battle_id });
        }
        let side = battle
            .side_of(&player_id)
            .ok_or(BattleError::NotAParticipant {
                battle: battle_id,
                player: player_id,
            })?;

        let rounds = self.fetch_rounds(battle_id).await?;
        let round_number = rounds.len() as u32 + 1;
        if round_number > self.rules.max_rounds() {
            return Err(BattleError::MaxRoundsReached {
                battle: battle_id,
                max: self.rules.max_rounds(),
            });
        }

        let (player1_move, player2_move) = if battle.is_computer_battle() {
            let computer_move = self.computer.choose();
            match side {
                Side::Player1 => (player_move, computer_move),
                Side::Player2 => (computer_move, player_move),
            }
        } else {
            if pending.round_number != round_number {
                pending.reset(round_number);
            }
            // A seat re-submitting before resolution replaces its own move.
            pending.submit(side, player_move);
            let Some(moves) = pending.both() else {
                debug!(
                    battle = %battle_id,
                    round = round_number,
                    ?side,
                    "move recorded; awaiting opponent"
                );
                return Ok(MoveOutcome {
                    round: round_number,
                    player_move,
                    opponent_move: None,
                    complete: false,
                    state: MoveState::AwaitingOpponent,
                });
            };
            moves
        };

        self.persist_round(Round {
            battle_id,
            round_number,
            player1_move,
            player2_move,
        })
        .await?;
        pending.reset(round_number + 1);

        let rounds = self.fetch_rounds(battle_id).await?;
        let complete = self.rules.is_battle_complete(&rounds);
        if complete {
            self.settle(&battle, &rounds).await?;
        }

        let opponent_move = match side {
            Side::Player1 => player2_move,
            Side::Player2 => player1_move,
        };
        Ok(MoveOutcome {
            round: round_number,
            player_move,
            opponent_move: Some(opponent_move),
            complete,
            state: MoveState::Resolved,
        })
    }

    /// Current view of a battle and its rounds.
    pub async fn get_battle_status(
        &self,
        battle_id: BattleId,
    ) -> Result<BattleSnapshot, BattleError> {
        let battle = self.load_battle(battle_id).await?;
        let rounds = self.fetch_rounds(battle_id).await?;
        let current_round = rounds.len() as u32 + 1;
        let winner = battle.winner_id;
        Ok(BattleSnapshot {
            battle,
            rounds,
            current_round,
            winner,
        })
    }

    /// The player's in-progress battle, if any.
    pub async fn active_battle(
        &self,
        player: UserId,
    ) -> Result<Option<BattleSnapshot>, BattleError> {
        let store = self.store.clone();
        let battle = self
            .with_retry(|| {
                let store = store.clone();
                async move {
                    store
                        .active_battle_for(&player)
                        .await
                        .map_err(BattleError::from)
                }
            })
            .await?;
        let Some(battle) = battle else {
            return Ok(None);
        };
        let rounds = self.fetch_rounds(battle.id).await?;
        let current_round = rounds.len() as u32 + 1;
        let winner = battle.winner_id;
        Ok(Some(BattleSnapshot {
            battle,
            rounds,
            current_round,
            winner,
        }))
    }

    /// Settle a battle explicitly. Normally settlement runs inline from the
    /// final `make_move`; this entry point exists for administrative
    /// completion and is guarded by the same per-battle gate.
    pub async fn complete_battle(&self, battle_id: BattleId) -> Result<Settlement, BattleError> {
        let gate = self.gate(battle_id);
        let _pending = gate.lock().await;

        // Fresh fetch, not the cache: double settlement must be impossible
        // even right after another caller completed the battle.
        let battle = self
            .fetch_battle(battle_id)
            .await?
            .ok_or(BattleError::BattleNotFound { battle: battle_id })?;
        if battle.status == BattleStatus::Completed {
            return Err(BattleError::BattleAlreadyCompleted { battle: battle_id });
        }
        let rounds = self.fetch_rounds(battle_id).await?;
        self.settle(&battle, &rounds).await
    }

    /// Winner determination and the stake side effect. Callers hold the
    /// battle gate and have verified the battle is still active.
    async fn settle(&self, battle: &Battle, rounds: &[Round]) -> Result<Settlement, BattleError> {
        let winner_side =
            self.rules
                .battle_winner(rounds)
                .ok_or(BattleError::UndecidedBattle {
                    battle: battle.id,
                })?;
        let winner_id = battle.player_id(winner_side);

        let mut card_transferred = false;
        if !battle.is_computer_battle() {
            let loser_side = winner_side.opponent();
            let loser_id = battle.player_id(loser_side);
            let loser_card = battle.card_id(loser_side);
            self.transfer_stake(loser_card, loser_id, winner_id).await?;
            card_transferred = true;
        }

        self.persist_status(battle.id, BattleStatus::Completed, Some(winner_id))
            .await?;
        self.invalidate(battle.id);
        info!(
            battle = %battle.id,
            winner = %winner_id,
            card_transferred,
            "battle settled"
        );
        Ok(Settlement {
            winner_id,
            card_transferred,
        })
    }

    // Gate and cache plumbing.

    fn gate(&self, battle_id: BattleId) -> Arc<Gate> {
        let mut gates = self.gates.lock().unwrap();
        gates
            .entry(battle_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(PendingRound::default())))
            .clone()
    }

    fn invalidate(&self, battle_id: BattleId) {
        self.cache.lock().unwrap().remove(&battle_id);
        self.gates.lock().unwrap().remove(&battle_id);
    }

    async fn load_battle(&self, battle_id: BattleId) -> Result<Battle, BattleError> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&battle_id) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.battle.clone());
                }
            }
        }
        let battle = self
            .fetch_battle(battle_id)
            .await?
            .ok_or(BattleError::BattleNotFound { battle: battle_id })?;
        self.cache.lock().unwrap().insert(
            battle_id,
            CachedBattle {
                battle: battle.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(battle)
    }

    // Retried gateway accessors.

    async fn fetch_battle(&self, battle_id: BattleId) -> Result<Option<Battle>, BattleError> {
        let store = self.store.clone();
        self.with_retry(|| {
            let store = store.clone();
            async move { store.battle(&battle_id).await.map_err(BattleError::from) }
        })
        .await
    }

    async fn fetch_rounds(&self, battle_id: BattleId) -> Result<Vec<Round>, BattleError> {
        let store = self.store.clone();
        self.with_retry(|| {
            let store = store.clone();
            async move { store.rounds(&battle_id).await.map_err(BattleError::from) }
        })
        .await
    }

    async fn persist_round(&self, round: Round) -> Result<(), BattleError> {
        let store = self.store.clone();
        self.with_retry(|| {
            let store = store.clone();
            let round = round.clone();
            async move { store.append_round(round).await.map_err(BattleError::from) }
        })
        .await
    }

    async fn persist_status(
        &self,
        battle_id: BattleId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> Result<(), BattleError> {
        let store = self.store.clone();
        self.with_retry(|| {
            let store = store.clone();
            async move {
                store
                    .set_battle_status(&battle_id, status, winner)
                    .await
                    .map_err(BattleError::from)
            }
        })
        .await
    }

    async fn transfer_stake(
        &self,
        card: CardId,
        from: UserId,
        to: UserId,
    ) -> Result<(), BattleError> {
        let custodian = self.custodian.clone();
        self.with_retry(|| {
            let custodian = custodian.clone();
            async move { custodian.transfer_card(&card, &from, &to).await }
        })
        .await
    }

    /// Run a gateway operation, retrying transient failures with a fixed
    /// backoff up to the attempt bound. Domain errors pass straight through.
    async fn with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, BattleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BattleError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(BattleError::DataAccessFailure { source, .. })
                    if source.is_transient() && attempt < self.retry.max_attempts =>
                {
                    warn!(attempt, err = %source, "transient data access failure; backing off");
                    sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(BattleError::DataAccessFailure { source, .. }) => {
                    return Err(BattleError::DataAccessFailure {
                        attempts: attempt,
                        source,
                    });
                }
                Err(other) => return Err(other),
            }
        }
    }
}
