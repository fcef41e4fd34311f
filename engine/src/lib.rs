//! Cardclash battle engine.
//!
//! This crate contains the battle subsystem's logic: the pure
//! rock-paper-scissors rules kernel, the matchmaking queue service, the
//! card custodian, and the battle orchestrator that serializes concurrent
//! move submissions per battle and settles finished battles exactly once.
//!
//! ## Concurrency model
//! Execution is event-driven: logical operations interleave at `await`
//! points (every gateway call, every backoff). The [`Orchestrator`] is the
//! sole in-process linearization point for round creation; storage
//! implementations back it with a uniqueness constraint on
//! `(battle_id, round_number)`.
//!
//! ## Storage
//! All persistence flows through the [`BattleStore`] gateway trait.
//! [`MemoryStore`] is the bundled implementation used by the arena service
//! and the test suite.

pub mod custodian;
pub mod matchmaker;
pub mod memory;
pub mod orchestrator;
pub mod rules;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


pub use custodian::Custodian;
pub use matchmaker::{AuthProvider, Matchmaker, StaticAuth};
pub use memory::MemoryStore;
pub use orchestrator::{
    ComputerOpponent, Orchestrator, RandomOpponent, RetryPolicy,
};
pub use rules::{RoundOutcome, Rules, RulesConfig, TieBreak, WinTally};
pub use store::{BattleStore, StoreResult};
