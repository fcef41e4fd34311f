//! Client-side view-models for the cardclash battle subsystem.
//!
//! These mirror server state for a UI and never own it: they tolerate
//! stale or duplicate updates, debounce derived-state recomputation, and
//! expose guarded mutation entry points that mirror (but never replace)
//! server-side enforcement. All timing is explicit: callers pass the
//! current time in milliseconds and drive deferred work through `tick`.

pub mod lobby;
pub mod projection;

pub use lobby::LobbyState;
pub use projection::{
    BattleProjection, Signal, DEBOUNCE_MS, ERROR_DISPLAY_MS, MAX_RETRY_ATTEMPTS, MOVE_TIMEOUT_MS,
    RETRY_BASE_DELAY_MS,
};
