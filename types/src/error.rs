use serde::Serialize;
use thiserror::Error;

use crate::battle::{BattleId, CardId, UserId};

/// Coarse error classification, assigned where the error originates and
/// carried with it; downstream layers must never re-derive a category from
/// message text. Only `Network` errors are candidates for automatic retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Auth,
    Validation,
    State,
    Network,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network)
    }
}

/// Failure raised by the data-access gateway. The gateway performs no
/// retries itself; callers decide based on `is_transient`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("round {round_number} already exists for battle {battle}")]
    DuplicateRound { battle: BattleId, round_number: u32 },
    #[error("storage constraint violated: {reason}")]
    Constraint { reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Domain errors of the battle subsystem. Each variant carries a stable
/// machine code for the wire and a fixed category.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BattleError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("player {player} has no cards to stake")]
    NoCardsAvailable { player: UserId },
    #[error("opponent {player} has no cards to stake")]
    OpponentHasNoCards { player: UserId },
    #[error("battle {battle} not found")]
    BattleNotFound { battle: BattleId },
    #[error("battle {battle} is already completed")]
    BattleAlreadyCompleted { battle: BattleId },
    #[error("player {player} is not a participant in battle {battle}")]
    NotAParticipant { battle: BattleId, player: UserId },
    #[error("battle {battle} already reached the maximum of {max} rounds")]
    MaxRoundsReached { battle: BattleId, max: u32 },
    #[error("battle {battle} has no decidable winner")]
    UndecidedBattle { battle: BattleId },
    #[error("card {card} is not held by {holder}")]
    OwnershipMismatch { card: CardId, holder: UserId },
    #[error("data access failed after {attempts} attempt(s): {source}")]
    DataAccessFailure {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for BattleError {
    /// A gateway failure surfaced without retries. The orchestrator's retry
    /// wrapper rebuilds the variant with the real attempt count.
    fn from(source: StoreError) -> Self {
        BattleError::DataAccessFailure {
            attempts: 1,
            source,
        }
    }
}

impl BattleError {
    /// Stable machine-readable code, suitable for wire protocols and logs.
    pub fn code(&self) -> &'static str {
        match self {
            BattleError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            BattleError::NoCardsAvailable { .. } => "NO_CARDS_AVAILABLE",
            BattleError::OpponentHasNoCards { .. } => "OPPONENT_HAS_NO_CARDS",
            BattleError::BattleNotFound { .. } => "BATTLE_NOT_FOUND",
            BattleError::BattleAlreadyCompleted { .. } => "BATTLE_ALREADY_COMPLETED",
            BattleError::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            BattleError::MaxRoundsReached { .. } => "MAX_ROUNDS_REACHED",
            BattleError::UndecidedBattle { .. } => "UNDECIDED_BATTLE",
            BattleError::OwnershipMismatch { .. } => "OWNERSHIP_MISMATCH",
            BattleError::DataAccessFailure { .. } => "DATA_ACCESS_FAILURE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BattleError::AuthenticationRequired => ErrorCategory::Auth,
            BattleError::NoCardsAvailable { .. } | BattleError::OpponentHasNoCards { .. } => {
                ErrorCategory::Validation
            }
            BattleError::BattleNotFound { .. }
            | BattleError::BattleAlreadyCompleted { .. }
            | BattleError::NotAParticipant { .. }
            | BattleError::MaxRoundsReached { .. }
            | BattleError::UndecidedBattle { .. }
            | BattleError::OwnershipMismatch { .. } => ErrorCategory::State,
            BattleError::DataAccessFailure { .. } => ErrorCategory::Network,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::unavailable("connection reset").is_transient());
        assert!(!StoreError::DuplicateRound {
            battle: Uuid::from_u128(1),
            round_number: 3,
        }
        .is_transient());
        assert!(!StoreError::Constraint {
            reason: "queue entry exists".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_codes_are_stable() {
        let battle = Uuid::from_u128(1);
        let player = Uuid::from_u128(2);
        assert_eq!(
            BattleError::AuthenticationRequired.code(),
            "AUTHENTICATION_REQUIRED"
        );
        assert_eq!(
            BattleError::BattleAlreadyCompleted { battle }.code(),
            "BATTLE_ALREADY_COMPLETED"
        );
        assert_eq!(
            BattleError::NotAParticipant { battle, player }.code(),
            "NOT_A_PARTICIPANT"
        );
        assert_eq!(
            BattleError::DataAccessFailure {
                attempts: 3,
                source: StoreError::unavailable("down"),
            }
            .code(),
            "DATA_ACCESS_FAILURE"
        );
    }

    #[test]
    fn test_categories_assigned_at_origin() {
        let battle = Uuid::from_u128(1);
        let player = Uuid::from_u128(2);
        assert_eq!(
            BattleError::AuthenticationRequired.category(),
            ErrorCategory::Auth
        );
        assert_eq!(
            BattleError::NoCardsAvailable { player }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            BattleError::MaxRoundsReached { battle, max: 5 }.category(),
            ErrorCategory::State
        );
        let network = BattleError::DataAccessFailure {
            attempts: 3,
            source: StoreError::unavailable("down"),
        };
        assert_eq!(network.category(), ErrorCategory::Network);
        assert!(network.category().is_retryable());
        assert!(!ErrorCategory::State.is_retryable());
    }
}
