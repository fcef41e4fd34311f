//! View types returned to callers of the battle subsystem. Serialized in
//! camelCase for the wire.

use serde::{Deserialize, Serialize};

use crate::battle::{Battle, Move, Round, UserId};

/// Whether a submitted move produced a resolved round or is still waiting on
/// the other seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveState {
    Resolved,
    AwaitingOpponent,
}

/// Result of a `make_move` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    /// Round number the move was recorded for.
    pub round: u32,
    pub player_move: Move,
    /// Present only once the round resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_move: Option<Move>,
    pub complete: bool,
    pub state: MoveState,
}

impl MoveOutcome {
    pub fn is_resolved(&self) -> bool {
        self.state == MoveState::Resolved
    }
}

/// Point-in-time view of a battle and its resolved rounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSnapshot {
    pub battle: Battle,
    pub rounds: Vec<Round>,
    /// The round number the next resolved round would get.
    pub current_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<UserId>,
}

/// Result of settling a completed battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub winner_id: UserId,
    /// True when the loser's staked card moved to the winner. Always false
    /// for computer battles.
    pub card_transferred: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_outcome_serialization() {
        let outcome = MoveOutcome {
            round: 2,
            player_move: Move::Rock,
            opponent_move: None,
            complete: false,
            state: MoveState::AwaitingOpponent,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["round"], 2);
        assert_eq!(object["playerMove"], "rock");
        assert_eq!(object["state"], "awaitingOpponent");
        assert!(!object.contains_key("opponentMove"));
        assert!(!outcome.is_resolved());

        let roundtrip: MoveOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(roundtrip, outcome);
    }

    #[test]
    fn test_resolved_outcome_carries_opponent_move() {
        let outcome = MoveOutcome {
            round: 1,
            player_move: Move::Paper,
            opponent_move: Some(Move::Scissors),
            complete: true,
            state: MoveState::Resolved,
        };
        assert!(outcome.is_resolved());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["opponentMove"], "scissors");
    }
}
