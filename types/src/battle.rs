use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a player account.
pub type UserId = Uuid;

/// Identifier of a battle.
pub type BattleId = Uuid;

/// Identifier of a card.
pub type CardId = Uuid;

/// Identifier of a matchmaking queue entry.
pub type QueueEntryId = Uuid;

/// Reserved identity of the synthetic computer opponent.
pub const COMPUTER_USER_ID: UserId = Uuid::from_u128(0xb1b2_d700_b02c_4ef5_bc5f_ec6e_ba70_26af);

/// Reserved card staked by the computer opponent. Never owned, never
/// transferred.
pub const COMPUTER_CARD_ID: CardId = Uuid::from_u128(0x2);

/// A rock-paper-scissors move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    /// All moves, in a fixed order usable for uniform sampling.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// The move this move defeats.
    pub fn beats(&self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown move: {0}")]
pub struct ParseMoveError(pub String);

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            other => Err(ParseMoveError(other.to_string())),
        }
    }
}

/// One of the two seats in a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player1,
    Player2,
}

impl Side {
    pub fn opponent(&self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }
}

/// Battle lifecycle status. Transitions only from `Active` to `Completed`,
/// never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    Active,
    Completed,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Active => "active",
            BattleStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BattleInvariantError {
    #[error("active battle {battle} has a winner set ({winner})")]
    ActiveWithWinner { battle: BattleId, winner: UserId },
    #[error("completed battle {battle} has no winner")]
    CompletedWithoutWinner { battle: BattleId },
    #[error("winner {winner} is not a participant of battle {battle}")]
    WinnerNotParticipant { battle: BattleId, winner: UserId },
}

/// A contest between two seated participants, each with a staked card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub id: BattleId,
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub player1_card_id: CardId,
    pub player2_card_id: CardId,
    pub status: BattleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<UserId>,
}

impl Battle {
    /// Whether the second seat is the reserved computer opponent.
    pub fn is_computer_battle(&self) -> bool {
        self.player2_id == COMPUTER_USER_ID
    }

    /// The seat occupied by `player`, if any.
    pub fn side_of(&self, player: &UserId) -> Option<Side> {
        if self.player1_id == *player {
            Some(Side::Player1)
        } else if self.player2_id == *player {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn player_id(&self, side: Side) -> UserId {
        match side {
            Side::Player1 => self.player1_id,
            Side::Player2 => self.player2_id,
        }
    }

    pub fn card_id(&self, side: Side) -> CardId {
        match side {
            Side::Player1 => self.player1_card_id,
            Side::Player2 => self.player2_card_id,
        }
    }

    /// Validate the status/winner invariants: an active battle has no winner,
    /// a completed battle has exactly one, and the winner is a participant.
    pub fn validate_invariants(&self) -> Result<(), BattleInvariantError> {
        match (self.status, self.winner_id) {
            (BattleStatus::Active, Some(winner)) => Err(BattleInvariantError::ActiveWithWinner {
                battle: self.id,
                winner,
            }),
            (BattleStatus::Completed, None) => Err(BattleInvariantError::CompletedWithoutWinner {
                battle: self.id,
            }),
            (BattleStatus::Completed, Some(winner)) => {
                if winner != self.player1_id && winner != self.player2_id {
                    return Err(BattleInvariantError::WinnerNotParticipant {
                        battle: self.id,
                        winner,
                    });
                }
                Ok(())
            }
            (BattleStatus::Active, None) => Ok(()),
        }
    }
}

/// Creation payload for a battle. The gateway assigns the id; new battles
/// always start `Active` with no winner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBattle {
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub player1_card_id: CardId,
    pub player2_card_id: CardId,
}

impl NewBattle {
    pub fn versus(
        player1_id: UserId,
        player1_card_id: CardId,
        player2_id: UserId,
        player2_card_id: CardId,
    ) -> Self {
        Self {
            player1_id,
            player2_id,
            player1_card_id,
            player2_card_id,
        }
    }

    /// A battle against the reserved computer opponent.
    pub fn against_computer(player_id: UserId, player_card_id: CardId) -> Self {
        Self::versus(player_id, player_card_id, COMPUTER_USER_ID, COMPUTER_CARD_ID)
    }
}

/// One resolved move-exchange within a battle. Rounds are append-only: once
/// written they are never modified or removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub battle_id: BattleId,
    /// 1-based, strictly increasing, gapless, unique per battle.
    pub round_number: u32,
    pub player1_move: Move,
    pub player2_move: Move,
}

impl Round {
    pub fn move_of(&self, side: Side) -> Move {
        match side {
            Side::Player1 => self.player1_move,
            Side::Player2 => self.player2_move,
        }
    }
}

/// A player waiting for an opponent. At most one active entry per player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub player_id: UserId,
    /// Monotonic admission stamp; opponent selection is strict FIFO on it.
    pub created_at: u64,
}

/// Custodial view of a card: ownership is the only attribute the battle
/// subsystem reads or mutates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub owner_id: UserId,
}
