//! Lobby view-model: queue membership and the viewer's current battle.
//!
//! Like the battle projection, this only mirrors server state. Methods fold
//! in the results of queue operations; nothing here talks to the network.

use cardclash_types::{Battle, BattleStatus};

#[derive(Clone, Debug, Default)]
pub struct LobbyState {
    in_queue: bool,
    loading: bool,
    error: Option<String>,
    current_battle: Option<Battle>,
}

impl LobbyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_queue(&self) -> bool {
        self.in_queue
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_battle(&self) -> Option<&Battle> {
        self.current_battle.as_ref()
    }

    pub fn is_battle_complete(&self) -> bool {
        self.current_battle
            .as_ref()
            .is_some_and(|battle| battle.status == BattleStatus::Completed)
    }

    /// A queue request went out; show the optimistic waiting state.
    pub fn begin_join(&mut self) {
        self.loading = true;
        self.error = None;
        self.in_queue = true;
    }

    pub fn joined(&mut self, battle: Option<Battle>) {
        self.loading = false;
        if let Some(battle) = battle {
            self.current_battle = Some(battle);
        }
    }

    pub fn join_failed(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.in_queue = false;
        self.error = Some(message.into());
    }

    pub fn begin_leave(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn left(&mut self) {
        self.loading = false;
        self.in_queue = false;
    }

    pub fn leave_failed(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    /// Fold in the answer to an active-battle lookup.
    pub fn active_battle_fetched(&mut self, battle: Option<Battle>) {
        self.loading = false;
        if let Some(battle) = battle {
            self.current_battle = Some(battle);
        }
    }

    /// A newer view of the current battle arrived.
    pub fn battle_updated(&mut self, battle: Battle) {
        self.current_battle = Some(battle);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardclash_types::{BattleStatus, COMPUTER_CARD_ID, COMPUTER_USER_ID};
    use uuid::Uuid;

    fn computer_battle() -> Battle {
        Battle {
            id: Uuid::from_u128(1),
            player1_id: Uuid::from_u128(10),
            player2_id: COMPUTER_USER_ID,
            player1_card_id: Uuid::from_u128(100),
            player2_card_id: COMPUTER_CARD_ID,
            status: BattleStatus::Active,
            winner_id: None,
        }
    }

    #[test]
    fn test_join_success_keeps_queue_flag_and_battle() {
        let mut lobby = LobbyState::new();
        lobby.begin_join();
        assert!(lobby.is_loading());
        assert!(lobby.is_in_queue());

        lobby.joined(Some(computer_battle()));
        assert!(!lobby.is_loading());
        assert!(lobby.current_battle().is_some());
        assert!(!lobby.is_battle_complete());
    }

    #[test]
    fn test_join_failure_rolls_back_queue_flag() {
        let mut lobby = LobbyState::new();
        lobby.begin_join();
        lobby.join_failed("player has no cards to stake");
        assert!(!lobby.is_in_queue());
        assert!(!lobby.is_loading());
        assert_eq!(lobby.error(), Some("player has no cards to stake"));
    }

    #[test]
    fn test_leave_clears_queue_flag() {
        let mut lobby = LobbyState::new();
        lobby.begin_join();
        lobby.joined(None);
        lobby.begin_leave();
        lobby.left();
        assert!(!lobby.is_in_queue());
        assert!(lobby.error().is_none());
    }

    #[test]
    fn test_battle_update_tracks_completion() {
        let mut lobby = LobbyState::new();
        lobby.active_battle_fetched(Some(computer_battle()));
        assert!(!lobby.is_battle_complete());

        let mut finished = computer_battle();
        finished.status = BattleStatus::Completed;
        finished.winner_id = Some(finished.player1_id);
        lobby.battle_updated(finished);
        assert!(lobby.is_battle_complete());
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let mut lobby = LobbyState::new();
        lobby.begin_join();
        lobby.joined(Some(computer_battle()));
        lobby.reset();
        assert!(!lobby.is_in_queue());
        assert!(lobby.current_battle().is_none());
        assert!(lobby.error().is_none());
    }
}
