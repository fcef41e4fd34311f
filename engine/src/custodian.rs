//! Card custodian: stake validation and ownership transfer.
//!
//! The custodian is the only component allowed to move a card between
//! accounts. Transfers re-check ownership immediately before the write so a
//! stale card reference (the battle was created long before settlement)
//! cannot move a card the loser no longer holds.

use cardclash_types::{BattleError, Card, CardId, UserId, COMPUTER_USER_ID};
use tracing::info;

use crate::store::BattleStore;

#[derive(Clone)]
pub struct Custodian<S> {
    store: S,
}

impl<S: BattleStore> Custodian<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Draw a random card from the user's collection to stake.
    pub async fn random_card(&self, user: &UserId) -> Result<Card, BattleError> {
        self.store
            .random_card_owned_by(user)
            .await?
            .ok_or(BattleError::NoCardsAvailable { player: *user })
    }

    pub async fn has_cards(&self, user: &UserId) -> Result<bool, BattleError> {
        Ok(self.store.random_card_owned_by(user).await?.is_some())
    }

    /// Both combatants must hold at least one card before a battle starts.
    /// The computer seat is exempt; each seat's failure is reported
    /// distinctly so the caller can tell whose stake is missing.
    pub async fn validate_stakes(
        &self,
        player1: &UserId,
        player2: &UserId,
    ) -> Result<(), BattleError> {
        if *player1 != COMPUTER_USER_ID && !self.has_cards(player1).await? {
            return Err(BattleError::NoCardsAvailable { player: *player1 });
        }
        if *player2 != COMPUTER_USER_ID && !self.has_cards(player2).await? {
            return Err(BattleError::OpponentHasNoCards { player: *player2 });
        }
        Ok(())
    }

    /// Move `card` from `from` to `to`. Fails with `OwnershipMismatch` when
    /// `from` no longer holds the card.
    pub async fn transfer_card(
        &self,
        card: &CardId,
        from: &UserId,
        to: &UserId,
    ) -> Result<(), BattleError> {
        match self.store.card(card).await? {
            Some(current) if current.owner_id == *from => {}
            _ => {
                return Err(BattleError::OwnershipMismatch {
                    card: *card,
                    holder: *from,
                })
            }
        }
        self.store.transfer_card(card, to).await?;
        info!(card = %card, from = %from, to = %to, "card transferred");
        Ok(())
    }
}
