use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vest_types::{Address, Amount};

use crate::error::TransferError;
use crate::traits::{TransferLeg, ValueTransfer};

/// In-memory token balances implementing [`ValueTransfer`].
///
/// Used by tests, the CLI simulator, and embedders that keep balances
/// alongside the ledger. Every accepted batch is recorded so callers can
/// inspect exactly which transfers the ledger requested.
///
/// A poisoned lock is recovered on every access. Balances are only written
/// once a batch has been fully staged.
#[derive(Default)]
pub struct InMemoryVault {
    inner: RwLock<VaultState>,
}

#[derive(Default)]
struct VaultState {
    balances: HashMap<(Address, Address), Amount>,
    batches: Vec<Vec<TransferLeg>>,
    rejecting: Option<String>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockReadGuard<'_, VaultState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, VaultState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit `amount` of `token` to `account` out of thin air.
    pub fn mint(&self, token: &Address, account: &Address, amount: Amount) {
        let mut state = self.state_mut();
        let entry = state.balances.entry((*token, *account)).or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn balance_of(&self, token: &Address, account: &Address) -> Amount {
        self.state()
            .balances
            .get(&(*token, *account))
            .copied()
            .unwrap_or(0)
    }

    /// Make every subsequent transfer fail with `reason` until
    /// [`Self::accept_transfers`] is called.
    pub fn reject_transfers(&self, reason: impl Into<String>) {
        self.state_mut().rejecting = Some(reason.into());
    }

    pub fn accept_transfers(&self) {
        self.state_mut().rejecting = None;
    }

    /// Every batch applied so far, in order.
    pub fn batches(&self) -> Vec<Vec<TransferLeg>> {
        self.state().batches.clone()
    }

    pub fn batch_count(&self) -> usize {
        self.state().batches.len()
    }
}

impl ValueTransfer for InMemoryVault {
    fn transfer(&self, legs: &[TransferLeg]) -> Result<(), TransferError> {
        let mut state = self.state_mut();

        if let Some(reason) = &state.rejecting {
            return Err(TransferError::Rejected(reason.clone()));
        }

        // Stage every leg against a scratch copy so a failing leg leaves
        // the real balances untouched.
        let mut staged: HashMap<(Address, Address), Amount> = HashMap::new();
        for leg in legs {
            let from_key = (leg.token, leg.from);
            let available = staged
                .get(&from_key)
                .or_else(|| state.balances.get(&from_key))
                .copied()
                .unwrap_or(0);
            if available < leg.amount {
                return Err(TransferError::InsufficientFunds {
                    account: leg.from,
                    token: leg.token,
                    required: leg.amount,
                    available,
                });
            }
            staged.insert(from_key, available - leg.amount);

            let to_key = (leg.token, leg.to);
            let current = staged
                .get(&to_key)
                .or_else(|| state.balances.get(&to_key))
                .copied()
                .unwrap_or(0);
            let credited = current.checked_add(leg.amount).ok_or_else(|| {
                TransferError::Rejected(format!("balance overflow for {}", leg.to))
            })?;
            staged.insert(to_key, credited);
        }

        state.balances.extend(staged);
        state.batches.push(legs.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(token: Address, from: Address, to: Address, amount: Amount) -> TransferLeg {
        TransferLeg {
            token,
            from,
            to,
            amount,
        }
    }

    #[test]
    fn transfer_moves_balances() {
        let vault = InMemoryVault::new();
        let (token, alice, bob) = (
            Address::derive("token"),
            Address::derive("alice"),
            Address::derive("bob"),
        );
        vault.mint(&token, &alice, 100);

        vault.transfer(&[leg(token, alice, bob, 40)]).unwrap();
        assert_eq!(vault.balance_of(&token, &alice), 60);
        assert_eq!(vault.balance_of(&token, &bob), 40);
        assert_eq!(vault.batch_count(), 1);
    }

    #[test]
    fn failing_leg_rolls_back_whole_batch() {
        let vault = InMemoryVault::new();
        let (token, alice, bob, carol) = (
            Address::derive("token"),
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        );
        vault.mint(&token, &alice, 50);

        let err = vault
            .transfer(&[leg(token, alice, bob, 30), leg(token, alice, carol, 30)])
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InsufficientFunds { available: 20, required: 30, .. }
        ));
        assert_eq!(vault.balance_of(&token, &alice), 50);
        assert_eq!(vault.balance_of(&token, &bob), 0);
        assert_eq!(vault.batch_count(), 0);
    }

    #[test]
    fn chained_legs_see_staged_balances() {
        let vault = InMemoryVault::new();
        let (token, alice, bob, carol) = (
            Address::derive("token"),
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        );
        vault.mint(&token, &alice, 10);

        vault
            .transfer(&[leg(token, alice, bob, 10), leg(token, bob, carol, 10)])
            .unwrap();
        assert_eq!(vault.balance_of(&token, &carol), 10);
        assert_eq!(vault.balance_of(&token, &bob), 0);
    }

    #[test]
    fn poisoned_lock_is_recovered_everywhere() {
        let vault = std::sync::Arc::new(InMemoryVault::new());
        let (token, alice, bob) = (
            Address::derive("token"),
            Address::derive("alice"),
            Address::derive("bob"),
        );
        vault.mint(&token, &alice, 10);

        let holder = vault.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.write().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(vault.inner.is_poisoned());

        vault.mint(&token, &alice, 5);
        assert_eq!(vault.balance_of(&token, &alice), 15);
        vault.reject_transfers("paused");
        assert_eq!(
            vault.transfer(&[leg(token, alice, bob, 1)]),
            Err(TransferError::Rejected("paused".into()))
        );
        vault.accept_transfers();
        vault.transfer(&[leg(token, alice, bob, 15)]).unwrap();
        assert_eq!(vault.balance_of(&token, &bob), 15);
        assert_eq!(vault.batch_count(), 1);
    }

    #[test]
    fn rejecting_vault_fails_until_reset() {
        let vault = InMemoryVault::new();
        let (token, alice, bob) = (
            Address::derive("token"),
            Address::derive("alice"),
            Address::derive("bob"),
        );
        vault.mint(&token, &alice, 10);
        vault.reject_transfers("paused");

        assert_eq!(
            vault.transfer(&[leg(token, alice, bob, 1)]),
            Err(TransferError::Rejected("paused".into()))
        );
        vault.accept_transfers();
        vault.transfer(&[leg(token, alice, bob, 1)]).unwrap();
    }
}
