use serde::{Deserialize, Serialize};
use vest_types::Address;

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::traits::AccessControl;

/// Single-owner administration.
///
/// `transfer` and `renounce` are the only mutators, and both require the
/// caller to be the current owner. Once renounced there is no owner and
/// every gated call fails.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Option<Address>,
}

impl Ownable {
    pub fn new(owner: Option<Address>) -> Self {
        Self {
            owner: owner.filter(|o| !o.is_zero()),
        }
    }

    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    pub fn ensure_owner(&self, caller: &Address, action: &str) -> Result<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(LedgerError::unauthorized(caller, action))
        }
    }

    /// Hand ownership to `new_owner`.
    pub fn transfer(&mut self, caller: &Address, new_owner: Address) -> Result<LedgerEvent> {
        self.ensure_owner(caller, "transfer ownership")?;
        if new_owner.is_zero() {
            return Err(LedgerError::invalid("new owner is the zero address"));
        }
        Ok(self.set(Some(new_owner)))
    }

    /// Leave the ledger without an owner.
    pub fn renounce(&mut self, caller: &Address) -> Result<LedgerEvent> {
        self.ensure_owner(caller, "renounce ownership")?;
        Ok(self.set(None))
    }

    fn set(&mut self, new_owner: Option<Address>) -> LedgerEvent {
        let previous_owner = std::mem::replace(&mut self.owner, new_owner);
        LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        }
    }
}

impl AccessControl for Ownable {
    fn is_owner(&self, caller: &Address) -> bool {
        self.owner.as_ref() == Some(caller)
    }
}
