use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vest_types::{Address, Amount, Timestamp};

use crate::error::TransferError;
use crate::events::LedgerEvent;

/// One movement of `amount` units of `token` from `from` to `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// Boundary to whatever actually moves the underlying asset.
///
/// The ledger calls `transfer` at most once per operation. Implementations
/// must apply the whole batch or none of it.
pub trait ValueTransfer: Send + Sync {
    fn transfer(&self, legs: &[TransferLeg]) -> Result<(), TransferError>;
}

/// Source of the current time in seconds since the UNIX epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Receiver of ledger notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}

/// Access-control gate for administrative calls.
pub trait AccessControl {
    fn is_owner(&self, caller: &Address) -> bool;
}

impl<T: ValueTransfer + ?Sized> ValueTransfer for Arc<T> {
    fn transfer(&self, legs: &[TransferLeg]) -> Result<(), TransferError> {
        (**self).transfer(legs)
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &LedgerEvent) {
        (**self).emit(event)
    }
}
