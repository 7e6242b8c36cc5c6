use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use vest_types::{Address, Amount, StreamId};

use crate::error::{LedgerError, Result};
use crate::ledger::StreamLedger;
use crate::records::{Stream, StreamRequest};

/// A [`StreamLedger`] that can be shared across threads.
///
/// Mutations hold the write lock for the whole operation, including its
/// transfer call, so operations are serialized and never observed half
/// applied. Reads run concurrently.
pub struct SharedStreamLedger {
    inner: RwLock<StreamLedger>,
}

impl SharedStreamLedger {
    pub fn new(ledger: StreamLedger) -> Self {
        Self {
            inner: RwLock::new(ledger),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StreamLedger>> {
        self.inner.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StreamLedger>> {
        self.inner.write().map_err(|_| LedgerError::Poisoned)
    }

    pub fn create_stream(&self, caller: &Address, request: StreamRequest) -> Result<StreamId> {
        self.write()?.create_stream(caller, request)
    }

    pub fn withdraw_from_stream(
        &self,
        caller: &Address,
        stream_id: StreamId,
        amount: Amount,
    ) -> Result<bool> {
        self.write()?.withdraw_from_stream(caller, stream_id, amount)
    }

    pub fn withdraw_from_streams(&self, caller: &Address, ids: &[StreamId]) -> Result<bool> {
        self.write()?.withdraw_from_streams(caller, ids)
    }

    pub fn cancel_stream(&self, caller: &Address, stream_id: StreamId) -> Result<bool> {
        self.write()?.cancel_stream(caller, stream_id)
    }

    pub fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> Result<()> {
        self.write()?.transfer_ownership(caller, new_owner)
    }

    pub fn renounce_ownership(&self, caller: &Address) -> Result<()> {
        self.write()?.renounce_ownership(caller)
    }

    pub fn balance_of(&self, stream_id: StreamId, who: &Address) -> Result<Amount> {
        self.read()?.balance_of(stream_id, who)
    }

    pub fn balance_of_streams(&self, ids: &[StreamId], who: &Address) -> Result<Amount> {
        self.read()?.balance_of_streams(ids, who)
    }

    pub fn delta_of(&self, stream_id: StreamId) -> Result<u64> {
        self.read()?.delta_of(stream_id)
    }

    pub fn get_stream(&self, stream_id: StreamId) -> Result<Stream> {
        self.read()?.get_stream(stream_id)
    }

    pub fn next_stream_id(&self) -> Result<StreamId> {
        Ok(self.read()?.next_stream_id())
    }

    pub fn owner(&self) -> Result<Option<Address>> {
        Ok(self.read()?.owner())
    }

    /// Run `f` against the ledger under the read lock.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&StreamLedger) -> T) -> Result<T> {
        Ok(f(&*self.read()?))
    }

    pub fn into_inner(self) -> Result<StreamLedger> {
        self.inner.into_inner().map_err(|_| LedgerError::Poisoned)
    }
}
