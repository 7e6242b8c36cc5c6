use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use vest_types::{Address, Amount, StreamId, Timestamp};

use crate::config::{ConfigError, LedgerConfig};
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::math;
use crate::ownable::Ownable;
use crate::records::{Balances, Role, Stream, StreamRequest};
use crate::traits::{AccessControl, Clock, EventSink, TransferLeg, ValueTransfer};

/// The stream ledger.
///
/// Owns every stream record and applies the state-changing operations
/// under one rule: validate, mutate storage, call the value-transfer
/// collaborator once, then emit. If the transfer fails every storage
/// mutation of the call is undone before the error is returned.
///
/// Mutators take `&mut self`. The transfer collaborator never receives a
/// handle to the ledger, so it cannot call back into a half-finished
/// operation.
pub struct StreamLedger {
    config: LedgerConfig,
    state: LedgerState,
    ownership: Ownable,
    vault: Arc<dyn ValueTransfer>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

struct LedgerState {
    streams: BTreeMap<StreamId, Stream>,
    by_address: HashMap<Address, BTreeSet<StreamId>>,
    next_stream_id: StreamId,
}

/// Inverse of one storage mutation, replayed in reverse on rollback.
enum Undo {
    Reinsert(Stream),
    Restore(Stream),
    Remove(StreamId),
    RewindCounter(StreamId),
}

impl LedgerState {
    fn new(first_stream_id: StreamId) -> Self {
        Self {
            streams: BTreeMap::new(),
            by_address: HashMap::new(),
            next_stream_id: first_stream_id,
        }
    }

    fn insert(&mut self, stream: Stream) {
        self.by_address
            .entry(stream.sender)
            .or_default()
            .insert(stream.id);
        self.by_address
            .entry(stream.recipient)
            .or_default()
            .insert(stream.id);
        self.streams.insert(stream.id, stream);
    }

    fn remove(&mut self, id: StreamId) -> Option<Stream> {
        let stream = self.streams.remove(&id)?;
        for party in [stream.sender, stream.recipient] {
            if let Some(ids) = self.by_address.get_mut(&party) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_address.remove(&party);
                }
            }
        }
        Some(stream)
    }

    fn replace(&mut self, stream: Stream) {
        self.streams.insert(stream.id, stream);
    }

    fn undo(&mut self, journal: Vec<Undo>) {
        for step in journal.into_iter().rev() {
            match step {
                Undo::Reinsert(stream) => self.insert(stream),
                Undo::Restore(stream) => self.replace(stream),
                Undo::Remove(id) => {
                    self.remove(id);
                }
                Undo::RewindCounter(id) => self.next_stream_id = id,
            }
        }
    }
}

/// Result of draining a recipient balance from one stream.
struct Drain {
    amount: Amount,
    sender_remainder: Amount,
}

impl StreamLedger {
    /// Create an empty ledger.
    ///
    /// Emits `OwnershipTransferred` when the config names an initial owner.
    pub fn new(
        config: LedgerConfig,
        vault: Arc<dyn ValueTransfer>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let ownership = Ownable::new(config.initial_owner);
        if let Some(owner) = ownership.owner() {
            sink.emit(&LedgerEvent::OwnershipTransferred {
                previous_owner: None,
                new_owner: Some(owner),
            });
        }
        Ok(Self {
            state: LedgerState::new(config.first_stream_id),
            config,
            ownership,
            vault,
            clock,
            sink,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn custody_address(&self) -> Address {
        self.config.custody_address
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Open a stream and pull its deposit into custody.
    ///
    /// The caller must be the sender or the ledger owner.
    pub fn create_stream(&mut self, caller: &Address, request: StreamRequest) -> Result<StreamId> {
        if *caller != request.sender && !self.ownership.is_owner(caller) {
            return Err(LedgerError::unauthorized(caller, "create a stream for another sender"));
        }
        if request.sender.is_zero() {
            return Err(LedgerError::invalid("sender is the zero address"));
        }
        if request.recipient.is_zero() {
            return Err(LedgerError::invalid("recipient is the zero address"));
        }
        if request.recipient == request.sender {
            return Err(LedgerError::invalid("recipient is the sender"));
        }
        if request.sender == self.config.custody_address {
            return Err(LedgerError::invalid("sender is the ledger itself"));
        }
        if request.recipient == self.config.custody_address {
            return Err(LedgerError::invalid("recipient is the ledger itself"));
        }
        if request.token_address.is_zero() {
            return Err(LedgerError::invalid("token is the zero address"));
        }
        if request.deposit == 0 {
            return Err(LedgerError::invalid("deposit is zero"));
        }
        let now = self.clock.now();
        if request.start_time <= now {
            return Err(LedgerError::invalid(format!(
                "start time {} is not after current time {now}",
                request.start_time
            )));
        }
        let rate_per_second =
            math::rate_per_second(request.deposit, request.start_time, request.stop_time)?;

        let id = self.state.next_stream_id;
        let next = id.checked_next().ok_or(LedgerError::Overflow)?;
        let stream = Stream {
            id,
            sender: request.sender,
            recipient: request.recipient,
            deposit: request.deposit,
            token_address: request.token_address,
            start_time: request.start_time,
            stop_time: request.stop_time,
            remaining_balance: request.deposit,
            rate_per_second,
            nft_token_id: request.nft_token_id,
        };

        let journal = vec![Undo::RewindCounter(id), Undo::Remove(id)];
        self.state.next_stream_id = next;
        self.state.insert(stream.clone());

        let leg = TransferLeg {
            token: stream.token_address,
            from: stream.sender,
            to: self.config.custody_address,
            amount: stream.deposit,
        };
        self.commit(journal, &[leg])?;

        tracing::info!(
            stream = %id,
            sender = %stream.sender.short_id(),
            recipient = %stream.recipient.short_id(),
            deposit = %stream.deposit,
            rate = %stream.rate_per_second,
            "stream created"
        );
        self.sink.emit(&LedgerEvent::CreateStream {
            stream_id: id,
            sender: stream.sender,
            recipient: stream.recipient,
            nft_token_id: stream.nft_token_id,
            deposit: stream.deposit,
            token_address: stream.token_address,
            start_time: stream.start_time,
            stop_time: stream.stop_time,
        });
        Ok(id)
    }

    /// Withdraw `amount` of the caller's vested balance from one stream.
    pub fn withdraw_from_stream(
        &mut self,
        caller: &Address,
        stream_id: StreamId,
        amount: Amount,
    ) -> Result<bool> {
        let stream = self.stream(stream_id)?.clone();
        if *caller != stream.recipient {
            return Err(LedgerError::unauthorized(caller, "withdraw from this stream"));
        }
        if amount == 0 {
            return Err(LedgerError::invalid("withdrawal amount is zero"));
        }
        let now = self.clock.now();
        let available = math::apportion(&stream, now)?.recipient;
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let mut journal = Vec::new();
        let drain = self.drain(stream.clone(), amount, now, &mut journal)?;
        let mut legs = vec![self.payout(&stream, stream.recipient, drain.amount)];
        if drain.sender_remainder > 0 {
            legs.push(self.payout(&stream, stream.sender, drain.sender_remainder));
        }
        self.commit(journal, &legs)?;

        tracing::info!(
            stream = %stream_id,
            amount = %drain.amount,
            sender_remainder = %drain.sender_remainder,
            "withdrew from stream"
        );
        self.sink.emit(&LedgerEvent::WithdrawFromStream {
            stream_id,
            recipient: stream.recipient,
            amount: drain.amount,
            sender_remainder: drain.sender_remainder,
        });
        Ok(true)
    }

    /// Withdraw the caller's full available balance from every listed stream
    /// it is the recipient of.
    ///
    /// Missing ids, streams of other recipients and streams with nothing
    /// available are skipped. All payouts go out in one transfer call.
    pub fn withdraw_from_streams(&mut self, caller: &Address, ids: &[StreamId]) -> Result<bool> {
        self.check_batch(ids)?;
        let now = self.clock.now();
        let mut journal = Vec::new();

        let batch = match self.drain_batch(caller, ids, now, &mut journal) {
            Ok(batch) => batch,
            Err(e) => {
                self.state.undo(journal);
                return Err(e);
            }
        };
        if batch.processed.is_empty() {
            tracing::debug!(caller = %caller.short_id(), "batch withdrawal found nothing eligible");
            return Err(LedgerError::NothingEligible);
        }

        let mut legs: Vec<TransferLeg> = batch
            .per_token
            .iter()
            .map(|(token, amount)| TransferLeg {
                token: *token,
                from: self.config.custody_address,
                to: *caller,
                amount: *amount,
            })
            .collect();
        legs.extend(batch.remainders);
        self.commit(journal, &legs)?;

        tracing::info!(
            recipient = %caller.short_id(),
            streams = batch.processed.len(),
            amount = %batch.total,
            "batch withdrawal"
        );
        self.sink.emit(&LedgerEvent::WithdrawFromStreams {
            stream_id_list: batch.processed,
            recipient: *caller,
            amount: batch.total,
        });
        Ok(true)
    }

    /// Settle a stream early: the recipient gets what has vested, the sender
    /// gets the rest.
    pub fn cancel_stream(&mut self, caller: &Address, stream_id: StreamId) -> Result<bool> {
        let stream = self.stream(stream_id)?.clone();
        if !stream.is_participant(caller) {
            return Err(LedgerError::unauthorized(caller, "cancel this stream"));
        }
        let now = self.clock.now();
        let balances = math::apportion(&stream, now)?;

        self.state.remove(stream_id);
        let journal = vec![Undo::Reinsert(stream.clone())];

        let mut legs = Vec::with_capacity(2);
        if balances.recipient > 0 {
            legs.push(self.payout(&stream, stream.recipient, balances.recipient));
        }
        if balances.sender > 0 {
            legs.push(self.payout(&stream, stream.sender, balances.sender));
        }
        self.commit(journal, &legs)?;

        tracing::info!(
            stream = %stream_id,
            cancelled_by = %caller.short_id(),
            sender_balance = %balances.sender,
            recipient_balance = %balances.recipient,
            "stream cancelled"
        );
        self.sink.emit(&LedgerEvent::CancelStream {
            stream_id,
            sender: stream.sender,
            recipient: stream.recipient,
            nft_token_id: stream.nft_token_id,
            sender_balance: balances.sender,
            recipient_balance: balances.recipient,
        });
        Ok(true)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<()> {
        let event = self.ownership.transfer(caller, new_owner)?;
        tracing::info!(new_owner = %new_owner.short_id(), "ownership transferred");
        self.sink.emit(&event);
        Ok(())
    }

    pub fn renounce_ownership(&mut self, caller: &Address) -> Result<()> {
        let event = self.ownership.renounce(caller)?;
        tracing::info!(previous_owner = %caller.short_id(), "ownership renounced");
        self.sink.emit(&event);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Balance of `who` in a stream at the current time.
    pub fn balance_of(&self, stream_id: StreamId, who: &Address) -> Result<Amount> {
        let stream = self.stream(stream_id)?;
        let role = stream
            .role_of(who)
            .ok_or_else(|| LedgerError::invalid(format!("{who} is not a party to stream {stream_id}")))?;
        Ok(self.balances(stream_id)?.of(role))
    }

    /// Both sides of a stream's remaining balance at the current time.
    pub fn balances(&self, stream_id: StreamId) -> Result<Balances> {
        math::apportion(self.stream(stream_id)?, self.clock.now())
    }

    /// Sum of `who`'s balances over the listed streams it takes part in.
    ///
    /// Skips entries the way [`Self::withdraw_from_streams`] does: missing
    /// ids, streams `who` is not a party to, and zero balances. Fails with
    /// `NothingEligible` when every entry was skipped.
    pub fn balance_of_streams(&self, ids: &[StreamId], who: &Address) -> Result<Amount> {
        self.check_batch(ids)?;
        let now = self.clock.now();
        let mut total: Amount = 0;
        let mut eligible = 0usize;
        let mut seen = BTreeSet::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let Some(stream) = self.state.streams.get(id) else {
                continue;
            };
            let Some(role) = stream.role_of(who) else {
                continue;
            };
            let balance = math::apportion(stream, now)?.of(role);
            if balance == 0 {
                continue;
            }
            eligible += 1;
            total = total.checked_add(balance).ok_or(LedgerError::Overflow)?;
        }
        if eligible == 0 {
            return Err(LedgerError::NothingEligible);
        }
        Ok(total)
    }

    /// Seconds of the stream's window elapsed so far.
    pub fn delta_of(&self, stream_id: StreamId) -> Result<u64> {
        let stream = self.stream(stream_id)?;
        Ok(math::delta_of(
            stream.start_time,
            stream.stop_time,
            self.clock.now(),
        ))
    }

    /// A copy of every stored field of a stream.
    pub fn get_stream(&self, stream_id: StreamId) -> Result<Stream> {
        self.stream(stream_id).cloned()
    }

    pub fn stream_exists(&self, stream_id: StreamId) -> bool {
        self.state.streams.contains_key(&stream_id)
    }

    /// Id the next created stream will receive.
    pub fn next_stream_id(&self) -> StreamId {
        self.state.next_stream_id
    }

    /// Ids of active streams where `address` is sender or recipient.
    pub fn streams_of(&self, address: &Address) -> Vec<StreamId> {
        self.state
            .by_address
            .get(address)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn stream_count(&self) -> usize {
        self.state.streams.len()
    }

    /// Active streams in id order.
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.state.streams.values()
    }

    pub fn owner(&self) -> Option<Address> {
        self.ownership.owner()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn stream(&self, stream_id: StreamId) -> Result<&Stream> {
        self.state
            .streams
            .get(&stream_id)
            .ok_or(LedgerError::NotFound(stream_id))
    }

    fn check_batch(&self, ids: &[StreamId]) -> Result<()> {
        if ids.is_empty() {
            return Err(LedgerError::invalid("stream id list is empty"));
        }
        if ids.len() > self.config.max_batch_size {
            return Err(LedgerError::invalid(format!(
                "{} stream ids exceed the batch limit of {}",
                ids.len(),
                self.config.max_batch_size
            )));
        }
        Ok(())
    }

    fn payout(&self, stream: &Stream, to: Address, amount: Amount) -> TransferLeg {
        TransferLeg {
            token: stream.token_address,
            from: self.config.custody_address,
            to,
            amount,
        }
    }

    /// Reduce a stream's remaining balance by `amount`, then settle it if
    /// nothing more can vest to the recipient.
    fn drain(
        &mut self,
        mut stream: Stream,
        amount: Amount,
        now: Timestamp,
        journal: &mut Vec<Undo>,
    ) -> Result<Drain> {
        let original = stream.clone();
        stream.remaining_balance = stream
            .remaining_balance
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;

        if math::is_exhausted(&stream, now)? {
            let sender_remainder = stream.remaining_balance;
            self.state.remove(stream.id);
            journal.push(Undo::Reinsert(original));
            tracing::debug!(stream = %stream.id, %sender_remainder, "stream settled");
            Ok(Drain {
                amount,
                sender_remainder,
            })
        } else {
            self.state.replace(stream);
            journal.push(Undo::Restore(original));
            Ok(Drain {
                amount,
                sender_remainder: 0,
            })
        }
    }

    fn drain_batch(
        &mut self,
        caller: &Address,
        ids: &[StreamId],
        now: Timestamp,
        journal: &mut Vec<Undo>,
    ) -> Result<BatchDrain> {
        let mut batch = BatchDrain::default();
        for id in ids {
            let Some(stream) = self.state.streams.get(id).cloned() else {
                tracing::debug!(stream = %id, "skipping missing stream");
                continue;
            };
            if stream.role_of(caller) != Some(Role::Recipient) {
                tracing::debug!(stream = %id, "skipping stream of another recipient");
                continue;
            }
            let available = math::apportion(&stream, now)?.recipient;
            if available == 0 {
                tracing::debug!(stream = %id, "skipping stream with nothing available");
                continue;
            }

            let drain = self.drain(stream.clone(), available, now, journal)?;
            let per_token = batch.per_token.entry(stream.token_address).or_default();
            *per_token = per_token
                .checked_add(drain.amount)
                .ok_or(LedgerError::Overflow)?;
            batch.total = batch
                .total
                .checked_add(drain.amount)
                .ok_or(LedgerError::Overflow)?;
            if drain.sender_remainder > 0 {
                batch
                    .remainders
                    .push(self.payout(&stream, stream.sender, drain.sender_remainder));
            }
            batch.processed.push(*id);
        }
        Ok(batch)
    }

    /// Run the single transfer call of an operation, undoing `journal` if
    /// it fails.
    fn commit(&mut self, journal: Vec<Undo>, legs: &[TransferLeg]) -> Result<()> {
        if legs.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.vault.transfer(legs) {
            tracing::warn!(error = %e, legs = legs.len(), "transfer failed, rolling back");
            self.state.undo(journal);
            return Err(LedgerError::TransferFailed(e));
        }
        Ok(())
    }
}

#[derive(Default)]
struct BatchDrain {
    processed: Vec<StreamId>,
    per_token: BTreeMap<Address, Amount>,
    remainders: Vec<TransferLeg>,
    total: Amount,
}
