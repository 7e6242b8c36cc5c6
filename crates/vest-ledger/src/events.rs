use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use vest_types::{Address, Amount, NftTokenId, StreamId, Timestamp};

use crate::traits::EventSink;

/// Notification emitted on every ledger state transition.
///
/// Consumers can rebuild ledger history from these alone. Variant and field
/// names follow the streaming ABI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    CreateStream {
        stream_id: StreamId,
        sender: Address,
        recipient: Address,
        nft_token_id: Option<NftTokenId>,
        deposit: Amount,
        token_address: Address,
        start_time: Timestamp,
        stop_time: Timestamp,
    },
    CancelStream {
        stream_id: StreamId,
        sender: Address,
        recipient: Address,
        nft_token_id: Option<NftTokenId>,
        sender_balance: Amount,
        recipient_balance: Amount,
    },
    WithdrawFromStream {
        stream_id: StreamId,
        recipient: Address,
        amount: Amount,
        /// Division remainder returned to the sender when this withdrawal
        /// settled the stream; zero otherwise.
        sender_remainder: Amount,
    },
    WithdrawFromStreams {
        stream_id_list: Vec<StreamId>,
        recipient: Address,
        amount: Amount,
    },
    OwnershipTransferred {
        previous_owner: Option<Address>,
        new_owner: Option<Address>,
    },
}

impl LedgerEvent {
    /// The ABI event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateStream { .. } => "CreateStream",
            Self::CancelStream { .. } => "CancelStream",
            Self::WithdrawFromStream { .. } => "WithdrawFromStream",
            Self::WithdrawFromStreams { .. } => "WithdrawFromStreams",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
        }
    }
}

fn short(addr: &Option<Address>) -> String {
    addr.map(|a| a.short_id()).unwrap_or_else(|| "none".into())
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateStream {
                stream_id,
                sender,
                recipient,
                deposit,
                start_time,
                stop_time,
                ..
            } => write!(
                f,
                "CreateStream {stream_id} {} -> {} deposit={deposit} window=[{start_time}, {stop_time})",
                sender.short_id(),
                recipient.short_id()
            ),
            Self::CancelStream {
                stream_id,
                sender_balance,
                recipient_balance,
                ..
            } => write!(
                f,
                "CancelStream {stream_id} sender={sender_balance} recipient={recipient_balance}"
            ),
            Self::WithdrawFromStream {
                stream_id,
                recipient,
                amount,
                sender_remainder,
            } => write!(
                f,
                "WithdrawFromStream {stream_id} {} amount={amount} remainder={sender_remainder}",
                recipient.short_id()
            ),
            Self::WithdrawFromStreams {
                stream_id_list,
                recipient,
                amount,
            } => {
                let ids: Vec<String> = stream_id_list.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "WithdrawFromStreams [{}] {} amount={amount}",
                    ids.join(", "),
                    recipient.short_id()
                )
            }
            Self::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => write!(
                f,
                "OwnershipTransferred {} -> {}",
                short(previous_owner),
                short(new_owner)
            ),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Default)]
pub struct EventLog {
    events: RwLock<Vec<LedgerEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<LedgerEvent> {
        self.events.read().ok().and_then(|e| e.last().cloned())
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<LedgerEvent> {
        self.events
            .write()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &LedgerEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event.clone());
        }
    }
}

/// Writes each event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LedgerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => tracing::info!(target: "vest_ledger::events", event = event.name(), %payload),
            Err(e) => tracing::warn!(event = event.name(), error = %e, "failed to encode event"),
        }
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &LedgerEvent) {}
}

/// Forwards each event to every inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
