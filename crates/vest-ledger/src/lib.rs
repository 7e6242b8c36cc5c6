//! Continuous value-vesting ledger for Vestline.
//!
//! Funds deposited by a sender vest linearly to a recipient over a fixed
//! window. This crate provides:
//! - `Stream` records and the pure vesting math over them
//! - `StreamLedger`: create, withdraw, batch-withdraw and cancel, with
//!   rollback when the value transfer fails
//! - `SharedStreamLedger` for serialized access across threads
//! - Collaborator boundaries (`ValueTransfer`, `Clock`, `EventSink`,
//!   `AccessControl`) with in-memory implementations
//! - Single-owner administration and an invariant validator
//!
//! # Invariants
//!
//! - Conservation: withdrawn + remaining == deposit for every stream, and
//!   the payouts of a settled stream sum to its deposit exactly
//! - Stream ids are allocated sequentially and never reused
//! - The division remainder of `deposit / duration` always goes to the sender

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod math;
pub mod ownable;
pub mod records;
pub mod shared;
pub mod traits;
pub mod validation;
pub mod vault;

pub use clock::{ManualClock, SystemClock};
pub use config::{ConfigError, LedgerConfig};
pub use error::{ErrorKind, LedgerError, TransferError};
pub use events::{EventLog, FanoutSink, LedgerEvent, NoopSink, TracingSink};
pub use ledger::StreamLedger;
pub use ownable::Ownable;
pub use records::{Balances, Role, Stream, StreamRequest};
pub use shared::SharedStreamLedger;
pub use traits::{AccessControl, Clock, EventSink, TransferLeg, ValueTransfer};
pub use validation::{InvariantValidator, ValidationReport, Violation, ViolationKind};
pub use vault::InMemoryVault;
