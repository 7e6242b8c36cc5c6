use std::collections::BTreeMap;

use vest_types::{Address, Amount, StreamId};

use crate::ledger::StreamLedger;
use crate::records::Stream;
use crate::vault::InMemoryVault;

/// Result of an invariant sweep over a ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub stream_count: usize,
    /// Sum of remaining balances per token.
    pub custody: BTreeMap<Address, Amount>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific invariant violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub stream: Option<StreamId>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    RemainingExceedsDeposit,
    ZeroRate,
    RateExceedsDeposit,
    InvertedWindow,
    SelfStream,
    IdNotAllocated,
    CustodyMismatch,
}

/// Checks stored streams against the ledger invariants.
pub struct InvariantValidator;

impl InvariantValidator {
    /// Validate every active stream.
    pub fn validate(ledger: &StreamLedger) -> ValidationReport {
        let mut report = ValidationReport::default();
        let next_id = ledger.next_stream_id();

        for stream in ledger.streams() {
            report.stream_count += 1;
            let entry = report.custody.entry(stream.token_address).or_default();
            *entry = entry.saturating_add(stream.remaining_balance);
            Self::check_stream(stream, next_id, &mut report.violations);
        }

        report
    }

    /// Validate streams and compare per-token remaining balances with what
    /// the vault holds at the ledger's custody address.
    pub fn validate_custody(ledger: &StreamLedger, vault: &InMemoryVault) -> ValidationReport {
        let mut report = Self::validate(ledger);
        let custody_address = ledger.custody_address();
        for (token, expected) in &report.custody {
            let held = vault.balance_of(token, &custody_address);
            if held != *expected {
                report.violations.push(Violation {
                    stream: None,
                    kind: ViolationKind::CustodyMismatch,
                    description: format!(
                        "token {token}: streams hold {expected}, custody holds {held}"
                    ),
                });
            }
        }
        report
    }

    fn check_stream(stream: &Stream, next_id: StreamId, violations: &mut Vec<Violation>) {
        let mut flag = |kind: ViolationKind, description: String| {
            violations.push(Violation {
                stream: Some(stream.id),
                kind,
                description,
            });
        };

        if stream.stop_time <= stream.start_time {
            flag(
                ViolationKind::InvertedWindow,
                format!("window [{}, {}) is empty", stream.start_time, stream.stop_time),
            );
            // Rate checks below divide by the duration.
            return;
        }
        if stream.remaining_balance > stream.deposit {
            flag(
                ViolationKind::RemainingExceedsDeposit,
                format!(
                    "remaining {} exceeds deposit {}",
                    stream.remaining_balance, stream.deposit
                ),
            );
        }
        if stream.rate_per_second == 0 {
            flag(ViolationKind::ZeroRate, "rate per second is zero".into());
        }
        let streamed = stream
            .rate_per_second
            .checked_mul(Amount::from(stream.duration()));
        if streamed.map_or(true, |total| total > stream.deposit) {
            flag(
                ViolationKind::RateExceedsDeposit,
                format!(
                    "rate {} over {}s exceeds deposit {}",
                    stream.rate_per_second,
                    stream.duration(),
                    stream.deposit
                ),
            );
        }
        if stream.sender == stream.recipient {
            flag(ViolationKind::SelfStream, "sender and recipient are equal".into());
        }
        if stream.id >= next_id {
            flag(
                ViolationKind::IdNotAllocated,
                format!("id {} is not below next id {next_id}", stream.id),
            );
        }
    }
}
