//! Scripted scenarios replayed against an in-memory ledger.
//!
//! Participants and tokens are named by label; each label maps to
//! `Address::derive(label)`. Step times are offsets from the scenario's
//! `start` instant.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vest_ledger::{
    EventLog, EventSink, FanoutSink, InMemoryVault, InvariantValidator, LedgerConfig,
    LedgerError, LedgerEvent, ManualClock, Stream, StreamLedger, StreamRequest, TracingSink,
};
use vest_types::{Address, Amount, NftTokenId, StreamId, Timestamp};

fn default_start() -> Timestamp {
    1_700_000_000
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Clock reading before the first step.
    #[serde(default = "default_start")]
    pub start: Timestamp,
    /// Label of the initial owner.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub mint: Vec<Mint>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
pub struct Mint {
    pub account: String,
    pub token: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Create {
        /// Defaults to the sender.
        #[serde(default)]
        caller: Option<String>,
        sender: String,
        recipient: String,
        token: String,
        deposit: u64,
        start: u64,
        stop: u64,
        #[serde(default)]
        nft: Option<u64>,
    },
    Advance {
        seconds: u64,
    },
    Withdraw {
        caller: String,
        stream: StreamId,
        amount: u64,
    },
    WithdrawBatch {
        caller: String,
        streams: Vec<StreamId>,
    },
    Cancel {
        caller: String,
        stream: StreamId,
    },
    Balance {
        who: String,
        streams: Vec<StreamId>,
    },
    TransferOwnership {
        caller: String,
        new_owner: String,
    },
    RenounceOwnership {
        caller: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Advance { .. } => "advance",
            Self::Withdraw { .. } => "withdraw",
            Self::WithdrawBatch { .. } => "withdraw-batch",
            Self::Cancel { .. } => "cancel",
            Self::Balance { .. } => "balance",
            Self::TransferOwnership { .. } => "transfer-ownership",
            Self::RenounceOwnership { .. } => "renounce-ownership",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<LedgerEvent>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct Holding {
    pub account: String,
    pub token: String,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub name: Option<String>,
    pub setup_events: Vec<LedgerEvent>,
    pub steps: Vec<StepOutcome>,
    pub streams: Vec<Stream>,
    pub holdings: Vec<Holding>,
    pub violations: Vec<String>,
}

impl SimulationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

struct Simulation {
    ledger: StreamLedger,
    vault: Arc<InMemoryVault>,
    clock: Arc<ManualClock>,
    log: Arc<EventLog>,
    start: Timestamp,
    accounts: BTreeMap<String, Address>,
    tokens: BTreeMap<String, Address>,
}

impl Simulation {
    fn account(&mut self, label: &str) -> Address {
        *self
            .accounts
            .entry(label.to_string())
            .or_insert_with(|| Address::derive(label))
    }

    fn token(&mut self, label: &str) -> Address {
        *self
            .tokens
            .entry(label.to_string())
            .or_insert_with(|| Address::derive(label))
    }

    fn apply(&mut self, step: &Step) -> Result<String, LedgerError> {
        match step {
            Step::Create {
                caller,
                sender,
                recipient,
                token,
                deposit,
                start,
                stop,
                nft,
            } => {
                let caller = self.account(caller.as_deref().unwrap_or(sender));
                let request = StreamRequest {
                    sender: self.account(sender),
                    recipient: self.account(recipient),
                    deposit: Amount::from(*deposit),
                    token_address: self.token(token),
                    start_time: self.start.saturating_add(*start),
                    stop_time: self.start.saturating_add(*stop),
                    nft_token_id: nft.map(NftTokenId),
                };
                let id = self.ledger.create_stream(&caller, request)?;
                Ok(format!("created stream {id}"))
            }
            Step::Advance { seconds } => {
                let now = self.clock.advance(*seconds);
                Ok(format!("clock at +{}s", now.saturating_sub(self.start)))
            }
            Step::Withdraw {
                caller,
                stream,
                amount,
            } => {
                let caller = self.account(caller);
                self.ledger
                    .withdraw_from_stream(&caller, *stream, Amount::from(*amount))?;
                Ok(format!("withdrew {amount} from {stream}"))
            }
            Step::WithdrawBatch { caller, streams } => {
                let caller = self.account(caller);
                self.ledger.withdraw_from_streams(&caller, streams)?;
                Ok(format!("batch withdrawal over {} ids", streams.len()))
            }
            Step::Cancel { caller, stream } => {
                let caller = self.account(caller);
                self.ledger.cancel_stream(&caller, *stream)?;
                Ok(format!("cancelled {stream}"))
            }
            Step::Balance { who, streams } => {
                let address = self.account(who);
                let balance = match streams.as_slice() {
                    [single] => self.ledger.balance_of(*single, &address)?,
                    many => self.ledger.balance_of_streams(many, &address)?,
                };
                Ok(format!("{who} can claim {balance}"))
            }
            Step::TransferOwnership { caller, new_owner } => {
                let caller = self.account(caller);
                let owner = self.account(new_owner);
                self.ledger.transfer_ownership(&caller, owner)?;
                Ok(format!("ownership moved to {new_owner}"))
            }
            Step::RenounceOwnership { caller } => {
                let caller = self.account(caller);
                self.ledger.renounce_ownership(&caller)?;
                Ok("ownership renounced".to_string())
            }
        }
    }

    fn holdings(&self) -> Vec<Holding> {
        let custody = self.ledger.custody_address();
        let holders = self
            .accounts
            .iter()
            .map(|(label, address)| (label.as_str(), *address))
            .chain(std::iter::once(("custody", custody)));

        let mut holdings = Vec::new();
        for (account, address) in holders {
            for (token, token_address) in &self.tokens {
                let amount = self.vault.balance_of(token_address, &address);
                if amount > 0 {
                    holdings.push(Holding {
                        account: account.to_string(),
                        token: token.clone(),
                        amount,
                    });
                }
            }
        }
        holdings
    }
}

/// Replay `scenario` and collect per-step results, final state and any
/// invariant violations.
///
/// A failing step is recorded and the run continues. With `trace_events`
/// every event is also logged through `tracing`.
pub fn run(
    scenario: &Scenario,
    config: Option<LedgerConfig>,
    trace_events: bool,
) -> anyhow::Result<SimulationReport> {
    let mut accounts = BTreeMap::new();
    let mut config = config.unwrap_or_else(|| scenario.ledger.clone());
    if let Some(owner) = &scenario.owner {
        let address = Address::derive(owner);
        accounts.insert(owner.clone(), address);
        config = config.with_owner(address);
    }

    let vault = Arc::new(InMemoryVault::new());
    let clock = Arc::new(ManualClock::new(scenario.start));
    let log = Arc::new(EventLog::new());
    let sink: Arc<dyn EventSink> = if trace_events {
        Arc::new(
            FanoutSink::new()
                .with(log.clone())
                .with(Arc::new(TracingSink)),
        )
    } else {
        log.clone()
    };
    let ledger = StreamLedger::new(config, vault.clone(), clock.clone(), sink)
        .context("building ledger")?;

    let mut sim = Simulation {
        ledger,
        vault,
        clock,
        log,
        start: scenario.start,
        accounts,
        tokens: BTreeMap::new(),
    };
    let setup_events = sim.log.drain();

    for mint in &scenario.mint {
        let account = sim.account(&mint.account);
        let token = sim.token(&mint.token);
        sim.vault.mint(&token, &account, Amount::from(mint.amount));
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let result = sim.apply(step);
        if let Err(err) = &result {
            tracing::debug!(index, action = step.action(), error = %err, "step rejected");
        }
        let (output, error) = match result {
            Ok(output) => (Some(output), None),
            Err(err) => (None, Some(err.to_string())),
        };
        steps.push(StepOutcome {
            index: index + 1,
            action: step.action(),
            at: sim.ledger.now().saturating_sub(scenario.start),
            output,
            error,
            events: sim.log.drain(),
        });
    }

    let validation = InvariantValidator::validate_custody(&sim.ledger, &sim.vault);
    Ok(SimulationReport {
        name: scenario.name.clone(),
        setup_events,
        steps,
        streams: sim.ledger.streams().cloned().collect(),
        holdings: sim.holdings(),
        violations: validation
            .violations
            .iter()
            .map(|v| v.description.clone())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
name = "basic"
owner = "operator"

[[mint]]
account = "alice"
token = "usdc"
amount = 10000

[[steps]]
action = "create"
sender = "alice"
recipient = "bob"
token = "usdc"
deposit = 1000
start = 10
stop = 110

[[steps]]
action = "advance"
seconds = 60

[[steps]]
action = "balance"
who = "bob"
streams = [1]

[[steps]]
action = "withdraw"
caller = "bob"
stream = 1
amount = 300

[[steps]]
action = "withdraw"
caller = "mallory"
stream = 1
amount = 1

[[steps]]
action = "advance"
seconds = 150

[[steps]]
action = "withdraw"
caller = "bob"
stream = 1
amount = 700
"#;

    fn parse(text: &str) -> Scenario {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn basic_scenario_runs_to_completion() {
        let report = run(&parse(BASIC), None, false).unwrap();

        assert_eq!(report.name.as_deref(), Some("basic"));
        assert_eq!(report.setup_events.len(), 1);
        assert_eq!(report.steps.len(), 7);
        assert_eq!(report.steps[2].output.as_deref(), Some("bob can claim 500"));
        assert!(!report.steps[4].succeeded());
        assert!(report.steps[4].events.is_empty());
        assert!(report.steps[6].succeeded());
        assert!(report.streams.is_empty());
        assert!(report.is_valid());

        let bob = report
            .holdings
            .iter()
            .find(|h| h.account == "bob")
            .unwrap();
        assert_eq!(bob.amount, 1000);
        assert!(report.holdings.iter().all(|h| h.account != "custody"));
    }

    #[test]
    fn steps_record_clock_offsets() {
        let report = run(&parse(BASIC), None, false).unwrap();
        let offsets: Vec<u64> = report.steps.iter().map(|s| s.at).collect();
        assert_eq!(offsets, vec![0, 60, 60, 60, 60, 210, 210]);
    }

    #[test]
    fn config_override_replaces_ledger_table() {
        let config = LedgerConfig::from_toml_str("first_stream_id = 50").unwrap();
        let report = run(&parse(BASIC), Some(config), false).unwrap();
        assert_eq!(
            report.steps[0].output.as_deref(),
            Some("created stream #50")
        );
        // Later steps still address stream 1, which no longer exists.
        assert!(!report.steps[2].succeeded());
    }

    #[test]
    fn bundled_scenario_is_consistent() {
        let scenario = parse(include_str!("../scenarios/basic.toml"));
        let report = run(&scenario, None, false).unwrap();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.steps[3].output.as_deref(), Some("bob can claim 1000"));
        assert!(report.streams.is_empty());
    }

    #[test]
    fn oversized_advance_saturates_the_clock() {
        let text = r#"
start = 100

[[steps]]
action = "advance"
seconds = 18446744073709551615

[[steps]]
action = "advance"
seconds = 5
"#;
        let report = run(&parse(text), None, false).unwrap();
        let expected = u64::MAX - 100;
        assert_eq!(report.steps[0].at, expected);
        assert_eq!(report.steps[1].at, expected);
        assert!(report.steps.iter().all(StepOutcome::succeeded));
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let text = r#"
[[steps]]
action = "teleport"
"#;
        assert!(toml::from_str::<Scenario>(text).is_err());
    }

    #[test]
    fn ownership_steps_emit_events() {
        let text = r#"
owner = "operator"

[[steps]]
action = "transfer-ownership"
caller = "operator"
new_owner = "treasury"

[[steps]]
action = "renounce-ownership"
caller = "operator"

[[steps]]
action = "renounce-ownership"
caller = "treasury"
"#;
        let report = run(&parse(text), None, false).unwrap();
        assert_eq!(report.steps[0].events.len(), 1);
        assert!(!report.steps[1].succeeded());
        assert!(report.steps[2].succeeded());
        assert_eq!(report.steps[2].events[0].name(), "OwnershipTransferred");
    }
}
