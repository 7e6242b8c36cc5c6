//! End-to-end ledger scenarios against the in-memory collaborators.

use std::sync::Arc;

use vest_ledger::{
    ErrorKind, EventLog, InMemoryVault, InvariantValidator, LedgerConfig, LedgerError,
    LedgerEvent, ManualClock, StreamLedger, StreamRequest,
};
use vest_types::{Address, Amount, StreamId, Timestamp};

const T0: Timestamp = 1_700_000_000;

struct World {
    ledger: StreamLedger,
    vault: Arc<InMemoryVault>,
    clock: Arc<ManualClock>,
    log: Arc<EventLog>,
    token: Address,
    alice: Address,
    bob: Address,
    carol: Address,
}

fn world() -> World {
    let vault = Arc::new(InMemoryVault::new());
    let clock = Arc::new(ManualClock::new(T0));
    let log = Arc::new(EventLog::new());
    let ledger = StreamLedger::new(
        LedgerConfig::default(),
        vault.clone(),
        clock.clone(),
        log.clone(),
    )
    .unwrap();
    let token = Address::derive("token");
    let alice = Address::derive("alice");
    vault.mint(&token, &alice, 1_000_000);
    World {
        ledger,
        vault,
        clock,
        log,
        token,
        alice,
        bob: Address::derive("bob"),
        carol: Address::derive("carol"),
    }
}

impl World {
    fn open(
        &mut self,
        recipient: Address,
        deposit: Amount,
        start: Timestamp,
        stop: Timestamp,
    ) -> StreamId {
        let sender = self.alice;
        self.ledger
            .create_stream(
                &sender,
                StreamRequest {
                    sender,
                    recipient,
                    deposit,
                    token_address: self.token,
                    start_time: start,
                    stop_time: stop,
                    nft_token_id: None,
                },
            )
            .unwrap()
    }

    fn assert_valid(&self) {
        let report = InvariantValidator::validate_custody(&self.ledger, &self.vault);
        assert!(report.is_valid(), "{:?}", report.violations);
    }
}

#[test]
fn thousand_over_hundred_seconds() {
    let mut w = world();
    let bob = w.bob;
    let id = w.open(bob, 1000, T0 + 10, T0 + 110);

    w.clock.set(T0 + 60);
    assert_eq!(w.ledger.balance_of(id, &bob).unwrap(), 500);

    w.ledger.withdraw_from_stream(&bob, id, 300).unwrap();
    assert_eq!(w.ledger.get_stream(id).unwrap().remaining_balance, 700);
    assert_eq!(w.ledger.balance_of(id, &bob).unwrap(), 200);
    w.assert_valid();

    w.clock.set(T0 + 210);
    assert_eq!(w.ledger.balance_of(id, &bob).unwrap(), 700);

    w.ledger.withdraw_from_stream(&bob, id, 700).unwrap();
    assert_eq!(
        w.ledger.get_stream(id).unwrap_err(),
        LedgerError::NotFound(id)
    );
    assert_eq!(w.vault.balance_of(&w.token, &bob), 1000);
    w.assert_valid();
}

#[test]
fn invalid_windows_are_rejected() {
    let mut w = world();
    let alice = w.alice;
    let request = |deposit, start, stop| StreamRequest {
        sender: alice,
        recipient: Address::derive("bob"),
        deposit,
        token_address: Address::derive("token"),
        start_time: start,
        stop_time: stop,
        nft_token_id: None,
    };

    let err = w
        .ledger
        .create_stream(&alice, request(1000, T0 + 100, T0 + 100))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = w
        .ledger
        .create_stream(&alice, request(1000, T0 + 100, T0 + 50))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = w
        .ledger
        .create_stream(&alice, request(99, T0 + 1, T0 + 101))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(w.log.is_empty());
}

#[test]
fn batch_withdrawal_skips_ineligible_streams() {
    let mut w = world();
    let (bob, carol) = (w.bob, w.carol);
    let id1 = w.open(bob, 1000, T0 + 10, T0 + 110);
    let id2 = w.open(carol, 1000, T0 + 10, T0 + 110);
    let id3 = w.open(bob, 1000, T0 + 500, T0 + 600);

    w.clock.set(T0 + 60);
    let expected = w.ledger.balance_of(id1, &bob).unwrap();
    let batches_before = w.vault.batch_count();

    w.ledger
        .withdraw_from_streams(&bob, &[id1, id2, id3])
        .unwrap();

    assert_eq!(w.vault.batch_count(), batches_before + 1);
    let batch = w.vault.batches().pop().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].to, bob);
    assert_eq!(batch[0].amount, expected);
    assert_eq!(
        w.log.last(),
        Some(LedgerEvent::WithdrawFromStreams {
            stream_id_list: vec![id1],
            recipient: bob,
            amount: expected,
        })
    );
    assert_eq!(w.ledger.get_stream(id2).unwrap().remaining_balance, 1000);
    assert_eq!(w.ledger.get_stream(id3).unwrap().remaining_balance, 1000);
    w.assert_valid();
}

#[test]
fn batch_with_nothing_eligible_is_reported() {
    let mut w = world();
    let (bob, carol) = (w.bob, w.carol);
    let id = w.open(carol, 1000, T0 + 10, T0 + 110);
    w.clock.set(T0 + 60);

    let err = w.ledger.withdraw_from_streams(&bob, &[id]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToDo);
}

#[test]
fn batch_settles_finished_streams_and_refunds_remainders() {
    let mut w = world();
    let (alice, bob) = (w.alice, w.bob);
    let a = w.open(bob, 1005, T0 + 10, T0 + 110);
    let b = w.open(bob, 2000, T0 + 10, T0 + 210);
    let alice_before = w.vault.balance_of(&w.token, &alice);

    w.clock.set(T0 + 160);
    w.ledger.withdraw_from_streams(&bob, &[a, b]).unwrap();

    assert!(!w.ledger.stream_exists(a));
    assert!(w.ledger.stream_exists(b));
    assert_eq!(w.vault.balance_of(&w.token, &bob), 1000 + 1500);
    assert_eq!(w.vault.balance_of(&w.token, &alice), alice_before + 5);
    w.assert_valid();
}

#[test]
fn cancellation_matches_balance_just_before() {
    let mut w = world();
    let (alice, bob) = (w.alice, w.bob);
    let id = w.open(bob, 3600, T0 + 100, T0 + 3700);
    w.clock.set(T0 + 1000);
    w.ledger.withdraw_from_stream(&bob, id, 400).unwrap();
    w.clock.set(T0 + 2000);

    let recipient_before = w.ledger.balance_of(id, &bob).unwrap();
    let sender_before = w.ledger.balance_of(id, &alice).unwrap();
    let remaining = w.ledger.get_stream(id).unwrap().remaining_balance;
    assert_eq!(recipient_before + sender_before, remaining);

    w.ledger.cancel_stream(&bob, id).unwrap();
    assert_eq!(
        w.log.last(),
        Some(LedgerEvent::CancelStream {
            stream_id: id,
            sender: alice,
            recipient: bob,
            nft_token_id: None,
            sender_balance: sender_before,
            recipient_balance: recipient_before,
        })
    );
    assert_eq!(w.vault.balance_of(&w.token, &bob), 400 + recipient_before);
    w.assert_valid();
}

#[test]
fn ids_are_never_reused() {
    let mut w = world();
    let bob = w.bob;
    let first = w.open(bob, 100, T0 + 1, T0 + 101);
    let alice = w.alice;
    w.ledger.cancel_stream(&alice, first).unwrap();
    let second = w.open(bob, 100, T0 + 1, T0 + 101);
    assert!(second > first);
    assert_eq!(w.ledger.next_stream_id(), StreamId::new(second.value() + 1));
}

#[test]
fn first_stream_id_comes_from_config() {
    let vault = Arc::new(InMemoryVault::new());
    let config = LedgerConfig::from_toml_str("first_stream_id = 100000").unwrap();
    let ledger = StreamLedger::new(
        config,
        vault,
        Arc::new(ManualClock::new(T0)),
        Arc::new(EventLog::new()),
    )
    .unwrap();
    assert_eq!(ledger.next_stream_id(), StreamId::new(100_000));
}

#[test]
fn batch_across_tokens_pays_one_leg_per_token() {
    let mut w = world();
    let (alice, bob) = (w.alice, w.bob);
    let dai = Address::derive("dai");
    w.vault.mint(&dai, &alice, 1_000_000);

    let a = w.open(bob, 1000, T0 + 10, T0 + 110);
    let b = w
        .ledger
        .create_stream(
            &alice,
            StreamRequest {
                sender: alice,
                recipient: bob,
                deposit: 2000,
                token_address: dai,
                start_time: T0 + 10,
                stop_time: T0 + 110,
                nft_token_id: None,
            },
        )
        .unwrap();
    let c = w.open(bob, 500, T0 + 10, T0 + 60);

    w.clock.set(T0 + 60);
    let batches_before = w.vault.batch_count();
    w.ledger.withdraw_from_streams(&bob, &[a, b, c]).unwrap();

    assert_eq!(w.vault.batch_count(), batches_before + 1);
    let batch = w.vault.batches().pop().unwrap();
    assert_eq!(batch.len(), 2);
    let custody = w.ledger.custody_address();
    for leg in &batch {
        assert_eq!(leg.from, custody);
        assert_eq!(leg.to, bob);
    }
    let paid = |token: Address| {
        batch
            .iter()
            .filter(|leg| leg.token == token)
            .map(|leg| leg.amount)
            .sum::<Amount>()
    };
    assert_eq!(paid(w.token), 500 + 500);
    assert_eq!(paid(dai), 1000);

    assert_eq!(
        w.log.last(),
        Some(LedgerEvent::WithdrawFromStreams {
            stream_id_list: vec![a, b, c],
            recipient: bob,
            amount: 2000,
        })
    );
    assert!(!w.ledger.stream_exists(c));
    assert_eq!(w.vault.balance_of(&w.token, &bob), 1000);
    assert_eq!(w.vault.balance_of(&dai, &bob), 1000);
    w.assert_valid();
}
