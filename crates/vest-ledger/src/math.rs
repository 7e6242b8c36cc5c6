//! Vesting arithmetic.
//!
//! Every function here is a pure function of stream fields and a
//! caller-supplied `now`; nothing reads a clock or touches storage.

use vest_types::{Amount, Timestamp};

use crate::error::{LedgerError, Result};
use crate::records::{Balances, Stream};

/// Seconds of the window `[start, stop)` that have elapsed at `now`.
///
/// `0` before the start, `stop - start` at or after the stop.
pub fn delta_of(start: Timestamp, stop: Timestamp, now: Timestamp) -> u64 {
    if now <= start {
        return 0;
    }
    if now < stop {
        return now - start;
    }
    stop - start
}

/// `deposit / duration`, rejecting windows where the rate would be zero.
pub fn rate_per_second(deposit: Amount, start: Timestamp, stop: Timestamp) -> Result<Amount> {
    if stop <= start {
        return Err(LedgerError::invalid("stop time must be after start time"));
    }
    let duration = Amount::from(stop - start);
    if deposit < duration {
        return Err(LedgerError::invalid(format!(
            "deposit {deposit} is smaller than duration {duration}s; rate would be zero"
        )));
    }
    Ok(deposit / duration)
}

/// Amount vested to the recipient at `now`, ignoring prior withdrawals.
///
/// Capped at `rate * duration`, so the division remainder never vests.
pub fn vested_amount(stream: &Stream, now: Timestamp) -> Result<Amount> {
    let delta = delta_of(stream.start_time, stream.stop_time, now);
    stream
        .rate_per_second
        .checked_mul(Amount::from(delta))
        .ok_or(LedgerError::Overflow)
}

/// Split `remaining_balance` between recipient and sender at `now`.
pub fn apportion(stream: &Stream, now: Timestamp) -> Result<Balances> {
    let vested = vested_amount(stream, now)?;
    let recipient = vested
        .saturating_sub(stream.withdrawn())
        .min(stream.remaining_balance);
    Ok(Balances {
        sender: stream.remaining_balance - recipient,
        recipient,
    })
}

/// Whether nothing more can ever vest to the recipient.
///
/// True once the window has closed and every vested unit has been
/// withdrawn; whatever is left is the sender's remainder.
pub fn is_exhausted(stream: &Stream, now: Timestamp) -> Result<bool> {
    if stream.remaining_balance == 0 {
        return Ok(true);
    }
    if now < stream.stop_time {
        return Ok(false);
    }
    Ok(apportion(stream, now)?.recipient == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vest_types::{Address, StreamId};

    fn stream(deposit: Amount, start: Timestamp, stop: Timestamp) -> Stream {
        Stream {
            id: StreamId::new(1),
            sender: Address::derive("sender"),
            recipient: Address::derive("recipient"),
            deposit,
            token_address: Address::derive("token"),
            start_time: start,
            stop_time: stop,
            remaining_balance: deposit,
            rate_per_second: rate_per_second(deposit, start, stop).unwrap(),
            nft_token_id: None,
        }
    }

    #[test]
    fn delta_clamps_to_window() {
        assert_eq!(delta_of(10, 110, 0), 0);
        assert_eq!(delta_of(10, 110, 10), 0);
        assert_eq!(delta_of(10, 110, 60), 50);
        assert_eq!(delta_of(10, 110, 110), 100);
        assert_eq!(delta_of(10, 110, 1_000), 100);
    }

    #[test]
    fn rate_rejects_bad_windows() {
        assert!(rate_per_second(1000, 10, 10).is_err());
        assert!(rate_per_second(1000, 20, 10).is_err());
        assert!(rate_per_second(99, 0, 100).is_err());
        assert_eq!(rate_per_second(100, 0, 100).unwrap(), 1);
        assert_eq!(rate_per_second(1005, 10, 110).unwrap(), 10);
    }

    #[test]
    fn apportion_mid_stream() {
        let s = stream(1000, 10, 110);
        let b = apportion(&s, 60).unwrap();
        assert_eq!(b.recipient, 500);
        assert_eq!(b.sender, 500);
    }

    #[test]
    fn apportion_accounts_for_withdrawals() {
        let mut s = stream(1000, 10, 110);
        s.remaining_balance = 700;
        assert_eq!(apportion(&s, 60).unwrap().recipient, 200);
        assert_eq!(apportion(&s, 60).unwrap().sender, 500);
        assert_eq!(apportion(&s, 210).unwrap().recipient, 700);
        assert_eq!(apportion(&s, 210).unwrap().sender, 0);
    }

    #[test]
    fn remainder_stays_with_sender_after_stop() {
        let s = stream(1005, 10, 110);
        let b = apportion(&s, 500).unwrap();
        assert_eq!(b.recipient, 1000);
        assert_eq!(b.sender, 5);
    }

    #[test]
    fn exhaustion_after_stop() {
        let mut s = stream(1005, 10, 110);
        assert!(!is_exhausted(&s, 500).unwrap());
        s.remaining_balance = 5;
        assert!(is_exhausted(&s, 500).unwrap());
        assert!(!is_exhausted(&s, 100).unwrap());
        s.remaining_balance = 0;
        assert!(is_exhausted(&s, 0).unwrap());
    }
}
