use serde::{Deserialize, Serialize};
use vest_types::{Address, Amount, NftTokenId, StreamId, Timestamp};

/// A single continuous vesting schedule from a sender to a recipient.
///
/// `deposit`, the addresses, the time window and the rate are fixed at
/// creation. Only `remaining_balance` changes, and only through withdrawal
/// or cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: StreamId,
    pub sender: Address,
    pub recipient: Address,
    pub deposit: Amount,
    pub token_address: Address,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub remaining_balance: Amount,
    pub rate_per_second: Amount,
    pub nft_token_id: Option<NftTokenId>,
}

impl Stream {
    /// Length of the vesting window in seconds.
    pub fn duration(&self) -> u64 {
        self.stop_time - self.start_time
    }

    /// The integer-division dust `deposit - rate * duration`.
    ///
    /// Never vests to the recipient; it is part of the sender's final share.
    pub fn remainder(&self) -> Amount {
        self.deposit - self.rate_per_second * Amount::from(self.duration())
    }

    /// Total already withdrawn by the recipient.
    pub fn withdrawn(&self) -> Amount {
        self.deposit - self.remaining_balance
    }

    pub fn role_of(&self, who: &Address) -> Option<Role> {
        if *who == self.recipient {
            Some(Role::Recipient)
        } else if *who == self.sender {
            Some(Role::Sender)
        } else {
            None
        }
    }

    pub fn is_participant(&self, who: &Address) -> bool {
        self.role_of(who).is_some()
    }
}

/// Which side of a stream an address is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Recipient,
}

/// Apportionment of a stream's remaining balance at one instant.
///
/// `sender + recipient == remaining_balance` always.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub sender: Amount,
    pub recipient: Amount,
}

impl Balances {
    pub fn of(&self, role: Role) -> Amount {
        match role {
            Role::Sender => self.sender,
            Role::Recipient => self.recipient,
        }
    }

    pub fn total(&self) -> Amount {
        self.sender + self.recipient
    }
}

/// Parameters of a stream creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub sender: Address,
    pub recipient: Address,
    pub deposit: Amount,
    pub token_address: Address,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    #[serde(default)]
    pub nft_token_id: Option<NftTokenId>,
}
