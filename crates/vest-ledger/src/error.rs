use vest_types::{Address, Amount, StreamId};

/// Errors produced by ledger operations.
///
/// Every error aborts the whole operation; the ledger is left exactly as it
/// was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("stream {0} does not exist")]
    NotFound(StreamId),

    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: Address, action: String },

    #[error("requested {requested} exceeds available balance {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("value transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("no eligible stream in batch")]
    NothingEligible,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Flat error category, for callers that branch on the kind of failure
/// rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unauthorized,
    InsufficientBalance,
    TransferFailed,
    NothingToDo,
    Internal,
}

impl LedgerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub(crate) fn unauthorized(caller: &Address, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller: *caller,
            action: action.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::TransferFailed(_) => ErrorKind::TransferFailed,
            Self::NothingEligible => ErrorKind::NothingToDo,
            Self::Overflow | Self::Poisoned => ErrorKind::Internal,
        }
    }
}

/// Failure reported by a [`ValueTransfer`](crate::traits::ValueTransfer)
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("{account} holds {available} of token {token}, needs {required}")]
    InsufficientFunds {
        account: Address,
        token: Address,
        required: Amount,
        available: Amount,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Convenience type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
