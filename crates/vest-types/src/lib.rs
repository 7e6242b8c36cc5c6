//! Foundation types for Vestline.
//!
//! Every other Vestline crate depends on `vest-types`.
//!
//! # Key Types
//!
//! - [`Address`]: 20-byte account or token address
//! - [`StreamId`]: Sequential, never-reused stream identifier
//! - [`NftTokenId`]: Opaque beneficiary-rights token reference
//! - [`Amount`] / [`Timestamp`]: Token quantities and epoch seconds

pub mod address;
pub mod error;
pub mod stream;

pub use address::{Address, ADDRESS_LEN};
pub use error::TypeError;
pub use stream::{Amount, NftTokenId, StreamId, Timestamp};
