//! # Valocracy Contracts
//!
//! The contracts behind a contribution-weighted treasury:
//!
//! - **Treasury**: a single-asset vault whose share ledger is credited by
//!   the certificate registry and redeemed by holders at a live exchange
//!   rate.
//! - **Valocracy**: a registry of soulbound contribution certificates.
//!   Issuing one credits the recipient with treasury shares worth the
//!   certificate's rarity.
//! - **Asset**: the pooled fungible asset, modeled behind a trait so the
//!   vault only depends on balances and transfers.
//! - **Deployment**: hosts the three together and gives every call an
//!   all-or-nothing transaction boundary.
//!
//! ## Design Principles
//!
//! 1. Amounts are `u64`; every sum and product is checked and conversions go
//!    through a `u128` intermediate.
//! 2. Rounding is explicit at every conversion and always favours the
//!    holders who stay.
//! 3. Every check runs before the first write, so a failing call leaves each
//!    contract as it found it.
//! 4. Every public type is serializable (serde) for persistence and the API.

pub mod asset;
pub mod deployment;
pub mod events;
pub mod math;
pub mod treasury;
pub mod valocracy;

pub use deployment::{ContractError, Deployment, ErrorKind};
pub use events::{Event, EventRecord};
pub use treasury::Treasury;
pub use valocracy::Valocracy;
