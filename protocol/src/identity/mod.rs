//! # Identity Module
//!
//! Every principal in Valocracy (the registry administrator, certificate
//! holders, and the deployed contracts themselves) is named by an
//! [`Address`]. Addresses are 32 raw bytes rendered as Bech32 with the `val`
//! prefix, so a mistyped character is caught by the checksum.
//!
//! Contracts derive their own address from a fixed label with BLAKE3 (see
//! [`crate::config`]), which keeps deployments reproducible across restarts.

pub mod address;

pub use address::{Address, AddressError, ADDRESS_HRP, ADDRESS_LENGTH};
