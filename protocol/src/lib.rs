// Copyright (c) 2026 Valocracy Contributors. MIT License.
// See LICENSE for details.

//! # Valocracy Protocol: Core Primitives
//!
//! Shared building blocks for the Valocracy contracts and node:
//!
//! - **identity**: 32-byte principal addresses with Bech32 encoding and a
//!   null identity for burns.
//! - **config**: Protocol constants: names, symbols, derivation labels,
//!   default ports.
//! - **storage**: sled-backed persistence for deployment snapshots and the
//!   event journal.
//!
//! The accounting logic itself lives in `valocracy-contracts`; nothing in
//! this crate knows about shares or certificates.

pub mod config;
pub mod identity;
pub mod storage;

pub use identity::Address;
