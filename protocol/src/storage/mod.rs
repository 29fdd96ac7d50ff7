//! # Storage Module
//!
//! Persistence for a running Valocracy deployment. The contract state is
//! small (a handful of maps), so instead of a table per entity we persist a
//! whole-state snapshot after every committed transaction, next to an
//! append-only journal of the events that transaction emitted.
//!
//! ```text
//! Deployment::transact ──► snapshot + events ──► ValocracyDB::commit
//!                                                 (one sled transaction)
//! ```
//!
//! Bincode for on-disk encoding; JSON is for the API and the CLI.

pub mod db;

pub use db::{DbError, DbResult, Sequenced, ValocracyDB};
