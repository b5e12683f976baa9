//! Transactional document store for the Tambola coordinator.
//!
//! The coordinator treats persistence as a transactional document
//! database: keyed documents in named collections, mutated only through
//! serializable optimistic transactions. This crate provides that
//! contract in memory.
//!
//! # Key types
//!
//! - [`DocStore`] — shared store handle; [`DocStore::in_transaction`]
//!   runs a closure with bounded conflict retry
//! - [`Transaction`] — versioned reads/scans, staged writes, atomic
//!   all-or-nothing commit
//! - [`StoreError`] — conflicts/contention (retryable) vs codec faults

mod error;
mod store;

pub use error::StoreError;
pub use store::{DocStore, Transaction};
