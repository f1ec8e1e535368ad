//! # Order storage
//!
//! [`OrderStore`] is the contract every order backend implements. Two backends ship with the engine: the in-memory
//! [`crate::MemoryDatabase`] and, behind the `sqlite` feature, [`crate::SqliteDatabase`].
//!
//! Backends are the only place where order state is mutated. Each mutating call is atomic with respect to other
//! mutations of the same order reference; contention is never wider than a single order.
mod order_store;

pub use order_store::{OrderStore, OrderStoreError, PaymentTransition};
