//! Market Payment Engine
//!
//! The Market Payment Engine tracks the financial lifecycle of multi-vendor marketplace orders. It is gateway-agnostic:
//! the payment gateway is only ever seen through the notifications it sends and the split configuration it is handed.
//!
//! The library is divided into these sections:
//! 1. Payout splitting ([`mod@split`]). A pure, deterministic calculation that turns a cart into a per-vendor payout
//!    breakdown, and turns that breakdown into the fee-bearing split configuration the gateway expects.
//! 2. Order storage ([`mod@traits`], with the in-memory [`MemoryDatabase`] and, behind the `sqlite` feature, the
//!    [`SqliteDatabase`] backends). Backends own the order state machine and guarantee that every transition is atomic
//!    for a given order reference.
//! 3. The public API ([`mod@mpe_api`]). [`OrderFlowApi`] places orders and drives delivery; [`OrderReconciler`]
//!    resolves asynchronous payment notifications (webhooks, polling, manual updates, rider terminals) to exactly one
//!    order and applies the transition they announce.
//!
//! The engine also emits events when orders are paid or delivered, or when a payment notification cannot be matched to
//! any order. See [`mod@events`] for the hook system.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod memory;
pub mod mpe_api;
pub mod split;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

pub use memory::MemoryDatabase;
pub use mpe_api::{
    order_flow_api::OrderFlowApi,
    reconciler::{OrderReconciler, ReconcileOutcome},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{OrderStore, OrderStoreError, PaymentTransition};
