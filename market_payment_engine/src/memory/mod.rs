//! `MemoryDatabase` is a process-local [`OrderStore`](crate::OrderStore) backend.
//!
//! Orders live in an arena keyed by order reference. Each order sits behind its own mutex, so writers only ever
//! contend on a single order. A secondary index maps gateway payment references to order references.
mod memory_impl;

pub use memory_impl::MemoryDatabase;
