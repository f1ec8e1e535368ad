//! SQLite backend for the Market Payment Engine.
//!
//! Every state change is a compare-and-set `UPDATE` guarded by the values the change was computed from, so that two
//! writers racing on the same order can never both succeed. The loser re-reads the order and tries again.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
