//! # Market payment server
//!
//! The HTTP boundary of the market payment gateway. It is responsible for:
//! * Accepting orders, splitting each cart between its vendors and the platform, and starting the gateway checkout.
//! * Receiving signed payment webhooks from the gateway and reconciling them with orders.
//! * Letting clients poll the gateway for a payment's status.
//! * Rider operations: dispatch, payment collection on delivery, and delivery completion.
//! * Paying vendors their share of orders that were paid on delivery.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: liveness check.
//! * `/gateway/webhook`: gateway notifications. Signed with HMAC-SHA512 and optionally restricted by source address.
//! * `/api/...`: orders, split previews, payment verification, rider operations and vendor payouts. See
//!   [routes](routes/index.html).
pub mod auto_confirm_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
