//! The public API of the Market Payment Engine.
//!
//! * [`order_flow_api::OrderFlowApi`] places orders and drives rider assignment and delivery.
//! * [`reconciler::OrderReconciler`] ingests payment notifications from every source.
//!
//! Both are generic over an [`OrderStore`](crate::OrderStore) backend.
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_objects;
pub mod reconciler;
