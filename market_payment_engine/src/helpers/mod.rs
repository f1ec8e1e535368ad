mod order_reference;

pub use order_reference::{generate_order_reference, ORDER_REFERENCE_PREFIX};
