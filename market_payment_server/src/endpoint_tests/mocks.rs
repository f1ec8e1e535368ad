use gateway_tools::{DedicatedAccount, GatewayApiError, TransactionInit, TransferReceipt, TransferRequest};
use market_payment_engine::{
    db_types::{NewOrder, Order, OrderReference, PaymentUpdate},
    mpe_api::order_objects::OrderQueryFilter,
    split::GatewaySplitConfig,
    OrderStore,
    OrderStoreError,
    PaymentTransition,
};
use mockall::mock;
use serde_json::Value;

use crate::integrations::gateway::PaymentGateway;

mock! {
    pub Gateway {}
    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }
    impl PaymentGateway for Gateway {
        async fn initialize_checkout(&self, order: &Order, split: &GatewaySplitConfig) -> Result<TransactionInit, GatewayApiError>;
        async fn verify_payment(&self, reference: &str) -> Result<Value, GatewayApiError>;
        async fn issue_dedicated_account(&self, email: &str, full_name: &str) -> Result<DedicatedAccount, GatewayApiError>;
        async fn pay_vendor(&self, transfer: TransferRequest) -> Result<TransferReceipt, GatewayApiError>;
    }
}

mock! {
    pub Store {}
    impl Clone for Store {
        fn clone(&self) -> Self;
    }
    impl OrderStore for Store {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;
        async fn fetch_order(&self, reference: &OrderReference) -> Result<Option<Order>, OrderStoreError>;
        async fn fetch_order_by_payment_reference(&self, payment_reference: &str) -> Result<Option<Order>, OrderStoreError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError>;
        async fn transition_payment(&self, reference: &OrderReference, update: PaymentUpdate) -> Result<PaymentTransition, OrderStoreError>;
        async fn assign_delivery(&self, reference: &OrderReference, rider_id: &str, terminal_id: Option<String>) -> Result<Order, OrderStoreError>;
        async fn complete_delivery(&self, reference: &OrderReference) -> Result<Order, OrderStoreError>;
    }
}
