use std::{collections::HashMap, sync::Arc};

use cucumber::World;
use market_payment_engine::{
    db_types::OrderReference,
    events::EventProducers,
    mpe_api::reconciler::ReconcileOutcome,
    split::{
        FeeSchedule,
        GatewaySplitConfig,
        OrderSplit,
        PayoutSplitter,
        SplitError,
        SplitPaymentConfigurator,
        VendorRegistry,
    },
    MemoryDatabase,
    OrderFlowApi,
    OrderReconciler,
    OrderStoreError,
};

#[derive(Default, Debug, World)]
pub struct MarketWorld {
    pub system: Option<MarketSystem>,
}

#[derive(Debug)]
pub struct MarketSystem {
    pub splitter: PayoutSplitter,
    pub configurator: SplitPaymentConfigurator,
    pub api: OrderFlowApi<MemoryDatabase>,
    pub reconciler: OrderReconciler<MemoryDatabase>,
    pub last_split: Option<Result<OrderSplit, SplitError>>,
    pub last_config: Option<Result<GatewaySplitConfig, SplitError>>,
    pub last_outcome: Option<ReconcileOutcome>,
    pub last_error: Option<OrderStoreError>,
    /// `paid_at` snapshots, keyed by order, for idempotence checks
    pub paid_at: HashMap<OrderReference, Option<chrono::DateTime<chrono::Utc>>>,
}

impl MarketWorld {
    pub fn system(&self) -> &MarketSystem {
        self.system.as_ref().expect("Market not initialised")
    }

    pub fn system_mut(&mut self) -> &mut MarketSystem {
        self.system.as_mut().expect("Market not initialised")
    }
}

impl MarketSystem {
    pub fn new(registry: VendorRegistry) -> Self {
        let registry = Arc::new(registry);
        let db = MemoryDatabase::new();
        let splitter = PayoutSplitter::new(FeeSchedule::default(), Arc::clone(&registry));
        let configurator = SplitPaymentConfigurator::new(registry, "platform");
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let reconciler = OrderReconciler::new(db, EventProducers::default());
        Self {
            splitter,
            configurator,
            api,
            reconciler,
            last_split: None,
            last_config: None,
            last_outcome: None,
            last_error: None,
            paid_at: HashMap::new(),
        }
    }

    pub fn split(&self) -> &OrderSplit {
        self.last_split.as_ref().expect("No split calculated").as_ref().expect("The split failed")
    }
}
