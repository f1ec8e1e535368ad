use cucumber::{gherkin::Step, given};
use market_payment_engine::split::{Vendor, VendorRegistry};

use crate::cucumber::{market_world::MarketSystem, MarketWorld};

#[given("a fresh market")]
async fn fresh_market(world: &mut MarketWorld) {
    let registry = VendorRegistry::new()
        .with_vendor("vendor-a", Vendor::new("Vendor A", "ACCT_A"))
        .with_vendor("vendor-b", Vendor::new("Vendor B", "ACCT_B"));
    world.system = Some(MarketSystem::new(registry));
}

#[given("a market with vendors")]
async fn market_with_vendors(world: &mut MarketWorld, step: &Step) {
    let table = step.table.as_ref().expect("A vendor table is required");
    let registry = table.rows.iter().skip(1).fold(VendorRegistry::new(), |registry, row| {
        registry.with_vendor(row[0].as_str(), Vendor::new(&row[1], &row[2]))
    });
    world.system = Some(MarketSystem::new(registry));
}
