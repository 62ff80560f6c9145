use std::collections::HashMap;

use cucumber::World;
use group_buy_engine::{
    db_types::TradeOrder,
    order_objects::LockOrderOutcome,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    OrderFlowApi,
    SettlementApi,
    SqliteDatabase,
    SqliteLockProvider,
};
use log::*;

#[derive(Default, Debug, World)]
pub struct GroupBuyWorld {
    pub system: Option<GroupBuySystem>,
    /// Legs by the out_trade_no they were locked with
    pub legs: HashMap<String, TradeOrder>,
    pub last_outcome: Option<LockOrderOutcome>,
}

#[derive(Debug)]
pub struct GroupBuySystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase, SqliteLockProvider>,
    pub settlement: SettlementApi<SqliteDatabase>,
}

impl GroupBuyWorld {
    pub fn system(&self) -> &GroupBuySystem {
        self.system.as_ref().expect("Group-buy system not initialised")
    }

    pub fn leg(&self, out_trade_no: &str) -> &TradeOrder {
        self.legs.get(out_trade_no).unwrap_or_else(|| panic!("No leg was locked as {out_trade_no}"))
    }
}

impl GroupBuySystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let orders = OrderFlowApi::new(db.clone(), db.lock_provider(), Default::default());
        let settlement = SettlementApi::new(db.clone(), 3);
        Self { db_path: url, db, orders, settlement }
    }
}
