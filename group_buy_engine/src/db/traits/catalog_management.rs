use super::DatabaseBackend;
use crate::db_types::{Activity, ActivityGoods, Discount, FlowSwitches, Sku};

/// Read access to the activity catalog and the dynamic switches.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement: DatabaseBackend {
    async fn fetch_activity(&self, activity_id: i64) -> Result<Option<Activity>, Self::Error>;

    /// The activity binding for goods sold through the given source and channel.
    async fn fetch_activity_goods(
        &self,
        goods_id: &str,
        source: &str,
        channel: &str,
    ) -> Result<Option<ActivityGoods>, Self::Error>;

    async fn fetch_discount(&self, discount_id: i64) -> Result<Option<Discount>, Self::Error>;

    async fn fetch_sku(&self, goods_id: &str) -> Result<Option<Sku>, Self::Error>;

    /// A snapshot of the flow switches. Missing rows take their defaults.
    async fn fetch_flow_switches(&self) -> Result<FlowSwitches, Self::Error>;
}
