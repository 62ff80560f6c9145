mod traffic_split;
mod ttl_cache;

pub use traffic_split::{is_in_traffic_split, traffic_bucket};
pub use ttl_cache::TtlCache;
