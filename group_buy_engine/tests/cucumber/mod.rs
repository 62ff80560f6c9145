mod group_buy_world;
mod setups;
mod steps;

pub use group_buy_world::GroupBuyWorld;
