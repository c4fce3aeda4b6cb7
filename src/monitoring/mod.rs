pub mod control;
pub mod logger;
pub mod stats;

pub use stats::{SettlementRunStats, StatsSnapshot};
