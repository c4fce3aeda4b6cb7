pub mod feed;
pub mod settlement;
pub mod storage;
pub mod monitoring;
pub mod utils;
pub mod types;

pub use crate::types::*;
