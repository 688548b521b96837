pub mod execution;
pub mod health;
pub mod identity;
pub mod market_data;
pub mod notification;
pub mod order;
pub mod portfolio;
pub mod recovery;
pub mod risk;
pub mod signal;
