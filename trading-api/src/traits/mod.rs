pub mod alerting;
pub mod broker;
pub mod data_feed;
pub mod persistence;
pub mod strategist;
