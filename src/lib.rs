pub mod config;
pub mod counters;
pub mod domain;
pub mod janitor;
pub mod lifecycle;
pub mod scheduler;
pub mod startup;
pub mod store;
pub mod subscriber_api;
pub mod telemetry;
pub mod triggers;
