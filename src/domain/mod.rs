pub mod job;
pub mod retention_policy;
pub mod subscriber;
pub mod subscriber_status;
