pub mod collector;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod retry;
pub mod snapshot;
