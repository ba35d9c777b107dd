pub mod backends;
pub mod cache;
pub mod config_loader;
pub mod delivery;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod http;
pub mod job;
pub mod metrics_store;
pub mod pool;
pub mod process;
pub mod registry;
