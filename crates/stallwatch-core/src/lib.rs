pub mod config;
pub mod logging;

pub mod http;
pub mod monitor;
pub mod queue_owner;
pub mod retry;
pub mod transfer_client;
pub mod watchdog;
