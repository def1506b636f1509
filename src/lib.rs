pub mod agent;
pub mod api;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod executor;
pub mod http_util;
pub mod network_mode;
pub mod portal;
pub mod radio;
