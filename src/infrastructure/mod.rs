pub mod checkpoint;
pub mod config;
pub mod error;
pub mod http_api;
pub mod scheduler;
pub mod storage;
pub mod sync_client;
