pub mod api;
pub mod config;
pub mod counter;
pub mod error;
pub mod identity;
pub mod storage;
pub mod types;
