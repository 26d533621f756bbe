pub mod config;
pub mod error;
pub mod storage;
pub mod trip_store;
