pub mod cascade;
pub mod cross_day;
pub mod models;
pub mod status;
pub mod time;
