pub mod booking;
pub mod calendar;
pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod reaper;
pub mod store;
pub mod wal;
