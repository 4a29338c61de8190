pub mod cache;
pub mod config;
pub mod explain;
pub mod providers;
