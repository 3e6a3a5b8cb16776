pub mod analysis;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod filter;
pub mod format;
pub mod live;
pub mod trace;
