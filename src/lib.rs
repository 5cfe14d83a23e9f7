pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod tenant;
pub mod theme;
pub mod transport;
pub mod types;

pub use app::{AppContext, BootReport};
pub use config::AppConfig;
