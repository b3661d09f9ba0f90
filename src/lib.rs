pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod holds;
pub mod inventory;
pub mod logging;
pub mod pathfinding;
pub mod registry;
pub mod server;
pub mod services;
pub mod signs;

pub use config::AppConfig;
pub use controller::{Controller, HealthSummary, TickSummary};
pub use error::{OperatorError, Result};
