pub mod api;
pub mod card_service;
pub mod config;
pub mod database;
pub mod due_queue;
pub mod errors;
pub mod forecast;
pub mod leech;
pub mod logging;
pub mod models;
pub mod sm2_scheduler;

pub use card_service::CardService;
pub use config::{Config, SrsConfig};
pub use database::Database;
pub use errors::*;
pub use leech::LeechConfig;
pub use models::*;
pub use sm2_scheduler::{Quality, SchedulerConfig, Sm2Scheduler};
