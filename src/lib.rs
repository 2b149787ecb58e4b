pub mod api;
pub mod args;
pub mod baseline;
pub mod calibration;
pub mod config;
pub mod error;
pub mod fake_feed;
pub mod features;
pub mod forest;
pub mod form;
pub mod history;
pub mod league_stats;
pub mod model;
pub mod persist;
pub mod prediction;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod scoreline;
pub mod simulation;
pub mod standings;
pub mod training;

pub use api::{ForecastRequest, ForecastResponse, PredictionResult};
pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use history::{MatchHistoryStore, MatchRecord};
pub use prediction::PredictionService;
pub use registry::ModelRegistry;
