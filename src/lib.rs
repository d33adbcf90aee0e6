pub mod agents;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod ingest;
pub mod learning;
pub mod memory;
pub mod monitoring;
pub mod providers;
pub mod retrieval;
pub mod time_window;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineDeps, EngineError, EngineSettings, MemoryEngine};
