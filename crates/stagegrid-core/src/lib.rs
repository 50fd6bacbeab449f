pub mod config;
pub mod types;

pub use config::{ControllerConfig, DispatchConfig, ServerConfig, StagegridConfig};
pub use types::*;
