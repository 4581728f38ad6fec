pub mod config;
pub mod replay;

pub use config::{AppConfig, ConfigError, SourceConfig};
pub use replay::{FrameReport, ReplayReport, replay_frames};
