pub mod config;
pub mod error;
pub mod target;

pub use config::{LinkdConfig, TaskTiming};
pub use error::*;
pub use target::*;
