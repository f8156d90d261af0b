// Offload Core - Domain Logic & Ports
// NO infrastructure dependencies: contexts live in offload-infra-system

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
