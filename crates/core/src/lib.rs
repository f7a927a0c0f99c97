pub mod config;
pub mod error;
pub mod kv;
pub mod queue;
pub mod types;

pub use config::AppConfig;
pub use error::{SendcraftError, SendcraftResult};
