pub mod auth;
pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{InsightError, InsightResult};
pub use types::{FilterConfig, JobConfig, JobFile, MatchType, OneOrMany, ValuesMode};
