//! Logging section of the Dex configuration.

use serde::{Deserialize, Serialize};
use strum::Display;

pub const LOG_FORMAT: &str = "text";

/// Log levels understood by the Dex logger.
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DexLogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Logger {
    pub level: DexLogLevel,
    pub format: &'static str,
}

impl From<DexLogLevel> for Logger {
    fn from(level: DexLogLevel) -> Self {
        Self {
            level,
            format: LOG_FORMAT,
        }
    }
}
