//! Environment configuration.
//!
//! Two variables are read:
//!
//! - `PROMISSORY_WORKERS`: size of the default pool. Defaults to the number of
//!   CPUs.
//! - `PROMISSORY_DEBUG`: `1`/`true` turns on debug tracing of thread hops for
//!   promises created with default options.
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const WORKERS_VAR: &str = "PROMISSORY_WORKERS";
pub const DEBUG_VAR: &str = "PROMISSORY_DEBUG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workers: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            debug: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(workers) = lookup(WORKERS_VAR) {
            config.workers = match workers.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(Error::Validation(format!(
                        "{WORKERS_VAR} must be a positive integer, got `{workers}`"
                    )))
                }
                Ok(n) => n,
            };
        }

        if let Some(debug) = lookup(DEBUG_VAR) {
            config.debug = match debug.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(Error::Validation(format!(
                        "{DEBUG_VAR} must be a boolean, got `{debug}`"
                    )))
                }
            };
        }

        Ok(config)
    }
}

/// The debug default for new promises, read from the environment once.
pub(crate) fn debug_default() -> bool {
    static DEBUG: OnceLock<bool> = OnceLock::new();
    *DEBUG.get_or_init(|| Config::from_env().map(|c| c.debug).unwrap_or(false))
}
