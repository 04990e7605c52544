use ini::Ini;
use std::path::Path;

/// Tunables that are not part of the protocol surface.
///
/// All values have defaults matching the deployed behavior, so a node runs
/// without any config file.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Read/write/connect timeout for outbound calls in milliseconds.
    pub timeout_ms: u64,
    /// Number of worker threads handling inbound requests.
    pub workers: usize,
    /// Interval of the successor liveness probe in seconds.
    pub keep_alive_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeout_ms: 3600,
            workers: 4,
            keep_alive_secs: 5,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        let conf = Ini::load_from_file(path)?;
        let defaults = Config::default();

        let section = match conf.section(Some("chord")) {
            Some(section) => section,
            None => return Ok(defaults),
        };

        let timeout_ms = match section.get("timeout_ms") {
            Some(value) => value.parse()?,
            None => defaults.timeout_ms,
        };

        let workers = match section.get("workers") {
            Some(value) => value.parse()?,
            None => defaults.workers,
        };

        let keep_alive_secs = match section.get("keep_alive_secs") {
            Some(value) => value.parse()?,
            None => defaults.keep_alive_secs,
        };

        Ok(Config {
            timeout_ms,
            workers,
            keep_alive_secs,
        })
    }
}
