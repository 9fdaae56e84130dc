//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_MS: u64 = 300_000;
const DEFAULT_BATCH_WINDOW_MS: u64 = 50;

/// Cache and de-duplication knobs, read from the `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve repeated reads from memory.
    pub enabled: bool,
    /// Lifetime of a cached query result (ms).
    pub ttl_ms: u64,
    /// Debounce window used to coalesce concurrent identical reads (ms).
    pub batch_window_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: DEFAULT_TTL_MS,
            batch_window_ms: DEFAULT_BATCH_WINDOW_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_ms: settings.ttl.as_millis().try_into().unwrap_or(u64::MAX),
            batch_window_ms: settings
                .batch_window
                .as_millis()
                .try_into()
                .unwrap_or(u64::MAX),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.batch_window(), Duration::from_millis(50));
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"ttl_ms": 1000}"#).expect("cache config");
        assert_eq!(config.ttl_ms, 1000);
        assert_eq!(config.batch_window_ms, DEFAULT_BATCH_WINDOW_MS);
        assert!(config.enabled);
    }
}
