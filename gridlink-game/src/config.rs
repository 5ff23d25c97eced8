//! Engine tuning loaded from JSON, with every field optional.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CACHE_TTL_MS, DEFAULT_PAGE_SIZE, MAX_LIVES, PRELOAD_BACKWARD, PRELOAD_FORWARD,
    REGEN_INTERVAL_MS, STORAGE_PREFIX,
};

/// Configuration shared by the services built by [`crate::GridlinkEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of levels materialized per window.
    pub page_size: u32,
    /// Age after which a cached level is refetched.
    pub cache_ttl_ms: i64,
    pub max_lives: u32,
    /// One life is restored per elapsed interval.
    pub regen_interval_ms: i64,
    pub preload_forward: u32,
    pub preload_backward: u32,
    /// Namespace for every durable key.
    pub storage_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl_ms: CACHE_TTL_MS,
            max_lives: MAX_LIVES,
            regen_interval_ms: REGEN_INTERVAL_MS,
            preload_forward: PRELOAD_FORWARD,
            preload_backward: PRELOAD_BACKWARD,
            storage_prefix: STORAGE_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::sanitized)
    }

    /// Clamp values that would make the services misbehave.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.regen_interval_ms = self.regen_interval_ms.max(1);
        self.cache_ttl_ms = self.cache_ttl_ms.max(0);
        if self.storage_prefix.trim().is_empty() {
            self.storage_prefix = STORAGE_PREFIX.to_string();
        }
        self
    }

    pub(crate) fn key(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.storage_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "page_size": 10 }"#).unwrap();
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.max_lives, 5);
        assert_eq!(cfg.regen_interval_ms, 600_000);
        assert_eq!(cfg.cache_ttl_ms, 86_400_000);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let cfg = EngineConfig::from_json(r#"{ "page_size": 0, "storage_prefix": " " }"#).unwrap();
        assert_eq!(cfg.page_size, 1);
        assert_eq!(cfg.storage_prefix, "gridlink");
    }

    #[test]
    fn keys_are_namespaced() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.key("progress"), "gridlink.progress");
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(EngineConfig::from_json(r#"{ "page_size": "big" }"#).is_err());
    }
}
