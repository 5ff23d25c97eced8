//! Centralized tuning constants for Gridlink progress logic.
//!
//! These values define the defaults for [`crate::config::EngineConfig`]. Keeping
//! them together ensures pacing can only be adjusted via code changes reviewed
//! in version control or through an explicit configuration file.

// Lives -------------------------------------------------------------------
pub const MAX_LIVES: u32 = 5;
pub const REGEN_INTERVAL_MS: i64 = 10 * 60 * 1000;

// Level cache -------------------------------------------------------------
pub const CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const PRELOAD_FORWARD: u32 = 3;
pub const PRELOAD_BACKWARD: u32 = 2;

// Storage -----------------------------------------------------------------
pub const STORAGE_PREFIX: &str = "gridlink";
pub(crate) const PROGRESS_KEY: &str = "progress";
pub(crate) const LIVES_KEY: &str = "lives";
pub(crate) const LEVEL_CACHE_KEY: &str = "level_cache";

/// Schema version stamped on every durable envelope.
pub(crate) const STORAGE_SCHEMA_VERSION: u32 = 1;

// Level identifiers -------------------------------------------------------
pub const LEVEL_ID_PREFIX: &str = "level_";
