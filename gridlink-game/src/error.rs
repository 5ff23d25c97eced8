//! Error taxonomy shared by the core services and their collaborators.

use thiserror::Error;

/// Errors surfaced by the progress and level engine.
///
/// Transient persistence failures and corrupt durable state are recovered
/// inside the services and never reach callers; what remains here is what a
/// caller can act on (retry a fetch, show a "no lives" prompt).
#[derive(Debug, Error)]
pub enum GameError {
    #[error("level {number} was not found")]
    LevelNotFound { number: u32 },
    #[error("level store error: {0}")]
    Source(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("account store error: {0}")]
    Account(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no lives remaining")]
    NoLivesRemaining,
    #[error("level {number} is outside the known range 1..={max}")]
    LevelOutOfRange { number: u32, max: u32 },
}

impl GameError {
    /// Whether the failure is worth offering a retry affordance for.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LevelNotFound { .. } | Self::Source(_) | Self::Storage(_) | Self::Account(_)
        )
    }
}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_io_failures_only() {
        assert!(GameError::Source("offline".into()).is_retryable());
        assert!(GameError::LevelNotFound { number: 3 }.is_retryable());
        assert!(!GameError::NoLivesRemaining.is_retryable());
        assert!(!GameError::LevelOutOfRange { number: 9, max: 4 }.is_retryable());
    }

    #[test]
    fn messages_name_the_level() {
        let err = GameError::LevelNotFound { number: 42 };
        assert_eq!(err.to_string(), "level 42 was not found");
    }
}
