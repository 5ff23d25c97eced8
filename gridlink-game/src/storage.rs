//! Versioned JSON envelopes over the durable key-value store.
//!
//! Every blob is written as `{ "version": N, "data": ... }`. Reads that hit a
//! missing key, an I/O failure, malformed JSON, the wrong shape or a foreign
//! version all collapse to `None` so callers can fall back to defaults.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::KeyValueStore;
use crate::constants::STORAGE_SCHEMA_VERSION;
use crate::error::GameResult;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

/// Serialize `value` into a versioned envelope string.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> GameResult<String> {
    let envelope = EnvelopeRef {
        version: STORAGE_SCHEMA_VERSION,
        data: value,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse an envelope string, rejecting foreign versions and bad shapes.
#[must_use]
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    match serde_json::from_str::<Envelope<T>>(raw) {
        Ok(envelope) if envelope.version == STORAGE_SCHEMA_VERSION => Some(envelope.data),
        Ok(envelope) => {
            warn!(
                "discarding stored blob with schema version {} (expected {STORAGE_SCHEMA_VERSION})",
                envelope.version
            );
            None
        }
        Err(err) => {
            warn!("discarding corrupt stored blob: {err}");
            None
        }
    }
}

/// Read and decode `key`; any failure is logged and reported as absence.
pub async fn read<T, K>(store: &K, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    K: KeyValueStore + ?Sized,
{
    match store.get(key).await {
        Ok(Some(raw)) => {
            let decoded = decode(&raw);
            if decoded.is_none() {
                warn!("stored value under {key} is unreadable; using defaults");
            }
            decoded
        }
        Ok(None) => None,
        Err(err) => {
            warn!("failed to read {key}: {err}");
            None
        }
    }
}

/// Encode and write `value` under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the underlying write fails.
pub async fn write<T, K>(store: &K, key: &str, value: &T) -> GameResult<()>
where
    T: Serialize + Sync,
    K: KeyValueStore + ?Sized,
{
    let raw = encode(value)?;
    store.set(key, raw).await
}
