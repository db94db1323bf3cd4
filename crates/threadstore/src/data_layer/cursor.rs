//! Opaque pagination cursors.
//!
//! A cursor is the store's last-evaluated key serialized to JSON and
//! base64-encoded. It is a pure value with no server-side session: feeding an
//! unmodified cursor back resumes exactly where the previous page ended, and
//! a tampered or unparseable cursor fails with `InvalidCursor` rather than
//! silently restarting.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use threadstore_core::storage::{DataLayerError, Result};

use crate::store::LastKey;

/// Encode a continuation key into an opaque cursor token.
pub fn encode_cursor(key: &LastKey) -> Result<String> {
    let json = serde_json::to_vec(key).map_err(|e| DataLayerError::Serialization(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Decode a cursor token back into a continuation key.
pub fn decode_cursor(cursor: &str) -> Result<LastKey> {
    let invalid = |reason: String| DataLayerError::InvalidCursor(reason);

    let bytes = STANDARD
        .decode(cursor)
        .map_err(|e| invalid(format!("not base64: {e}")))?;
    let key: LastKey =
        serde_json::from_slice(&bytes).map_err(|e| invalid(format!("not a key map: {e}")))?;

    if key.is_empty() {
        return Err(invalid("empty key map".to_string()));
    }

    Ok(key)
}
