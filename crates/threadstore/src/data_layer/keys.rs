//! Key derivation functions.
//!
//! Pure functions for deriving partition and sort keys following the
//! single-table design. All functions are sync and have no side effects.
//!
//! Identifiers are assumed never to contain the separator characters `#` and
//! `::`; this is an external invariant, not validated here.

use chrono::{DateTime, Utc};
use threadstore_core::storage::{DataLayerError, Result};

use crate::store::ItemKey;

// ============================================================================
// Key prefixes and fixed sort keys
// ============================================================================

pub const USER_PREFIX: &str = "USER#";
pub const THREAD_PREFIX: &str = "THREAD#";
pub const STEP_PREFIX: &str = "STEP#";
pub const ELEMENT_PREFIX: &str = "ELEMENT#";
pub const TS_PREFIX: &str = "TS#";

pub const SK_USER: &str = "USER";
pub const SK_THREAD: &str = "THREAD";

/// Delimiter joining the thread and step parts of a feedback handle.
pub const FEEDBACK_DELIMITER: &str = "::";

// ============================================================================
// Attribute names
// ============================================================================

pub const ATTR_PK: &str = "PK";
pub const ATTR_SK: &str = "SK";
pub const ATTR_USER_THREAD_PK: &str = "UserThreadPK";
pub const ATTR_USER_THREAD_SK: &str = "UserThreadSK";

// ============================================================================
// Primary keys
// ============================================================================

/// Generate the primary key for a User.
///
/// Pattern: `USER#<identifier>` / `USER`
pub fn user_key(identifier: &str) -> ItemKey {
    ItemKey::new(format!("{USER_PREFIX}{identifier}"), SK_USER)
}

/// Generate the primary key for a Thread header.
///
/// Pattern: `THREAD#<thread_id>` / `THREAD`
pub fn thread_key(thread_id: &str) -> ItemKey {
    ItemKey::new(format!("{THREAD_PREFIX}{thread_id}"), SK_THREAD)
}

/// Generate the primary key for a Step.
///
/// Pattern: `THREAD#<thread_id>` / `STEP#<step_id>`
///
/// Steps share their thread's partition key so one range query retrieves a
/// thread with all its steps.
pub fn step_key(thread_id: &str, step_id: &str) -> ItemKey {
    ItemKey::new(
        format!("{THREAD_PREFIX}{thread_id}"),
        format!("{STEP_PREFIX}{step_id}"),
    )
}

/// Generate the primary key for an Element.
///
/// Pattern: `THREAD#<thread_id>` / `ELEMENT#<element_id>`
pub fn element_key(thread_id: &str, element_id: &str) -> ItemKey {
    ItemKey::new(
        format!("{THREAD_PREFIX}{thread_id}"),
        format!("{ELEMENT_PREFIX}{element_id}"),
    )
}

// ============================================================================
// Feedback handles
// ============================================================================

/// Build the composite feedback handle for a step.
///
/// Pattern: `THREAD#<thread_id>::STEP#<step_id>`
///
/// This exact shape is part of the public contract; callers store and
/// resubmit it.
pub fn feedback_id(thread_id: &str, step_id: &str) -> String {
    format!("{THREAD_PREFIX}{thread_id}{FEEDBACK_DELIMITER}{STEP_PREFIX}{step_id}")
}

/// Parse a feedback handle back into its `(thread_id, step_id)` parts.
pub fn parse_feedback_id(feedback_id: &str) -> Result<(String, String)> {
    let malformed = || DataLayerError::MalformedIdentifier(feedback_id.to_string());

    let (thread_part, step_part) = feedback_id
        .split_once(FEEDBACK_DELIMITER)
        .ok_or_else(malformed)?;

    let thread_id = thread_part.strip_prefix(THREAD_PREFIX).ok_or_else(malformed)?;
    let step_id = step_part.strip_prefix(STEP_PREFIX).ok_or_else(malformed)?;

    if thread_id.is_empty() || step_id.is_empty() {
        return Err(malformed());
    }

    Ok((thread_id.to_string(), step_id.to_string()))
}

// ============================================================================
// UserThread index keys
// ============================================================================

/// Generate the UserThread index partition key for a thread owner.
///
/// Pattern: `USER#<user_id>`
pub fn user_thread_pk(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Generate the UserThread index sort key for a thread.
///
/// Pattern: `TS#<rfc3339 createdAt>`
///
/// RFC 3339 timestamps sort lexicographically, so a descending range scan of
/// this key yields newest-first thread listing.
pub fn user_thread_sk(created_at: &DateTime<Utc>) -> String {
    format!("{TS_PREFIX}{}", created_at.to_rfc3339())
}
