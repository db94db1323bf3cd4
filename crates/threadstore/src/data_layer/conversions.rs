//! Attribute conversion functions.
//!
//! Pure functions for converting between raw attribute-value maps and domain
//! types. Optional fields are mapped by omission, not null values, so partial
//! encodes never clobber unrelated attributes on update. Decoding tolerates
//! unknown attributes and defaults missing optional ones to empty containers.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde_json::Value;
use threadstore_core::conversation::{Element, Feedback, Metadata, PersistedUser, Step, Thread};
use threadstore_core::storage::{DataLayerError, Result};

use super::keys;
use crate::store::RawItem;

// ============================================================================
// User conversions
// ============================================================================

/// Convert a persisted user to a raw item.
pub fn user_to_item(user: &PersistedUser) -> RawItem {
    let key = keys::user_key(&user.identifier);

    let mut item = RawItem::new();
    item.insert(keys::ATTR_PK.to_string(), AttributeValue::S(key.pk));
    item.insert(keys::ATTR_SK.to_string(), AttributeValue::S(key.sk));

    item.insert("id".to_string(), AttributeValue::S(user.id.clone()));
    item.insert(
        "identifier".to_string(),
        AttributeValue::S(user.identifier.clone()),
    );
    item.insert("metadata".to_string(), metadata_to_attr(&user.metadata));
    item.insert(
        "createdAt".to_string(),
        AttributeValue::S(user.created_at.to_rfc3339()),
    );

    item
}

/// Convert a raw item to a persisted user.
pub fn item_to_user(item: &RawItem) -> Result<PersistedUser> {
    Ok(PersistedUser {
        id: get_string(item, "id")?,
        identifier: get_string(item, "identifier")?,
        metadata: get_metadata(item, "metadata"),
        created_at: get_datetime(item, "createdAt")?,
    })
}

// ============================================================================
// Thread conversions
// ============================================================================

/// Convert a raw item to a thread shell (no steps or elements attached).
///
/// Index-projected items may omit `id` and `createdAt`; both fall back to the
/// key attributes so a listing page still decodes.
pub fn item_to_thread(item: &RawItem) -> Result<Thread> {
    let id = match get_optional_string(item, "id") {
        Some(id) => id,
        None => thread_id_from_pk(item)?,
    };

    let created_at = get_optional_datetime(item, "createdAt")?
        .or_else(|| created_at_from_user_thread_sk(item))
        .unwrap_or(DateTime::UNIX_EPOCH);

    Ok(Thread {
        id,
        name: get_optional_string(item, "name"),
        user_id: get_optional_string(item, "userId"),
        created_at,
        metadata: get_metadata(item, "metadata"),
        tags: get_tags(item, "tags"),
        steps: Vec::new(),
        elements: Vec::new(),
    })
}

fn thread_id_from_pk(item: &RawItem) -> Result<String> {
    get_string(item, keys::ATTR_PK)?
        .strip_prefix(keys::THREAD_PREFIX)
        .map(str::to_string)
        .ok_or_else(|| {
            DataLayerError::InvalidData("thread item with non-thread partition key".to_string())
        })
}

fn created_at_from_user_thread_sk(item: &RawItem) -> Option<DateTime<Utc>> {
    let sk = get_optional_string(item, keys::ATTR_USER_THREAD_SK)?;
    let ts = sk.strip_prefix(keys::TS_PREFIX)?;
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Step conversions
// ============================================================================

/// Convert a step to a raw item.
pub fn step_to_item(step: &Step) -> RawItem {
    let key = keys::step_key(&step.thread_id, &step.id);

    let mut item = RawItem::new();
    item.insert(keys::ATTR_PK.to_string(), AttributeValue::S(key.pk));
    item.insert(keys::ATTR_SK.to_string(), AttributeValue::S(key.sk));

    item.insert("id".to_string(), AttributeValue::S(step.id.clone()));
    item.insert(
        "threadId".to_string(),
        AttributeValue::S(step.thread_id.clone()),
    );
    item.insert(
        "type".to_string(),
        AttributeValue::S(step.step_type.clone()),
    );
    if let Some(name) = &step.name {
        item.insert("name".to_string(), AttributeValue::S(name.clone()));
    }
    if let Some(input) = &step.input {
        item.insert("input".to_string(), AttributeValue::S(input.clone()));
    }
    if let Some(output) = &step.output {
        item.insert("output".to_string(), AttributeValue::S(output.clone()));
    }
    item.insert(
        "createdAt".to_string(),
        AttributeValue::S(step.created_at.to_rfc3339()),
    );
    item.insert("metadata".to_string(), metadata_to_attr(&step.metadata));
    item.insert("tags".to_string(), tags_to_attr(&step.tags));
    if let Some(feedback) = &step.feedback {
        item.insert("feedback".to_string(), feedback_to_attr(feedback));
    }

    item
}

/// Convert a raw item to a step.
pub fn item_to_step(item: &RawItem) -> Result<Step> {
    let id = get_string(item, "id")?;
    let thread_id = match get_optional_string(item, "threadId") {
        Some(thread_id) => thread_id,
        None => thread_id_from_pk(item)?,
    };

    Ok(Step {
        id,
        thread_id,
        name: get_optional_string(item, "name"),
        step_type: get_optional_string(item, "type").unwrap_or_default(),
        input: get_optional_string(item, "input"),
        output: get_optional_string(item, "output"),
        created_at: get_optional_datetime(item, "createdAt")?.unwrap_or(DateTime::UNIX_EPOCH),
        metadata: get_metadata(item, "metadata"),
        tags: get_tags(item, "tags"),
        feedback: item.get("feedback").and_then(attr_to_feedback),
    })
}

// ============================================================================
// Feedback conversions
// ============================================================================

/// Encode feedback as the nested map stored on its owning step.
pub fn feedback_to_attr(feedback: &Feedback) -> AttributeValue {
    let mut map = RawItem::new();
    map.insert(
        "forId".to_string(),
        AttributeValue::S(feedback.for_id.clone()),
    );
    map.insert(
        "threadId".to_string(),
        AttributeValue::S(feedback.thread_id.clone()),
    );
    map.insert(
        "value".to_string(),
        AttributeValue::N(feedback.value.to_string()),
    );
    if let Some(comment) = &feedback.comment {
        map.insert("comment".to_string(), AttributeValue::S(comment.clone()));
    }
    AttributeValue::M(map)
}

/// Decode the embedded feedback attribute. Returns `None` for anything that
/// is not a well-formed feedback map.
pub fn attr_to_feedback(attr: &AttributeValue) -> Option<Feedback> {
    let map = attr.as_m().ok()?;
    Some(Feedback {
        for_id: get_optional_string(map, "forId")?,
        thread_id: get_optional_string(map, "threadId")?,
        value: map.get("value")?.as_n().ok()?.parse().ok()?,
        comment: get_optional_string(map, "comment"),
    })
}

// ============================================================================
// Element conversions
// ============================================================================

/// Convert an element to a raw item. Only metadata and the blob pointer are
/// stored; the payload lives in external blob storage.
pub fn element_to_item(element: &Element) -> RawItem {
    let key = keys::element_key(&element.thread_id, &element.id);

    let mut item = RawItem::new();
    item.insert(keys::ATTR_PK.to_string(), AttributeValue::S(key.pk));
    item.insert(keys::ATTR_SK.to_string(), AttributeValue::S(key.sk));

    item.insert("id".to_string(), AttributeValue::S(element.id.clone()));
    item.insert(
        "threadId".to_string(),
        AttributeValue::S(element.thread_id.clone()),
    );
    item.insert(
        "type".to_string(),
        AttributeValue::S(element.element_type.clone()),
    );
    item.insert("name".to_string(), AttributeValue::S(element.name.clone()));
    if let Some(for_id) = &element.for_id {
        item.insert("forId".to_string(), AttributeValue::S(for_id.clone()));
    }
    if let Some(mime) = &element.mime {
        item.insert("mime".to_string(), AttributeValue::S(mime.clone()));
    }
    if let Some(url) = &element.url {
        item.insert("url".to_string(), AttributeValue::S(url.clone()));
    }
    if let Some(object_key) = &element.object_key {
        item.insert(
            "objectKey".to_string(),
            AttributeValue::S(object_key.clone()),
        );
    }

    item
}

/// Convert a raw item to an element.
pub fn item_to_element(item: &RawItem) -> Result<Element> {
    let id = get_string(item, "id")?;
    let thread_id = match get_optional_string(item, "threadId") {
        Some(thread_id) => thread_id,
        None => thread_id_from_pk(item)?,
    };

    Ok(Element {
        id,
        thread_id,
        for_id: get_optional_string(item, "forId"),
        element_type: get_optional_string(item, "type").unwrap_or_default(),
        name: get_optional_string(item, "name").unwrap_or_default(),
        mime: get_optional_string(item, "mime"),
        url: get_optional_string(item, "url"),
        object_key: get_optional_string(item, "objectKey"),
    })
}

// ============================================================================
// JSON <-> AttributeValue
// ============================================================================

/// Convert a JSON value to its attribute-value wrapper.
pub fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

/// Convert an attribute value back to JSON. Unknown attribute kinds decode to
/// null rather than failing.
pub fn attr_to_json(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| n.parse::<f64>().map(Value::from))
            .unwrap_or(Value::Null),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => Value::Array(values.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attr_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(values) => Value::Array(
            values.iter().cloned().map(Value::String).collect(),
        ),
        _ => Value::Null,
    }
}

/// Encode a metadata map as a nested map attribute.
pub fn metadata_to_attr(metadata: &Metadata) -> AttributeValue {
    AttributeValue::M(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), json_to_attr(v)))
            .collect(),
    )
}

/// Encode a tag list as a list attribute.
pub fn tags_to_attr(tags: &[String]) -> AttributeValue {
    AttributeValue::L(
        tags.iter()
            .map(|tag| AttributeValue::S(tag.clone()))
            .collect(),
    )
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get a required string attribute.
fn get_string(item: &RawItem, key: &str) -> Result<String> {
    get_optional_string(item, key)
        .ok_or_else(|| DataLayerError::InvalidData(format!("Missing or invalid field: {key}")))
}

/// Get an optional string attribute.
fn get_optional_string(item: &RawItem, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

/// Get a required datetime attribute (RFC 3339 format).
fn get_datetime(item: &RawItem, key: &str) -> Result<DateTime<Utc>> {
    get_optional_datetime(item, key)?
        .ok_or_else(|| DataLayerError::InvalidData(format!("Missing or invalid field: {key}")))
}

/// Get an optional datetime attribute. Present-but-unparseable is an error.
fn get_optional_datetime(item: &RawItem, key: &str) -> Result<Option<DateTime<Utc>>> {
    match get_optional_string(item, key) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| DataLayerError::InvalidData(format!("Invalid datetime {key}: {e}"))),
    }
}

/// Get a metadata map, defaulting to empty when absent.
fn get_metadata(item: &RawItem, key: &str) -> Metadata {
    let Some(attr) = item.get(key) else {
        return Metadata::new();
    };
    match attr_to_json(attr) {
        Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

/// Get a tag list, defaulting to empty when absent.
fn get_tags(item: &RawItem, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}
