//! Thread reassembly.
//!
//! Reconstructs a nested thread from the flat item set sharing one thread
//! partition key. Items dispatch on their sort-key prefix, not on a type
//! attribute, to stay consistent with the key design.

use threadstore_core::conversation::Thread;
use threadstore_core::storage::{DataLayerError, Result};

use super::conversions::{item_to_element, item_to_step, item_to_thread};
use super::keys;
use crate::store::RawItem;

/// Reassemble a thread from the raw items of its partition.
///
/// Steps are ordered chronologically by `createdAt`, with the step id as a
/// stable tie-breaker. Embedded feedback stays on its step. Elements are
/// carried on the thread, linked to their owning step via `forId`.
///
/// Returns `None` for an empty item set. Step or element items without a
/// thread header indicate a bug upstream and fail with `InvalidData` rather
/// than being repaired here.
pub fn assemble_thread(items: &[RawItem]) -> Result<Option<Thread>> {
    let mut header = None;
    let mut steps = Vec::new();
    let mut elements = Vec::new();

    for item in items {
        let Some(sort_key) = item.get(keys::ATTR_SK).and_then(|v| v.as_s().ok()) else {
            continue;
        };

        if sort_key == keys::SK_THREAD {
            header = Some(item_to_thread(item)?);
        } else if sort_key.starts_with(keys::STEP_PREFIX) {
            steps.push(item_to_step(item)?);
        } else if sort_key.starts_with(keys::ELEMENT_PREFIX) {
            elements.push(item_to_element(item)?);
        }
    }

    let Some(mut thread) = header else {
        if steps.is_empty() && elements.is_empty() {
            return Ok(None);
        }
        return Err(DataLayerError::InvalidData(
            "thread items present without a thread header".to_string(),
        ));
    };

    steps.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    thread.steps = steps;
    thread.elements = elements;
    Ok(Some(thread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;
    use chrono::{TimeZone, Utc};
    use threadstore_core::conversation::{Element, Step};

    use crate::data_layer::conversions::{element_to_item, step_to_item};

    fn header_item(thread_id: &str) -> RawItem {
        let mut item = RawItem::new();
        item.insert(
            "PK".to_string(),
            AttributeValue::S(format!("THREAD#{thread_id}")),
        );
        item.insert("SK".to_string(), AttributeValue::S("THREAD".to_string()));
        item.insert("id".to_string(), AttributeValue::S(thread_id.to_string()));
        item.insert(
            "createdAt".to_string(),
            AttributeValue::S("2023-01-01T00:00:00+00:00".to_string()),
        );
        item
    }

    fn step_item(thread_id: &str, step_id: &str, hour: u32) -> RawItem {
        let created_at = Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap();
        step_to_item(&Step::new(step_id, thread_id, "user_message", created_at))
    }

    #[test]
    fn test_empty_item_set_is_none() {
        assert_eq!(assemble_thread(&[]).unwrap(), None);
    }

    #[test]
    fn test_thread_with_zero_steps_has_empty_steps() {
        let thread = assemble_thread(&[header_item("t1")]).unwrap().unwrap();
        assert_eq!(thread.id, "t1");
        assert!(thread.steps.is_empty());
    }

    #[test]
    fn test_steps_ordered_chronologically() {
        let items = vec![
            step_item("t1", "s2", 2),
            header_item("t1"),
            step_item("t1", "s1", 1),
        ];

        let thread = assemble_thread(&items).unwrap().unwrap();

        let ids: Vec<&str> = thread.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_step_id() {
        let items = vec![
            step_item("t1", "sb", 1),
            step_item("t1", "sa", 1),
            header_item("t1"),
        ];

        let thread = assemble_thread(&items).unwrap().unwrap();

        let ids: Vec<&str> = thread.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sa", "sb"]);
    }

    #[test]
    fn test_elements_attached_to_thread() {
        let element = Element {
            id: "e1".to_string(),
            thread_id: "t1".to_string(),
            for_id: Some("s1".to_string()),
            element_type: "text".to_string(),
            name: "notes.txt".to_string(),
            mime: None,
            url: None,
            object_key: None,
        };
        let items = vec![
            header_item("t1"),
            step_item("t1", "s1", 1),
            element_to_item(&element),
        ];

        let thread = assemble_thread(&items).unwrap().unwrap();

        assert_eq!(thread.elements.len(), 1);
        assert_eq!(thread.elements[0].for_id.as_deref(), Some("s1"));
        assert_eq!(thread.elements[0].for_id, Some(thread.steps[0].id.clone()));
    }

    #[test]
    fn test_steps_without_header_fail() {
        let result = assemble_thread(&[step_item("t1", "s1", 1)]);
        assert!(matches!(result, Err(DataLayerError::InvalidData(_))));
    }
}
