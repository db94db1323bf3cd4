//! Partial-update planning.
//!
//! An [`UpdatePlan`] is a list of attributes to set and a list of attributes
//! to remove, never a full-item overwrite. The DynamoDB backend renders a
//! plan into an `UpdateExpression` with `#name`/`:value` placeholders; the
//! in-memory backend applies it structurally.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

/// An attribute-scoped update: SET some attributes, REMOVE others.
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    sets: Vec<(String, AttributeValue)>,
    removes: Vec<String>,
}

impl UpdatePlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute to set with the given value.
    pub fn set(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.sets.push((name.into(), value));
        self
    }

    /// Adds an attribute to remove.
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.removes.push(name.into());
        self
    }

    /// Returns true when the plan carries no clauses.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.removes.is_empty()
    }

    /// Attributes to set, in insertion order.
    pub fn sets(&self) -> &[(String, AttributeValue)] {
        &self.sets
    }

    /// Attributes to remove, in insertion order.
    pub fn removes(&self) -> &[String] {
        &self.removes
    }

    /// Renders the `UpdateExpression` string, e.g.
    /// `SET #name = :name REMOVE #feedback`.
    pub fn update_expression(&self) -> String {
        let mut expression = String::new();

        if !self.sets.is_empty() {
            let clauses: Vec<String> = self
                .sets
                .iter()
                .map(|(name, _)| format!("#{name} = :{name}"))
                .collect();
            expression.push_str("SET ");
            expression.push_str(&clauses.join(", "));
        }

        if !self.removes.is_empty() {
            if !expression.is_empty() {
                expression.push(' ');
            }
            let clauses: Vec<String> =
                self.removes.iter().map(|name| format!("#{name}")).collect();
            expression.push_str("REMOVE ");
            expression.push_str(&clauses.join(", "));
        }

        expression
    }

    /// Placeholder-to-attribute name mapping for the rendered expression.
    pub fn attribute_names(&self) -> HashMap<String, String> {
        self.sets
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.removes.iter().map(String::as_str))
            .map(|name| (format!("#{name}"), name.to_string()))
            .collect()
    }

    /// Placeholder-to-value mapping for the rendered expression.
    ///
    /// `None` when the plan has no SET clauses; DynamoDB rejects an empty
    /// `ExpressionAttributeValues` map.
    pub fn attribute_values(&self) -> Option<HashMap<String, AttributeValue>> {
        if self.sets.is_empty() {
            return None;
        }
        Some(
            self.sets
                .iter()
                .map(|(name, value)| (format!(":{name}"), value.clone()))
                .collect(),
        )
    }
}
