use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata attached to users, threads and steps.
///
/// Stored as a nested map attribute and round-tripped losslessly.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A user as supplied by the host application.
///
/// The identifier is externally assigned and immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub identifier: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl User {
    /// Creates a user with the given identifier and empty metadata.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: Metadata::new(),
        }
    }

    /// Sets the metadata for this user.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A user as stored in the table, with its generated id and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedUser {
    pub id: String,
    pub identifier: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl PersistedUser {
    /// Creates a persisted user from an incoming user, generating a fresh id.
    pub fn from_user(user: &User, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identifier: user.identifier.clone(),
            metadata: user.metadata.clone(),
            created_at,
        }
    }
}

/// A conversation thread owning zero or more steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub name: Option<String>,
    /// Owner reference. Non-owning back-link to the user item.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Thread {
    /// Creates an empty thread shell with the given id.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: None,
            user_id: None,
            created_at,
            metadata: Metadata::new(),
            tags: Vec::new(),
            steps: Vec::new(),
            elements: Vec::new(),
        }
    }
}

/// A sparse set of thread fields for partial updates.
///
/// Only supplied fields are written; unsupplied fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadUpdate {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub metadata: Option<Metadata>,
    pub tags: Option<Vec<String>>,
}

impl ThreadUpdate {
    /// Returns true when no field is supplied.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.user_id.is_none()
            && self.metadata.is_none()
            && self.tags.is_none()
    }
}

/// A single turn within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub thread_id: String,
    pub name: Option<String>,
    /// Step kind as reported by the host application, e.g. "user_message".
    /// Kept as a plain string so unknown kinds survive a round trip.
    #[serde(rename = "type")]
    pub step_type: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
    pub feedback: Option<Feedback>,
}

impl Step {
    /// Creates a step with the given identity and kind.
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        step_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            name: None,
            step_type: step_type.into(),
            input: None,
            output: None,
            created_at,
            metadata: Metadata::new(),
            tags: Vec::new(),
            feedback: None,
        }
    }
}

/// User feedback on a step.
///
/// Never stored as a standalone item; lives embedded on its owning step and is
/// addressed by the composite handle `THREAD#<thread_id>::STEP#<for_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Id of the step this feedback is attached to.
    pub for_id: String,
    pub thread_id: String,
    pub value: i64,
    pub comment: Option<String>,
}

/// Metadata for a binary payload attached to a step.
///
/// The payload itself lives in external blob storage; only the url and object
/// key are stored in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub thread_id: String,
    /// Id of the step this element is attached to.
    pub for_id: Option<String>,
    #[serde(rename = "type")]
    pub element_type: String,
    pub name: String,
    pub mime: Option<String>,
    pub url: Option<String>,
    pub object_key: Option<String>,
}
