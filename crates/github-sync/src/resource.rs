//! # Resource kinds
//!
//! Labels and milestones share one reconcile procedure but differ in key
//! field, mutable fields, equality rule and REST endpoints. Each kind
//! implements [`Resource`], which is the descriptor the reconciler and the
//! client are generic over.

use std::fmt::{self, Debug, Display};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of repository metadata being synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Label,
    Milestone,
}

impl ResourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Milestone => "milestone",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor for one syncable resource kind.
pub trait Resource: Debug + Clone + Send + Sync + DeserializeOwned + 'static {
    /// Forge identifier used to address updates
    type Id: Debug + Display + Clone + Send + Sync;

    const KIND: ResourceKind;

    /// Path segment of the collection under `/repos/{owner}/{repo}/`
    const COLLECTION: &'static str;

    /// Extra query parameters for listing
    const LIST_QUERY: &'static [(&'static str, &'static str)] = &[];

    /// Unique key within a repository (label name, milestone title)
    fn key(&self) -> &str;

    /// Identifier of an existing resource on the forge
    fn id(&self) -> Self::Id;

    /// Whether `self` and `other` already agree on every mutable field.
    fn is_equivalent(&self, other: &Self) -> bool;

    /// Human-readable `old->new` summary of the mutable fields.
    fn describe_changes(&self, existing: &Self) -> String;

    /// Body of a create call: key plus the mutable fields that are set.
    /// Absent fields are left out.
    fn create_body(&self) -> Value;

    /// Body of an update call: every mutable field, absent ones as `null`
    /// so that a value the source lacks is cleared on the target.
    fn update_body(&self) -> Value;
}

/// Repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Resource for Label {
    type Id = String;

    const KIND: ResourceKind = ResourceKind::Label;
    const COLLECTION: &'static str = "labels";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> String {
        self.name.clone()
    }

    // Absent and empty descriptions are compared as given by the forge.
    fn is_equivalent(&self, other: &Self) -> bool {
        self.color == other.color && self.description == other.description
    }

    fn describe_changes(&self, existing: &Self) -> String {
        format!(
            "{}->{}, {}->{}",
            existing.color,
            self.color,
            display_opt(existing.description.as_deref()),
            display_opt(self.description.as_deref())
        )
    }

    fn create_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::from(self.name.as_str()));
        body.insert("color".to_string(), Value::from(self.color.as_str()));
        insert_present(&mut body, "description", self.description.as_deref());
        Value::Object(body)
    }

    // An absent description is sent as null so the target's is cleared.
    fn update_body(&self) -> Value {
        serde_json::json!({
            "color": self.color,
            "description": self.description,
        })
    }
}

/// Open/closed state of a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    #[default]
    Open,
    Closed,
}

/// Repository milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO-8601 timestamp as returned by the forge
    #[serde(default)]
    pub due_on: Option<String>,
    /// Forge-assigned number, only meaningful for existing milestones
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub state: MilestoneState,
}

impl Resource for Milestone {
    type Id = u64;

    const KIND: ResourceKind = ResourceKind::Milestone;
    const COLLECTION: &'static str = "milestones";
    const LIST_QUERY: &'static [(&'static str, &'static str)] = &[("state", "all")];

    fn key(&self) -> &str {
        &self.title
    }

    fn id(&self) -> u64 {
        self.number
    }

    fn is_equivalent(&self, other: &Self) -> bool {
        self.description == other.description
            && same_due_date(self.due_on.as_deref(), other.due_on.as_deref())
    }

    fn describe_changes(&self, existing: &Self) -> String {
        format!(
            "{}->{}, {}->{}",
            display_opt(existing.due_on.as_deref()),
            display_opt(self.due_on.as_deref()),
            display_opt(existing.description.as_deref()),
            display_opt(self.description.as_deref())
        )
    }

    fn create_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("title".to_string(), Value::from(self.title.as_str()));
        insert_present(&mut body, "due_on", self.due_on.as_deref());
        insert_present(&mut body, "description", self.description.as_deref());
        Value::Object(body)
    }

    // Absent fields are sent as null so the target's values are cleared.
    fn update_body(&self) -> Value {
        serde_json::json!({
            "due_on": self.due_on,
            "description": self.description,
        })
    }
}

/// Compare due dates at day granularity (`YYYY-MM-DD` prefix).
///
/// Both present compares the date part only; exactly one present is a
/// difference; neither present is equal.
#[must_use]
pub fn same_due_date(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => date_part(a) == date_part(b),
        (None, None) => true,
        _ => false,
    }
}

fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

fn insert_present(body: &mut Map<String, Value>, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        body.insert(field.to_string(), Value::from(value));
    }
}

fn display_opt(value: Option<&str>) -> &str {
    value.unwrap_or("<none>")
}
