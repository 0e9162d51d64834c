//! Issues and fixes produced by one check phase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fix::Fix;

/// Record type an [`Issue`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// User document / identity account.
    User,
    /// Provider profile document.
    ProviderProfile,
    /// Call document.
    Call,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::User => "user",
            EntityKind::ProviderProfile => "provider_profile",
            EntityKind::Call => "call",
        })
    }
}

/// One detected inconsistency, for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Entity type.
    pub entity: EntityKind,
    /// Id of the offending record.
    pub entity_id: String,
    /// Human-readable description.
    pub description: String,
}

impl Issue {
    /// Issue about `entity_id`.
    pub fn new(entity: EntityKind, entity_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            entity,
            entity_id: entity_id.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.entity, self.entity_id, self.description)
    }
}

/// Issues and fixes owned by a single phase until the orchestrator merges them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    /// Detected issues, in detection order.
    pub issues: Vec<Issue>,
    /// Proposed fixes, in detection order.
    pub fixes: Vec<Fix>,
}

impl Findings {
    /// Records an issue without a fix.
    pub fn issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Records an issue together with the fix that resolves it.
    pub fn issue_with_fix(&mut self, issue: Issue, fix: Fix) {
        self.issues.push(issue);
        self.fixes.push(fix);
    }

    /// Appends everything from `other`.
    pub fn extend(&mut self, other: Findings) {
        self.issues.extend(other.issues);
        self.fixes.extend(other.fixes);
    }
}
