//! Typed repair instructions.
//!
//! A [`Fix`] is a target id, a [`Priority`] and one [`FixKind`]. The kind set
//! is closed: every variant carries its own payload and the applier matches on
//! it exhaustively, so a new kind cannot be added without deciding how it is
//! written. On the wire (plan files) a fix is a flat JSON object tagged by
//! `type`:
//!
//! ```json
//! {"targetId": "u1", "priority": "high", "type": "syncEmail", "authEmail": "a@x.com"}
//! ```

pub mod apply;
pub mod plan;

use serde::{Deserialize, Serialize};

use crate::records::{ProviderKind, Role};

pub use apply::{ApplySummary, FixApplier, FixError, prioritized, write_ops};
pub use plan::{Plan, PlanEntry, load_plan, write_plan};

/// Rating given to a synthesized provider profile.
pub const DEFAULT_PROFILE_RATING: f64 = 4.5;
/// Status given to a call whose status is missing.
pub const DEFAULT_CALL_STATUS: &str = "pending";

/// Application order of fixes; higher goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Cosmetic field gaps.
    Low,
    /// Orphans and type drift.
    Medium,
    /// Missing records and identity drift.
    High,
}

impl Priority {
    /// Sort weight: high 3, medium 2, low 1.
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// One repair instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Id of the document the fix writes to.
    pub target_id: String,
    /// Application order.
    pub priority: Priority,
    /// What to write.
    #[serde(flatten)]
    pub kind: FixKind,
}

impl Fix {
    /// Fix with the kind's default priority.
    pub fn new(target_id: impl Into<String>, kind: FixKind) -> Self {
        Self {
            target_id: target_id.into(),
            priority: kind.default_priority(),
            kind,
        }
    }

    /// The wire `type` name.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Every repair the reconciler knows how to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FixKind {
    /// Create the user document for an identity that has none.
    CreateUserDoc(NewUserDoc),
    /// Delete a user document whose identity is gone.
    DeleteOrphanDoc,
    /// Fill in missing user fields.
    FixUserFields(UserFieldPatch),
    /// Overwrite the user's email with the identity provider's.
    SyncEmail {
        /// Email held by the identity provider.
        auth_email: String,
    },
    /// Create the provider profile for a lawyer or expat.
    #[serde(rename = "createSOSProfile")]
    CreateSosProfile(NewProviderProfile),
    /// Delete a provider profile whose owner is not a provider.
    #[serde(rename = "deleteOrphanSOS")]
    DeleteOrphanSos,
    /// Set the profile type to the owner's role.
    #[serde(rename = "syncSOSType")]
    SyncSosType {
        /// Type derived from the owning user's role.
        expected_type: ProviderKind,
    },
    /// Delete a call whose client or provider does not exist.
    DeleteOrphanCall {
        /// Which party is missing.
        reason: OrphanReason,
    },
    /// Fill in missing call fields.
    FixCallFields(CallFieldPatch),
}

impl FixKind {
    /// Priority used when a check emits this kind.
    pub fn default_priority(&self) -> Priority {
        match self {
            FixKind::CreateUserDoc(_)
            | FixKind::SyncEmail { .. }
            | FixKind::CreateSosProfile(_)
            | FixKind::DeleteOrphanCall { .. } => Priority::High,
            FixKind::DeleteOrphanDoc | FixKind::DeleteOrphanSos | FixKind::SyncSosType { .. } => {
                Priority::Medium
            }
            FixKind::FixUserFields(_) | FixKind::FixCallFields(_) => Priority::Low,
        }
    }

    /// The wire `type` name.
    pub fn type_name(&self) -> &'static str {
        match self {
            FixKind::CreateUserDoc(_) => "createUserDoc",
            FixKind::DeleteOrphanDoc => "deleteOrphanDoc",
            FixKind::FixUserFields(_) => "fixUserFields",
            FixKind::SyncEmail { .. } => "syncEmail",
            FixKind::CreateSosProfile(_) => "createSOSProfile",
            FixKind::DeleteOrphanSos => "deleteOrphanSOS",
            FixKind::SyncSosType { .. } => "syncSOSType",
            FixKind::DeleteOrphanCall { .. } => "deleteOrphanCall",
            FixKind::FixCallFields(_) => "fixCallFields",
        }
    }
}

/// User document synthesized from an identity account.
///
/// `createdAt` is stamped when the fix is applied so that two scans of the
/// same data produce equal fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserDoc {
    /// Identity email, when the account has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Always [`Role::Client`] for synthesized users.
    pub role: Role,
    /// First display-name token.
    pub first_name: String,
    /// Remaining display-name tokens.
    pub last_name: String,
    /// `first last`.
    pub display_name: String,
    /// Account is usable.
    pub is_active: bool,
    /// Account passed moderation.
    pub is_approved: bool,
    /// Identity documents checked.
    pub is_verified: bool,
}

impl NewUserDoc {
    /// Client user with names split from `display_name`.
    pub fn client(email: Option<&str>, first_name: String, last_name: String) -> Self {
        Self {
            email: email.map(str::to_string),
            role: Role::Client,
            display_name: format!("{first_name} {last_name}"),
            first_name,
            last_name,
            is_active: true,
            is_approved: true,
            is_verified: false,
        }
    }
}

/// Defaults for user fields found missing. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFieldPatch {
    /// Identity email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Fallback role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// From the identity display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// From the identity display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Stamp `createdAt` with the apply time.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub set_created_at: bool,
}

impl UserFieldPatch {
    /// `true` when applying the patch would write nothing.
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.role.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && !self.set_created_at
    }
}

/// Provider profile synthesized for a lawyer or expat without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProviderProfile {
    /// Written as the profile's `type`.
    pub profile_type: ProviderKind,
    /// Owner's full name.
    pub full_name: String,
    /// Owner's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Starting rating.
    pub rating: f64,
    /// Starting review count.
    pub review_count: u32,
    /// Call price from the role price table.
    pub price: u32,
    /// Profile is listed.
    pub is_active: bool,
}

/// Defaults for call fields found missing. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFieldPatch {
    /// `<provider role>_call`, or `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// [`DEFAULT_CALL_STATUS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Provider's price table entry, or 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u32>,
}

impl CallFieldPatch {
    /// `true` when applying the patch would write nothing.
    pub fn is_empty(&self) -> bool {
        self.service_type.is_none() && self.status.is_none() && self.price.is_none()
    }
}

/// Why a call is an orphan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrphanReason {
    /// `clientId` names no user.
    #[serde(rename = "Missing client")]
    MissingClient,
    /// `providerId` names no user.
    #[serde(rename = "Missing provider")]
    MissingProvider,
}

impl OrphanReason {
    /// Text used in issues and plan files.
    pub fn as_str(self) -> &'static str {
        match self {
            OrphanReason::MissingClient => "Missing client",
            OrphanReason::MissingProvider => "Missing provider",
        }
    }
}
