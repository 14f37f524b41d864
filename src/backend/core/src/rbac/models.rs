//! Authorization data models: requirements, resources and per-requirement status.

use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Requirement
// ═══════════════════════════════════════════════════════════════════════════════

/// A capability being checked, such as "view profile".
///
/// Requirements carry no payload; two requirements are the same check iff
/// their names are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requirement(&'static str);

impl Requirement {
    /// View a user's profile.
    pub const VIEW_PROFILE: Self = Self("view_profile");

    /// Manage a lendable item.
    pub const MANAGE_ITEM: Self = Self("manage_item");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource
// ═══════════════════════════════════════════════════════════════════════════════

/// An authorization target. Loaded by the handler, never mutated here.
pub trait OwnedResource: Send + Sync {
    fn owner_id(&self) -> Uuid;
}

impl<T: OwnedResource + ?Sized> OwnedResource for &T {
    fn owner_id(&self) -> Uuid {
        (**self).owner_id()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolution state of one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Pending,
    Succeeded,
    /// Terminal; never reverts.
    Failed,
}

impl RequirementStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}
