//! In-memory lending directory.
//!
//! Stands in for the persistence layer: handlers load users and items from
//! here and pass them to the authorization engine as owned resources.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{LendError, Result};
use crate::rbac::OwnedResource;

/// Longest accepted item name, in characters.
pub const MAX_ITEM_NAME_LEN: usize = 120;

/// Longest accepted item description, in characters.
pub const MAX_ITEM_DESCRIPTION_LEN: usize = 2_000;

/// A member's profile. Owned by the member themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl OwnedResource for UserProfile {
    fn owner_id(&self) -> Uuid {
        self.id
    }
}

/// A lendable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OwnedResource for Item {
    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

/// Request body for registering an item.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

impl CreateItem {
    /// Check the request, collecting every violation.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("name is required".to_string());
        } else if name.chars().count() > MAX_ITEM_NAME_LEN {
            errors.push(format!(
                "name must be at most {} characters",
                MAX_ITEM_NAME_LEN
            ));
        }

        if let Some(ref description) = self.description {
            if description.chars().count() > MAX_ITEM_DESCRIPTION_LEN {
                errors.push(format!(
                    "description must be at most {} characters",
                    MAX_ITEM_DESCRIPTION_LEN
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LendError::validation("Validation failed", errors))
        }
    }
}

/// Thread-safe store of users and items.
#[derive(Debug, Clone, Default)]
pub struct LendingDirectory {
    users: Arc<DashMap<Uuid, UserProfile>>,
    items: Arc<DashMap<Uuid, Item>>,
}

impl LendingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserProfile) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: Uuid) -> Option<UserProfile> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn insert_item(&self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn item(&self, id: Uuid) -> Option<Item> {
        self.items.get(&id).map(|i| i.clone())
    }

    /// Validate and store a new item for `owner_id`.
    pub fn create_item(&self, owner_id: Uuid, request: CreateItem) -> Result<Item> {
        request.validate()?;

        let item = Item {
            id: Uuid::new_v4(),
            owner_id,
            name: request.name.trim().to_string(),
            description: request.description,
            created_at: Utc::now(),
        };
        self.insert_item(item.clone());
        Ok(item)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
