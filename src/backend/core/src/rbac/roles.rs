//! Predefined role tags.
//!
//! Lendit ships with four built-in roles:
//!
//! | Role       | Description                                         |
//! |------------|-----------------------------------------------------|
//! | SuperAdmin | Passes every requirement on every resource          |
//! | Admin      | Manages users and items across the tenant           |
//! | Staff      | Handles lending desk operations for any member      |
//! | Member     | Borrows and lends their own items                   |
//!
//! Role tags are compared exactly, including case.

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedRole {
    SuperAdmin,
    Admin,
    Staff,
    Member,
}

impl PredefinedRole {
    /// Roles that may act on resources they do not own.
    pub const ELEVATED: [PredefinedRole; 3] = [Self::Admin, Self::Staff, Self::SuperAdmin];

    /// The role tag as carried in the token.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SuperAdmin",
            Self::Admin => "Admin",
            Self::Staff => "Staff",
            Self::Member => "Member",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Unrestricted access to every resource",
            Self::Admin => "Manage users and items across the tenant",
            Self::Staff => "Operate the lending desk on behalf of members",
            Self::Member => "Borrow and lend own items",
        }
    }

    pub fn is_elevated(&self) -> bool {
        Self::ELEVATED.contains(self)
    }

    /// Parse an exact role tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.as_str() == tag)
    }

    /// Tags of the elevated roles.
    pub fn elevated_tags() -> Vec<&'static str> {
        Self::ELEVATED.iter().map(|r| r.as_str()).collect()
    }

    /// Return all predefined roles.
    pub fn all() -> Vec<PredefinedRole> {
        vec![Self::SuperAdmin, Self::Admin, Self::Staff, Self::Member]
    }
}

impl std::fmt::Display for PredefinedRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevated_roles() {
        assert!(PredefinedRole::SuperAdmin.is_elevated());
        assert!(PredefinedRole::Admin.is_elevated());
        assert!(PredefinedRole::Staff.is_elevated());
        assert!(!PredefinedRole::Member.is_elevated());
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        assert_eq!(PredefinedRole::from_tag("Staff"), Some(PredefinedRole::Staff));
        assert_eq!(PredefinedRole::from_tag("staff"), None);
        assert_eq!(PredefinedRole::from_tag("Owner"), None);
    }

    #[test]
    fn test_elevated_tags() {
        assert_eq!(
            PredefinedRole::elevated_tags(),
            vec!["Admin", "Staff", "SuperAdmin"]
        );
    }
}
