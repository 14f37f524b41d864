//! The per-request principal.
//!
//! A [`Principal`] is built once from the inbound credential and is
//! read-only afterwards. It keeps the raw subject and expiry claims so that
//! malformed values can be told apart from absent ones.

use std::collections::BTreeSet;

use serde_json::Value;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Expiry claim
// ═══════════════════════════════════════════════════════════════════════════════

/// The `exp` claim as presented by the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryClaim {
    /// No expiry claim on the credential.
    Absent,
    /// Unix-epoch seconds.
    Timestamp(i64),
    /// Present, but not a timestamp. Holds the raw value.
    Malformed(String),
}

impl ExpiryClaim {
    /// Interpret a raw JSON claim value.
    ///
    /// Integers, integral floats and numeric strings are accepted.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::Number(n)) => {
                if let Some(secs) = n.as_i64() {
                    Self::Timestamp(secs)
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Self::Timestamp(f as i64)
                        }
                        _ => Self::Malformed(n.to_string()),
                    }
                }
            }
            Some(Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(secs) => Self::Timestamp(secs),
                Err(_) => Self::Malformed(s.clone()),
            },
            Some(other) => Self::Malformed(other.to_string()),
        }
    }

    /// The timestamp, if the claim is a valid one.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(secs) => Some(*secs),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// The caller of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    authenticated: bool,
    subject: Option<String>,
    roles: BTreeSet<String>,
    expiry: ExpiryClaim,
    token: Option<String>,
}

impl Principal {
    /// A principal carrying no authentication at all.
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            subject: None,
            roles: BTreeSet::new(),
            expiry: ExpiryClaim::Absent,
            token: None,
        }
    }

    /// Start building an authenticated principal.
    pub fn builder() -> PrincipalBuilder {
        PrincipalBuilder::default()
    }

    /// Whether the request carried a verified credential.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The raw subject claim.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The subject claim parsed as an identifier.
    ///
    /// Parsing is format-insensitive: hyphenated, simple, braced and URN
    /// forms in either case all yield the same id.
    pub fn subject_id(&self) -> Option<Uuid> {
        self.subject
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Check if the principal carries a role tag.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Check if the principal carries any of the role tags.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }

    pub fn expiry(&self) -> &ExpiryClaim {
        &self.expiry
    }

    /// The bearer token the principal was built from.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Builder for authenticated principals.
#[derive(Debug, Default)]
pub struct PrincipalBuilder {
    subject: Option<String>,
    roles: BTreeSet<String>,
    expiry: Option<ExpiryClaim>,
    token: Option<String>,
}

impl PrincipalBuilder {
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn maybe_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn expires_at(mut self, secs: i64) -> Self {
        self.expiry = Some(ExpiryClaim::Timestamp(secs));
        self
    }

    pub fn expiry(mut self, expiry: ExpiryClaim) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn build(self) -> Principal {
        Principal {
            authenticated: true,
            subject: self.subject,
            roles: self.roles,
            expiry: self.expiry.unwrap_or(ExpiryClaim::Absent),
            token: self.token,
        }
    }
}
