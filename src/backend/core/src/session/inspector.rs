//! Session token inspection.
//!
//! Classifies the current credential by how close it is to expiry:
//!
//! ```text
//!   remaining = exp - now
//!
//!   HardExpired | GracePeriodExpired |    NearExpiry    |   Fresh
//!   ------------+--------------------+------------------+----------->
//!            -grace                  0             near_expiry
//! ```
//!
//! `GracePeriodExpired` covers `-grace ..= 0` and `NearExpiry` covers
//! `1 ..= near_expiry`. A missing expiry claim is treated as non-expiring.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::principal::{ExpiryClaim, Principal};
use crate::config::SessionConfig;

/// Default window before expiry in which renewal is triggered.
pub const DEFAULT_NEAR_EXPIRY_SECS: i64 = 300;

/// Default window after expiry in which renewal is still permitted.
pub const DEFAULT_GRACE_SECS: i64 = 5;

/// Classification of the current credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Fresh,
    NearExpiry,
    GracePeriodExpired,
    HardExpired,
    Unauthenticated,
    MalformedClaim,
}

impl TokenState {
    /// Whether the orchestrator should attempt a renewal.
    pub fn is_renewable(&self) -> bool {
        matches!(self, Self::NearExpiry | Self::GracePeriodExpired)
    }

    /// Whether downstream handlers may accept the credential.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            Self::Fresh | Self::NearExpiry | Self::GracePeriodExpired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::NearExpiry => "near_expiry",
            Self::GracePeriodExpired => "grace_period_expired",
            Self::HardExpired => "hard_expired",
            Self::Unauthenticated => "unauthenticated",
            Self::MalformedClaim => "malformed_claim",
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds used by the inspector, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub near_expiry_secs: i64,
    pub grace_secs: i64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            near_expiry_secs: DEFAULT_NEAR_EXPIRY_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
        }
    }
}

impl From<&SessionConfig> for SessionPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            near_expiry_secs: config.near_expiry_secs,
            grace_secs: config.grace_secs,
        }
    }
}

/// Classifies principals against a [`SessionPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenInspector {
    policy: SessionPolicy,
}

impl TokenInspector {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Classify against the current wall clock.
    pub fn classify(&self, principal: &Principal) -> TokenState {
        self.classify_at(principal, Utc::now().timestamp())
    }

    /// Classify against an explicit `now` (Unix seconds).
    pub fn classify_at(&self, principal: &Principal, now: i64) -> TokenState {
        if !principal.is_authenticated() {
            return TokenState::Unauthenticated;
        }

        let expiry = match principal.expiry() {
            ExpiryClaim::Absent => return TokenState::Fresh,
            ExpiryClaim::Malformed(_) => return TokenState::MalformedClaim,
            ExpiryClaim::Timestamp(secs) => *secs,
        };

        let remaining = expiry.saturating_sub(now);

        if remaining > self.policy.near_expiry_secs {
            TokenState::Fresh
        } else if remaining > 0 {
            TokenState::NearExpiry
        } else if remaining >= self.policy.grace_secs.saturating_neg() {
            TokenState::GracePeriodExpired
        } else {
            TokenState::HardExpired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn expiring_in(remaining: i64) -> Principal {
        Principal::builder()
            .subject("5f8d0b1e-3c8a-4c54-9d8e-0d3c7a1b2e4f")
            .expires_at(NOW + remaining)
            .build()
    }

    fn classify(remaining: i64) -> TokenState {
        TokenInspector::default().classify_at(&expiring_in(remaining), NOW)
    }

    #[test]
    fn test_unauthenticated() {
        let state = TokenInspector::default().classify_at(&Principal::anonymous(), NOW);
        assert_eq!(state, TokenState::Unauthenticated);
        assert!(!state.is_renewable());
    }

    #[test]
    fn test_missing_expiry_is_fresh() {
        let principal = Principal::builder().subject("someone").build();
        let state = TokenInspector::default().classify_at(&principal, NOW);
        assert_eq!(state, TokenState::Fresh);
    }

    #[test]
    fn test_malformed_expiry() {
        let principal = Principal::builder()
            .expiry(ExpiryClaim::Malformed("soon".to_string()))
            .build();
        let state = TokenInspector::default().classify_at(&principal, NOW);
        assert_eq!(state, TokenState::MalformedClaim);
        assert!(!state.is_usable());
    }

    #[test]
    fn test_near_expiry_boundaries() {
        assert_eq!(classify(DEFAULT_NEAR_EXPIRY_SECS + 1), TokenState::Fresh);
        assert_eq!(classify(DEFAULT_NEAR_EXPIRY_SECS), TokenState::NearExpiry);
        assert_eq!(classify(1), TokenState::NearExpiry);
    }

    #[test]
    fn test_grace_boundaries() {
        assert_eq!(classify(0), TokenState::GracePeriodExpired);
        assert_eq!(classify(-DEFAULT_GRACE_SECS), TokenState::GracePeriodExpired);
        assert_eq!(classify(-DEFAULT_GRACE_SECS - 1), TokenState::HardExpired);
    }

    #[test]
    fn test_custom_policy() {
        let inspector = TokenInspector::new(SessionPolicy {
            near_expiry_secs: 60,
            grace_secs: 30,
        });

        assert_eq!(inspector.classify_at(&expiring_in(61), NOW), TokenState::Fresh);
        assert_eq!(inspector.classify_at(&expiring_in(60), NOW), TokenState::NearExpiry);
        assert_eq!(
            inspector.classify_at(&expiring_in(-30), NOW),
            TokenState::GracePeriodExpired
        );
        assert_eq!(inspector.classify_at(&expiring_in(-31), NOW), TokenState::HardExpired);
    }

    #[test]
    fn test_renewable_states() {
        assert!(TokenState::NearExpiry.is_renewable());
        assert!(TokenState::GracePeriodExpired.is_renewable());
        assert!(!TokenState::Fresh.is_renewable());
        assert!(!TokenState::HardExpired.is_renewable());
        assert!(!TokenState::MalformedClaim.is_renewable());
    }

    #[test]
    fn test_extreme_expiry_does_not_overflow() {
        let principal = Principal::builder().expires_at(i64::MIN).build();
        let state = TokenInspector::default().classify_at(&principal, NOW);
        assert_eq!(state, TokenState::HardExpired);
    }

    #[test]
    fn test_extreme_grace_does_not_overflow() {
        let inspector = TokenInspector::new(SessionPolicy {
            near_expiry_secs: 300,
            grace_secs: i64::MIN,
        });
        assert_eq!(inspector.classify_at(&expiring_in(-1), NOW), TokenState::HardExpired);

        let inspector = TokenInspector::new(SessionPolicy {
            near_expiry_secs: 300,
            grace_secs: i64::MAX,
        });
        assert_eq!(
            inspector.classify_at(&expiring_in(-1_000_000), NOW),
            TokenState::GracePeriodExpired
        );
    }
}
