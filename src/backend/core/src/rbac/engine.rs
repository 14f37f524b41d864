//! Authorization engine.
//!
//! The engine answers the question:
//! "May this principal act on this resource for every one of these
//! requirements?"
//!
//! Every registered evaluator sees the context as it stood before any
//! evaluator ran, so the verdict does not depend on registration order.

use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::context::{AuthorizationContext, AuthorizationFailure};
use super::evaluators::{OwnershipOrElevatedRole, RequirementEvaluator, SuperAdminBypass};
use super::models::{OwnedResource, Requirement, RequirementStatus};
use crate::error::{LendError, Result};
use crate::session::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Result
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationResult {
    /// Every requirement succeeded and nothing failed.
    pub succeeded: bool,
    /// An evaluator raised a terminal failure.
    pub failed: bool,
    pub requirements: Vec<(Requirement, RequirementStatus)>,
    pub failures: Vec<AuthorizationFailure>,
}

impl AuthorizationResult {
    fn from_context(context: AuthorizationContext<'_>) -> Self {
        Self {
            succeeded: context.has_succeeded(),
            failed: context.has_failed(),
            requirements: context.requirements().to_vec(),
            failures: context.failures().to_vec(),
        }
    }

    /// Requirements left unresolved.
    pub fn pending(&self) -> Vec<Requirement> {
        self.requirements
            .iter()
            .filter(|(_, s)| s.is_pending())
            .map(|(r, _)| *r)
            .collect()
    }

    /// Label used for logs and metrics.
    pub fn decision(&self) -> &'static str {
        if self.failed {
            "failed"
        } else if self.succeeded {
            "allowed"
        } else {
            "denied"
        }
    }

    /// Turn the verdict into an error for callers that treat denial as one.
    ///
    /// A terminal failure is an authentication problem (401); plain denial
    /// is 403.
    pub fn into_result(self) -> Result<()> {
        if self.failed {
            let reasons: Vec<String> = self.failures.iter().map(|f| f.reason.clone()).collect();
            return Err(LendError::authorization_failed(
                "The caller's identity could not be established",
            )
            .with_internal_message(reasons.join("; ")));
        }

        if !self.succeeded {
            let pending: Vec<String> = self.pending().iter().map(|r| r.to_string()).collect();
            return Err(LendError::forbidden(
                "You do not have permission to perform this action",
            )
            .with_internal_message(format!("unresolved requirements: {}", pending.join(", "))));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs an ordered list of evaluators over a set of requirements.
///
/// Cheap to clone; holds no mutable state.
#[derive(Clone, Default)]
pub struct AuthorizationEngine {
    evaluators: Vec<Arc<dyn RequirementEvaluator>>,
}

impl AuthorizationEngine {
    /// Create an engine with no evaluators. Every non-empty requirement set
    /// is denied until some are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The evaluators the server registers at startup.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(SuperAdminBypass)
            .register(OwnershipOrElevatedRole::view_profile())
            .register(OwnershipOrElevatedRole::for_requirement(
                Requirement::MANAGE_ITEM,
            ))
    }

    /// Append an evaluator.
    pub fn register<E>(mut self, evaluator: E) -> Self
    where
        E: RequirementEvaluator + 'static,
    {
        self.evaluators.push(Arc::new(evaluator));
        self
    }

    pub fn evaluator_names(&self) -> Vec<&'static str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    /// Decide whether `principal` satisfies every requirement on `resource`.
    pub fn authorize(
        &self,
        requirements: &[Requirement],
        principal: &Principal,
        resource: Option<&dyn OwnedResource>,
    ) -> AuthorizationResult {
        let mut context = AuthorizationContext::new(requirements, principal, resource);

        let deltas: Vec<_> = self
            .evaluators
            .iter()
            .map(|evaluator| (evaluator.name(), evaluator.evaluate(&context)))
            .collect();

        for (name, delta) in deltas {
            context.apply(name, delta);
        }

        let result = AuthorizationResult::from_context(context);

        debug!(
            subject = ?principal.subject(),
            requirements = ?requirements,
            resource_owner = ?resource.map(|r| r.owner_id()),
            decision = result.decision(),
            "Authorization evaluated"
        );

        counter!(
            "lendit_authorization_decisions_total",
            "decision" => result.decision()
        )
        .increment(1);

        result
    }

    /// [`authorize`](Self::authorize) and convert denial into an error.
    pub fn enforce(
        &self,
        requirements: &[Requirement],
        principal: &Principal,
        resource: Option<&dyn OwnedResource>,
    ) -> Result<()> {
        self.authorize(requirements, principal, resource).into_result()
    }
}

impl fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("evaluators", &self.evaluator_names())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
