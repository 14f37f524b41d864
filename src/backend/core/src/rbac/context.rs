//! Authorization context and evaluator deltas.
//!
//! Evaluators never mutate the context. Each one reads it and returns an
//! [`EvaluationDelta`]; the engine folds the deltas in with
//! [`AuthorizationContext::apply`].

use serde::Serialize;
use std::fmt;

use super::models::{OwnedResource, Requirement, RequirementStatus};
use crate::session::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Delta
// ═══════════════════════════════════════════════════════════════════════════════

/// One evaluator decision about one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeed(Requirement),
    /// Terminal failure. Distinct from leaving the requirement pending.
    Fail {
        requirement: Requirement,
        reason: String,
    },
}

/// The decisions of a single evaluator run. Empty means abstain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationDelta {
    outcomes: Vec<Outcome>,
}

impl EvaluationDelta {
    pub fn abstain() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, requirement: Requirement) -> Self {
        self.outcomes.push(Outcome::Succeed(requirement));
        self
    }

    pub fn fail(mut self, requirement: Requirement, reason: impl Into<String>) -> Self {
        self.outcomes.push(Outcome::Fail {
            requirement,
            reason: reason.into(),
        });
        self
    }

    pub fn is_abstain(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════════════

/// A recorded terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationFailure {
    pub requirement: Requirement,
    pub evaluator: &'static str,
    pub reason: String,
}

impl fmt::Display for AuthorizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.requirement, self.evaluator, self.reason)
    }
}

/// State of one authorization decision.
pub struct AuthorizationContext<'a> {
    principal: &'a Principal,
    resource: Option<&'a dyn OwnedResource>,
    requirements: Vec<(Requirement, RequirementStatus)>,
    failures: Vec<AuthorizationFailure>,
}

impl<'a> AuthorizationContext<'a> {
    /// Start a decision with every requirement pending. Duplicates collapse.
    pub fn new(
        requirements: &[Requirement],
        principal: &'a Principal,
        resource: Option<&'a dyn OwnedResource>,
    ) -> Self {
        let mut entries: Vec<(Requirement, RequirementStatus)> =
            Vec::with_capacity(requirements.len());
        for requirement in requirements {
            if !entries.iter().any(|(r, _)| r == requirement) {
                entries.push((*requirement, RequirementStatus::Pending));
            }
        }

        Self {
            principal,
            resource,
            requirements: entries,
            failures: Vec::new(),
        }
    }

    pub fn principal(&self) -> &Principal {
        self.principal
    }

    pub fn resource(&self) -> Option<&dyn OwnedResource> {
        self.resource
    }

    pub fn requirements(&self) -> &[(Requirement, RequirementStatus)] {
        &self.requirements
    }

    pub fn status(&self, requirement: Requirement) -> Option<RequirementStatus> {
        self.requirements
            .iter()
            .find(|(r, _)| *r == requirement)
            .map(|(_, s)| *s)
    }

    pub fn is_pending(&self, requirement: Requirement) -> bool {
        self.status(requirement) == Some(RequirementStatus::Pending)
    }

    pub fn pending_requirements(&self) -> impl Iterator<Item = Requirement> + '_ {
        self.requirements
            .iter()
            .filter(|(_, s)| s.is_pending())
            .map(|(r, _)| *r)
    }

    pub fn failures(&self) -> &[AuthorizationFailure] {
        &self.failures
    }

    /// Whether any evaluator failed the context.
    pub fn has_failed(&self) -> bool {
        self.requirements
            .iter()
            .any(|(_, s)| *s == RequirementStatus::Failed)
    }

    /// Every requirement succeeded and nothing failed.
    pub fn has_succeeded(&self) -> bool {
        self.requirements
            .iter()
            .all(|(_, s)| *s == RequirementStatus::Succeeded)
    }

    /// Fold one evaluator's delta into the verdict.
    ///
    /// `Succeed` only moves a requirement out of `Pending`; `Fail` always
    /// wins. Outcomes for requirements not in this context are ignored.
    pub fn apply(&mut self, evaluator: &'static str, delta: EvaluationDelta) {
        for outcome in delta.outcomes {
            match outcome {
                Outcome::Succeed(requirement) => {
                    let entry = self.requirements.iter_mut().find(|(r, _)| *r == requirement);
                    if let Some(entry) = entry {
                        if entry.1.is_pending() {
                            entry.1 = RequirementStatus::Succeeded;
                        }
                    }
                }
                Outcome::Fail {
                    requirement,
                    reason,
                } => {
                    let entry = self.requirements.iter_mut().find(|(r, _)| *r == requirement);
                    if let Some(entry) = entry {
                        entry.1 = RequirementStatus::Failed;
                        self.failures.push(AuthorizationFailure {
                            requirement,
                            evaluator,
                            reason,
                        });
                    }
                }
            }
        }
    }
}

impl fmt::Debug for AuthorizationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("subject", &self.principal.subject())
            .field("resource_owner", &self.resource.map(|r| r.owner_id()))
            .field("requirements", &self.requirements)
            .field("failures", &self.failures)
            .finish()
    }
}
