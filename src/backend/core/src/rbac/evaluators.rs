//! Requirement evaluators.
//!
//! An evaluator reads an [`AuthorizationContext`] and returns the
//! requirements it can decide. Returning nothing is abstaining; denial is
//! never an error raised here.

use super::context::{AuthorizationContext, EvaluationDelta};
use super::models::Requirement;
use super::roles::PredefinedRole;

/// A pure decision unit registered with the engine.
pub trait RequirementEvaluator: Send + Sync {
    /// Name recorded against any failure this evaluator raises.
    fn name(&self) -> &'static str;

    fn evaluate(&self, context: &AuthorizationContext<'_>) -> EvaluationDelta;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SuperAdmin bypass
// ═══════════════════════════════════════════════════════════════════════════════

/// Succeeds every pending requirement for `SuperAdmin` principals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperAdminBypass;

impl RequirementEvaluator for SuperAdminBypass {
    fn name(&self) -> &'static str {
        "super_admin_bypass"
    }

    fn evaluate(&self, context: &AuthorizationContext<'_>) -> EvaluationDelta {
        if !context
            .principal()
            .has_role(PredefinedRole::SuperAdmin.as_str())
        {
            return EvaluationDelta::abstain();
        }

        context
            .pending_requirements()
            .fold(EvaluationDelta::abstain(), EvaluationDelta::succeed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership or elevated role
// ═══════════════════════════════════════════════════════════════════════════════

/// Grants one requirement to elevated roles and to the resource owner.
///
/// Decision order:
/// 1. subject id missing or unparsable: fail the context
/// 2. any elevated role: succeed
/// 3. resource owned by the subject: succeed
/// 4. otherwise abstain
#[derive(Debug, Clone)]
pub struct OwnershipOrElevatedRole {
    requirement: Requirement,
    elevated_roles: Vec<&'static str>,
}

impl OwnershipOrElevatedRole {
    pub fn for_requirement(requirement: Requirement) -> Self {
        Self {
            requirement,
            elevated_roles: PredefinedRole::elevated_tags(),
        }
    }

    /// The profile-viewing policy.
    pub fn view_profile() -> Self {
        Self::for_requirement(Requirement::VIEW_PROFILE)
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }
}

impl RequirementEvaluator for OwnershipOrElevatedRole {
    fn name(&self) -> &'static str {
        "ownership_or_elevated_role"
    }

    fn evaluate(&self, context: &AuthorizationContext<'_>) -> EvaluationDelta {
        if !context.is_pending(self.requirement) {
            return EvaluationDelta::abstain();
        }

        let principal = context.principal();
        let Some(subject_id) = principal.subject_id() else {
            let reason = match principal.subject() {
                None => "subject identifier claim is missing".to_string(),
                Some(raw) => format!("subject identifier '{}' is not a valid identifier", raw),
            };
            return EvaluationDelta::abstain().fail(self.requirement, reason);
        };

        if principal.has_any_role(&self.elevated_roles) {
            return EvaluationDelta::abstain().succeed(self.requirement);
        }

        match context.resource() {
            Some(resource) if resource.owner_id() == subject_id => {
                EvaluationDelta::abstain().succeed(self.requirement)
            }
            _ => EvaluationDelta::abstain(),
        }
    }
}
