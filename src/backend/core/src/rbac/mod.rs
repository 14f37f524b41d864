//! Resource-based access control.
//!
//! This module provides:
//! - **Models**: Requirement markers, owned resources, per-requirement status
//! - **Evaluators**: pure decision units (`SuperAdminBypass`, `OwnershipOrElevatedRole`)
//! - **Engine**: folds evaluator decisions into an allow / deny / failed verdict
//! - **Predefined Roles**: SuperAdmin, Admin, Staff, Member
//!
//! # Usage
//!
//! ```rust,ignore
//! use lendit_core::rbac::{AuthorizationEngine, Requirement};
//!
//! let engine = AuthorizationEngine::with_defaults();
//! let profile = directory.user(id)?;
//!
//! // Plain denial is a boolean outcome...
//! let result = engine.authorize(&[Requirement::VIEW_PROFILE], &principal, Some(&profile));
//!
//! // ...which callers usually turn into a 401/403 error.
//! engine.enforce(&[Requirement::VIEW_PROFILE], &principal, Some(&profile))?;
//! ```

pub mod context;
pub mod engine;
pub mod evaluators;
pub mod models;
pub mod roles;

pub use context::{AuthorizationContext, AuthorizationFailure, EvaluationDelta, Outcome};
pub use engine::{AuthorizationEngine, AuthorizationResult};
pub use evaluators::{OwnershipOrElevatedRole, RequirementEvaluator, SuperAdminBypass};
pub use models::{OwnedResource, Requirement, RequirementStatus};
pub use roles::PredefinedRole;
