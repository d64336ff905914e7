//! Tenant authorization engine for multi-tenant services.
//!
//! Every read or write against tenant data passes through a single
//! evaluation: the caller's membership is resolved, RBAC requirements are
//! checked, tenant ABAC policies are applied (deny overrides allow), and the
//! organization's data residency and classification are compared with what
//! the caller expects. Only a fully successful evaluation yields an
//! [`AuthorizationContext`], which is handed to the caller's handler exactly
//! once. Every outcome is recorded through an [`AuditSink`].
//!
//! Denials are typed [`AuthorizationError`]s whose `Display` never reveals
//! tenant, role or policy identifiers.
//!
//! # Examples
//!
//! Authorizing a repository call with the in-memory store (enable `memory-store`):
//! ```no_run
//! # #[cfg(feature = "memory-store")]
//! # {
//! use std::sync::Arc;
//! use tenant_guard::{
//!     AccessGuardBuilder, Action, DataClassification, DataResidency, Membership, MemoryStore,
//!     OrgAccessInput, OrgId, OrganizationProfile, PermissionMap, RepositoryAuthorizer,
//!     ResourceType, RoleKey, UserId,
//! };
//!
//! let org = OrgId::try_from("org-1").unwrap();
//! let user = UserId::try_from("user-1").unwrap();
//! let member = RoleKey::try_from("member").unwrap();
//! let read = PermissionMap::try_from_pairs([("organization", ["read"])]).unwrap();
//!
//! let store = MemoryStore::new();
//! store.add_organization(OrganizationProfile::new(
//!     org.clone(),
//!     DataResidency::UkOnly,
//!     DataClassification::Official,
//! ));
//! store.add_membership(Membership::active(org.clone(), user.clone(), member.clone()));
//! store.add_role_permissions(org.clone(), member, &read);
//!
//! let guard = Arc::new(AccessGuardBuilder::new(store).build());
//! let authorizer = RepositoryAuthorizer::new(guard);
//! let input = OrgAccessInput::new(
//!     org,
//!     user,
//!     Action::try_from("read").unwrap(),
//!     ResourceType::try_from("organization").unwrap(),
//! )
//! .require_permissions(read);
//! let _ = authorizer.authorize(input, |context| async move { context.org_id().clone() });
//! # }
//! ```
#![forbid(unsafe_code)]

mod attributes;
mod audit;
mod authorizer;
mod cache_safe;
mod context;
mod error;
mod guard;
mod permission;
mod policy;
mod request;
mod scope;
mod store;
mod types;

#[cfg(any(test, feature = "memory-store"))]
mod memory_store;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::attributes::{AttributeValue, Attributes};
pub use crate::audit::{
    AUDIT_TARGET, AuditSink, AuditSinkError, AuthorizationAuditEvent, Decision, MemoryAuditSink,
    NoopAuditSink, TracingAuditSink,
};
pub use crate::authorizer::{
    ATTR_RECORD_ORG_ID, AuthorizerDefaults, PII_RESOURCE, RepositoryAuthorizer,
    RepositoryAuthorizerBuilder, TenantRecord,
};
pub use crate::cache_safe::{CacheSafeAuthorizationContext, to_cache_safe_authorization_context};
pub use crate::context::AuthorizationContext;
pub use crate::error::{AuthorizationError, DenialKind, Error, Result, StoreError};
pub use crate::guard::{
    ATTR_CLASSIFICATION, ATTR_RESIDENCY, AccessGrant, AccessGuard, AccessGuardBuilder,
    EmptyPolicySet, Environment, GuardEvaluator, SUBJECT_ORG_ID, SUBJECT_ROLE_KEY,
    SUBJECT_USER_ID,
};
pub use crate::permission::{PermissionMap, merge_permission_maps, merge_roles};
pub use crate::policy::{
    AbacPolicy, AbacPolicyRecord, ConditionTarget, Effect, POLICY_SCHEMA_VERSION, PolicyCondition,
    PolicyOrigin, PolicyOutcome, PolicyRequest, evaluate_policies, selector_matches,
};
pub use crate::request::OrgAccessInput;
pub use crate::scope::{DEFAULT_AUDIT_SOURCE, OrganizationProfile, TenantScope};
pub use crate::store::{
    Membership, MembershipStatus, MembershipStore, OrganizationStore, PolicyStore, Store,
};
pub use crate::types::{
    Action, DataClassification, DataResidency, OrgId, PolicyId, ResourceType, RoleKey, UserId,
};

#[cfg(feature = "serde")]
pub use crate::policy::policies_from_json;

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;
