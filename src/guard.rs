use crate::attributes::{AttributeValue, Attributes};
use crate::error::{AuthorizationError, Error, StoreError};
use crate::permission::{PermissionMap, satisfies_any_profile};
use crate::policy::{AbacPolicy, PolicyOutcome, PolicyRequest, evaluate_policies};
use crate::request::OrgAccessInput;
use crate::scope::{OrganizationProfile, TenantScope};
use crate::store::{Membership, Store};
use crate::types::{OrgId, PolicyId, RoleKey, UserId};
use async_trait::async_trait;
use tracing::{debug, error};

/// Subject attribute keys filled from the membership and organization.
pub const SUBJECT_USER_ID: &str = "userId";
pub const SUBJECT_ORG_ID: &str = "orgId";
pub const SUBJECT_ROLE_KEY: &str = "roleKey";
/// Residency attribute, set on both subject and resource.
pub const ATTR_RESIDENCY: &str = "residency";
/// Classification attribute, set on both subject and resource.
pub const ATTR_CLASSIFICATION: &str = "classification";

/// Behavior when a tenant has no ABAC policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmptyPolicySet {
    /// The RBAC result stands.
    #[default]
    DeferToRbac,
    /// Deny with [`AuthorizationError::PolicyDenied`].
    DenyAll,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Successful guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub user_id: UserId,
    pub role_key: RoleKey,
    /// Effective permissions: role template plus membership grants.
    pub permissions: PermissionMap,
    pub subject_attributes: Attributes,
    /// Caller attributes with residency and classification defaults applied.
    pub resource_attributes: Attributes,
    pub tenant_scope: TenantScope,
    /// Allow policy that matched, if any.
    pub matched_policy: Option<PolicyId>,
    /// The guard's wildcard setting, under which `permissions` are interpreted.
    pub wildcard: bool,
}

impl AccessGrant {
    pub fn org_id(&self) -> &OrgId {
        self.tenant_scope.org_id()
    }
}

/// Strategy that decides one access request.
#[async_trait]
pub trait GuardEvaluator: Send + Sync {
    /// Evaluates membership, RBAC, ABAC and compliance checks for `input`.
    async fn evaluate(&self, input: &OrgAccessInput) -> Result<AccessGrant, AuthorizationError>;
}

/// Store-backed [`GuardEvaluator`].
#[derive(Debug)]
pub struct AccessGuard<S> {
    store: S,
    enable_wildcard: bool,
    empty_policy_set: EmptyPolicySet,
    environment: Environment,
    development_fallback_policies: Vec<AbacPolicy>,
    default_audit_source: Option<String>,
}

/// Builder for [`AccessGuard`].
pub struct AccessGuardBuilder<S> {
    store: S,
    enable_wildcard: bool,
    empty_policy_set: EmptyPolicySet,
    environment: Environment,
    development_fallback_policies: Vec<AbacPolicy>,
    default_audit_source: Option<String>,
}

impl<S> AccessGuardBuilder<S> {
    /// Creates a new builder with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            enable_wildcard: false,
            empty_policy_set: EmptyPolicySet::DeferToRbac,
            environment: Environment::Production,
            development_fallback_policies: Vec::new(),
            default_audit_source: None,
        }
    }

    /// Enables or disables `*` matching in granted permissions.
    pub fn enable_wildcard(mut self, on: bool) -> Self {
        self.enable_wildcard = on;
        self
    }

    /// Sets the behavior for tenants without ABAC policies.
    pub fn empty_policy_set(mut self, behavior: EmptyPolicySet) -> Self {
        self.empty_policy_set = behavior;
        self
    }

    /// Sets the deployment environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets bootstrap policies used in development for tenants without policies.
    pub fn development_fallback_policies(
        mut self,
        policies: impl IntoIterator<Item = AbacPolicy>,
    ) -> Self {
        self.development_fallback_policies = policies
            .into_iter()
            .map(AbacPolicy::into_development_fallback)
            .collect();
        self
    }

    /// Sets the audit source used when neither request nor tenant names one.
    pub fn default_audit_source(mut self, source: impl Into<String>) -> Self {
        self.default_audit_source = Some(source.into());
        self
    }

    /// Builds the guard.
    pub fn build(self) -> AccessGuard<S> {
        AccessGuard {
            store: self.store,
            enable_wildcard: self.enable_wildcard,
            empty_policy_set: self.empty_policy_set,
            environment: self.environment,
            development_fallback_policies: self.development_fallback_policies,
            default_audit_source: self.default_audit_source,
        }
    }
}

impl<S> AccessGuard<S>
where
    S: Store,
{
    /// Returns the effective permissions of an active member.
    pub async fn effective_permissions(
        &self,
        org: &OrgId,
        user: &UserId,
    ) -> Result<PermissionMap, AuthorizationError> {
        let membership = self.active_membership(org, user).await?;
        self.membership_permissions(&membership).await
    }

    async fn active_membership(
        &self,
        org: &OrgId,
        user: &UserId,
    ) -> Result<Membership, AuthorizationError> {
        let membership = self
            .store
            .membership(org.clone(), user.clone())
            .await
            .map_err(store_failure)?;
        match membership {
            Some(membership) if membership.is_active() => {
                if &membership.org_id != org || &membership.user_id != user {
                    return Err(AuthorizationError::failed(format!(
                        "store returned membership {}/{} for {org}/{user}",
                        membership.org_id, membership.user_id
                    )));
                }
                Ok(membership)
            }
            _ => Err(AuthorizationError::NoActiveMembership),
        }
    }

    async fn membership_permissions(
        &self,
        membership: &Membership,
    ) -> Result<PermissionMap, AuthorizationError> {
        let mut permissions = self
            .store
            .role_permissions(membership.org_id.clone(), membership.role_key.clone())
            .await
            .map_err(store_failure)?;
        permissions.extend(&membership.permissions);
        Ok(permissions)
    }

    async fn organization(&self, org: &OrgId) -> Result<OrganizationProfile, AuthorizationError> {
        self.store
            .organization(org.clone())
            .await
            .map_err(store_failure)?
            .ok_or_else(|| {
                AuthorizationError::failed(format!("organization profile missing for {org}"))
            })
    }

    async fn policies(&self, org: &OrgId) -> Result<Vec<AbacPolicy>, AuthorizationError> {
        let records = self
            .store
            .policies(org.clone())
            .await
            .map_err(store_failure)?;
        if records.is_empty() && self.environment == Environment::Development {
            debug!(org_id = %org, "using development fallback policies");
            return Ok(self.development_fallback_policies.clone());
        }
        records
            .into_iter()
            .map(AbacPolicy::try_from)
            .collect::<crate::error::Result<Vec<_>>>()
            .map_err(|err| {
                error!(org_id = %org, error = %err, "invalid stored abac policy");
                AuthorizationError::from(err)
            })
    }

    fn check_rbac(
        &self,
        input: &OrgAccessInput,
        role_key: &RoleKey,
        permissions: &PermissionMap,
    ) -> Result<(), AuthorizationError> {
        if let Some(required) = input.required_roles.as_deref()
            && !required.is_empty()
            && !required.contains(role_key)
        {
            return Err(AuthorizationError::RoleMismatch {
                role: role_key.clone(),
                required: required.to_vec(),
            });
        }

        if let Some(required) = &input.required_permissions
            && let Some((resource, action)) = permissions.first_missing(required, self.enable_wildcard)
        {
            return Err(AuthorizationError::PermissionDenied {
                resource: resource.clone(),
                action: action.clone(),
            });
        }

        if let Some(profiles) = &input.required_any_permissions
            && !satisfies_any_profile(permissions, profiles, self.enable_wildcard)
        {
            return Err(AuthorizationError::PermissionDenied {
                resource: input.resource_type.clone(),
                action: input.action.clone(),
            });
        }

        Ok(())
    }

    fn check_abac(
        &self,
        policies: &[AbacPolicy],
        request: &PolicyRequest<'_>,
    ) -> Result<Option<PolicyId>, AuthorizationError> {
        if policies.is_empty() {
            return match self.empty_policy_set {
                EmptyPolicySet::DeferToRbac => Ok(None),
                EmptyPolicySet::DenyAll => Err(AuthorizationError::PolicyDenied { policy: None }),
            };
        }
        match evaluate_policies(policies, request) {
            PolicyOutcome::Denied(policy) => Err(AuthorizationError::PolicyDenied {
                policy: Some(policy),
            }),
            PolicyOutcome::Allowed(policy) => Ok(Some(policy)),
            PolicyOutcome::NoMatch => Ok(None),
        }
    }

    fn check_compliance(
        &self,
        input: &OrgAccessInput,
        profile: &OrganizationProfile,
    ) -> Result<(), AuthorizationError> {
        if let Some(expected) = input.expected_residency
            && expected != profile.data_residency
        {
            return Err(AuthorizationError::ResidencyMismatch {
                expected,
                actual: profile.data_residency,
            });
        }
        if let Some(expected) = input.expected_classification
            && expected != profile.data_classification
        {
            return Err(AuthorizationError::ClassificationMismatch {
                expected,
                actual: profile.data_classification,
            });
        }
        Ok(())
    }

    fn resolve_audit_source<'a>(
        &'a self,
        input: &'a OrgAccessInput,
        profile: &'a OrganizationProfile,
    ) -> Option<&'a str> {
        [
            input.audit_source.as_deref(),
            profile.audit_source.as_deref(),
            self.default_audit_source.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|source| !source.trim().is_empty())
    }
}

fn store_failure(err: StoreError) -> AuthorizationError {
    AuthorizationError::from(Error::from(err))
}

fn subject_attributes(membership: &Membership, profile: &OrganizationProfile) -> Attributes {
    let mut attributes = membership.attributes.clone();
    attributes.insert(SUBJECT_USER_ID, membership.user_id.as_str());
    attributes.insert(SUBJECT_ORG_ID, membership.org_id.as_str());
    attributes.insert(SUBJECT_ROLE_KEY, membership.role_key.as_str());
    attributes.insert(ATTR_RESIDENCY, profile.data_residency.as_str());
    attributes.insert(ATTR_CLASSIFICATION, profile.data_classification.as_str());
    attributes
}

fn resource_attributes(input: &OrgAccessInput, profile: &OrganizationProfile) -> Attributes {
    let mut attributes = input.resource_attributes.clone();
    attributes.insert_default(
        ATTR_RESIDENCY,
        AttributeValue::from(profile.data_residency.as_str()),
    );
    attributes.insert_default(
        ATTR_CLASSIFICATION,
        AttributeValue::from(profile.data_classification.as_str()),
    );
    attributes
}

#[async_trait]
impl<S> GuardEvaluator for AccessGuard<S>
where
    S: Store,
{
    async fn evaluate(&self, input: &OrgAccessInput) -> Result<AccessGrant, AuthorizationError> {
        let org = &input.org_id;
        let membership = self.active_membership(org, &input.user_id).await?;
        let profile = self.organization(org).await?;
        let permissions = self.membership_permissions(&membership).await?;

        self.check_rbac(input, &membership.role_key, &permissions)?;
        debug!(org_id = %org, role = %membership.role_key, "rbac checks passed");

        let subject = subject_attributes(&membership, &profile);
        let resource = resource_attributes(input, &profile);
        let policies = self.policies(org).await?;
        let matched_policy = self.check_abac(
            &policies,
            &PolicyRequest {
                action: &input.action,
                resource_type: &input.resource_type,
                subject: &subject,
                resource: &resource,
            },
        )?;
        debug!(
            org_id = %org,
            policies = policies.len(),
            matched = ?matched_policy,
            "abac checks passed"
        );

        self.check_compliance(input, &profile)?;

        let mut tenant_scope = profile.scope_for(org, self.resolve_audit_source(input, &profile))?;
        if let Some(batch_id) = membership.audit_batch_id.as_deref()
            && !batch_id.trim().is_empty()
        {
            tenant_scope = tenant_scope.with_audit_batch_id(batch_id);
        }
        Ok(AccessGrant {
            user_id: membership.user_id,
            role_key: membership.role_key,
            permissions,
            subject_attributes: subject,
            resource_attributes: resource,
            tenant_scope,
            matched_policy,
            wildcard: self.enable_wildcard,
        })
    }
}
