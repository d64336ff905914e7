use crate::attributes::Attributes;
use crate::error::AuthorizationError;
use crate::guard::AccessGrant;
use crate::permission::PermissionMap;
use crate::request::OrgAccessInput;
use crate::scope::TenantScope;
use crate::types::{
    Action, DataClassification, DataResidency, OrgId, PolicyId, ResourceType, RoleKey, UserId,
};

/// Result of a successful authorization, handed to exactly one handler.
///
/// Not `Clone`. Only [`crate::RepositoryAuthorizer::authorize`] creates one,
/// and its tenant scope always belongs to the authorized org.
#[derive(Debug)]
pub struct AuthorizationContext {
    org_id: OrgId,
    user_id: UserId,
    role_key: RoleKey,
    permissions: PermissionMap,
    subject_attributes: Attributes,
    action: Action,
    resource_type: ResourceType,
    resource_attributes: Attributes,
    required_roles: Option<Vec<RoleKey>>,
    required_permissions: Option<PermissionMap>,
    required_any_permissions: Option<Vec<PermissionMap>>,
    expected_residency: Option<DataResidency>,
    expected_classification: Option<DataClassification>,
    correlation_id: String,
    matched_policy: Option<PolicyId>,
    wildcard: bool,
    tenant_scope: TenantScope,
}

impl AuthorizationContext {
    /// Freezes a resolved request and its grant.
    ///
    /// Fails when the grant was issued for another org or user.
    pub(crate) fn new(
        input: OrgAccessInput,
        correlation_id: String,
        grant: AccessGrant,
    ) -> Result<Self, AuthorizationError> {
        if grant.org_id() != &input.org_id || grant.user_id != input.user_id {
            return Err(AuthorizationError::failed(format!(
                "grant for {}/{} does not match request {}/{}",
                grant.org_id(),
                grant.user_id,
                input.org_id,
                input.user_id
            )));
        }
        Ok(Self {
            org_id: input.org_id,
            user_id: input.user_id,
            role_key: grant.role_key,
            permissions: grant.permissions,
            subject_attributes: grant.subject_attributes,
            action: input.action,
            resource_type: input.resource_type,
            resource_attributes: grant.resource_attributes,
            required_roles: input.required_roles,
            required_permissions: input.required_permissions,
            required_any_permissions: input.required_any_permissions,
            expected_residency: input.expected_residency,
            expected_classification: input.expected_classification,
            correlation_id,
            matched_policy: grant.matched_policy,
            wildcard: grant.wildcard,
            tenant_scope: grant.tenant_scope,
        })
    }

    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn role_key(&self) -> &RoleKey {
        &self.role_key
    }

    /// Effective permissions at evaluation time.
    pub fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }

    pub fn subject_attributes(&self) -> &Attributes {
        &self.subject_attributes
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn resource_attributes(&self) -> &Attributes {
        &self.resource_attributes
    }

    pub fn required_roles(&self) -> Option<&[RoleKey]> {
        self.required_roles.as_deref()
    }

    pub fn required_permissions(&self) -> Option<&PermissionMap> {
        self.required_permissions.as_ref()
    }

    pub fn required_any_permissions(&self) -> Option<&[PermissionMap]> {
        self.required_any_permissions.as_deref()
    }

    pub fn expected_residency(&self) -> Option<DataResidency> {
        self.expected_residency
    }

    pub fn expected_classification(&self) -> Option<DataClassification> {
        self.expected_classification
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Allow policy that matched during evaluation, if any.
    pub fn matched_policy(&self) -> Option<&PolicyId> {
        self.matched_policy.as_ref()
    }

    /// Returns whether the permission snapshot grants `action` on `resource`.
    ///
    /// Uses the same wildcard rule as the evaluation that produced this context.
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.permissions.grants(resource, action, self.wildcard)
    }

    /// Whether `*` grants in the snapshot match any resource or action.
    pub fn wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn tenant_scope(&self) -> &TenantScope {
        &self.tenant_scope
    }

    pub fn audit_source(&self) -> &str {
        self.tenant_scope.audit_source()
    }

    pub fn data_residency(&self) -> DataResidency {
        self.tenant_scope.data_residency()
    }

    pub fn data_classification(&self) -> DataClassification {
        self.tenant_scope.data_classification()
    }
}
