use crate::attributes::{AttributeValue, Attributes};
use crate::permission::PermissionMap;
use crate::types::{Action, DataClassification, DataResidency, OrgId, ResourceType, RoleKey, UserId};

/// One authorization request: who asks, for what, under which requirements.
///
/// `None` requirements impose nothing; [`crate::RepositoryAuthorizer`]
/// defaults may still add to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgAccessInput {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub action: Action,
    pub resource_type: ResourceType,
    pub required_roles: Option<Vec<RoleKey>>,
    pub required_permissions: Option<PermissionMap>,
    /// Alternative permission profiles; one fully granted profile suffices.
    pub required_any_permissions: Option<Vec<PermissionMap>>,
    pub expected_classification: Option<DataClassification>,
    pub expected_residency: Option<DataResidency>,
    pub audit_source: Option<String>,
    pub correlation_id: Option<String>,
    pub resource_attributes: Attributes,
}

impl OrgAccessInput {
    /// Creates a request with no requirements.
    pub fn new(org_id: OrgId, user_id: UserId, action: Action, resource_type: ResourceType) -> Self {
        Self {
            org_id,
            user_id,
            action,
            resource_type,
            required_roles: None,
            required_permissions: None,
            required_any_permissions: None,
            expected_classification: None,
            expected_residency: None,
            audit_source: None,
            correlation_id: None,
            resource_attributes: Attributes::new(),
        }
    }

    pub fn require_roles(mut self, roles: impl IntoIterator<Item = RoleKey>) -> Self {
        self.required_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn require_permissions(mut self, permissions: PermissionMap) -> Self {
        self.required_permissions = Some(permissions);
        self
    }

    pub fn require_any_permissions(mut self, profiles: impl IntoIterator<Item = PermissionMap>) -> Self {
        self.required_any_permissions = Some(profiles.into_iter().collect());
        self
    }

    pub fn expect_classification(mut self, classification: DataClassification) -> Self {
        self.expected_classification = Some(classification);
        self
    }

    pub fn expect_residency(mut self, residency: DataResidency) -> Self {
        self.expected_residency = Some(residency);
        self
    }

    pub fn audit_source(mut self, source: impl Into<String>) -> Self {
        self.audit_source = Some(source.into());
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn resource_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.resource_attributes.insert(key, value);
        self
    }

    pub fn resource_attributes(mut self, attributes: Attributes) -> Self {
        self.resource_attributes = attributes;
        self
    }
}
