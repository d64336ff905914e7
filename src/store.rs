use crate::attributes::Attributes;
use crate::error::StoreError;
use crate::permission::PermissionMap;
use crate::policy::AbacPolicyRecord;
use crate::scope::OrganizationProfile;
use crate::types::{OrgId, RoleKey, UserId};
use async_trait::async_trait;

/// Lifecycle state of a membership. Only `Active` memberships authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum MembershipStatus {
    Active,
    Invited,
    Suspended,
    Deactivated,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Membership {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub role_key: RoleKey,
    pub status: MembershipStatus,
    /// Grants attached to this membership on top of the role template.
    #[cfg_attr(feature = "serde", serde(default))]
    pub permissions: PermissionMap,
    /// ABAC subject attributes (department, clearance, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Attributes,
    /// Audit batch the member's actions are grouped under, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub audit_batch_id: Option<String>,
}

impl Membership {
    /// Creates an active membership without extra grants or attributes.
    pub fn active(org_id: OrgId, user_id: UserId, role_key: RoleKey) -> Self {
        Self {
            org_id,
            user_id,
            role_key,
            status: MembershipStatus::Active,
            permissions: PermissionMap::new(),
            attributes: Attributes::new(),
            audit_batch_id: None,
        }
    }

    pub fn with_status(mut self, status: MembershipStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionMap) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_audit_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.audit_batch_id = Some(batch_id.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Store interface for organization compliance profiles.
#[async_trait]
pub trait OrganizationStore {
    /// Returns the profile of an organization, if it exists.
    async fn organization(
        &self,
        org: OrgId,
    ) -> std::result::Result<Option<OrganizationProfile>, StoreError>;
}

/// Store interface for memberships and role templates.
#[async_trait]
pub trait MembershipStore {
    /// Returns the membership of a user within an organization.
    async fn membership(
        &self,
        org: OrgId,
        user: UserId,
    ) -> std::result::Result<Option<Membership>, StoreError>;

    /// Returns the permission template bound to a role key within an organization.
    async fn role_permissions(
        &self,
        org: OrgId,
        role: RoleKey,
    ) -> std::result::Result<PermissionMap, StoreError>;
}

/// Store interface for tenant ABAC policies.
#[async_trait]
pub trait PolicyStore {
    /// Returns the raw policy records of an organization.
    async fn policies(&self, org: OrgId) -> std::result::Result<Vec<AbacPolicyRecord>, StoreError>;
}

/// Composite store trait.
pub trait Store: OrganizationStore + MembershipStore + PolicyStore + Send + Sync {}

impl<T> Store for T where T: OrganizationStore + MembershipStore + PolicyStore + Send + Sync {}
