use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use async_trait::async_trait;
use crate::permission::PermissionMap;
use crate::policy::{AbacPolicy, AbacPolicyRecord};
use crate::scope::OrganizationProfile;
use crate::store::{Membership, MembershipStore, OrganizationStore, PolicyStore};
use crate::types::{OrgId, RoleKey, UserId};

/// In-memory store implementation for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    organizations: RwLock<HashMap<OrgId, OrganizationProfile>>,
    memberships: RwLock<HashMap<(OrgId, UserId), Membership>>,
    role_permissions: RwLock<HashMap<(OrgId, RoleKey), PermissionMap>>,
    policies: RwLock<HashMap<OrgId, Vec<AbacPolicyRecord>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an organization profile.
    pub fn add_organization(&self, profile: OrganizationProfile) {
        let mut guard = self.inner.organizations.write().expect("poisoned lock");
        guard.insert(profile.org_id.clone(), profile);
    }

    /// Adds or replaces a membership.
    pub fn add_membership(&self, membership: Membership) {
        let mut guard = self.inner.memberships.write().expect("poisoned lock");
        guard.insert(
            (membership.org_id.clone(), membership.user_id.clone()),
            membership,
        );
    }

    /// Removes a membership.
    pub fn remove_membership(&self, org: &OrgId, user: &UserId) {
        let mut guard = self.inner.memberships.write().expect("poisoned lock");
        guard.remove(&(org.clone(), user.clone()));
    }

    /// Adds permissions to a role template.
    pub fn add_role_permissions(&self, org: OrgId, role: RoleKey, permissions: &PermissionMap) {
        let mut guard = self.inner.role_permissions.write().expect("poisoned lock");
        guard.entry((org, role)).or_default().extend(permissions);
    }

    /// Appends a validated policy to an organization.
    pub fn add_policy(&self, org: OrgId, policy: &AbacPolicy) {
        self.add_policy_record(org, AbacPolicyRecord::from(policy));
    }

    /// Appends a raw policy record, valid or not.
    pub fn add_policy_record(&self, org: OrgId, record: AbacPolicyRecord) {
        let mut guard = self.inner.policies.write().expect("poisoned lock");
        guard.entry(org).or_default().push(record);
    }

    /// Removes every policy of an organization.
    pub fn clear_policies(&self, org: &OrgId) {
        let mut guard = self.inner.policies.write().expect("poisoned lock");
        guard.remove(org);
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn organization(
        &self,
        org: OrgId,
    ) -> std::result::Result<Option<OrganizationProfile>, crate::StoreError> {
        let guard = self.inner.organizations.read().expect("poisoned lock");
        Ok(guard.get(&org).cloned())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn membership(
        &self,
        org: OrgId,
        user: UserId,
    ) -> std::result::Result<Option<Membership>, crate::StoreError> {
        let guard = self.inner.memberships.read().expect("poisoned lock");
        Ok(guard.get(&(org, user)).cloned())
    }

    async fn role_permissions(
        &self,
        org: OrgId,
        role: RoleKey,
    ) -> std::result::Result<PermissionMap, crate::StoreError> {
        let guard = self.inner.role_permissions.read().expect("poisoned lock");
        Ok(guard.get(&(org, role)).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn policies(
        &self,
        org: OrgId,
    ) -> std::result::Result<Vec<AbacPolicyRecord>, crate::StoreError> {
        let guard = self.inner.policies.read().expect("poisoned lock");
        Ok(guard.get(&org).cloned().unwrap_or_default())
    }
}
