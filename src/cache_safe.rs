use crate::context::AuthorizationContext;
use crate::permission::PermissionMap;
use crate::types::{DataClassification, DataResidency, OrgId, RoleKey, UserId};
use std::fmt::Write as _;

/// Appends `value` as `{byte_len}:{value}` so no component can absorb its neighbours.
fn push_component(key: &mut String, value: &str) {
    let _ = write!(key, "{}:{value}", value.len());
}

/// Subset of an [`AuthorizationContext`] that is safe to use as cache-key material.
///
/// Per-request data (correlation id, audit source and batch, the request's
/// action, resource and attributes) is dropped, so two requests by the same
/// member with the same grants produce equal values. It grants nothing and
/// cannot be turned back into an [`AuthorizationContext`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheSafeAuthorizationContext {
    org_id: OrgId,
    user_id: UserId,
    role_key: RoleKey,
    permissions: PermissionMap,
    wildcard: bool,
    data_residency: DataResidency,
    data_classification: DataClassification,
}

impl CacheSafeAuthorizationContext {
    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn role_key(&self) -> &RoleKey {
        &self.role_key
    }

    pub fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }

    /// Whether `*` grants in [`Self::permissions`] match any resource or action.
    pub fn wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn data_residency(&self) -> DataResidency {
        self.data_residency
    }

    pub fn data_classification(&self) -> DataClassification {
        self.data_classification
    }

    /// Deterministic string key, e.g.
    /// `5:org-1|6:user-1|6:member|7:UK_ONLY|8:OFFICIAL|exact|12:organization=4:read`.
    ///
    /// Every variable component is length-prefixed, so distinct values never
    /// share a key even when names contain `:` or other separators.
    pub fn fingerprint(&self) -> String {
        let mut key = String::new();
        for component in [
            self.org_id.as_str(),
            self.user_id.as_str(),
            self.role_key.as_str(),
            self.data_residency.as_str(),
            self.data_classification.as_str(),
        ] {
            push_component(&mut key, component);
            key.push('|');
        }
        key.push_str(if self.wildcard { "wildcard|" } else { "exact|" });
        for (index, (resource, action)) in self.permissions.pairs().enumerate() {
            if index > 0 {
                key.push(',');
            }
            push_component(&mut key, resource.as_str());
            key.push('=');
            push_component(&mut key, action.as_str());
        }
        key
    }
}

impl From<&AuthorizationContext> for CacheSafeAuthorizationContext {
    fn from(context: &AuthorizationContext) -> Self {
        Self {
            org_id: context.org_id().clone(),
            user_id: context.user_id().clone(),
            role_key: context.role_key().clone(),
            permissions: context.permissions().clone(),
            wildcard: context.wildcard(),
            data_residency: context.data_residency(),
            data_classification: context.data_classification(),
        }
    }
}

/// Strips request-specific fields from an authorized context.
pub fn to_cache_safe_authorization_context(
    context: &AuthorizationContext,
) -> CacheSafeAuthorizationContext {
    CacheSafeAuthorizationContext::from(context)
}
