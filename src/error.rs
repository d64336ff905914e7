use crate::types::{
    Action, DataClassification, DataResidency, OrgId, PolicyId, ResourceType, RoleKey,
};
use std::fmt;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction and validation errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid resource, action or enum name.
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// Stored or submitted ABAC policy failed validation.
    #[error("invalid policy {policy}: {reason}")]
    InvalidPolicy { policy: String, reason: String },
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

/// Denial kind, as recorded in audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DenialKind {
    RoleMismatch,
    PermissionDenied,
    PolicyDenied,
    ResidencyMismatch,
    ClassificationMismatch,
    CrossTenantAccess,
    NoActiveMembership,
    AuthorizationFailed,
}

impl DenialKind {
    /// Returns the stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoleMismatch => "role_mismatch",
            Self::PermissionDenied => "permission_denied",
            Self::PolicyDenied => "policy_denied",
            Self::ResidencyMismatch => "residency_mismatch",
            Self::ClassificationMismatch => "classification_mismatch",
            Self::CrossTenantAccess => "cross_tenant_access",
            Self::NoActiveMembership => "no_active_membership",
            Self::AuthorizationFailed => "authorization_failed",
        }
    }
}

impl fmt::Display for DenialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization denial.
///
/// Every denial renders as the same `not authorized` message so callers
/// cannot tell tenants, roles or policies apart from the error text. Use
/// [`AuthorizationError::kind`] to branch and [`AuthorizationError::detail`]
/// for operator-facing logs.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// Caller's role is not in the required set.
    #[error("not authorized")]
    RoleMismatch {
        role: RoleKey,
        required: Vec<RoleKey>,
    },
    /// A required resource/action pair is not granted.
    #[error("not authorized")]
    PermissionDenied {
        resource: ResourceType,
        action: Action,
    },
    /// An ABAC deny policy matched, or the tenant denies by empty policy set.
    #[error("not authorized")]
    PolicyDenied { policy: Option<PolicyId> },
    /// Tenant residency differs from the caller's expectation.
    #[error("not authorized")]
    ResidencyMismatch {
        expected: DataResidency,
        actual: DataResidency,
    },
    /// Tenant classification differs from the caller's expectation.
    #[error("not authorized")]
    ClassificationMismatch {
        expected: DataClassification,
        actual: DataClassification,
    },
    /// A record belongs to another tenant, or is missing.
    #[error("not authorized")]
    CrossTenantAccess {
        authorized: OrgId,
        record: Option<OrgId>,
    },
    /// Caller has no active membership in the organization.
    #[error("not authorized")]
    NoActiveMembership,
    /// Unexpected failure during evaluation.
    #[error("authorization failed")]
    AuthorizationFailed {
        #[source]
        source: StoreError,
    },
}

impl AuthorizationError {
    /// Wraps an arbitrary failure into [`AuthorizationError::AuthorizationFailed`].
    pub fn failed(source: impl Into<StoreError>) -> Self {
        Self::AuthorizationFailed {
            source: source.into(),
        }
    }

    /// Returns the denial kind.
    pub fn kind(&self) -> DenialKind {
        match self {
            Self::RoleMismatch { .. } => DenialKind::RoleMismatch,
            Self::PermissionDenied { .. } => DenialKind::PermissionDenied,
            Self::PolicyDenied { .. } => DenialKind::PolicyDenied,
            Self::ResidencyMismatch { .. } => DenialKind::ResidencyMismatch,
            Self::ClassificationMismatch { .. } => DenialKind::ClassificationMismatch,
            Self::CrossTenantAccess { .. } => DenialKind::CrossTenantAccess,
            Self::NoActiveMembership => DenialKind::NoActiveMembership,
            Self::AuthorizationFailed { .. } => DenialKind::AuthorizationFailed,
        }
    }

    /// Operator-facing description. Never return this to end users.
    pub fn detail(&self) -> String {
        match self {
            Self::RoleMismatch { role, required } => {
                let required: Vec<&str> = required.iter().map(RoleKey::as_str).collect();
                format!("role {role} is not one of [{}]", required.join(", "))
            }
            Self::PermissionDenied { resource, action } => {
                format!("missing permission {resource}:{action}")
            }
            Self::PolicyDenied { policy: Some(policy) } => {
                format!("denied by abac policy {policy}")
            }
            Self::PolicyDenied { policy: None } => {
                "denied: tenant has no abac policies".to_string()
            }
            Self::ResidencyMismatch { expected, actual } => {
                format!("residency {actual} does not match expected {expected}")
            }
            Self::ClassificationMismatch { expected, actual } => {
                format!("classification {actual} does not match expected {expected}")
            }
            Self::CrossTenantAccess {
                authorized,
                record: Some(record),
            } => format!("record org {record} does not match authorized org {authorized}"),
            Self::CrossTenantAccess {
                authorized,
                record: None,
            } => format!("record missing for authorized org {authorized}"),
            Self::NoActiveMembership => "no active membership".to_string(),
            Self::AuthorizationFailed { source } => format!("evaluation failed: {source}"),
        }
    }
}

impl From<Error> for AuthorizationError {
    fn from(error: Error) -> Self {
        Self::failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn denial_display_should_not_leak_identifiers() {
        let err = AuthorizationError::CrossTenantAccess {
            authorized: OrgId::try_from("org-1").unwrap(),
            record: Some(OrgId::try_from("org-2").unwrap()),
        };
        assert_eq!(err.to_string(), "not authorized");
        assert!(err.detail().contains("org-2"));
        assert_eq!(err.kind(), DenialKind::CrossTenantAccess);
    }

    #[test]
    fn crate_error_should_wrap_into_authorization_failed_with_cause() {
        let err = AuthorizationError::from(Error::InvalidId("bad".to_string()));
        assert_eq!(err.kind(), DenialKind::AuthorizationFailed);
        assert_eq!(err.to_string(), "authorization failed");
        let cause = err.source().expect("cause preserved");
        assert!(cause.to_string().contains("bad"));
    }
}
