use crate::error::{Error, Result};
use crate::types::{DataClassification, DataResidency, OrgId};

/// Audit source used when neither the request nor any default names one.
pub const DEFAULT_AUDIT_SOURCE: &str = "org-guard";

/// Tenant scope of an authorized request.
///
/// Immutable once built; only getters are exposed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TenantScope {
    org_id: OrgId,
    data_residency: DataResidency,
    data_classification: DataClassification,
    audit_source: String,
    audit_batch_id: Option<String>,
}

impl TenantScope {
    /// Creates a scope. A blank audit source falls back to [`DEFAULT_AUDIT_SOURCE`].
    pub fn new(
        org_id: OrgId,
        data_residency: DataResidency,
        data_classification: DataClassification,
        audit_source: impl Into<String>,
    ) -> Self {
        let audit_source = audit_source.into();
        let audit_source = if audit_source.trim().is_empty() {
            DEFAULT_AUDIT_SOURCE.to_string()
        } else {
            audit_source
        };
        Self {
            org_id,
            data_residency,
            data_classification,
            audit_source,
            audit_batch_id: None,
        }
    }

    /// Attaches an audit batch id.
    pub fn with_audit_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.audit_batch_id = Some(batch_id.into());
        self
    }

    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    pub fn data_residency(&self) -> DataResidency {
        self.data_residency
    }

    pub fn data_classification(&self) -> DataClassification {
        self.data_classification
    }

    pub fn audit_source(&self) -> &str {
        &self.audit_source
    }

    pub fn audit_batch_id(&self) -> Option<&str> {
        self.audit_batch_id.as_deref()
    }
}

/// Stored compliance configuration of an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrganizationProfile {
    pub org_id: OrgId,
    pub data_residency: DataResidency,
    pub data_classification: DataClassification,
    /// Audit source configured for the tenant, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub audit_source: Option<String>,
}

impl OrganizationProfile {
    /// Creates a profile without a tenant audit source.
    pub fn new(
        org_id: OrgId,
        data_residency: DataResidency,
        data_classification: DataClassification,
    ) -> Self {
        Self {
            org_id,
            data_residency,
            data_classification,
            audit_source: None,
        }
    }

    /// Sets the tenant audit source.
    pub fn with_audit_source(mut self, audit_source: impl Into<String>) -> Self {
        self.audit_source = Some(audit_source.into());
        self
    }

    /// Builds the scope for a request against this organization.
    ///
    /// Fails when the profile belongs to a different org than `org_id`.
    pub fn scope_for(&self, org_id: &OrgId, audit_source: Option<&str>) -> Result<TenantScope> {
        if &self.org_id != org_id {
            return Err(Error::InvalidId(format!(
                "organization profile {} does not match {org_id}",
                self.org_id
            )));
        }
        let source = audit_source
            .or(self.audit_source.as_deref())
            .unwrap_or(DEFAULT_AUDIT_SOURCE);
        Ok(TenantScope::new(
            self.org_id.clone(),
            self.data_residency,
            self.data_classification,
            source,
        ))
    }
}
