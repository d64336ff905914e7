//! Audit side-channel for authorization decisions.

use crate::attributes::Attributes;
use crate::error::{DenialKind, StoreError};
use crate::types::{Action, OrgId, ResourceType, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Tracing target used by [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "tenant_guard::audit";

/// Outcome recorded in an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record per authorization evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuthorizationAuditEvent {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub action: Action,
    pub resource_type: ResourceType,
    pub resource_attributes: Attributes,
    pub decision: Decision,
    pub denial_kind: Option<DenialKind>,
    pub audit_source: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Failure reported by an [`AuditSink`].
#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditSinkError(#[source] pub StoreError);

impl AuditSinkError {
    pub fn new(source: impl Into<StoreError>) -> Self {
        Self(source.into())
    }
}

/// Destination for authorization audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an event. Failures never change the authorization outcome.
    async fn record(&self, event: AuthorizationAuditEvent) -> Result<(), AuditSinkError>;
}

/// Emits events as `tracing` records on [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuthorizationAuditEvent) -> Result<(), AuditSinkError> {
        let denial_kind = event.denial_kind.map(DenialKind::as_str).unwrap_or("");
        tracing::info!(
            target: AUDIT_TARGET,
            org_id = %event.org_id,
            user_id = %event.user_id,
            action = %event.action,
            resource_type = %event.resource_type,
            decision = %event.decision,
            denial_kind,
            audit_source = %event.audit_source,
            correlation_id = %event.correlation_id,
            timestamp = %event.timestamp.to_rfc3339(),
            "authorization decision"
        );
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuthorizationAuditEvent) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuthorizationAuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events, oldest first.
    pub fn events(&self) -> Vec<AuthorizationAuditEvent> {
        self.events.lock().expect("poisoned lock").clone()
    }

    /// Removes and returns recorded events.
    pub fn drain(&self) -> Vec<AuthorizationAuditEvent> {
        std::mem::take(&mut *self.events.lock().expect("poisoned lock"))
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuthorizationAuditEvent) -> Result<(), AuditSinkError> {
        self.events
            .lock()
            .map_err(|_| AuditSinkError::new("poisoned audit buffer"))?
            .push(event);
        Ok(())
    }
}
