//! Repository-facing authorization façade.
//!
//! [`RepositoryAuthorizer`] merges service-wide requirements into each
//! request, runs the configured [`GuardEvaluator`], records an audit event
//! for every outcome and only then hands an [`AuthorizationContext`] to the
//! caller's handler.

use crate::attributes::Attributes;
use crate::audit::{AuditSink, AuthorizationAuditEvent, Decision, TracingAuditSink};
use crate::context::AuthorizationContext;
use crate::error::AuthorizationError;
use crate::guard::GuardEvaluator;
use crate::permission::{PermissionMap, merge_permission_maps, merge_roles};
use crate::request::OrgAccessInput;
use crate::scope::DEFAULT_AUDIT_SOURCE;
use crate::types::{Action, DataClassification, DataResidency, OrgId, ResourceType, RoleKey};
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Requirements applied to every request of a repository.
///
/// Permissions and roles are unioned with the request's; the remaining fields
/// only fill in what the request leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AuthorizerDefaults {
    pub required_roles: Option<Vec<RoleKey>>,
    pub required_permissions: Option<PermissionMap>,
    pub required_any_permissions: Option<Vec<PermissionMap>>,
    pub expected_classification: Option<DataClassification>,
    pub expected_residency: Option<DataResidency>,
    pub audit_source: Option<String>,
}

/// A persisted record owned by one tenant.
pub trait TenantRecord {
    fn org_id(&self) -> &OrgId;

    /// Classification the record is tagged with, if any.
    fn data_classification(&self) -> Option<DataClassification> {
        None
    }

    /// Residency the record is tagged with, if any.
    fn data_residency(&self) -> Option<DataResidency> {
        None
    }

    /// Whether the record holds personal data. Such records need a `pii` grant.
    fn contains_pii(&self) -> bool {
        false
    }
}

impl<T: TenantRecord + ?Sized> TenantRecord for &T {
    fn org_id(&self) -> &OrgId {
        (**self).org_id()
    }

    fn data_classification(&self) -> Option<DataClassification> {
        (**self).data_classification()
    }

    fn data_residency(&self) -> Option<DataResidency> {
        (**self).data_residency()
    }

    fn contains_pii(&self) -> bool {
        (**self).contains_pii()
    }
}

/// Resource key of the grants that unlock records holding personal data.
pub const PII_RESOURCE: &str = "pii";
const PII_ACTIONS: [&str; 4] = ["read", "write", "delete", "process"];
/// Resource attribute naming the foreign org in a cross-tenant audit event.
pub const ATTR_RECORD_ORG_ID: &str = "recordOrgId";

/// Authorization entry point for repositories and services.
pub struct RepositoryAuthorizer {
    guard: Arc<dyn GuardEvaluator>,
    defaults: AuthorizerDefaults,
    audit_sink: Arc<dyn AuditSink>,
}

/// Builder for [`RepositoryAuthorizer`].
pub struct RepositoryAuthorizerBuilder {
    guard: Arc<dyn GuardEvaluator>,
    defaults: AuthorizerDefaults,
    audit_sink: Arc<dyn AuditSink>,
}

impl RepositoryAuthorizerBuilder {
    /// Creates a builder with empty defaults and a [`TracingAuditSink`].
    pub fn new(guard: Arc<dyn GuardEvaluator>) -> Self {
        Self {
            guard,
            defaults: AuthorizerDefaults::default(),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }

    /// Sets the requirements merged into every request.
    pub fn defaults(mut self, defaults: AuthorizerDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the audit sink.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    /// Builds the authorizer.
    pub fn build(self) -> RepositoryAuthorizer {
        RepositoryAuthorizer {
            guard: self.guard,
            defaults: self.defaults,
            audit_sink: self.audit_sink,
        }
    }
}

impl fmt::Debug for RepositoryAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryAuthorizer")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl RepositoryAuthorizer {
    /// Creates an authorizer with empty defaults and a [`TracingAuditSink`].
    pub fn new(guard: Arc<dyn GuardEvaluator>) -> Self {
        RepositoryAuthorizerBuilder::new(guard).build()
    }

    pub fn builder(guard: Arc<dyn GuardEvaluator>) -> RepositoryAuthorizerBuilder {
        RepositoryAuthorizerBuilder::new(guard)
    }

    pub fn defaults(&self) -> &AuthorizerDefaults {
        &self.defaults
    }

    /// Authorizes `input` and runs `handler` with the resulting context.
    ///
    /// The handler runs at most once, and never when a check fails. Every
    /// outcome is recorded on the audit sink before this returns.
    #[tracing::instrument(
        name = "authorize",
        skip_all,
        fields(
            org_id = %input.org_id,
            user_id = %input.user_id,
            action = %input.action,
            resource_type = %input.resource_type,
        )
    )]
    pub async fn authorize<F, Fut, T>(
        &self,
        input: OrgAccessInput,
        handler: F,
    ) -> Result<T, AuthorizationError>
    where
        F: FnOnce(AuthorizationContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let input = self.resolve(input);
        let correlation_id = input
            .correlation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut event = AuthorizationAuditEvent {
            org_id: input.org_id.clone(),
            user_id: input.user_id.clone(),
            action: input.action.clone(),
            resource_type: input.resource_type.clone(),
            resource_attributes: input.resource_attributes.clone(),
            decision: Decision::Deny,
            denial_kind: None,
            audit_source: input
                .audit_source
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIT_SOURCE.to_string()),
            correlation_id: correlation_id.clone(),
            timestamp: Utc::now(),
        };

        let outcome = match self.guard.evaluate(&input).await {
            Ok(grant) => {
                event.audit_source = grant.tenant_scope.audit_source().to_string();
                event.resource_attributes = grant.resource_attributes.clone();
                AuthorizationContext::new(input, correlation_id, grant)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(context) => {
                debug!(
                    role = %context.role_key(),
                    correlation_id = %context.correlation_id(),
                    "authorization granted"
                );
                event.decision = Decision::Allow;
                self.emit(event).await;
                Ok(handler(context).await)
            }
            Err(err) => {
                match &err {
                    AuthorizationError::AuthorizationFailed { .. } => {
                        error!(reason = %err.detail(), "authorization evaluation failed")
                    }
                    _ => warn!(kind = %err.kind(), reason = %err.detail(), "authorization denied"),
                }
                event.denial_kind = Some(err.kind());
                self.emit(event).await;
                Err(err)
            }
        }
    }

    /// Returns the record when it belongs to the context's org.
    ///
    /// A missing record is treated like a foreign one. Refusals are recorded
    /// on the audit sink with the context's correlation id.
    pub async fn assert_tenant_record<R: TenantRecord>(
        &self,
        record: Option<R>,
        context: &AuthorizationContext,
    ) -> Result<R, AuthorizationError> {
        let record_org = match record {
            Some(record) if record.org_id() == context.org_id() => return Ok(record),
            Some(record) => Some(record.org_id().clone()),
            None => None,
        };
        error!(
            authorized_org = %context.org_id(),
            record_org = ?record_org,
            correlation_id = %context.correlation_id(),
            "cross-tenant record access blocked"
        );
        let mut attributes = context.resource_attributes().clone();
        if let Some(record_org) = &record_org {
            attributes.insert(ATTR_RECORD_ORG_ID, record_org.as_str());
        }
        let err = AuthorizationError::CrossTenantAccess {
            authorized: context.org_id().clone(),
            record: record_org,
        };
        self.emit(record_denial_event(context, attributes, &err)).await;
        Err(err)
    }

    /// Like [`Self::assert_tenant_record`], and also checks the record's compliance tags.
    ///
    /// A record classified above the tenant's classification, or tagged with
    /// another residency, is refused. So is a record holding personal data
    /// when the context has no [`PII_RESOURCE`] grant.
    pub async fn assert_record_compliance<R: TenantRecord>(
        &self,
        record: Option<R>,
        context: &AuthorizationContext,
    ) -> Result<R, AuthorizationError> {
        let record = self.assert_tenant_record(record, context).await?;
        let Err(err) = check_record_tags(&record, context) else {
            return Ok(record);
        };
        drop(record);
        warn!(
            org_id = %context.org_id(),
            kind = %err.kind(),
            reason = %err.detail(),
            correlation_id = %context.correlation_id(),
            "record compliance check denied"
        );
        let event = record_denial_event(context, context.resource_attributes().clone(), &err);
        self.emit(event).await;
        Err(err)
    }

    /// Re-checks one permission against the context's snapshot, without store access.
    pub fn enforce_permission(
        &self,
        context: &AuthorizationContext,
        resource: &str,
        action: &str,
    ) -> Result<(), AuthorizationError> {
        if context.has_permission(resource, action) {
            return Ok(());
        }
        let err = AuthorizationError::PermissionDenied {
            resource: ResourceType::new(resource)?,
            action: Action::new(action)?,
        };
        warn!(
            org_id = %context.org_id(),
            reason = %err.detail(),
            correlation_id = %context.correlation_id(),
            "permission re-check denied"
        );
        Err(err)
    }

    fn resolve(&self, mut input: OrgAccessInput) -> OrgAccessInput {
        let defaults = &self.defaults;
        input.required_permissions = merge_permission_maps(
            defaults.required_permissions.as_ref(),
            input.required_permissions.as_ref(),
        );
        input.required_roles = merge_roles(
            defaults.required_roles.as_deref(),
            input.required_roles.as_deref(),
        );
        if input.required_any_permissions.is_none() {
            input.required_any_permissions = defaults.required_any_permissions.clone();
        }
        input.expected_classification = input
            .expected_classification
            .or(defaults.expected_classification);
        input.expected_residency = input.expected_residency.or(defaults.expected_residency);
        input.audit_source = input
            .audit_source
            .filter(|source| !source.trim().is_empty())
            .or_else(|| defaults.audit_source.clone());
        input
    }

    async fn emit(&self, event: AuthorizationAuditEvent) {
        if let Err(err) = self.audit_sink.record(event).await {
            error!(error = %err, "failed to record authorization audit event");
        }
    }
}

fn check_record_tags<R: TenantRecord>(
    record: &R,
    context: &AuthorizationContext,
) -> Result<(), AuthorizationError> {
    if let Some(classification) = record.data_classification()
        && classification > context.data_classification()
    {
        return Err(AuthorizationError::ClassificationMismatch {
            expected: context.data_classification(),
            actual: classification,
        });
    }
    if let Some(residency) = record.data_residency()
        && residency != context.data_residency()
    {
        return Err(AuthorizationError::ResidencyMismatch {
            expected: context.data_residency(),
            actual: residency,
        });
    }
    if record.contains_pii()
        && !PII_ACTIONS
            .iter()
            .any(|action| context.has_permission(PII_RESOURCE, action))
    {
        return Err(AuthorizationError::PermissionDenied {
            resource: ResourceType::from_string(PII_RESOURCE.to_string()),
            action: context.action().clone(),
        });
    }
    Ok(())
}

fn record_denial_event(
    context: &AuthorizationContext,
    resource_attributes: Attributes,
    err: &AuthorizationError,
) -> AuthorizationAuditEvent {
    AuthorizationAuditEvent {
        org_id: context.org_id().clone(),
        user_id: context.user_id().clone(),
        action: context.action().clone(),
        resource_type: context.resource_type().clone(),
        resource_attributes,
        decision: Decision::Deny,
        denial_kind: Some(err.kind()),
        audit_source: context.audit_source().to_string(),
        correlation_id: context.correlation_id().to_string(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSinkError, MemoryAuditSink};
    use crate::error::DenialKind;
    use crate::guard::{AccessGrant, AccessGuardBuilder};
    use crate::memory_store::MemoryStore;
    use crate::policy::{AbacPolicy, Effect};
    use crate::scope::{OrganizationProfile, TenantScope};
    use crate::store::Membership;
    use crate::types::{PolicyId, UserId};
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn org(value: &str) -> OrgId {
        OrgId::try_from(value).unwrap()
    }

    fn user() -> UserId {
        UserId::try_from("user-1").unwrap()
    }

    fn role(value: &str) -> RoleKey {
        RoleKey::try_from(value).unwrap()
    }

    fn perms(pairs: &[(&str, &str)]) -> PermissionMap {
        PermissionMap::try_from_pairs(pairs.iter().map(|(r, a)| (*r, [*a]))).unwrap()
    }

    fn input(org_id: &str, action: &str, resource: &str) -> OrgAccessInput {
        OrgAccessInput::new(
            org(org_id),
            user(),
            Action::try_from(action).unwrap(),
            ResourceType::try_from(resource).unwrap(),
        )
    }

    fn grant_for(org_id: &str, permissions: PermissionMap) -> AccessGrant {
        AccessGrant {
            user_id: user(),
            role_key: role("member"),
            permissions,
            subject_attributes: Attributes::new(),
            resource_attributes: Attributes::new(),
            tenant_scope: TenantScope::new(
                org(org_id),
                DataResidency::UkOnly,
                DataClassification::OfficialSensitive,
                DEFAULT_AUDIT_SOURCE,
            ),
            matched_policy: None,
            wildcard: false,
        }
    }

    /// Guard stub that replays a fixed outcome and records what it was asked.
    struct StubGuard {
        outcome: fn() -> Result<AccessGrant, AuthorizationError>,
        seen: Mutex<Vec<OrgAccessInput>>,
    }

    impl StubGuard {
        fn new(outcome: fn() -> Result<AccessGrant, AuthorizationError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_input(&self) -> OrgAccessInput {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GuardEvaluator for StubGuard {
        async fn evaluate(&self, input: &OrgAccessInput) -> Result<AccessGrant, AuthorizationError> {
            self.seen.lock().unwrap().push(input.clone());
            (self.outcome)()
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: AuthorizationAuditEvent) -> Result<(), AuditSinkError> {
            Err(AuditSinkError::new("sink offline"))
        }
    }

    fn allow_org_1() -> Result<AccessGrant, AuthorizationError> {
        Ok(grant_for("org-1", perms(&[("organization", "read")])))
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_organization(OrganizationProfile::new(
            org("org-1"),
            DataResidency::UkOnly,
            DataClassification::Official,
        ));
        store.add_membership(Membership::active(org("org-1"), user(), role("member")));
        store.add_role_permissions(
            org("org-1"),
            role("member"),
            &perms(&[("organization", "read"), ("employeeProfile", "list"), ("hr.compliance", "read")]),
        );
        store
    }

    fn store_authorizer(store: MemoryStore, sink: Arc<MemoryAuditSink>) -> RepositoryAuthorizer {
        let guard = Arc::new(AccessGuardBuilder::new(store).build());
        RepositoryAuthorizer::builder(guard).audit_sink(sink).build()
    }

    #[test]
    fn authorize_should_run_handler_once_with_context() {
        let sink = Arc::new(MemoryAuditSink::new());
        let authorizer = store_authorizer(seeded_store(), sink.clone());
        let calls = AtomicUsize::new(0);

        let org_id = block_on(authorizer.authorize(
            input("org-1", "read", "organization")
                .require_permissions(perms(&[("organization", "read")]))
                .correlation_id("corr-7"),
            |context| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(context.correlation_id(), "corr-7");
                    assert_eq!(context.tenant_scope().org_id(), context.org_id());
                    context.org_id().clone()
                }
            },
        ))
        .unwrap();

        assert_eq!(org_id, org("org-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].decision, Decision::Allow);
        assert_eq!(events[0].correlation_id, "corr-7");
        assert_eq!(events[0].audit_source, DEFAULT_AUDIT_SOURCE);
    }

    #[test]
    fn handler_should_never_run_when_a_check_fails() {
        let store = seeded_store();
        store.add_policy(
            org("org-1"),
            &AbacPolicy::new(
                PolicyId::try_from("deny-compliance").unwrap(),
                Effect::Deny,
                vec![Action::try_from("*").unwrap()],
                vec![ResourceType::try_from("hr.compliance").unwrap()],
            )
            .unwrap()
            .with_priority(1),
        );
        let sink = Arc::new(MemoryAuditSink::new());
        let authorizer = store_authorizer(store, sink.clone());
        let calls = AtomicUsize::new(0);

        let failing = vec![
            input("org-1", "read", "organization").require_roles([role("owner")]),
            input("org-1", "update", "organization")
                .require_permissions(perms(&[("organization", "update")])),
            input("org-1", "read", "hr.compliance"),
            input("org-1", "read", "organization").expect_residency(DataResidency::Global),
            input("org-1", "read", "organization")
                .expect_classification(DataClassification::TopSecret),
            input("org-2", "read", "organization"),
        ];
        let expected = [
            DenialKind::RoleMismatch,
            DenialKind::PermissionDenied,
            DenialKind::PolicyDenied,
            DenialKind::ResidencyMismatch,
            DenialKind::ClassificationMismatch,
            DenialKind::NoActiveMembership,
        ];

        for (request, kind) in failing.into_iter().zip(expected) {
            let err = block_on(authorizer.authorize(request, |_context| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {}
            }))
            .unwrap_err();
            assert_eq!(err.kind(), kind);
            assert_eq!(err.to_string(), "not authorized");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let events = sink.events();
        assert_eq!(events.len(), expected.len());
        assert!(events.iter().all(|event| event.decision == Decision::Deny));
        assert_eq!(events[2].denial_kind, Some(DenialKind::PolicyDenied));
    }

    #[test]
    fn deny_policy_should_override_higher_priority_allow() {
        let store = seeded_store();
        let make = |id: &str, effect: Effect, priority: i32| {
            AbacPolicy::new(
                PolicyId::try_from(id).unwrap(),
                effect,
                vec![Action::try_from("read").unwrap()],
                vec![ResourceType::try_from("organization").unwrap()],
            )
            .unwrap()
            .with_priority(priority)
        };
        store.add_policy(org("org-1"), &make("allow-read", Effect::Allow, 10));
        store.add_policy(org("org-1"), &make("deny-read", Effect::Deny, 1));
        let authorizer = store_authorizer(store, Arc::new(MemoryAuditSink::new()));

        let err = block_on(authorizer.authorize(input("org-1", "read", "organization"), |_| async {}))
            .unwrap_err();

        match err {
            AuthorizationError::PolicyDenied { policy } => {
                assert_eq!(policy, Some(PolicyId::try_from("deny-read").unwrap()))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn any_permission_profiles_should_pass_when_one_is_met() {
        let authorizer = store_authorizer(seeded_store(), Arc::new(MemoryAuditSink::new()));

        let result = block_on(authorizer.authorize(
            input("org-1", "list", "employeeProfile").require_any_permissions([
                perms(&[("organization", "update")]),
                perms(&[("employeeProfile", "list")]),
            ]),
            |context| async move { context.role_key().clone() },
        ));

        assert_eq!(result.unwrap(), role("member"));
    }

    #[test]
    fn defaults_should_merge_into_request() {
        let guard = StubGuard::new(allow_org_1);
        let authorizer = RepositoryAuthorizer::builder(guard.clone())
            .defaults(AuthorizerDefaults {
                required_roles: Some(vec![role("owner")]),
                required_permissions: Some(perms(&[("organization", "read")])),
                required_any_permissions: Some(vec![perms(&[("organization", "read")])]),
                expected_residency: Some(DataResidency::UkOnly),
                audit_source: Some("hr-repository".to_string()),
                ..AuthorizerDefaults::default()
            })
            .audit_sink(Arc::new(crate::audit::NoopAuditSink))
            .build();

        block_on(authorizer.authorize(
            input("org-1", "list", "employeeProfile")
                .require_roles([role("hrAdmin"), role("owner")])
                .require_permissions(perms(&[("employeeProfile", "list")]))
                .expect_residency(DataResidency::UkAndEea),
            |_| async {},
        ))
        .unwrap();

        let seen = guard.last_input();
        assert_eq!(seen.required_roles, Some(vec![role("owner"), role("hrAdmin")]));
        let required = seen.required_permissions.unwrap();
        assert!(required.grants("organization", "read", false));
        assert!(required.grants("employeeProfile", "list", false));
        assert_eq!(seen.required_any_permissions.map(|p| p.len()), Some(1));
        assert_eq!(seen.expected_residency, Some(DataResidency::UkAndEea));
        assert_eq!(seen.audit_source.as_deref(), Some("hr-repository"));
    }

    #[test]
    fn correlation_id_should_be_generated_and_shared_with_audit() {
        let sink = Arc::new(MemoryAuditSink::new());
        let authorizer = RepositoryAuthorizer::builder(StubGuard::new(allow_org_1))
            .audit_sink(sink.clone())
            .build();

        let correlation_id = block_on(authorizer.authorize(
            input("org-1", "read", "organization").correlation_id("  "),
            |context| async move { context.correlation_id().to_string() },
        ))
        .unwrap();

        assert!(Uuid::parse_str(&correlation_id).is_ok());
        assert_eq!(sink.events()[0].correlation_id, correlation_id);
    }

    #[test]
    fn grant_for_another_org_should_fail_closed() {
        let sink = Arc::new(MemoryAuditSink::new());
        let authorizer = RepositoryAuthorizer::builder(StubGuard::new(|| {
            Ok(grant_for("org-2", PermissionMap::new()))
        }))
        .audit_sink(sink.clone())
        .build();
        let calls = AtomicUsize::new(0);

        let err = block_on(authorizer.authorize(input("org-1", "read", "organization"), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {}
        }))
        .unwrap_err();

        assert_eq!(err.kind(), DenialKind::AuthorizationFailed);
        assert_eq!(err.to_string(), "authorization failed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.events()[0].denial_kind, Some(DenialKind::AuthorizationFailed));
    }

    #[test]
    fn audit_sink_failure_should_not_change_outcome() {
        let authorizer = RepositoryAuthorizer::builder(StubGuard::new(allow_org_1))
            .audit_sink(Arc::new(FailingSink))
            .build();

        let result = block_on(authorizer.authorize(input("org-1", "read", "organization"), |_| async { 42 }));

        assert_eq!(result.unwrap(), 42);
    }

    #[derive(Debug)]
    struct Record {
        org_id: OrgId,
        classification: Option<DataClassification>,
        residency: Option<DataResidency>,
        pii: bool,
    }

    impl TenantRecord for Record {
        fn org_id(&self) -> &OrgId {
            &self.org_id
        }

        fn data_classification(&self) -> Option<DataClassification> {
            self.classification
        }

        fn data_residency(&self) -> Option<DataResidency> {
            self.residency
        }

        fn contains_pii(&self) -> bool {
            self.pii
        }
    }

    fn record(org_id: &str) -> Record {
        Record {
            org_id: org(org_id),
            classification: None,
            residency: None,
            pii: false,
        }
    }

    fn with_context<T>(
        outcome: fn() -> Result<AccessGrant, AuthorizationError>,
        check: impl FnOnce(&RepositoryAuthorizer, AuthorizationContext) -> T,
    ) -> (T, Vec<AuthorizationAuditEvent>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let authorizer = RepositoryAuthorizer::builder(StubGuard::new(outcome))
            .audit_sink(sink.clone())
            .build();
        let context = block_on(authorizer.authorize(
            input("org-1", "read", "employeeProfile").correlation_id("corr-9"),
            |context| async move { context },
        ))
        .unwrap();
        sink.drain();
        let result = check(&authorizer, context);
        (result, sink.events())
    }

    #[test]
    fn assert_tenant_record_should_reject_foreign_and_missing_records() {
        let ((), events) = with_context(allow_org_1, |authorizer, context| {
            let owned = record("org-1");
            assert!(block_on(authorizer.assert_tenant_record(Some(&owned), &context)).is_ok());

            for foreign in ["org-2", "org-10", "ORG-1"] {
                let err = block_on(authorizer.assert_tenant_record(Some(record(foreign)), &context))
                    .unwrap_err();
                assert!(matches!(
                    err,
                    AuthorizationError::CrossTenantAccess { record: Some(ref other), .. } if other.as_str() == foreign
                ));
            }

            let err = block_on(authorizer.assert_tenant_record(None::<Record>, &context)).unwrap_err();
            assert!(matches!(err, AuthorizationError::CrossTenantAccess { record: None, .. }));
        });

        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|event| {
            event.decision == Decision::Deny
                && event.denial_kind == Some(DenialKind::CrossTenantAccess)
                && event.correlation_id == "corr-9"
                && event.org_id == org("org-1")
        }));
        assert_eq!(
            events[0].resource_attributes.get(ATTR_RECORD_ORG_ID),
            Some(&crate::attributes::AttributeValue::from("org-2"))
        );
        assert_eq!(events[3].resource_attributes.get(ATTR_RECORD_ORG_ID), None);
    }

    #[test]
    fn assert_record_compliance_should_check_tags() {
        let ((), events) = with_context(allow_org_1, |authorizer, context| {
            let lower = Record {
                classification: Some(DataClassification::Official),
                residency: Some(DataResidency::UkOnly),
                ..record("org-1")
            };
            assert!(block_on(authorizer.assert_record_compliance(Some(lower), &context)).is_ok());

            let higher = Record {
                classification: Some(DataClassification::Secret),
                ..record("org-1")
            };
            let err = block_on(authorizer.assert_record_compliance(Some(higher), &context)).unwrap_err();
            assert_eq!(err.kind(), DenialKind::ClassificationMismatch);

            let elsewhere = Record {
                residency: Some(DataResidency::Global),
                ..record("org-1")
            };
            let err = block_on(authorizer.assert_record_compliance(Some(elsewhere), &context)).unwrap_err();
            assert_eq!(err.kind(), DenialKind::ResidencyMismatch);
        });

        let kinds: Vec<_> = events.iter().map(|event| event.denial_kind).collect();
        assert_eq!(
            kinds,
            vec![Some(DenialKind::ClassificationMismatch), Some(DenialKind::ResidencyMismatch)]
        );
    }

    #[test]
    fn personal_data_should_require_a_pii_grant() {
        let pii_record = || Record {
            pii: true,
            ..record("org-1")
        };

        let (err, events) = with_context(allow_org_1, |authorizer, context| {
            block_on(authorizer.assert_record_compliance(Some(pii_record()), &context)).unwrap_err()
        });
        match err {
            AuthorizationError::PermissionDenied { resource, action } => {
                assert_eq!(resource.as_str(), PII_RESOURCE);
                assert_eq!(action.as_str(), "read");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(events[0].denial_kind, Some(DenialKind::PermissionDenied));

        let (allowed, events) = with_context(
            || Ok(grant_for("org-1", perms(&[("organization", "read"), ("pii", "process")]))),
            |authorizer, context| {
                block_on(authorizer.assert_record_compliance(Some(pii_record()), &context)).is_ok()
            },
        );
        assert!(allowed);
        assert!(events.is_empty());
    }

    #[test]
    fn enforce_permission_should_use_context_snapshot() {
        with_context(allow_org_1, |authorizer, context| {
            assert!(authorizer.enforce_permission(&context, "organization", "read").is_ok());
            let err = authorizer
                .enforce_permission(&context, "organization", "delete")
                .unwrap_err();
            assert_eq!(err.kind(), DenialKind::PermissionDenied);
        });
    }
}
