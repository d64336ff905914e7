//! ABAC policy model and evaluator.
//!
//! Stored policies arrive as [`AbacPolicyRecord`]s and are validated into
//! [`AbacPolicy`] before evaluation. The evaluator is pure: it sorts by
//! priority, lets any matching deny win over every allow, and reports
//! [`PolicyOutcome::NoMatch`] when nothing applies so the caller can fall
//! back to the RBAC result.

use crate::attributes::{AttributeValue, Attributes};
use crate::error::{Error, Result};
use crate::types::{Action, PolicyId, ResourceType};
use std::cmp::Reverse;
use std::fmt;

/// Current version of the stored policy schema.
pub const POLICY_SCHEMA_VERSION: u32 = 1;

const WILDCARD: char = '*';

/// Policy effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Effect {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(Error::InvalidName(format!("unknown policy effect {other:?}"))),
        }
    }
}

/// Where a policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PolicyOrigin {
    /// Stored for the tenant.
    #[default]
    Tenant,
    /// Bootstrap policy injected in development environments.
    DevelopmentFallback,
}

/// Attribute set a condition reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConditionTarget {
    Subject,
    Resource,
}

/// Policy condition.
///
/// A missing attribute makes `Equals`, `In` and `MatchesSubject` false and
/// `NotEquals` true. A list attribute matches when it contains the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")
)]
pub enum PolicyCondition {
    Equals {
        target: ConditionTarget,
        key: String,
        value: AttributeValue,
    },
    NotEquals {
        target: ConditionTarget,
        key: String,
        value: AttributeValue,
    },
    In {
        target: ConditionTarget,
        key: String,
        values: Vec<AttributeValue>,
    },
    /// Resource attribute equals a subject attribute, e.g. `ownerId == userId`.
    MatchesSubject {
        resource_key: String,
        subject_key: String,
    },
}

impl PolicyCondition {
    fn holds(&self, subject: &Attributes, resource: &Attributes) -> bool {
        let attributes = |target: &ConditionTarget| match target {
            ConditionTarget::Subject => subject,
            ConditionTarget::Resource => resource,
        };
        match self {
            Self::Equals { target, key, value } => attributes(target)
                .get(key)
                .is_some_and(|actual| actual.contains(value)),
            Self::NotEquals { target, key, value } => !attributes(target)
                .get(key)
                .is_some_and(|actual| actual.contains(value)),
            Self::In {
                target,
                key,
                values,
            } => attributes(target)
                .get(key)
                .is_some_and(|actual| values.iter().any(|value| actual.contains(value))),
            Self::MatchesSubject {
                resource_key,
                subject_key,
            } => match (resource.get(resource_key), subject.get(subject_key)) {
                (Some(AttributeValue::Null), _) | (_, Some(AttributeValue::Null)) => false,
                (Some(resource_value), Some(subject_value)) => {
                    subject_value.contains(resource_value)
                }
                _ => false,
            },
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let check_key = |key: &str| {
            if key.trim().is_empty() {
                Err("condition key must not be empty".to_string())
            } else {
                Ok(())
            }
        };
        let check_scalar = |value: &AttributeValue| match value {
            AttributeValue::List(_) => Err("condition values must be scalars".to_string()),
            _ => Ok(()),
        };
        match self {
            Self::Equals { key, value, .. } | Self::NotEquals { key, value, .. } => {
                check_key(key)?;
                check_scalar(value)
            }
            Self::In { key, values, .. } => {
                check_key(key)?;
                if values.is_empty() {
                    return Err("in condition requires at least one value".to_string());
                }
                values.iter().try_for_each(check_scalar)
            }
            Self::MatchesSubject {
                resource_key,
                subject_key,
            } => {
                check_key(resource_key)?;
                check_key(subject_key)
            }
        }
    }
}

/// Raw stored policy, validated into [`AbacPolicy`] through `TryFrom`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AbacPolicyRecord {
    pub schema_version: u32,
    pub id: String,
    pub effect: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub conditions: Vec<PolicyCondition>,
}

impl From<&AbacPolicy> for AbacPolicyRecord {
    fn from(policy: &AbacPolicy) -> Self {
        Self {
            schema_version: POLICY_SCHEMA_VERSION,
            id: policy.id.to_string(),
            effect: policy.effect.as_str().to_string(),
            actions: policy.actions.iter().map(ToString::to_string).collect(),
            resources: policy.resources.iter().map(ToString::to_string).collect(),
            priority: policy.priority,
            description: policy.description.clone(),
            conditions: policy.conditions.clone(),
        }
    }
}

/// Validated tenant-scoped ABAC policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbacPolicy {
    id: PolicyId,
    effect: Effect,
    actions: Vec<Action>,
    resources: Vec<ResourceType>,
    priority: i32,
    description: Option<String>,
    conditions: Vec<PolicyCondition>,
    origin: PolicyOrigin,
}

impl AbacPolicy {
    /// Creates a policy with priority 0 and no conditions.
    pub fn new(
        id: PolicyId,
        effect: Effect,
        actions: Vec<Action>,
        resources: Vec<ResourceType>,
    ) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPolicy {
            policy: id.to_string(),
            reason,
        };
        if actions.is_empty() {
            return Err(invalid("at least one action selector is required".to_string()));
        }
        if resources.is_empty() {
            return Err(invalid("at least one resource selector is required".to_string()));
        }
        for selector in actions
            .iter()
            .map(Action::as_str)
            .chain(resources.iter().map(ResourceType::as_str))
        {
            validate_selector(selector).map_err(invalid)?;
        }
        Ok(Self {
            id,
            effect,
            actions,
            resources,
            priority: 0,
            description: None,
            conditions: Vec::new(),
            origin: PolicyOrigin::Tenant,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: PolicyCondition) -> Result<Self> {
        condition.validate().map_err(|reason| Error::InvalidPolicy {
            policy: self.id.to_string(),
            reason,
        })?;
        self.conditions.push(condition);
        Ok(self)
    }

    pub(crate) fn into_development_fallback(mut self) -> Self {
        self.origin = PolicyOrigin::DevelopmentFallback;
        self
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn resources(&self) -> &[ResourceType] {
        &self.resources
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn conditions(&self) -> &[PolicyCondition] {
        &self.conditions
    }

    pub fn origin(&self) -> PolicyOrigin {
        self.origin
    }

    /// Returns whether this policy applies to the request.
    pub fn matches(&self, request: &PolicyRequest<'_>) -> bool {
        self.actions
            .iter()
            .any(|selector| selector_matches(selector.as_str(), request.action.as_str()))
            && self
                .resources
                .iter()
                .any(|selector| selector_matches(selector.as_str(), request.resource_type.as_str()))
            && self
                .conditions
                .iter()
                .all(|condition| condition.holds(request.subject, request.resource))
    }
}

impl TryFrom<AbacPolicyRecord> for AbacPolicy {
    type Error = Error;

    fn try_from(record: AbacPolicyRecord) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPolicy {
            policy: record.id.clone(),
            reason,
        };
        if record.schema_version != POLICY_SCHEMA_VERSION {
            return Err(invalid(format!(
                "unsupported schema version {}",
                record.schema_version
            )));
        }
        let id = PolicyId::new(&record.id).map_err(|err| invalid(err.to_string()))?;
        let effect: Effect = record
            .effect
            .parse()
            .map_err(|err: Error| invalid(err.to_string()))?;
        let actions = record
            .actions
            .iter()
            .map(Action::new)
            .collect::<Result<Vec<_>>>()
            .map_err(|err| invalid(err.to_string()))?;
        let resources = record
            .resources
            .iter()
            .map(ResourceType::new)
            .collect::<Result<Vec<_>>>()
            .map_err(|err| invalid(err.to_string()))?;

        let mut policy = AbacPolicy::new(id, effect, actions, resources)?.with_priority(record.priority);
        if let Some(description) = record.description {
            policy = policy.with_description(description);
        }
        for condition in record.conditions {
            policy = policy.with_condition(condition)?;
        }
        Ok(policy)
    }
}

/// Parses and validates a JSON array of policy records.
#[cfg(feature = "serde")]
pub fn policies_from_json(json: &str) -> Result<Vec<AbacPolicy>> {
    let records: Vec<AbacPolicyRecord> =
        serde_json::from_str(json).map_err(|err| Error::InvalidPolicy {
            policy: "<document>".to_string(),
            reason: err.to_string(),
        })?;
    records.into_iter().map(AbacPolicy::try_from).collect()
}

/// Attributes and target of one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub action: &'a Action,
    pub resource_type: &'a ResourceType,
    pub subject: &'a Attributes,
    pub resource: &'a Attributes,
}

/// Outcome of ABAC evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// A deny policy matched.
    Denied(PolicyId),
    /// An allow policy matched and no deny did.
    Allowed(PolicyId),
    /// No policy applies.
    NoMatch,
}

/// Evaluates policies in priority-descending order; deny overrides allow.
pub fn evaluate_policies(policies: &[AbacPolicy], request: &PolicyRequest<'_>) -> PolicyOutcome {
    let mut ordered: Vec<&AbacPolicy> = policies.iter().collect();
    ordered.sort_by_key(|policy| Reverse(policy.priority));

    let mut allowed = None;
    for policy in ordered.into_iter().filter(|policy| policy.matches(request)) {
        match policy.effect {
            Effect::Deny => return PolicyOutcome::Denied(policy.id.clone()),
            Effect::Allow => {
                allowed.get_or_insert_with(|| policy.id.clone());
            }
        }
    }
    allowed.map_or(PolicyOutcome::NoMatch, PolicyOutcome::Allowed)
}

/// Matches `*`, a trailing-`*` prefix such as `hr.people.*`, or an exact name.
pub fn selector_matches(selector: &str, value: &str) -> bool {
    match selector.strip_suffix(WILDCARD) {
        Some(prefix) => value.starts_with(prefix),
        None => selector == value,
    }
}

fn validate_selector(selector: &str) -> std::result::Result<(), String> {
    let body = selector.strip_suffix(WILDCARD).unwrap_or(selector);
    if body.contains(WILDCARD) {
        return Err(format!("selector {selector:?} may only end with '*'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(id: &str, effect: Effect, action: &str, resource: &str, priority: i32) -> AbacPolicy {
        AbacPolicy::new(
            PolicyId::try_from(id).unwrap(),
            effect,
            vec![Action::try_from(action).unwrap()],
            vec![ResourceType::try_from(resource).unwrap()],
        )
        .unwrap()
        .with_priority(priority)
    }

    fn record(id: &str, effect: &str) -> AbacPolicyRecord {
        AbacPolicyRecord {
            schema_version: POLICY_SCHEMA_VERSION,
            id: id.to_string(),
            effect: effect.to_string(),
            actions: vec!["read".to_string()],
            resources: vec!["hr.compliance".to_string()],
            priority: 5,
            description: Some("compliance reads".to_string()),
            conditions: Vec::new(),
        }
    }

    struct Fixture {
        action: Action,
        resource_type: ResourceType,
        subject: Attributes,
        resource: Attributes,
    }

    impl Fixture {
        fn new(action: &str, resource_type: &str) -> Self {
            Self {
                action: Action::try_from(action).unwrap(),
                resource_type: ResourceType::try_from(resource_type).unwrap(),
                subject: Attributes::new(),
                resource: Attributes::new(),
            }
        }

        fn request(&self) -> PolicyRequest<'_> {
            PolicyRequest {
                action: &self.action,
                resource_type: &self.resource_type,
                subject: &self.subject,
                resource: &self.resource,
            }
        }
    }

    #[test]
    fn deny_should_override_higher_priority_allow() {
        let policies = vec![
            policy("allow-all", Effect::Allow, "read", "*", 10),
            policy("deny-compliance", Effect::Deny, "*", "hr.compliance", 1),
        ];
        let fixture = Fixture::new("read", "hr.compliance");

        assert_eq!(
            evaluate_policies(&policies, &fixture.request()),
            PolicyOutcome::Denied(PolicyId::try_from("deny-compliance").unwrap())
        );
    }

    #[test]
    fn allow_should_report_highest_priority_match() {
        let policies = vec![
            policy("low", Effect::Allow, "read", "*", 1),
            policy("high", Effect::Allow, "read", "hr.*", 9),
            policy("tie", Effect::Allow, "read", "hr.leave", 9),
        ];
        let fixture = Fixture::new("read", "hr.leave");

        assert_eq!(
            evaluate_policies(&policies, &fixture.request()),
            PolicyOutcome::Allowed(PolicyId::try_from("high").unwrap())
        );
    }

    #[test]
    fn unrelated_policies_should_not_match() {
        let policies = vec![policy("deny-delete", Effect::Deny, "delete", "*", 1)];
        let fixture = Fixture::new("read", "organization");
        assert_eq!(
            evaluate_policies(&policies, &fixture.request()),
            PolicyOutcome::NoMatch
        );
        assert_eq!(evaluate_policies(&[], &fixture.request()), PolicyOutcome::NoMatch);
    }

    #[test]
    fn selectors_should_support_prefix_wildcards() {
        assert!(selector_matches("*", "anything"));
        assert!(selector_matches("hr.people.*", "hr.people.records"));
        assert!(!selector_matches("hr.people.*", "hr.leave"));
        assert!(selector_matches("read", "read"));
        assert!(!selector_matches("read", "reader"));
    }

    #[test]
    fn conditions_should_read_subject_and_resource_attributes() {
        let deny_other_departments = policy("dept", Effect::Deny, "read", "*", 1)
            .with_condition(PolicyCondition::NotEquals {
                target: ConditionTarget::Subject,
                key: "department".to_string(),
                value: AttributeValue::from("hr"),
            })
            .unwrap();
        let mut fixture = Fixture::new("read", "employeeProfile");
        fixture.subject.insert("department", "finance");
        assert!(deny_other_departments.matches(&fixture.request()));

        fixture.subject.insert("department", vec!["finance", "hr"]);
        assert!(!deny_other_departments.matches(&fixture.request()));
    }

    #[test]
    fn matches_subject_should_compare_owner_with_user() {
        let owner_only = policy("owner", Effect::Allow, "update", "employeeProfile", 1)
            .with_condition(PolicyCondition::MatchesSubject {
                resource_key: "ownerId".to_string(),
                subject_key: "userId".to_string(),
            })
            .unwrap();
        let mut fixture = Fixture::new("update", "employeeProfile");
        fixture.subject.insert("userId", "user-1");
        assert!(!owner_only.matches(&fixture.request()));

        fixture.resource.insert("ownerId", "user-1");
        assert!(owner_only.matches(&fixture.request()));

        fixture.resource.insert("ownerId", "user-2");
        assert!(!owner_only.matches(&fixture.request()));
    }

    #[test]
    fn in_condition_should_require_values() {
        let err = policy("p", Effect::Allow, "read", "*", 0)
            .with_condition(PolicyCondition::In {
                target: ConditionTarget::Resource,
                key: "residency".to_string(),
                values: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPolicy { .. }));
    }

    #[test]
    fn record_should_validate_into_policy() {
        let policy = AbacPolicy::try_from(record("compliance-read", "DENY")).unwrap();
        assert_eq!(policy.effect(), Effect::Deny);
        assert_eq!(policy.priority(), 5);
        assert_eq!(policy.origin(), PolicyOrigin::Tenant);
        assert_eq!(AbacPolicyRecord::from(&policy).effect, "deny");
    }

    #[test]
    fn record_should_reject_bad_schema_effect_and_selectors() {
        let mut stale = record("p1", "allow");
        stale.schema_version = 0;
        assert!(AbacPolicy::try_from(stale).is_err());

        assert!(AbacPolicy::try_from(record("p2", "maybe")).is_err());

        let mut inner_wildcard = record("p3", "allow");
        inner_wildcard.resources = vec!["hr.*.leave".to_string()];
        assert!(AbacPolicy::try_from(inner_wildcard).is_err());

        let mut no_actions = record("p4", "allow");
        no_actions.actions.clear();
        assert!(AbacPolicy::try_from(no_actions).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn policies_from_json_should_parse_conditions() {
        let json = r#"[
            {
                "schemaVersion": 1,
                "id": "owner-edit",
                "effect": "allow",
                "actions": ["update"],
                "resources": ["employeeProfile"],
                "priority": 3,
                "conditions": [
                    { "op": "matches_subject", "resourceKey": "ownerId", "subjectKey": "userId" },
                    { "op": "in", "target": "resource", "key": "residency", "values": ["UK_ONLY", "UK_AND_EEA"] }
                ]
            }
        ]"#;
        let policies = policies_from_json(json).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].conditions().len(), 2);
        assert!(policies_from_json(r#"[{"id": "x"}]"#).is_err());
    }
}
