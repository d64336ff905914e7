use crate::error::Result;
use crate::types::{Action, ResourceType, RoleKey};
use std::collections::{BTreeMap, BTreeSet, HashSet};

const WILDCARD: &str = "*";

/// Resource-type to allowed-actions mapping.
///
/// Ordered so that equality, hashing and iteration are deterministic.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PermissionMap(BTreeMap<ResourceType, BTreeSet<Action>>);

impl PermissionMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a validated map from string pairs, e.g. `[("organization", ["read"])]`.
    pub fn try_from_pairs<R, A>(pairs: impl IntoIterator<Item = (R, A)>) -> Result<Self>
    where
        R: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let mut map = Self::new();
        for (resource, actions) in pairs {
            let resource = ResourceType::new(resource)?;
            for action in actions {
                map.insert(resource.clone(), Action::new(action)?);
            }
        }
        Ok(map)
    }

    /// Adds one resource/action pair.
    pub fn insert(&mut self, resource: ResourceType, action: Action) {
        self.0.entry(resource).or_default().insert(action);
    }

    /// Adds every pair of `other` to this map.
    pub fn extend(&mut self, other: &PermissionMap) {
        for (resource, actions) in other.iter() {
            self.0
                .entry(resource.clone())
                .or_default()
                .extend(actions.iter().cloned());
        }
    }

    /// Returns whether the map holds no resource/action pair.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    /// Iterates resource types with their action sets.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceType, &BTreeSet<Action>)> {
        self.0.iter()
    }

    /// Iterates every resource/action pair.
    pub fn pairs(&self) -> impl Iterator<Item = (&ResourceType, &Action)> {
        self.0
            .iter()
            .flat_map(|(resource, actions)| actions.iter().map(move |action| (resource, action)))
    }

    /// Returns the actions granted on a resource type.
    pub fn actions(&self, resource: &str) -> Option<&BTreeSet<Action>> {
        self.0.get(resource)
    }

    /// Returns whether `action` on `resource` is granted.
    ///
    /// With `wildcard` enabled, a granted resource or action of `*` matches anything.
    pub fn grants(&self, resource: &str, action: &str, wildcard: bool) -> bool {
        let exact = self
            .0
            .get(resource)
            .is_some_and(|actions| actions.contains(action) || (wildcard && actions.contains(WILDCARD)));
        if exact || !wildcard {
            return exact;
        }
        self.0
            .get(WILDCARD)
            .is_some_and(|actions| actions.contains(action) || actions.contains(WILDCARD))
    }

    /// Returns the first required pair not granted by this map.
    pub fn first_missing<'a>(
        &self,
        required: &'a PermissionMap,
        wildcard: bool,
    ) -> Option<(&'a ResourceType, &'a Action)> {
        required
            .pairs()
            .find(|(resource, action)| !self.grants(resource.as_str(), action.as_str(), wildcard))
    }

    /// Returns whether every required pair is granted.
    pub fn satisfies(&self, required: &PermissionMap, wildcard: bool) -> bool {
        self.first_missing(required, wildcard).is_none()
    }

    fn normalized(mut self) -> Option<Self> {
        self.0.retain(|_, actions| !actions.is_empty());
        if self.0.is_empty() { None } else { Some(self) }
    }
}

impl FromIterator<(ResourceType, Action)> for PermissionMap {
    fn from_iter<T: IntoIterator<Item = (ResourceType, Action)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (resource, action) in iter {
            map.insert(resource, action);
        }
        map
    }
}

/// Merges two permission requirements by set union.
///
/// Defaults act as a floor: the result never holds fewer pairs than either
/// input. Returns `None` when neither input carries a pair, so "no
/// requirement" stays distinguishable from a populated one.
pub fn merge_permission_maps(
    base: Option<&PermissionMap>,
    override_map: Option<&PermissionMap>,
) -> Option<PermissionMap> {
    let mut merged = PermissionMap::new();
    for map in [base, override_map].into_iter().flatten() {
        merged.extend(map);
    }
    merged.normalized()
}

/// Merges role requirements by set union, keeping base order first.
pub fn merge_roles(base: Option<&[RoleKey]>, override_roles: Option<&[RoleKey]>) -> Option<Vec<RoleKey>> {
    let mut seen = HashSet::new();
    let merged: Vec<RoleKey> = [base, override_roles]
        .into_iter()
        .flatten()
        .flatten()
        .filter(|role| seen.insert(role.as_str()))
        .cloned()
        .collect();
    if merged.is_empty() { None } else { Some(merged) }
}

/// Returns whether at least one non-empty profile is fully granted.
///
/// Profiles without pairs are ignored; when no profile carries a pair there
/// is nothing to satisfy.
pub(crate) fn satisfies_any_profile(
    granted: &PermissionMap,
    profiles: &[PermissionMap],
    wildcard: bool,
) -> bool {
    let mut populated = profiles.iter().filter(|profile| !profile.is_empty()).peekable();
    if populated.peek().is_none() {
        return true;
    }
    populated.any(|profile| granted.satisfies(profile, wildcard))
}
