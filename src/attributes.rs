//! Subject and resource attributes used by ABAC conditions.

use std::collections::BTreeMap;
use std::fmt;

/// Attribute value.
///
/// Only scalars and flat lists of scalars are representable; nested objects
/// are rejected when attributes are loaded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns whether `self` equals `other`, or is a list containing it.
    pub(crate) fn contains(&self, other: &AttributeValue) -> bool {
        match self {
            Self::List(items) => items.iter().any(|item| item == other),
            value => value == other,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Named attributes, keyed by attribute name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, returning `self` for chaining.
    ///
    /// Blank keys are ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an attribute. Blank keys are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        if key.trim().is_empty() {
            return;
        }
        self.0.insert(key, value.into());
    }

    /// Inserts an attribute only when `key` is not present yet.
    pub(crate) fn insert_default(&mut self, key: &str, value: impl Into<AttributeValue>) {
        self.0.entry(key.to_string()).or_insert_with(|| value.into());
    }

    /// Returns an attribute by name.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Returns whether the set holds no attribute.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}
