use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

const MAX_NAME_LEN: usize = 128;

fn validate_simple_name(value: &str, kind: &str) -> Result<String> {
    validate_with(value, kind, is_allowed_id_char).map_err(Error::InvalidId)
}

fn validate_selector_name(value: &str, kind: &str) -> Result<String> {
    validate_with(value, kind, is_allowed_selector_char).map_err(Error::InvalidName)
}

fn validate_with(
    value: &str,
    kind: &str,
    allowed: fn(char) -> bool,
) -> std::result::Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{kind} must not be empty"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(format!("{kind} length must be <= {MAX_NAME_LEN}"));
    }
    if !trimmed.chars().all(allowed) {
        return Err(format!("{kind} contains invalid characters"));
    }
    Ok(trimmed.to_string())
}

fn is_allowed_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-')
}

fn is_allowed_selector_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | ':' | '_' | '-' | '*')
}

macro_rules! define_name_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $validate:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Creates a validated value.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                $validate(value.as_ref(), $kind).map(Self)
            }

            /// Creates a value from a trusted string without validation.
            pub fn from_string(value: String) -> Self {
                Self(value)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from_string(value)
            }
        }
    };
}

define_name_type!(
    /// Organization (tenant) identifier.
    OrgId,
    "org id",
    validate_simple_name
);
define_name_type!(
    /// User identifier.
    UserId,
    "user id",
    validate_simple_name
);
define_name_type!(
    /// Role key of a membership (`owner`, `hrAdmin`, `member`, ...).
    RoleKey,
    "role key",
    validate_simple_name
);
define_name_type!(
    /// ABAC policy identifier.
    PolicyId,
    "policy id",
    validate_simple_name
);
define_name_type!(
    /// Resource type name such as `organization` or `hr.compliance`.
    ///
    /// Policy selectors reuse this type, so `*` and trailing-`*` prefixes are accepted.
    ResourceType,
    "resource type",
    validate_selector_name
);
define_name_type!(
    /// Action name such as `read`, `update` or `org.abac.read`.
    Action,
    "action",
    validate_selector_name
);

/// Geographic or jurisdictional zone a tenant's data must stay within.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum DataResidency {
    /// United Kingdom only.
    UkOnly,
    /// United Kingdom and the European Economic Area.
    UkAndEea,
    /// Global, with restrictions on highly classified data.
    GlobalRestricted,
    /// Global.
    Global,
}

impl DataResidency {
    /// Returns the stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UkOnly => "UK_ONLY",
            Self::UkAndEea => "UK_AND_EEA",
            Self::GlobalRestricted => "GLOBAL_RESTRICTED",
            Self::Global => "GLOBAL",
        }
    }
}

impl fmt::Display for DataResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataResidency {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "UK_ONLY" => Ok(Self::UkOnly),
            "UK_AND_EEA" => Ok(Self::UkAndEea),
            "GLOBAL_RESTRICTED" => Ok(Self::GlobalRestricted),
            "GLOBAL" => Ok(Self::Global),
            other => Err(Error::InvalidName(format!("unknown data residency {other:?}"))),
        }
    }
}

/// Sensitivity tier of a tenant's data.
///
/// Ordered from least to most sensitive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum DataClassification {
    /// Routine business data.
    Official,
    /// Official data with handling caveats.
    OfficialSensitive,
    /// Secret.
    Secret,
    /// Top secret.
    TopSecret,
}

impl DataClassification {
    /// Returns the stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Official => "OFFICIAL",
            Self::OfficialSensitive => "OFFICIAL_SENSITIVE",
            Self::Secret => "SECRET",
            Self::TopSecret => "TOP_SECRET",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataClassification {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "OFFICIAL" => Ok(Self::Official),
            "OFFICIAL_SENSITIVE" => Ok(Self::OfficialSensitive),
            "SECRET" => Ok(Self::Secret),
            "TOP_SECRET" => Ok(Self::TopSecret),
            other => Err(Error::InvalidName(format!(
                "unknown data classification {other:?}"
            ))),
        }
    }
}
