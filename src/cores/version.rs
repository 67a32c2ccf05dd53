use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version tag of one loaded core, e.g. `"0.15.0"` or `"mock"`.
///
/// Versions compare component-wise on their numeric parts so that
/// `0.10.0 > 0.9.2`; non-numeric versions sort before numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineVersion(String);

impl EngineVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric_parts(&self) -> Option<Vec<u64>> {
        let parts: Vec<u64> = self
            .0
            .trim_start_matches('v')
            .split(['.', '-', '+'])
            .map_while(|part| part.parse::<u64>().ok())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts)
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Ord for EngineVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_parts(), other.numeric_parts()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EngineVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Externally visible, globally unique style identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(pub u32);

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StyleId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// What a style can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKind {
    #[default]
    Talk,
    Sing,
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleKind::Talk => f.write_str("talk"),
            StyleKind::Sing => f.write_str("sing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineVersion;

    #[test]
    fn numeric_versions_compare_by_component() {
        assert!(EngineVersion::from("0.10.0") > EngineVersion::from("0.9.2"));
        assert!(EngineVersion::from("1.0.0") > EngineVersion::from("0.99.0"));
    }

    #[test]
    fn named_versions_sort_before_numeric() {
        assert!(EngineVersion::from("mock") < EngineVersion::from("0.0.1"));
    }

    #[test]
    fn prerelease_suffix_is_ignored_for_ordering_prefix() {
        assert!(EngineVersion::from("0.15.0-preview") > EngineVersion::from("0.14.9"));
    }
}
