//! Dependency coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{BuildError, Result};

/// Identity of one external dependency: `group:name:version[:classifier]`.
///
/// Keys are validated when constructed, so every key that exists is safe to use as a
/// cache file name component and as a rule name.
///
/// ```
/// use buckforge::artifact::ArtifactKey;
///
/// let key: ArtifactKey = "com.google.guava:guava:19.0".parse().unwrap();
/// assert_eq!(key.group(), "com.google.guava");
/// assert_eq!(key.logical_id(), "com.google.guava:guava");
/// assert!("guava:19.0".parse::<ArtifactKey>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey {
    group: String,
    name: String,
    version: String,
    classifier: Option<String>,
}

impl ArtifactKey {
    pub fn new(group: &str, name: &str, version: &str, classifier: Option<&str>) -> Result<Self> {
        let input = match classifier {
            Some(c) => format!("{group}:{name}:{version}:{c}"),
            None => format!("{group}:{name}:{version}"),
        };

        validate_segment(&input, "group", group)?;
        validate_segment(&input, "name", name)?;
        validate_segment(&input, "version", version)?;
        if let Some(c) = classifier {
            validate_segment(&input, "classifier", c)?;
        }

        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            classifier: classifier.map(str::to_string),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    /// Versionless identity (`group:name[:classifier]`) used for conflict detection.
    pub fn logical_id(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}:{}:{c}", self.group, self.name),
            None => format!("{}:{}", self.group, self.name),
        }
    }

    /// Same logical dependency at another version.
    pub fn with_version(&self, version: &str) -> Result<Self> {
        Self::new(&self.group, &self.name, version, self.classifier.as_deref())
    }
}

/// Versionless `group:name` coordinate, used where configuration supplies the version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactModule {
    group: String,
    name: String,
}

impl ArtifactModule {
    pub fn new(group: &str, name: &str) -> Result<Self> {
        let input = format!("{group}:{name}");
        validate_segment(&input, "group", group)?;
        validate_segment(&input, "name", name)?;
        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full coordinate at `version`.
    pub fn at(&self, version: &str) -> Result<ArtifactKey> {
        ArtifactKey::new(&self.group, &self.name, version, None)
    }
}

impl FromStr for ArtifactModule {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [group, name] => Self::new(group, name),
            _ => Err(BuildError::InvalidCoordinate {
                input: s.to_string(),
                reason: "expected group:name".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ArtifactModule {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactModule> for String {
    fn from(module: ArtifactModule) -> Self {
        module.to_string()
    }
}

impl fmt::Display for ArtifactModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

fn validate_segment(input: &str, what: &str, segment: &str) -> Result<()> {
    let invalid = |reason: String| BuildError::InvalidCoordinate {
        input: input.to_string(),
        reason,
    };

    if segment.is_empty() {
        return Err(invalid(format!("{what} must not be empty")));
    }
    if segment == "." || segment == ".." {
        return Err(invalid(format!("{what} must not be '{segment}'")));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':'))
    {
        return Err(invalid(format!("{what} contains illegal character {c:?}")));
    }
    Ok(())
}

impl FromStr for ArtifactKey {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [group, name, version] => Self::new(group, name, version, None),
            [group, name, version, classifier] => Self::new(group, name, version, Some(classifier)),
            _ => Err(BuildError::InvalidCoordinate {
                input: s.to_string(),
                reason: "expected group:name:version[:classifier]".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        Ok(())
    }
}
