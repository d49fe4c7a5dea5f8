use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

/// An external library coordinate: `group:artifact:version`.
///
/// Equality and hashing go through the coordinate string, so two values that
/// render the same are interchangeable as map keys.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Dependency {
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, CoordinateError> {
        let dependency = Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        };
        validate_part("group", &dependency.group)?;
        validate_part("artifact", &dependency.artifact)?;
        validate_part("version", &dependency.version)?;
        Ok(dependency)
    }

    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.group, self.artifact, self.version)
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}.{}", self.artifact, self.version, extension)
    }

    /// Location inside the local dependency cache.
    pub fn cache_relative_path(&self, extension: &str) -> PathBuf {
        PathBuf::from(&self.group)
            .join(&self.artifact)
            .join(&self.version)
            .join(self.file_name(extension))
    }

    /// Maven-layout path appended to a repository base URL.
    pub fn remote_path(&self, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name(extension)
        )
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.coordinate() == other.coordinate()
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coordinate().hash(state);
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.coordinate())
    }
}

impl FromStr for Dependency {
    type Err = CoordinateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        // an optional fourth segment is a packaging/classifier hint and is ignored
        if parts.len() < 3 || parts.len() > 4 {
            return Err(CoordinateError::Malformed(trimmed.to_string()));
        }
        Dependency::new(parts[0].trim(), parts[1].trim(), parts[2].trim())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinate '{0}' must look like group:artifact:version")]
    Malformed(String),
    #[error("coordinate {field} is empty")]
    EmptyPart { field: &'static str },
    #[error("coordinate {field} '{value}' contains illegal characters")]
    IllegalPart { field: &'static str, value: String },
}

fn validate_part(field: &'static str, value: &str) -> Result<(), CoordinateError> {
    if value.trim().is_empty() {
        return Err(CoordinateError::EmptyPart { field });
    }
    let illegal = value.contains("..")
        || value
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch == ':' || ch.is_whitespace());
    if illegal {
        return Err(CoordinateError::IllegalPart {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
