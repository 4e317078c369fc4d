use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a nag.
///
/// Every event and every direct row for the same nag carries the same id.
/// Ids are opaque non-empty strings; surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NagId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid nag id '{raw}': ids must be non-empty and single-line")]
pub struct InvalidNagId {
    pub raw: String,
}

impl NagId {
    /// Validate and wrap a raw id.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNagId`] when the trimmed input is empty or spans
    /// several lines.
    pub fn new(raw: &str) -> Result<Self, InvalidNagId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(['\n', '\r']) {
            return Err(InvalidNagId {
                raw: raw.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NagId {
    type Err = InvalidNagId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NagId {
    type Error = InvalidNagId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<NagId> for String {
    fn from(id: NagId) -> Self {
        id.0
    }
}

impl AsRef<str> for NagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        let id = NagId::new("  Water plants ").expect("valid id");
        assert_eq!(id.as_str(), "Water plants");
    }

    #[test]
    fn rejects_blank_and_multiline() {
        assert!(NagId::new("   ").is_err());
        assert!(NagId::new("a\nb").is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let id: NagId = serde_json::from_str("\"rent\"").expect("deserialize");
        assert_eq!(id.to_string(), "rent");
        assert!(serde_json::from_str::<NagId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"rent\"");
    }
}
