//! Field-level validation issues.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    InvalidLiteral,
    InvalidEnumValue,
    InvalidUnion,
    InvalidIntersectionTypes,
    UnrecognizedKeys,
    Custom,
}

/// One step in the path to an offending value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A single validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    pub path: Vec<PathSegment>,
    /// Code-specific extras such as `expected`, `received`, `options` or `keys`
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Issue {
    pub fn new(code: IssueCode, message: impl Into<String>, path: &[PathSegment]) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.to_vec(),
            details: Map::new(),
        }
    }

    /// Attach a detail field
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Dotted rendering of the path, e.g. `items.0.name`
    pub fn dotted_path(&self) -> String {
        self.path
            .iter()
            .map(|segment| segment.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_json_shape() {
        let issue = Issue::new(
            IssueCode::InvalidType,
            "Required",
            &[PathSegment::Key("payload".to_string())],
        )
        .with_detail("expected", "string")
        .with_detail("received", "undefined");

        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["code"], "invalid_type");
        assert_eq!(json["path"], serde_json::json!(["payload"]));
        assert_eq!(json["expected"], "string");
        assert_eq!(json["received"], "undefined");
    }

    #[test]
    fn test_dotted_path() {
        let issue = Issue::new(
            IssueCode::Custom,
            "bad",
            &[
                PathSegment::Key("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("name".to_string()),
            ],
        );
        assert_eq!(issue.dotted_path(), "items.0.name");
    }
}
