use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GdcError;

/// Named remote collections exposed by the GDC search API. Each has its
/// own field schema reachable at `<endpoint>/_mapping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Files,
    Cases,
    Projects,
    Annotations,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Files => "files",
            Endpoint::Cases => "cases",
            Endpoint::Projects => "projects",
            Endpoint::Annotations => "annotations",
        }
    }

    /// Resolve the endpoint segment of a dotted field name, e.g.
    /// `files.data_category` -> `Files`.
    pub fn from_field(field: &str) -> Result<Self, GdcError> {
        let segment = field.split('.').next().unwrap_or(field);
        segment.parse()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = GdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "files" => Ok(Endpoint::Files),
            "cases" => Ok(Endpoint::Cases),
            "projects" => Ok(Endpoint::Projects),
            "annotations" => Ok(Endpoint::Annotations),
            other => Err(GdcError::InvalidEndpoint(other.to_string())),
        }
    }
}

/// An ordered, non-normalized sequence of filter values. Single values
/// and sequences convert into the same shape, and the conversion is
/// idempotent: `ValueList::from` on a `ValueList` is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueList(Vec<String>);

impl ValueList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for ValueList {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for ValueList {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for ValueList {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<&[&str]> for ValueList {
    fn from(values: &[&str]) -> Self {
        Self(values.iter().map(|value| value.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ValueList {
    fn from(values: [&str; N]) -> Self {
        Self(values.iter().map(|value| value.to_string()).collect())
    }
}

/// Convert any accepted value shape to an ordered list.
pub fn convert_to_list<T: Into<ValueList>>(value: T) -> ValueList {
    value.into()
}
