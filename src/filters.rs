use serde_json::{Value, json};

use crate::domain::ValueList;
use crate::error::GdcError;

pub const PROJECT_FIELD: &str = "cases.project.project_id";
pub const DATA_CATEGORY_FIELD: &str = "files.data_category";

/// Nested boolean filter expression sent to the GDC search endpoint.
/// Built fresh per query and immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Leaf {
        op: FilterOp,
        field: String,
        values: Vec<String>,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::In => "in",
        }
    }
}

impl FilterExpr {
    /// Atomic unit of a filter. The value list must be non-empty.
    pub fn leaf(field: &str, values: impl Into<ValueList>) -> Result<Self, GdcError> {
        let values = values.into();
        if values.is_empty() {
            return Err(GdcError::EmptyValues(field.to_string()));
        }
        Ok(FilterExpr::Leaf {
            op: FilterOp::In,
            field: field.to_string(),
            values: values.into_vec(),
        })
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterExpr::Leaf { op, field, values } => json!({
                "op": op.as_str(),
                "content": {
                    "field": field,
                    "value": values,
                }
            }),
            FilterExpr::And(children) => json!({
                "op": "and",
                "content": children.iter().map(FilterExpr::to_json).collect::<Vec<_>>(),
            }),
            FilterExpr::Or(children) => json!({
                "op": "or",
                "content": children.iter().map(FilterExpr::to_json).collect::<Vec<_>>(),
            }),
        }
    }

    /// Query-string-embeddable encoded form.
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }
}

/// High-level query intent: project, data category, and arbitrary
/// field/value constraints, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub project: Option<String>,
    pub data_category: Option<String>,
    pub extra: Vec<(String, ValueList)>,
}

impl SearchQuery {
    pub fn new(project: Option<&str>, data_category: Option<&str>) -> Self {
        Self {
            project: project.map(str::to_string),
            data_category: data_category.map(str::to_string),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, field: &str, values: impl Into<ValueList>) -> Self {
        self.extra.push((field.to_string(), values.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.data_category.is_none() && self.extra.is_empty()
    }

    /// AND combinator over project, category, and extras, in that
    /// order. `None` when no inputs are given. Extras naming a
    /// data-category key conflict with the dedicated parameter.
    pub fn filter(&self) -> Result<Option<FilterExpr>, GdcError> {
        if self.is_empty() {
            return Ok(None);
        }
        for (field, _) in &self.extra {
            if field == "data_category" || field == DATA_CATEGORY_FIELD {
                return Err(GdcError::ConflictingFilter(
                    "flexible filtering by data_category not supported; \
                     use the data_category parameter"
                        .to_string(),
                ));
            }
        }
        let mut children = Vec::new();
        if let Some(project) = &self.project {
            children.push(FilterExpr::leaf(PROJECT_FIELD, project.as_str())?);
        }
        if let Some(category) = &self.data_category {
            children.push(FilterExpr::leaf(DATA_CATEGORY_FIELD, category.as_str())?);
        }
        for (field, values) in &self.extra {
            children.push(FilterExpr::leaf(field, values.clone())?);
        }
        Ok(Some(FilterExpr::And(children)))
    }
}

/// Flat name/value parameter mapping with last-write-wins inserts.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.retain(|(existing, _)| existing != name);
        self.0.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Manifest,
}

impl ReturnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnType::Manifest => "manifest",
        }
    }
}

/// Recognized request options. Modeled as an explicit struct so a
/// misspelled option fails at the call site instead of being silently
/// sent upstream; genuinely free-form pairs go through `extra`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub size: Option<usize>,
    pub from: Option<usize>,
    pub fields: Vec<String>,
    pub facets: Option<String>,
    pub sort: Option<String>,
    pub return_type: Option<ReturnType>,
    pub format: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// Wrap the filter (JSON-encoded) plus passthrough options into a flat
/// parameter mapping. Later `extra` pairs override earlier keys.
pub fn build_query_params(filter: Option<&FilterExpr>, options: &QueryOptions) -> QueryParams {
    let mut params = QueryParams::new();
    if let Some(filter) = filter {
        params.insert("filters", filter.encode());
    }
    if let Some(size) = options.size {
        params.insert("size", size.to_string());
    }
    if let Some(from) = options.from {
        params.insert("from", from.to_string());
    }
    if !options.fields.is_empty() {
        params.insert("fields", options.fields.join(","));
    }
    if let Some(facets) = &options.facets {
        params.insert("facets", facets.clone());
    }
    if let Some(sort) = &options.sort {
        params.insert("sort", sort.clone());
    }
    if let Some(return_type) = options.return_type {
        params.insert("return_type", return_type.as_str());
    }
    if let Some(format) = &options.format {
        params.insert("format", format.clone());
    }
    for (name, value) in &options.extra {
        params.insert(name, value.clone());
    }
    params
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn leaf_requires_values() {
        let err = FilterExpr::leaf("files.data_category", Vec::<String>::new()).unwrap_err();
        assert_matches!(err, GdcError::EmptyValues(_));
    }

    #[test]
    fn leaf_serializes_to_gdc_shape() {
        let leaf = FilterExpr::leaf("files.data_category", "Clinical").unwrap();
        assert_eq!(
            leaf.to_json(),
            json!({
                "op": "in",
                "content": {"field": "files.data_category", "value": ["Clinical"]}
            })
        );
    }

    #[test]
    fn filter_parameters_project_and_category() {
        let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));
        let filter = query.filter().unwrap().unwrap();
        assert_eq!(
            filter.to_json(),
            json!({
                "op": "and",
                "content": [
                    {"op": "in", "content": {"field": "cases.project.project_id", "value": ["TCGA-BLCA"]}},
                    {"op": "in", "content": {"field": "files.data_category", "value": ["Clinical"]}},
                ]
            })
        );
    }

    #[test]
    fn filter_parameters_empty_inputs() {
        let query = SearchQuery::default();
        assert!(query.filter().unwrap().is_none());
    }

    #[test]
    fn filter_parameters_conflicting_category() {
        let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"))
            .with_extra("files.data_category", "Biospecimen");
        assert_matches!(query.filter(), Err(GdcError::ConflictingFilter(_)));

        let query = SearchQuery::default().with_extra("data_category", "Clinical");
        assert_matches!(query.filter(), Err(GdcError::ConflictingFilter(_)));
    }

    #[test]
    fn query_params_last_write_wins() {
        let mut params = QueryParams::new();
        params.insert("size", "10");
        params.insert("sort", "file_name:asc");
        params.insert("size", "25");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("size"), Some("25"));
    }

    #[test]
    fn build_query_params_wraps_filter_and_options() {
        let query = SearchQuery::new(Some("TCGA-BLCA"), None);
        let filter = query.filter().unwrap();
        let options = QueryOptions {
            size: Some(5),
            return_type: Some(ReturnType::Manifest),
            extra: vec![("size".to_string(), "7".to_string())],
            ..QueryOptions::default()
        };
        let params = build_query_params(filter.as_ref(), &options);
        assert!(params.get("filters").unwrap().contains("TCGA-BLCA"));
        assert_eq!(params.get("return_type"), Some("manifest"));
        // extras override recognized options with the same name
        assert_eq!(params.get("size"), Some("7"));
    }
}
