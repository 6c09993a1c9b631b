use tracing::debug;

use crate::domain::Endpoint;
use crate::error::GdcError;
use crate::filters::{
    DATA_CATEGORY_FIELD, PROJECT_FIELD, QueryOptions, SearchQuery, build_query_params,
};
use crate::http::GdcHttp;
use crate::settings::Settings;

/// How many close matches to offer when a field name is unknown.
const MAX_FIELD_SUGGESTIONS: usize = 5;

/// Checks requested field/value pairs against the remote schema and the
/// remote set of valid values for a field.
pub struct FieldValidator<'a, H: GdcHttp> {
    http: &'a H,
    settings: &'a Settings,
}

impl<'a, H: GdcHttp> FieldValidator<'a, H> {
    pub fn new(http: &'a H, settings: &'a Settings) -> Self {
        Self { http, settings }
    }

    /// List allowable fields for this endpoint, from `<endpoint>/_mapping`.
    pub fn list_valid_fields(&self, endpoint: Endpoint) -> Result<Vec<String>, GdcError> {
        let url = format!("{}/_mapping", self.settings.endpoint_url(endpoint));
        let response = self.http.get(&url, &[])?.error_for_status()?;
        let json = response.json()?;
        let mapping = json
            .get("_mapping")
            .and_then(|value| value.as_object())
            .ok_or_else(|| GdcError::ResultParse("missing _mapping key".to_string()))?;
        Ok(mapping.keys().cloned().collect())
    }

    /// List valid values for a field via a zero-result faceted query.
    ///
    /// Facet names are unprefixed (`data_category`, not
    /// `files.data_category`), so the endpoint prefix is stripped from
    /// the field name by default. Disabling the stripping on a prefixed
    /// name makes the facet call fail upstream.
    pub fn list_valid_values(
        &self,
        field: &str,
        endpoint: Endpoint,
        project: Option<&str>,
        strip_endpoint_from_field: bool,
    ) -> Result<Vec<String>, GdcError> {
        let facet_name = if strip_endpoint_from_field {
            field
                .strip_prefix(&format!("{}.", endpoint.as_str()))
                .unwrap_or(field)
        } else {
            field
        };
        let query = SearchQuery::new(project, None);
        let options = QueryOptions {
            size: Some(0),
            facets: Some(facet_name.to_string()),
            ..QueryOptions::default()
        };
        let params = build_query_params(query.filter()?.as_ref(), &options);
        let url = self.settings.endpoint_url(endpoint);
        let response = self.http.get(&url, params.as_slice())?.error_for_status()?;
        let json = response.json()?;
        let buckets = json
            .pointer(&format!("/data/aggregations/{facet_name}/buckets"))
            .and_then(|value| value.as_array())
            .ok_or_else(|| {
                GdcError::ResultParse(format!("no aggregation buckets for facet {facet_name}"))
            })?;
        let values = buckets
            .iter()
            .filter_map(|bucket| bucket.get("key").and_then(|key| key.as_str()))
            .map(str::to_string)
            .collect();
        Ok(values)
    }

    /// Verify that the field exists for this endpoint; the error carries
    /// up to `MAX_FIELD_SUGGESTIONS` close matches.
    pub fn verify_field_name(&self, field: &str, endpoint: Endpoint) -> Result<(), GdcError> {
        let valid = self.list_valid_fields(endpoint)?;
        if valid.iter().any(|candidate| candidate == field) {
            return Ok(());
        }
        let mut matches = search_for_field(&valid, field);
        matches.truncate(MAX_FIELD_SUGGESTIONS);
        Err(GdcError::UnknownField {
            field: field.to_string(),
            matches,
        })
    }

    /// Verify that every value is among the valid values for the field,
    /// listing every offending value on mismatch.
    pub fn verify_values(
        &self,
        values: &[String],
        field: &str,
        endpoint: Endpoint,
        project: Option<&str>,
    ) -> Result<(), GdcError> {
        self.verify_field_name(field, endpoint)?;
        let valid = self.list_valid_values(field, endpoint, project, true)?;
        let bad_values: Vec<String> = values
            .iter()
            .filter(|value| !valid.contains(value))
            .cloned()
            .collect();
        if bad_values.is_empty() {
            debug!(field, "all values verified against facet");
            Ok(())
        } else {
            Err(GdcError::InvalidValue {
                field: field.to_string(),
                values: bad_values,
            })
        }
    }

    /// Verify every leaf a query would produce: project, category, and
    /// each extra field/value pair. Endpoints are resolved from the
    /// dotted field names.
    pub fn verify_query(&self, query: &SearchQuery) -> Result<(), GdcError> {
        if let Some(project) = &query.project {
            let endpoint = Endpoint::from_field(PROJECT_FIELD)?;
            self.verify_values(&[project.clone()], PROJECT_FIELD, endpoint, None)?;
        }
        if let Some(category) = &query.data_category {
            let endpoint = Endpoint::from_field(DATA_CATEGORY_FIELD)?;
            self.verify_values(&[category.clone()], DATA_CATEGORY_FIELD, endpoint, None)?;
        }
        for (field, values) in &query.extra {
            let endpoint = Endpoint::from_field(field)?;
            self.verify_values(&values.clone().into_vec(), field, endpoint, None)?;
        }
        Ok(())
    }
}

/// Substring search over known fields, skipping matches at position 0
/// so a bare suffix like `data_category` suggests its prefixed forms.
fn search_for_field(fields: &[String], search: &str) -> Vec<String> {
    fields
        .iter()
        .filter(|field| field.find(search).is_some_and(|index| index > 0))
        .cloned()
        .collect()
}
