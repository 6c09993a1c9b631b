use std::collections::BTreeMap;

use camino::Utf8Path;
use serde_json::Value;
use tracing::debug;

use crate::domain::Endpoint;
use crate::error::GdcError;
use crate::filters::{QueryOptions, SearchQuery, build_query_params};
use crate::http::GdcHttp;
use crate::settings::Settings;

/// Per-file metadata with nested `cases` / `analysis` sub-objects
/// hoisted to the top level.
pub type FileInfoRecord = BTreeMap<String, Value>;

/// File-metadata side table: one row per requested file id.
#[derive(Debug, Clone, Default)]
pub struct FileInfoTable {
    rows: Vec<FileInfoRecord>,
}

impl FileInfoTable {
    pub fn from_rows(rows: Vec<FileInfoRecord>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FileInfoRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case id for a file id, if the table has a row for it.
    pub fn case_id_for(&self, file_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.get("file_id").and_then(Value::as_str) == Some(file_id))
            .and_then(|row| row.get("case_id"))
            .and_then(Value::as_str)
    }
}

/// Manifest id for a downloaded file: the name of its parent directory
/// (`<data_dir>/<id>/<filename>`).
pub fn file_id_for_path(path: &Utf8Path) -> Option<String> {
    path.parent()
        .and_then(Utf8Path::file_name)
        .map(str::to_string)
}

/// Fetch the file-metadata table for the given file ids, issuing one
/// query per chunk of `chunk_size` ids.
pub fn file_info_data<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    file_ids: &[String],
    fields: Option<&[String]>,
    chunk_size: Option<usize>,
) -> Result<FileInfoTable, GdcError> {
    let fields = fields.unwrap_or(&settings.default_file_fields);
    let chunk_size = chunk_size.unwrap_or(settings.default_chunk_size).max(1);
    let file_ids: Vec<&String> = file_ids.iter().filter(|id| !id.is_empty()).collect();
    if file_ids.is_empty() {
        return Ok(FileInfoTable::default());
    }

    let mut rows = Vec::with_capacity(file_ids.len());
    for chunk in file_ids.chunks(chunk_size) {
        let ids: Vec<String> = chunk.iter().map(|id| id.to_string()).collect();
        rows.extend(file_info_chunk(http, settings, &ids, fields)?);
    }
    Ok(FileInfoTable { rows })
}

fn file_info_chunk<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    file_ids: &[String],
    fields: &[String],
) -> Result<Vec<FileInfoRecord>, GdcError> {
    let query = SearchQuery::default().with_extra("files.file_id", file_ids.to_vec());
    let options = QueryOptions {
        size: Some(file_ids.len()),
        fields: fields.to_vec(),
        format: Some("json".to_string()),
        ..QueryOptions::default()
    };
    let params = build_query_params(query.filter()?.as_ref(), &options);
    let url = settings.endpoint_url(Endpoint::Files);
    let response = http.get(&url, params.as_slice())?.error_for_status()?;
    let json = response.json()?;
    let hits = json
        .pointer("/data/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| GdcError::ResultParse("missing data.hits".to_string()))?;
    if hits.len() != file_ids.len() {
        return Err(GdcError::ResultParse(format!(
            "not enough results from fileinfo returned: got {}, wanted {}",
            hits.len(),
            file_ids.len()
        )));
    }
    debug!(count = hits.len(), "flattening fileinfo hits");
    Ok(hits.iter().map(flatten_hit).collect())
}

/// Hoist the `cases` (first element) and `analysis` sub-mappings to the
/// top level of the record; everything else is copied through.
pub fn flatten_hit(hit: &Value) -> FileInfoRecord {
    let mut record = FileInfoRecord::new();
    let Some(object) = hit.as_object() else {
        return record;
    };
    for (key, value) in object {
        match key.as_str() {
            "cases" => {
                if let Some(case) = value.as_array().and_then(|cases| cases.first()) {
                    if let Some(case) = case.as_object() {
                        for (sub_key, sub_value) in case {
                            record.insert(sub_key.clone(), sub_value.clone());
                        }
                    }
                }
            }
            "analysis" => {
                if let Some(analysis) = value.as_object() {
                    for (sub_key, sub_value) in analysis {
                        record.insert(sub_key.clone(), sub_value.clone());
                    }
                }
            }
            _ => {
                record.insert(key.clone(), value.clone());
            }
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use serde_json::json;

    use super::*;

    #[test]
    fn file_id_comes_from_parent_dir() {
        let path = Utf8PathBuf::from("data/gdc/aaaa-1111/nationwide.xml");
        assert_eq!(file_id_for_path(&path).unwrap(), "aaaa-1111");
    }

    #[test]
    fn flatten_hoists_cases_and_analysis() {
        let hit = json!({
            "file_id": "aaaa-1111",
            "data_category": "Clinical",
            "cases": [{"case_id": "case-1", "submitter_id": "TCGA-XX-0001"}],
            "analysis": {"workflow_type": "none"},
        });
        let record = flatten_hit(&hit);
        assert_eq!(record["file_id"], json!("aaaa-1111"));
        assert_eq!(record["case_id"], json!("case-1"));
        assert_eq!(record["submitter_id"], json!("TCGA-XX-0001"));
        assert_eq!(record["workflow_type"], json!("none"));
        assert!(!record.contains_key("cases"));
        assert!(!record.contains_key("analysis"));
    }

    #[test]
    fn case_id_lookup() {
        let hit = json!({"file_id": "aaaa", "cases": [{"case_id": "case-1"}]});
        let table = FileInfoTable {
            rows: vec![flatten_hit(&hit)],
        };
        assert_eq!(table.case_id_for("aaaa"), Some("case-1"));
        assert_eq!(table.case_id_for("bbbb"), None);
    }
}
