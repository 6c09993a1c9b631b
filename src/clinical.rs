use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use tracing::debug;

use crate::error::GdcError;
use crate::fileinfo::{FileInfoTable, file_id_for_path, file_info_data};
use crate::http::GdcHttp;
use crate::settings::Settings;

/// Columns with this many or fewer distinct non-missing values are
/// treated as categorical.
pub const MAX_CATEGORY_GROUPS: usize = 5;

/// One flat field-name-to-value mapping per patient.
pub type ClinicalRecord = BTreeMap<String, String>;

/// Recursively flatten a clinical XML subtree into a flat mapping.
///
/// A node annotated with a `preferred_name` attribute contributes under
/// that name; otherwise, with `preferred_only` false, under its raw tag
/// name (prefixed with `name_prefix` when given); otherwise it
/// contributes no field of its own. The node's own trimmed text is
/// recorded when both a name and a non-empty value exist. Children are
/// merged depth-first with last-write-wins on name collision.
pub fn parse_tag_recursive(
    node: roxmltree::Node<'_, '_>,
    name_prefix: Option<&str>,
    preferred_only: bool,
) -> ClinicalRecord {
    let mut data = ClinicalRecord::new();
    if !node.is_element() {
        return data;
    }

    let field_name = if let Some(preferred) = node.attribute("preferred_name") {
        Some(preferred.to_string())
    } else if !preferred_only {
        let tag = node.tag_name().name().to_string();
        match name_prefix {
            Some(prefix) => Some(format!("{prefix}-{tag}")),
            None => Some(tag),
        }
    } else {
        None
    };

    let field_value = node.text().map(str::trim).filter(|text| !text.is_empty());

    if let (Some(name), Some(value)) = (&field_name, field_value) {
        data.insert(name.clone(), value.to_string());
    }

    if node.children().count() > 1 {
        for child in node.children() {
            let child_data = parse_tag_recursive(child, field_name.as_deref(), preferred_only);
            data.extend(child_data);
        }
    }

    data
}

/// Parse a downloaded clinical XML file into one flat patient record,
/// injecting source bookkeeping fields and the case id (looked up from
/// the provided file-info table, or fetched on demand).
pub fn clinical_record_from_file<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    xml_path: &Utf8Path,
    fileinfo: Option<&FileInfoTable>,
) -> Result<ClinicalRecord, GdcError> {
    let text = fs::read_to_string(xml_path.as_std_path())
        .map_err(|err| GdcError::Filesystem(format!("read {xml_path}: {err}")))?;
    let document = roxmltree::Document::parse(&text)
        .map_err(|err| GdcError::ClinicalParse(format!("{xml_path}: {err}")))?;

    let patient = document
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "patient")
        .ok_or_else(|| GdcError::ClinicalParse(format!("{xml_path}: no patient element")))?;

    let mut data = ClinicalRecord::new();
    for child in patient.children().filter(|child| child.is_element()) {
        data.extend(parse_tag_recursive(child, None, true));
    }

    let patient_id = document
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "patient_id")
        .and_then(|node| node.text())
        .map(str::trim)
        .ok_or_else(|| GdcError::ClinicalParse(format!("{xml_path}: no patient_id element")))?;

    let file_id = file_id_for_path(xml_path)
        .ok_or_else(|| GdcError::ClinicalParse(format!("{xml_path}: no parent directory")))?;

    let case_id = match fileinfo.and_then(|table| table.case_id_for(&file_id)) {
        Some(case_id) => case_id.to_string(),
        None => {
            debug!(%file_id, "case id not in provided table, fetching");
            let table = file_info_data(http, settings, &[file_id.clone()], None, None)?;
            table
                .case_id_for(&file_id)
                .ok_or_else(|| {
                    GdcError::ResultParse(format!("no case_id in fileinfo for {file_id}"))
                })?
                .to_string()
        }
    };

    data.insert("_source_type".to_string(), "XML".to_string());
    data.insert("_source_desc".to_string(), xml_path.to_string());
    data.insert("_source_file_uuid".to_string(), file_id);
    data.insert("patient_id".to_string(), patient_id.to_string());
    data.insert("case_id".to_string(), case_id);
    Ok(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Text,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicalColumn {
    pub name: String,
    pub kind: ColumnKind,
    /// One slot per table row; `None` where the record had no value.
    pub values: Vec<Option<String>>,
}

impl ClinicalColumn {
    /// Values under numeric coercion; non-numeric entries stay `None`.
    pub fn as_numbers(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .map(|value| value.as_deref().and_then(|value| value.parse().ok()))
            .collect()
    }

    /// Distinct non-missing values, for categorical columns.
    pub fn categories(&self) -> Vec<&str> {
        let distinct: BTreeSet<&str> = self.values.iter().flatten().map(String::as_str).collect();
        distinct.into_iter().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicalTable {
    pub n_rows: usize,
    pub columns: Vec<ClinicalColumn>,
}

impl ClinicalTable {
    pub fn column(&self, name: &str) -> Option<&ClinicalColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Assemble per-patient records into a table, one row per record, then
/// type each column independently: numeric when every non-missing value
/// parses as a number, else categorical when the distinct non-missing
/// count is at most `MAX_CATEGORY_GROUPS`, else plain text.
pub fn build_clinical_table(records: &[ClinicalRecord]) -> ClinicalTable {
    let names: BTreeSet<&String> = records.iter().flat_map(BTreeMap::keys).collect();
    let columns = names
        .into_iter()
        .map(|name| {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|record| record.get(name).cloned())
                .collect();
            let kind = infer_column_kind(&values);
            ClinicalColumn {
                name: name.clone(),
                kind,
                values,
            }
        })
        .collect();
    ClinicalTable {
        n_rows: records.len(),
        columns,
    }
}

fn infer_column_kind(values: &[Option<String>]) -> ColumnKind {
    let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
    if !present.is_empty() && present.iter().all(|value| value.parse::<f64>().is_ok()) {
        return ColumnKind::Numeric;
    }
    let distinct: BTreeSet<&str> = present.iter().copied().collect();
    if !distinct.is_empty() && distinct.len() <= MAX_CATEGORY_GROUPS {
        ColumnKind::Categorical
    } else {
        ColumnKind::Text
    }
}
