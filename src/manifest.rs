use tracing::info;

use crate::domain::Endpoint;
use crate::error::GdcError;
use crate::filters::{QueryOptions, ReturnType, SearchQuery, build_query_params};
use crate::http::GdcHttp;
use crate::paginate::{compute_offset, count_pages};
use crate::settings::Settings;

pub const MANIFEST_HEADER: &str = "id\tfilename\tmd5\tsize\tstate";

/// One row of the tab-separated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub filename: String,
    pub md5: String,
    pub size: u64,
    pub state: String,
}

impl ManifestEntry {
    pub fn parse_line(line: &str) -> Result<Self, GdcError> {
        let mut columns = line.split('\t');
        let mut next = |name: &str| {
            columns
                .next()
                .ok_or_else(|| GdcError::ResultParse(format!("manifest row missing {name}: {line}")))
        };
        let id = next("id")?.to_string();
        let filename = next("filename")?.to_string();
        let md5 = next("md5")?.to_string();
        let size = next("size")?
            .parse::<u64>()
            .map_err(|_| GdcError::ResultParse(format!("manifest row has non-numeric size: {line}")))?;
        let state = next("state")?.to_string();
        Ok(Self {
            id,
            filename,
            md5,
            size,
            state,
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.id, self.filename, self.md5, self.size, self.state
        )
    }
}

/// Parse a manifest document into its rows, skipping the header and any
/// blank lines.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, GdcError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with("id\t"))
        .map(ManifestEntry::parse_line)
        .collect()
}

/// Rebuild the tab-separated document (header plus one line per entry).
pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut lines = vec![MANIFEST_HEADER.to_string()];
    lines.extend(entries.iter().map(ManifestEntry::to_line));
    lines.join("\n")
}

/// One manifest request: `return_type=manifest`, ascending filename
/// sort, start position from the page/size pair. Returns the raw
/// tab-separated text.
pub fn manifest_page<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    query: &SearchQuery,
    page: usize,
    size: usize,
) -> Result<String, GdcError> {
    let options = QueryOptions {
        size: Some(size),
        from: Some(compute_offset(page, size)),
        sort: Some("file_name:asc".to_string()),
        return_type: Some(ReturnType::Manifest),
        ..QueryOptions::default()
    };
    let params = build_query_params(query.filter()?.as_ref(), &options);
    let url = settings.endpoint_url(Endpoint::Files);
    let response = http.get(&url, params.as_slice())?.error_for_status()?;
    Ok(response.body)
}

/// Assemble the manifest for files matching the query, fetching pages
/// strictly in order and concatenating them.
///
/// The manifest endpoint carries no pagination metadata, so the page
/// count is resolved up front unless given explicitly. Pages after the
/// first have their header row stripped; pages are joined with a single
/// newline and no blank separator line. With `item_cap` set, a
/// single-page fetch is widened to `item_cap + 1` rows and the final
/// document truncated to header plus `item_cap` rows by line position.
pub fn get_manifest<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    query: &SearchQuery,
    item_cap: Option<usize>,
    size: Option<usize>,
    pages: Option<usize>,
) -> Result<String, GdcError> {
    let mut size = size.unwrap_or(settings.default_size);
    let pages = match pages {
        Some(pages) => pages,
        None => count_pages(http, settings, query, Endpoint::Files, size, item_cap)?,
    };
    if let Some(cap) = item_cap {
        if pages == 1 {
            size = cap + 1;
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for page in 0..pages {
        let text = manifest_page(http, settings, query, page, size)?;
        let page_lines = text.lines().skip(if page > 0 { 1 } else { 0 });
        lines.extend(page_lines.map(str::to_string));
    }
    info!(pages, rows = lines.len().saturating_sub(1), "assembled manifest");

    if let Some(cap) = item_cap {
        lines.truncate(cap + 1);
    }
    Ok(lines.join("\n"))
}
