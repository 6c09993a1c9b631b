use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::GdcError;
use crate::fileinfo::{FileInfoTable, file_id_for_path, file_info_data};
use crate::filters::SearchQuery;
use crate::http::GdcHttp;
use crate::manifest::{get_manifest, parse_manifest, render_manifest};
use crate::settings::Settings;

/// External download tool: takes a manifest file and a credential,
/// downloads referenced objects into the data directory. Retry and
/// progress behavior belong to the tool itself.
pub trait Fetcher: Send + Sync {
    fn download(&self, manifest_path: &Path, data_dir: &Utf8Path) -> Result<(), GdcError>;
}

/// Runs `gdc-client download -m <manifest> -t <token>` with the data
/// directory as working directory.
pub struct GdcClientFetcher {
    client_path: Utf8PathBuf,
    token_path: Utf8PathBuf,
}

impl GdcClientFetcher {
    pub fn from_settings(settings: &Settings) -> Result<Self, GdcError> {
        Ok(Self {
            client_path: settings.client_path.clone(),
            token_path: settings.require_token()?.to_path_buf(),
        })
    }
}

impl Fetcher for GdcClientFetcher {
    fn download(&self, manifest_path: &Path, data_dir: &Utf8Path) -> Result<(), GdcError> {
        let mut cmd = Command::new(self.client_path.as_std_path());
        cmd.arg("download")
            .arg("-m")
            .arg(manifest_path)
            .arg("-t")
            .arg(self.token_path.as_std_path())
            .current_dir(data_dir.as_std_path());
        info!(client = %self.client_path, dir = %data_dir, "invoking gdc-client");
        let output = cmd
            .output()
            .map_err(|err| GdcError::Fetcher(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", self.client_path)
        } else {
            stderr
        };
        Err(GdcError::Fetcher(message))
    }
}

/// Per-file success/failure partition, re-derived from the filesystem
/// on every call. Never persisted.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub succeeded: Vec<Utf8PathBuf>,
    pub failed: Vec<Utf8PathBuf>,
    pub completed_at: DateTime<Utc>,
}

/// Downloaded file paths confirmed present, with the derived
/// file-metadata table attached as a side table.
#[derive(Debug, Clone)]
pub struct DownloadedFiles {
    pub paths: Vec<Utf8PathBuf>,
    pub report: DownloadReport,
    pub fileinfo: FileInfoTable,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub item_cap: Option<usize>,
    pub only_updates: bool,
    pub verify: bool,
    pub size: Option<usize>,
    pub pages: Option<usize>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            item_cap: None,
            only_updates: true,
            verify: false,
            size: None,
            pages: None,
        }
    }
}

/// Check every manifest row against `<data_dir>/<id>/<filename>` and
/// partition rows into succeeded and failed. The sole source of truth
/// for download success.
pub fn verify_download(manifest: &str, data_dir: &Utf8Path) -> Result<DownloadReport, GdcError> {
    let entries = parse_manifest(manifest)?;
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for entry in &entries {
        let path = data_dir.join(&entry.id).join(&entry.filename);
        if path.as_std_path().exists() {
            succeeded.push(path);
        } else {
            warn!(path = %path, "file not found following download");
            failed.push(path);
        }
    }
    Ok(DownloadReport {
        succeeded,
        failed,
        completed_at: Utc::now(),
    })
}

/// Keep only the manifest rows whose referenced local file is absent.
/// Short-circuits to the unfiltered manifest when update-only filtering
/// is disabled. Ensures the data directory exists either way.
pub fn filter_to_updates(
    manifest: &str,
    data_dir: &Utf8Path,
    only_updates: bool,
) -> Result<String, GdcError> {
    fs::create_dir_all(data_dir.as_std_path())
        .map_err(|err| GdcError::Filesystem(format!("create {data_dir}: {err}")))?;
    if !only_updates {
        return Ok(manifest.to_string());
    }
    let entries = parse_manifest(manifest)?;
    let missing: Vec<_> = entries
        .into_iter()
        .filter(|entry| {
            !data_dir
                .join(&entry.id)
                .join(&entry.filename)
                .as_std_path()
                .exists()
        })
        .collect();
    Ok(render_manifest(&missing))
}

/// Download files matching the query into the data directory.
///
/// 1. assemble the full manifest (error when empty);
/// 2. filter it to not-yet-downloaded rows;
/// 3. when rows remain, write them to a temporary manifest file and
///    invoke the fetcher with the data directory as working directory;
/// 4. verify the ORIGINAL manifest against the filesystem, so success
///    is judged against everything requested.
///
/// Partial success is not an error: missing files stay in the report's
/// failed partition and a repeat call re-filters to the remaining gaps.
pub fn download_files<H: GdcHttp, F: Fetcher>(
    http: &H,
    fetcher: &F,
    settings: &Settings,
    query: &SearchQuery,
    data_dir: &Utf8Path,
    options: &DownloadOptions,
) -> Result<DownloadedFiles, GdcError> {
    let manifest = get_manifest(
        http,
        settings,
        query,
        options.item_cap,
        options.size,
        options.pages,
    )?;
    if manifest.trim().is_empty() {
        return Err(GdcError::NoFiles);
    }

    let updates = filter_to_updates(&manifest, data_dir, options.only_updates)?;
    let report = if parse_manifest(&updates)?.is_empty() {
        info!("all manifest files already present, skipping fetcher");
        verify_download(&manifest, data_dir)?
    } else {
        // NamedTempFile removes the manifest on every exit path.
        let mut manifest_file = tempfile::NamedTempFile::new()
            .map_err(|err| GdcError::Filesystem(err.to_string()))?;
        manifest_file
            .write_all(updates.as_bytes())
            .and_then(|_| manifest_file.flush())
            .map_err(|err| GdcError::Filesystem(err.to_string()))?;
        fetcher.download(manifest_file.path(), data_dir)?;
        verify_download(&manifest, data_dir)?
    };

    let file_ids: Vec<String> = report
        .succeeded
        .iter()
        .filter_map(|path| file_id_for_path(path))
        .collect();
    let fileinfo = file_info_data(http, settings, &file_ids, None, None)?;

    Ok(DownloadedFiles {
        paths: report.succeeded.clone(),
        report,
        fileinfo,
    })
}
