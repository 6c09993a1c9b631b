use std::fs;

use camino::Utf8Path;
use tracing::info;

use crate::clinical::{ClinicalTable, build_clinical_table, clinical_record_from_file};
use crate::domain::Endpoint;
use crate::download::{DownloadOptions, DownloadedFiles, Fetcher, download_files};
use crate::error::GdcError;
use crate::fields::FieldValidator;
use crate::filters::{QueryOptions, SearchQuery, build_query_params};
use crate::http::GdcHttp;
use crate::manifest::get_manifest;
use crate::paginate::{compute_offset, count_pages};
use crate::settings::Settings;

/// Top-level pipeline: query construction, pagination, manifest
/// assembly, download-and-verify, clinical transform. Collaborators
/// are injected so transports and the external tool can be faked.
pub struct App<H: GdcHttp, F: Fetcher> {
    settings: Settings,
    http: H,
    fetcher: F,
}

impl<H: GdcHttp, F: Fetcher> App<H, F> {
    pub fn new(settings: Settings, http: H, fetcher: F) -> Self {
        Self {
            settings,
            http,
            fetcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// One search request against an endpoint, returning the parsed
    /// JSON body.
    pub fn get_data(
        &self,
        endpoint: Endpoint,
        query: &SearchQuery,
        page: usize,
        size: Option<usize>,
        fields: &[String],
        verify: bool,
    ) -> Result<serde_json::Value, GdcError> {
        if verify {
            self.validator().verify_query(query)?;
        }
        let size = size.unwrap_or(self.settings.default_size);
        let options = QueryOptions {
            size: Some(size),
            from: (page > 0).then(|| compute_offset(page, size)),
            fields: fields.to_vec(),
            ..QueryOptions::default()
        };
        let params = build_query_params(query.filter()?.as_ref(), &options);
        let url = self.settings.endpoint_url(endpoint);
        let response = self.http.get(&url, params.as_slice())?.error_for_status()?;
        response.json()
    }

    pub fn validator(&self) -> FieldValidator<'_, H> {
        FieldValidator::new(&self.http, &self.settings)
    }

    pub fn count_pages(
        &self,
        query: &SearchQuery,
        size: Option<usize>,
        item_cap: Option<usize>,
    ) -> Result<usize, GdcError> {
        let size = size.unwrap_or(self.settings.default_size);
        count_pages(
            &self.http,
            &self.settings,
            query,
            Endpoint::Files,
            size,
            item_cap,
        )
    }

    pub fn get_manifest(
        &self,
        query: &SearchQuery,
        item_cap: Option<usize>,
        size: Option<usize>,
        pages: Option<usize>,
        verify: bool,
    ) -> Result<String, GdcError> {
        if verify {
            self.validator().verify_query(query)?;
        }
        get_manifest(&self.http, &self.settings, query, item_cap, size, pages)
    }

    /// Assemble the manifest and write it under the data directory.
    pub fn save_manifest(
        &self,
        query: &SearchQuery,
        item_cap: Option<usize>,
        filename: &str,
    ) -> Result<camino::Utf8PathBuf, GdcError> {
        let manifest = self.get_manifest(query, item_cap, None, None, false)?;
        let data_dir = self.settings.data_dir.clone();
        fs::create_dir_all(data_dir.as_std_path())
            .map_err(|err| GdcError::Filesystem(format!("create {data_dir}: {err}")))?;
        let path = data_dir.join(filename);
        fs::write(path.as_std_path(), manifest)
            .map_err(|err| GdcError::Filesystem(format!("write {path}: {err}")))?;
        info!(%path, "manifest written to disk");
        Ok(path)
    }

    pub fn download_files(
        &self,
        query: &SearchQuery,
        data_dir: Option<&Utf8Path>,
        options: &DownloadOptions,
    ) -> Result<DownloadedFiles, GdcError> {
        if options.verify {
            self.validator().verify_query(query)?;
        }
        let data_dir = data_dir.unwrap_or(&self.settings.data_dir);
        download_files(
            &self.http,
            &self.fetcher,
            &self.settings,
            query,
            data_dir,
            options,
        )
    }

    /// Download the project's clinical files.
    pub fn download_clinical_files(
        &self,
        project: &str,
        data_dir: Option<&Utf8Path>,
        options: &DownloadOptions,
    ) -> Result<DownloadedFiles, GdcError> {
        let query = SearchQuery::new(Some(project), Some("Clinical"));
        self.download_files(&query, data_dir, options)
    }

    /// Download clinical files and flatten them into the per-patient
    /// table, one row per source file.
    pub fn get_clinical_data(
        &self,
        project: &str,
        data_dir: Option<&Utf8Path>,
        options: &DownloadOptions,
    ) -> Result<ClinicalTable, GdcError> {
        let files = self.download_clinical_files(project, data_dir, options)?;
        let mut records = Vec::with_capacity(files.paths.len());
        for path in &files.paths {
            records.push(clinical_record_from_file(
                &self.http,
                &self.settings,
                path,
                Some(&files.fileinfo),
            )?);
        }
        Ok(build_clinical_table(&records))
    }
}
