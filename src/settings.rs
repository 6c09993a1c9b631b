use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::domain::Endpoint;
use crate::error::GdcError;

/// One active configuration, passed explicitly into every core entry
/// point. `Default` carries the stock GDC values; callers override
/// fields or load a `gdc-query.json` via `SettingsLoader`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// URL template with an `{endpoint}` placeholder.
    pub api_endpoint: String,
    /// Path to the external gdc-client executable.
    pub client_path: Utf8PathBuf,
    /// Credential authorizing downloads. Required only when downloading.
    pub token_path: Option<Utf8PathBuf>,
    /// Directory the fetcher downloads into.
    pub data_dir: Utf8PathBuf,
    /// Records per page, by default.
    pub default_size: usize,
    /// Fields pulled for the file-metadata table.
    pub default_file_fields: Vec<String>,
    /// File ids per file-metadata request.
    pub default_chunk_size: usize,
    /// Recognized but not acted on here; the HTTP collaborator owns caching.
    pub use_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.gdc.cancer.gov/{endpoint}".to_string(),
            client_path: Utf8PathBuf::from("gdc-client"),
            token_path: None,
            data_dir: Utf8PathBuf::from("data/gdc"),
            default_size: 10,
            default_file_fields: default_file_fields(),
            default_chunk_size: 30,
            use_cache: false,
        }
    }
}

impl Settings {
    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        self.api_endpoint.replace("{endpoint}", endpoint.as_str())
    }

    /// Token path, required for download operations.
    pub fn require_token(&self) -> Result<&Utf8Path, GdcError> {
        self.token_path.as_deref().ok_or(GdcError::MissingToken)
    }
}

pub fn default_file_fields() -> Vec<String> {
    [
        "file_id",
        "file_name",
        "cases.submitter_id",
        "cases.case_id",
        "data_category",
        "data_type",
        "cases.samples.tumor_descriptor",
        "cases.samples.tissue_type",
        "cases.samples.sample_type",
        "cases.samples.submitter_id",
        "cases.samples.sample_id",
        "analysis.analysis_id",
        "analysis.workflow_type",
    ]
    .iter()
    .map(|field| field.to_string())
    .collect()
}

#[derive(Debug, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub client_path: Option<String>,
    #[serde(default)]
    pub token_path: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub default_size: Option<usize>,
    #[serde(default)]
    pub default_file_fields: Option<Vec<String>>,
    #[serde(default)]
    pub default_chunk_size: Option<usize>,
    #[serde(default)]
    pub use_cache: Option<bool>,
}

pub struct SettingsLoader;

impl SettingsLoader {
    /// Resolve settings from a JSON file. With no explicit path the
    /// default `gdc-query.json` is optional; stock settings are used
    /// when it is absent.
    pub fn resolve(path: Option<&str>) -> Result<Settings, GdcError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("gdc-query.json"),
        };

        if !config_path.exists() {
            if path.is_none() {
                return Ok(Settings::default());
            }
            return Err(GdcError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GdcError::ConfigRead(config_path.clone()))?;
        let file: SettingsFile =
            serde_json::from_str(&content).map_err(|err| GdcError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_file(file))
    }

    pub fn resolve_file(file: SettingsFile) -> Settings {
        let mut settings = Settings::default();
        if let Some(api_endpoint) = file.api_endpoint {
            settings.api_endpoint = api_endpoint;
        }
        if let Some(client_path) = file.client_path {
            settings.client_path = Utf8PathBuf::from(client_path);
        }
        if let Some(token_path) = file.token_path {
            settings.token_path = Some(Utf8PathBuf::from(token_path));
        }
        if let Some(data_dir) = file.data_dir {
            settings.data_dir = Utf8PathBuf::from(data_dir);
        }
        if let Some(default_size) = file.default_size {
            settings.default_size = default_size;
        }
        if let Some(default_file_fields) = file.default_file_fields {
            settings.default_file_fields = default_file_fields;
        }
        if let Some(default_chunk_size) = file.default_chunk_size {
            settings.default_chunk_size = default_chunk_size;
        }
        if let Some(use_cache) = file.use_cache {
            settings.use_cache = use_cache;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_size, 10);
        assert_eq!(settings.default_chunk_size, 30);
        assert_eq!(
            settings.endpoint_url(Endpoint::Files),
            "https://api.gdc.cancer.gov/files"
        );
    }

    #[test]
    fn token_required_for_downloads() {
        let settings = Settings::default();
        assert_matches!(settings.require_token(), Err(GdcError::MissingToken));

        let settings = Settings {
            token_path: Some(Utf8PathBuf::from("token.txt")),
            ..Settings::default()
        };
        assert_eq!(settings.require_token().unwrap(), "token.txt");
    }

    #[test]
    fn resolve_file_overrides() {
        let file: SettingsFile = serde_json::from_str(
            r#"{"data_dir": "downloads", "default_size": 25, "token_path": "t.txt"}"#,
        )
        .unwrap();
        let settings = SettingsLoader::resolve_file(file);
        assert_eq!(settings.data_dir, "downloads");
        assert_eq!(settings.default_size, 25);
        assert_eq!(settings.token_path.as_deref().unwrap(), "t.txt");
        assert_eq!(settings.default_chunk_size, 30);
    }
}
