use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use gdc_query::app::App;
use gdc_query::download::{
    DownloadOptions, Fetcher, download_files, filter_to_updates, verify_download,
};
use gdc_query::error::GdcError;
use gdc_query::filters::SearchQuery;
use gdc_query::http::{GdcHttp, HttpResponse};
use gdc_query::manifest::{MANIFEST_HEADER, parse_manifest};
use gdc_query::settings::Settings;

/// Serves a fixed manifest for manifest-mode requests and synthesizes
/// fileinfo hits for file-metadata queries.
struct FixedManifestHttp {
    manifest: String,
}

impl GdcHttp for FixedManifestHttp {
    fn get(&self, _url: &str, params: &[(String, String)]) -> Result<HttpResponse, GdcError> {
        let is_manifest = params
            .iter()
            .any(|(key, value)| key == "return_type" && value == "manifest");
        if is_manifest {
            return Ok(HttpResponse {
                status: 200,
                body: self.manifest.clone(),
            });
        }
        // fileinfo query: echo one hit per requested file id
        let filters = params
            .iter()
            .find(|(key, _)| key == "filters")
            .map(|(_, value)| value.as_str())
            .unwrap_or("{}");
        let json: serde_json::Value = serde_json::from_str(filters).unwrap();
        // extras-only queries arrive as an AND combinator over one leaf
        let ids: Vec<String> = json
            .pointer("/content/0/content/value")
            .and_then(|value| value.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let hits: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "file_id": id,
                    "cases": [{"case_id": format!("case-{id}")}],
                })
            })
            .collect();
        Ok(HttpResponse {
            status: 200,
            body: serde_json::json!({"data": {"hits": hits}}).to_string(),
        })
    }
}

/// Writes the files a real gdc-client would, minus any listed in
/// `withhold`, and counts invocations.
struct WritingFetcher {
    withhold: Vec<String>,
    calls: Mutex<usize>,
}

impl WritingFetcher {
    fn new(withhold: &[&str]) -> Self {
        Self {
            withhold: withhold.iter().map(|id| id.to_string()).collect(),
            calls: Mutex::new(0),
        }
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Fetcher for WritingFetcher {
    fn download(&self, manifest_path: &Path, data_dir: &Utf8Path) -> Result<(), GdcError> {
        *self.calls.lock().unwrap() += 1;
        let manifest = fs::read_to_string(manifest_path).unwrap();
        for entry in parse_manifest(&manifest).unwrap() {
            if self.withhold.contains(&entry.id) {
                continue;
            }
            let dir = data_dir.join(&entry.id);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(&entry.filename), b"<patient/>").unwrap();
        }
        Ok(())
    }
}

fn manifest_three_rows() -> String {
    format!(
        "{MANIFEST_HEADER}\n\
         aaaa\tone.xml\tmd5a\t10\treleased\n\
         bbbb\ttwo.xml\tmd5b\t20\treleased\n\
         cccc\tthree.xml\tmd5c\t30\treleased"
    )
}

fn temp_data_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("gdc")).unwrap()
}

fn options() -> DownloadOptions {
    DownloadOptions {
        pages: Some(1),
        ..DownloadOptions::default()
    }
}

#[test]
fn download_fetches_and_verifies_everything() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    let http = FixedManifestHttp {
        manifest: manifest_three_rows(),
    };
    let fetcher = WritingFetcher::new(&[]);
    let settings = Settings::default();
    let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));

    let files = download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap();
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(files.paths.len(), 3);
    assert!(files.report.failed.is_empty());
    assert_eq!(files.fileinfo.len(), 3);
    assert_eq!(files.fileinfo.case_id_for("bbbb"), Some("case-bbbb"));

    // round-trip: every referenced path now exists
    let report = verify_download(&manifest_three_rows(), &data_dir).unwrap();
    assert!(report.failed.is_empty());
    assert_eq!(report.succeeded.len(), 3);
}

#[test]
fn partial_download_is_reported_not_raised() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    let http = FixedManifestHttp {
        manifest: manifest_three_rows(),
    };
    let fetcher = WritingFetcher::new(&["cccc"]);
    let settings = Settings::default();
    let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));

    let files = download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap();
    assert_eq!(files.report.succeeded.len(), 2);
    assert_eq!(files.report.failed.len(), 1);
    assert!(files.report.failed[0].as_str().ends_with("cccc/three.xml"));
}

#[test]
fn repeated_downloads_shrink_the_failed_list() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    let http = FixedManifestHttp {
        manifest: manifest_three_rows(),
    };
    let settings = Settings::default();
    let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));

    // first pass: two of three arrive
    let first = {
        let fetcher = WritingFetcher::new(&["cccc"]);
        download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap()
    };
    // second pass: the fetcher only sees the remaining gap
    let second = {
        let fetcher = WritingFetcher::new(&[]);
        download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap()
    };
    assert!(second.report.failed.len() <= first.report.failed.len());
    assert!(second.report.failed.is_empty());
    assert_eq!(second.report.succeeded.len(), 3);
}

#[test]
fn fetcher_skipped_when_nothing_is_missing() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    for (id, filename) in [("aaaa", "one.xml"), ("bbbb", "two.xml"), ("cccc", "three.xml")] {
        let dir = data_dir.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(filename), b"<patient/>").unwrap();
    }
    let http = FixedManifestHttp {
        manifest: manifest_three_rows(),
    };
    let fetcher = WritingFetcher::new(&[]);
    let settings = Settings::default();
    let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));

    let files = download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap();
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(files.paths.len(), 3);
    assert!(files.report.failed.is_empty());
}

#[test]
fn empty_manifest_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    let http = FixedManifestHttp {
        manifest: String::new(),
    };
    let fetcher = WritingFetcher::new(&[]);
    let settings = Settings::default();
    let query = SearchQuery::new(Some("TCGA-XXXX"), Some("Clinical"));

    let err =
        download_files(&http, &fetcher, &settings, &query, &data_dir, &options()).unwrap_err();
    assert_matches!(err, GdcError::NoFiles);
}

#[test]
fn filter_to_updates_creates_the_data_dir() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    assert!(!data_dir.as_std_path().exists());
    filter_to_updates(&manifest_three_rows(), &data_dir, true).unwrap();
    assert!(data_dir.as_std_path().exists());
}

#[test]
fn app_download_uses_configured_data_dir() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp_data_dir(&temp);
    let settings = Settings {
        data_dir: data_dir.clone(),
        ..Settings::default()
    };
    let http = FixedManifestHttp {
        manifest: manifest_three_rows(),
    };
    let app = App::new(settings, http, WritingFetcher::new(&[]));

    let files = app
        .download_files(
            &SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical")),
            None,
            &options(),
        )
        .unwrap();
    assert_eq!(files.paths.len(), 3);
    assert!(files.paths[0].starts_with(&data_dir));
}
