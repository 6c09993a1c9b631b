use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gdc_query::app::App;
use gdc_query::domain::Endpoint;
use gdc_query::download::{DownloadOptions, DownloadedFiles, GdcClientFetcher};
use gdc_query::error::GdcError;
use gdc_query::filters::SearchQuery;
use gdc_query::http::GdcHttpClient;
use gdc_query::settings::{Settings, SettingsLoader};

#[derive(Parser)]
#[command(name = "gdc-query")]
#[command(about = "Query the GDC API, assemble manifests, download and verify files")]
#[command(version, author)]
struct Cli {
    /// Path to a gdc-query.json settings file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Assemble a manifest for matching files")]
    Manifest(ManifestArgs),
    #[command(about = "Download matching files and verify them against the manifest")]
    Download(DownloadArgs),
    #[command(about = "Download clinical files and print the flattened patient table")]
    Clinical(ClinicalArgs),
    #[command(about = "List valid fields for an endpoint")]
    Fields(FieldsArgs),
    #[command(about = "List valid values for a field")]
    Values(ValuesArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// Project id, e.g. TCGA-BLCA
    #[arg(long)]
    project: Option<String>,
    /// Data category, e.g. Clinical
    #[arg(long)]
    category: Option<String>,
    /// Extra field filter as field=value (repeatable)
    #[arg(long = "field", value_name = "FIELD=VALUE")]
    fields: Vec<String>,
    /// Verify field/value pairs against the remote schema first
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct ManifestArgs {
    #[command(flatten)]
    query: QueryArgs,
    /// Cap the manifest at this many files
    #[arg(long)]
    n: Option<usize>,
    /// Records per page
    #[arg(long)]
    size: Option<usize>,
    /// Explicit page count
    #[arg(long)]
    pages: Option<usize>,
    /// Write the manifest into the data directory under this name
    #[arg(long)]
    out: Option<String>,
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    query: QueryArgs,
    #[arg(long)]
    n: Option<usize>,
    #[arg(long)]
    size: Option<usize>,
    #[arg(long)]
    pages: Option<usize>,
    /// Download directory (defaults to the configured data_dir)
    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,
    /// Re-download files that are already present
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct ClinicalArgs {
    /// Project id, e.g. TCGA-BLCA
    #[arg(long)]
    project: String,
    #[arg(long)]
    n: Option<usize>,
    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct FieldsArgs {
    /// Endpoint name: files, cases, projects, annotations
    endpoint: Endpoint,
}

#[derive(Args)]
struct ValuesArgs {
    /// Field name, e.g. files.data_category
    field: String,
    #[arg(long)]
    project: Option<String>,
    /// Keep the endpoint prefix on the facet name
    #[arg(long)]
    no_strip: bool,
}

#[derive(Serialize)]
struct DownloadSummary {
    succeeded: Vec<String>,
    failed: Vec<String>,
    fileinfo_rows: usize,
    completed_at: String,
}

impl DownloadSummary {
    fn from_result(files: &DownloadedFiles) -> Self {
        Self {
            succeeded: files
                .report
                .succeeded
                .iter()
                .map(|path| path.to_string())
                .collect(),
            failed: files
                .report
                .failed
                .iter()
                .map(|path| path.to_string())
                .collect(),
            fileinfo_rows: files.fileinfo.len(),
            completed_at: files.report.completed_at.to_rfc3339(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = miette::Report::new(err);
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GdcError> {
    let settings = SettingsLoader::resolve(cli.config.as_deref())?;
    let http = GdcHttpClient::new()?;

    match cli.command {
        Commands::Manifest(args) => {
            let query = build_query(&args.query)?;
            let app = read_only_app(settings, http)?;
            if let Some(filename) = args.out {
                let path = app.save_manifest(&query, args.n, &filename)?;
                println!("{path}");
            } else {
                let manifest =
                    app.get_manifest(&query, args.n, args.size, args.pages, args.query.verify)?;
                println!("{manifest}");
            }
        }
        Commands::Download(args) => {
            let query = build_query(&args.query)?;
            let fetcher = GdcClientFetcher::from_settings(&settings)?;
            let app = App::new(settings, http, fetcher);
            let options = DownloadOptions {
                item_cap: args.n,
                only_updates: !args.all,
                verify: args.query.verify,
                size: args.size,
                pages: args.pages,
            };
            let files = app.download_files(&query, args.data_dir.as_deref(), &options)?;
            print_json(&DownloadSummary::from_result(&files))?;
        }
        Commands::Clinical(args) => {
            let fetcher = GdcClientFetcher::from_settings(&settings)?;
            let app = App::new(settings, http, fetcher);
            let options = DownloadOptions {
                item_cap: args.n,
                ..DownloadOptions::default()
            };
            let table = app.get_clinical_data(&args.project, args.data_dir.as_deref(), &options)?;
            print_json(&table)?;
        }
        Commands::Fields(args) => {
            let app = read_only_app(settings, http)?;
            let mut fields = app.validator().list_valid_fields(args.endpoint)?;
            fields.sort();
            print_json(&fields)?;
        }
        Commands::Values(args) => {
            let endpoint = Endpoint::from_field(&args.field)?;
            let app = read_only_app(settings, http)?;
            let values = app.validator().list_valid_values(
                &args.field,
                endpoint,
                args.project.as_deref(),
                !args.no_strip,
            )?;
            print_json(&values)?;
        }
    }
    Ok(())
}

fn build_query(args: &QueryArgs) -> Result<SearchQuery, GdcError> {
    let mut query = SearchQuery::new(args.project.as_deref(), args.category.as_deref());
    for pair in &args.fields {
        let (field, value) = pair
            .split_once('=')
            .ok_or_else(|| GdcError::ConflictingFilter(format!("expected FIELD=VALUE: {pair}")))?;
        query = query.with_extra(field, value);
    }
    Ok(query)
}

/// Commands that never shell out to gdc-client still need a fetcher to
/// satisfy the app's type; a present token must not be required for them.
fn read_only_app(
    settings: Settings,
    http: GdcHttpClient,
) -> Result<App<GdcHttpClient, NoFetcher>, GdcError> {
    Ok(App::new(settings, http, NoFetcher))
}

struct NoFetcher;

impl gdc_query::download::Fetcher for NoFetcher {
    fn download(
        &self,
        _manifest_path: &std::path::Path,
        _data_dir: &camino::Utf8Path,
    ) -> Result<(), GdcError> {
        Err(GdcError::Fetcher(
            "this command does not download files".to_string(),
        ))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), GdcError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| GdcError::ResultParse(err.to_string()))?;
    let mut stdout = io::stdout();
    stdout
        .write_all(json.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .map_err(|err| GdcError::Filesystem(err.to_string()))?;
    Ok(())
}
