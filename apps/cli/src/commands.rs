//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{BufReader, stdin, stdout};
use tracing::info;

use esbridge_core::{
    ProgressReporter, RowReader, RowWriter, RunSummary, run_correlate, run_search, run_update,
};
use esbridge_search::{ClientSettings, SearchClient};
use esbridge_shared::{
    EffectiveConfig, InvocationOptions, PersistedConfig, config_file_path, load_config_from,
    resolve_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// esbridge: correlate event rows with Elasticsearch documents.
#[derive(Parser)]
#[command(
    name = "esbridge",
    version,
    about = "Correlate newline-delimited JSON rows with Elasticsearch documents and update them in place.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Persisted endpoint config (defaults to ~/.esbridge/esbridge.json).
    #[arg(long, env = "ESBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich each input row with the documents matching its correlation fields.
    Correlate {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Comma-separated record fields to match documents on.
        #[arg(long)]
        correlate_fields: Option<String>,

        /// Fold all matches into one row with multivalue fields.
        #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
        return_mv: Option<bool>,
    },

    /// Apply each input row to its document as a partial update.
    Update {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[command(flatten)]
        routing: RoutingArgs,
    },

    /// Run the query once and emit one row per matching document.
    Search {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved configuration for the given options.
    Show {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[command(flatten)]
        search: SearchArgs,
    },
    /// Print the location of the persisted config file.
    Path,
}

/// Where to connect and what to read back.
#[derive(Args, Debug, Default)]
pub(crate) struct EndpointArgs {
    /// Endpoint list (`host:port,host:port`) or the name of a persisted endpoint.
    #[arg(long)]
    pub eaddr: Option<String>,

    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub use_ssl: Option<bool>,

    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub verify_certs: Option<bool>,

    /// Target index.
    #[arg(long)]
    pub index: Option<String>,

    /// Comma-separated document types.
    #[arg(long)]
    pub stype: Option<String>,

    /// Document field holding the event timestamp.
    #[arg(long)]
    pub tsfield: Option<String>,

    /// Comma-separated source fields to return.
    #[arg(long)]
    pub fields: Option<String>,

    /// Comma-separated source fields to leave out.
    #[arg(long)]
    pub exclude_fields: Option<String>,

    /// Add es_index, es_type, es_id and es_score to each row.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub include_es: Option<bool>,

    /// Add the JSON dump of the whole hit as _raw.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub include_raw: Option<bool>,

    /// Ignore document timestamps and stamp rows with the current time.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub no_timestamp: Option<bool>,

    /// Decode document timestamps into epoch seconds.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub convert_timestamp: Option<bool>,
}

/// Query, time window and paging.
#[derive(Args, Debug, Default)]
pub(crate) struct SearchArgs {
    /// Free-text query string.
    #[arg(long)]
    pub query: Option<String>,

    /// Maximum hits per search (page size when scanning).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Scroll through every match instead of a single bounded search.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub scan: Option<bool>,

    /// Look-back from `latest`, e.g. `now-4h` or a number of seconds.
    #[arg(long)]
    pub earliest: Option<String>,

    /// End of the window: epoch seconds, `now`, `now-N<unit>` or a local date.
    #[arg(long)]
    pub latest: Option<String>,

    /// Window start supplied by the calling pipeline, in epoch seconds.
    #[arg(long)]
    pub window_start: Option<i64>,

    /// Window end supplied by the calling pipeline, in epoch seconds.
    #[arg(long)]
    pub window_end: Option<i64>,
}

/// Update routing and visibility.
#[derive(Args, Debug, Default)]
pub(crate) struct RoutingArgs {
    /// Record field naming the target index.
    #[arg(long)]
    pub index_field: Option<String>,

    /// Record field naming the document type.
    #[arg(long)]
    pub stype_field: Option<String>,

    /// Record field naming the document id.
    #[arg(long)]
    pub id_field: Option<String>,

    /// Refresh the index after each update.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub force_refresh: Option<bool>,
}

impl EndpointArgs {
    fn apply(self, opts: &mut InvocationOptions) {
        opts.eaddr = self.eaddr;
        opts.use_ssl = self.use_ssl;
        opts.verify_certs = self.verify_certs;
        opts.index = self.index;
        opts.stype = self.stype;
        opts.tsfield = self.tsfield;
        opts.fields = self.fields;
        opts.exclude_fields = self.exclude_fields;
        opts.include_es = self.include_es;
        opts.include_raw = self.include_raw;
        opts.no_timestamp = self.no_timestamp;
        opts.convert_timestamp = self.convert_timestamp;
    }
}

impl SearchArgs {
    fn apply(self, opts: &mut InvocationOptions) {
        opts.query = self.query;
        opts.limit = self.limit;
        opts.scan = self.scan;
        opts.earliest = self.earliest;
        opts.latest = self.latest;
        opts.window_start = self.window_start;
        opts.window_end = self.window_end;
    }
}

impl RoutingArgs {
    fn apply(self, opts: &mut InvocationOptions) {
        opts.index_field = self.index_field;
        opts.stype_field = self.stype_field;
        opts.id_field = self.id_field;
        opts.force_refresh = self.force_refresh;
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries rows.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "esbridge=info",
        1 => "esbridge=debug",
        _ => "esbridge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    let mut opts = InvocationOptions::default();

    match cli.command {
        Command::Correlate {
            endpoint,
            search,
            correlate_fields,
            return_mv,
        } => {
            endpoint.apply(&mut opts);
            search.apply(&mut opts);
            opts.correlate_fields = correlate_fields;
            opts.return_mv = return_mv;
            cmd_correlate(config_path.as_deref(), &opts).await
        }
        Command::Update { endpoint, routing } => {
            endpoint.apply(&mut opts);
            routing.apply(&mut opts);
            cmd_update(config_path.as_deref(), &opts).await
        }
        Command::Search { endpoint, search } => {
            endpoint.apply(&mut opts);
            search.apply(&mut opts);
            cmd_search(config_path.as_deref(), &opts).await
        }
        Command::Config { action } => match action {
            ConfigAction::Show { endpoint, search } => {
                endpoint.apply(&mut opts);
                search.apply(&mut opts);
                cmd_config_show(config_path.as_deref(), &opts)
            }
            ConfigAction::Path => cmd_config_path(config_path.as_deref()),
        },
    }
}

/// Load the persisted store and merge the invocation options over it.
fn effective_config(config_path: Option<&Path>, opts: &InvocationOptions) -> Result<EffectiveConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let persisted: PersistedConfig = load_config_from(&path)
        .wrap_err_with(|| format!("loading {}", path.display()))?;
    Ok(resolve_config(opts, &persisted)?)
}

fn client_for(config: &EffectiveConfig) -> Result<SearchClient> {
    Ok(SearchClient::new(&ClientSettings::from(config))?)
}

async fn cmd_correlate(config_path: Option<&Path>, opts: &InvocationOptions) -> Result<()> {
    let config = effective_config(config_path, opts)?;
    let client = client_for(&config)?;

    info!(
        hosts = ?config.hosts,
        fields = ?config.correlate_fields,
        earliest = config.earliest,
        latest = config.latest,
        "correlating rows"
    );

    let mut reader = RowReader::new(BufReader::new(stdin()));
    let mut writer = RowWriter::new(stdout());
    let reporter = CliProgress::new()?;

    run_correlate(&client, &config, &mut reader, &mut writer, &reporter).await?;
    Ok(())
}

async fn cmd_update(config_path: Option<&Path>, opts: &InvocationOptions) -> Result<()> {
    let config = effective_config(config_path, opts)?;
    let client = client_for(&config)?;

    info!(
        hosts = ?config.hosts,
        index_field = %config.index_field,
        id_field = %config.id_field,
        "updating documents"
    );

    let mut reader = RowReader::new(BufReader::new(stdin()));
    let mut writer = RowWriter::new(stdout());
    let reporter = CliProgress::new()?;

    run_update(&client, &config, &mut reader, &mut writer, &reporter).await?;
    Ok(())
}

async fn cmd_search(config_path: Option<&Path>, opts: &InvocationOptions) -> Result<()> {
    let config = effective_config(config_path, opts)?;
    let client = client_for(&config)?;

    info!(hosts = ?config.hosts, query = %config.query, "searching");

    let mut writer = RowWriter::new(stdout());
    let reporter = CliProgress::new()?;

    run_search(&client, &config, &mut writer, &reporter).await?;
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>, opts: &InvocationOptions) -> Result<()> {
    let config = effective_config(config_path, opts)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_path(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn record_processed(&self, ordinal: usize, rows_out: usize) {
        self.spinner
            .set_message(format!("Record {ordinal}: {rows_out} row(s)"));
    }

    fn done(&self, summary: &RunSummary) {
        self.spinner.finish_and_clear();
        info!(
            records_in = summary.records_in,
            records_out = summary.records_out,
            "done in {:.1}s",
            summary.elapsed.as_secs_f64()
        );
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("esbridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn booleans_are_tri_state() {
        let cli = parse(&["correlate", "--scan", "false", "--include-es", "yes"]);
        let Command::Correlate {
            endpoint, search, ..
        } = cli.command
        else {
            panic!("expected correlate");
        };
        assert_eq!(search.scan, Some(false));
        assert_eq!(endpoint.include_es, Some(true));
        assert_eq!(endpoint.use_ssl, None);
    }

    #[test]
    fn correlate_options_reach_invocation() {
        let cli = parse(&[
            "correlate",
            "--eaddr",
            "es1:9200,es2:9200",
            "--correlate-fields",
            "user,host",
            "--return-mv",
            "true",
            "--earliest",
            "now-4h",
        ]);
        let mut opts = InvocationOptions::default();
        let Command::Correlate {
            endpoint,
            search,
            correlate_fields,
            return_mv,
        } = cli.command
        else {
            panic!("expected correlate");
        };
        endpoint.apply(&mut opts);
        search.apply(&mut opts);

        assert_eq!(opts.eaddr.as_deref(), Some("es1:9200,es2:9200"));
        assert_eq!(opts.earliest.as_deref(), Some("now-4h"));
        assert_eq!(correlate_fields.as_deref(), Some("user,host"));
        assert_eq!(return_mv, Some(true));
    }

    #[test]
    fn update_accepts_routing_fields() {
        let cli = parse(&["update", "--id-field", "doc_id", "--force-refresh", "1"]);
        let Command::Update { routing, .. } = cli.command else {
            panic!("expected update");
        };
        assert_eq!(routing.id_field.as_deref(), Some("doc_id"));
        assert_eq!(routing.force_refresh, Some(true));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = parse(&["config", "path", "--config", "/tmp/esbridge.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/esbridge.json")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn show_resolves_against_explicit_store() {
        let dir = std::env::temp_dir().join(format!("esbridge-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("esbridge.json");
        std::fs::write(&path, r#"{"prod": {"hosts": ["es-prod:9200"], "use_ssl": true}}"#).unwrap();

        let opts = InvocationOptions {
            eaddr: Some("prod".into()),
            ..Default::default()
        };
        let config = effective_config(Some(&path), &opts).unwrap();
        assert_eq!(config.hosts, vec!["es-prod:9200"]);
        assert!(config.use_ssl);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
