//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use manifestgen_core::{ProgressReporter, generate_with_progress, resolve_version};
use manifestgen_release::ReleaseClient;
use manifestgen_shared::{AppConfig, Manifest, Options, SourceLocator, init_config, load_config};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// manifestgen: render install manifests from a release or a local overlay.
#[derive(Parser)]
#[command(
    name = "manifestgen",
    version,
    about = "Render install manifests from a published release or a local kustomization.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Manifest output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Yaml,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate the install manifest.
    Install(InstallArgs),

    /// Query published releases.
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `install`; unset flags fall back to the config file.
#[derive(clap::Args)]
pub(crate) struct InstallArgs {
    /// Release root URL (https://...) or local kustomization directory.
    #[arg(long)]
    pub source: Option<String>,

    /// Release version, or `latest`.
    #[arg(long)]
    pub version: Option<String>,

    /// Namespace to install into.
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Logical path prefix of the manifest.
    #[arg(long)]
    pub target_path: Option<String>,

    /// Output file name.
    #[arg(long)]
    pub manifest_file: Option<String>,

    /// Download timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Components to install (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub components: Option<Vec<String>>,

    /// Additional components (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub components_extra: Option<Vec<String>>,

    /// Container registry for component images.
    #[arg(long)]
    pub registry: Option<String>,

    /// Prefix added to every resource name.
    #[arg(long)]
    pub name_prefix: Option<String>,

    /// Leave out network policies.
    #[arg(long)]
    pub no_network_policy: bool,

    /// Directory already holding the release content (skips the download).
    #[arg(long)]
    pub manifests_base: Option<PathBuf>,

    /// Write the manifest to this file instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: OutputFormat,
}

/// Release subcommands.
#[derive(Subcommand)]
pub(crate) enum VersionAction {
    /// Print the latest published release.
    Latest,
    /// Check that a release exists.
    Check {
        /// Version with or without the `v` prefix.
        version: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout
/// carries only the manifest.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "manifestgen=info",
        1 => "manifestgen=debug",
        _ => "manifestgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Install(args) => cmd_install(args).await,
        Command::Version { action } => match action {
            VersionAction::Latest => cmd_version_latest().await,
            VersionAction::Check { version } => cmd_version_check(&version).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_install(args: InstallArgs) -> Result<()> {
    let config = load_config()?;
    let mut options = install_options(&config, &args)?;

    // Pin `latest` to a concrete tag and fail early on unknown versions.
    if let SourceLocator::RemoteRelease { version, .. } = &mut options.source {
        let client = ReleaseClient::new(&config.release.api_url)?;
        let resolved = resolve_version(&client, version).await?;
        *version = resolved;
    }

    info!(
        source = %options.source,
        namespace = %options.namespace,
        "generating install manifest"
    );

    let reporter = CliProgress::new();
    let manifest =
        generate_with_progress(&options, args.manifests_base.as_deref(), &reporter).await?;

    let rendered = match args.format {
        OutputFormat::Yaml => manifest.content.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(&manifest)?,
    };

    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
            }
            std::fs::write(path, rendered)
                .map_err(|e| eyre!("cannot write {}: {e}", path.display()))?;
            eprintln!("  Manifest written to {} ({})", path.display(), manifest.path);
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Merge config-file defaults with command-line flags.
fn install_options(config: &AppConfig, args: &InstallArgs) -> Result<Options> {
    let mut options = Options::try_from(config)?;

    if args.source.is_some() || args.version.is_some() {
        let source = args.source.as_deref().unwrap_or(&config.defaults.base_url);
        let version = args.version.as_deref().unwrap_or(&config.defaults.version);
        options.source = SourceLocator::parse(source, version)?;
    }
    if let Some(ns) = &args.namespace {
        options.namespace = ns.clone();
    }
    if let Some(path) = &args.target_path {
        options.target_path = path.clone();
    }
    if let Some(file) = &args.manifest_file {
        options.manifest_file = file.clone();
    }
    if let Some(secs) = args.timeout {
        options.timeout = Duration::from_secs(secs);
    }
    if let Some(components) = &args.components {
        options.components = components.clone();
    }
    if let Some(extra) = &args.components_extra {
        options.components_extra = extra.clone();
    }
    if let Some(registry) = &args.registry {
        options.registry = registry.clone();
    }
    if args.name_prefix.is_some() {
        options.name_prefix = args.name_prefix.clone();
    }
    if args.no_network_policy {
        options.network_policy = false;
    }

    options.validate()?;
    Ok(options)
}

async fn cmd_version_latest() -> Result<()> {
    let config = load_config()?;
    let client = ReleaseClient::new(&config.release.api_url)?;
    println!("{}", client.latest_version().await?);
    Ok(())
}

async fn cmd_version_check(version: &str) -> Result<()> {
    let config = load_config()?;
    let client = ReleaseClient::new(&config.release.api_url)?;
    if client.version_exists(version).await? {
        println!("{version}: available");
        Ok(())
    } else {
        Err(eyre!("{version}: no such release"))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner (drawn on stderr).
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _manifest: &Manifest) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
