//! `dcmcrawl`: audit XNAT DICOM archives for coil-element settings
//!
//! # Commands
//!
//! ```bash
//! # Crawl the XNAT archive tree (default root /data/xnat/archive)
//! dcmcrawl scan
//!
//! # Only files modified in the last week, plain CSV output
//! dcmcrawl scan /data/xnat/archive --modified-within-days 7 --no-gzip -o week.psv
//!
//! # Crawl TAR archives created in the last 6 months
//! dcmcrawl archives /archives --tmp-dir /scratch
//!
//! # Configuration
//! dcmcrawl config init
//! dcmcrawl config show
//! ```

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use config::{expand_home, Config, CrawlConfig, IdentityBackend, CONFIG_FILE, DEFAULT_CONFIG};
use dcmcrawl_archive::{today, ExtensionFilter, TimeWindow, TreeScanner};
use dcmcrawl_core::{
    select_archives, BatchWriter, CrawlSummary, Crawler, Credentials, CsvSink, IdentityResolver,
    NoIdentity, PostgresResolver, SinkOptions, XnatResolver, DEFAULT_BATCH_SIZE,
    DEFAULT_DELIMITER,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Default XNAT archive root
const DEFAULT_XNAT_ROOT: &str = "/data/xnat/archive";

/// Subtree of the archive root holding QA sessions, excluded by default
const QA_SUBTREE: &str = "qa";

/// Default output file, relative to the home directory
const DEFAULT_OUTPUT: &str = "crawl_results.psv.gz";

/// Default archive age window for `dcmcrawl archives`
const DEFAULT_MAX_AGE_MONTHS: u32 = 6;

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (default)
    Normal,
    /// Verbose output with extra details
    Verbose,
}

impl Verbosity {
    /// Create from CLI flags
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Check if output should be shown (not quiet)
    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Default log filter; `RUST_LOG` takes precedence
    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dcmcrawl",
    about = "Audit DICOM archives for coil-element settings",
    long_about = "Crawl DICOM files in an XNAT archive tree or in TAR archives and record\n\
                  the receive coil elements of every image in a delimited log.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl an XNAT archive directory tree
    #[command(long_about = "Crawl an XNAT archive directory tree.\n\
                      \n\
                      Project and session ids are read from the\n\
                      archive/<project>/arc001/<session>/SCANS layout and the subject\n\
                      label is looked up once per session.")]
    Scan {
        /// Archive root to crawl
        #[arg(value_name = "ROOT", default_value = DEFAULT_XNAT_ROOT)]
        root: PathBuf,

        /// Subtree to skip (repeatable; default: <ROOT>/qa)
        #[arg(long, value_name = "DIR")]
        exclude: Vec<PathBuf>,

        /// Only crawl files modified within the last N days
        #[arg(long, value_name = "DAYS")]
        modified_within_days: Option<u64>,

        /// Image file extensions (comma separated; default: dcm)
        #[arg(long, value_name = "EXT", value_delimiter = ',')]
        extensions: Option<Vec<String>>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Crawl TAR archives in a directory
    #[command(long_about = "Crawl the TAR archives (.tar, .tar.gz, .tgz, .tar.bz2) directly inside\n\
                      a directory.\n\
                      \n\
                      Only archives created within the age window are opened. Image\n\
                      entries (.dcm, .dc3, .dic, .ima) are extracted one at a time to a\n\
                      temporary directory, decoded, and removed.")]
    Archives {
        /// Directory holding the archives
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Only open archives created within the last N months
        #[arg(long, value_name = "MONTHS", default_value_t = DEFAULT_MAX_AGE_MONTHS)]
        max_age_months: u32,

        /// Directory for extracted entries (default: a fresh system temp dir)
        #[arg(long, value_name = "DIR")]
        tmp_dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage configuration settings
    #[command(long_about = "Manage dcmcrawl configuration files.\n\
                      \n\
                      Configuration files are loaded in this order (later overrides earlier):\n\
                        1. User config: ~/.dcmcrawl.toml\n\
                        2. Project config: ./.dcmcrawl.toml\n\
                        3. Command-line arguments")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Output and lookup options shared by the crawl commands
#[derive(ClapArgs, Debug)]
struct OutputArgs {
    /// Output file (default: ~/crawl_results.psv.gz)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output field delimiter (default: |)
    #[arg(long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Write plain text instead of gzip
    #[arg(long)]
    no_gzip: bool,

    /// Write a header row when the output file is new or empty
    #[arg(long)]
    header: bool,

    /// Rows buffered before each write (default: 10000)
    #[arg(long, value_name = "ROWS")]
    batch_size: Option<usize>,

    /// Subject lookup backend (default: postgres for scan, none for archives)
    #[arg(long, value_enum)]
    identity: Option<IdentityBackend>,

    /// Credentials file (default: ~/.dcmcrawl/credentials.toml)
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a new .dcmcrawl.toml configuration file
    Init {
        /// Create in user home directory (~/.dcmcrawl.toml) instead of current directory
        #[arg(long)]
        global: bool,

        /// Overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Display the current effective configuration
    Show,

    /// Show the path(s) to configuration file(s)
    Path {
        /// Show all config file paths (user and project)
        #[arg(long)]
        all: bool,
    },
}

/// Output settings after merging CLI arguments, config files, and defaults
#[derive(Debug)]
struct OutputSettings {
    path: PathBuf,
    options: SinkOptions,
    batch_size: usize,
    identity: IdentityBackend,
    credentials: Option<PathBuf>,
}

impl OutputSettings {
    fn resolve(args: OutputArgs, config: &CrawlConfig, default_identity: IdentityBackend) -> Result<Self> {
        let path = match args.output.or_else(|| config.output.clone()) {
            Some(path) => expand_home(&path),
            None => dirs::home_dir()
                .context("Could not determine home directory for the default output file")?
                .join(DEFAULT_OUTPUT),
        };

        let delimiter = match (args.delimiter, config.delimiter.as_deref()) {
            (Some(c), _) => parse_delimiter(&c.to_string())?,
            (None, Some(s)) => parse_delimiter(s)?,
            (None, None) => DEFAULT_DELIMITER,
        };

        let gzip = if args.no_gzip {
            false
        } else {
            config
                .gzip
                .unwrap_or_else(|| path.extension().is_some_and(|ext| ext == "gz"))
        };

        let batch_size = args
            .batch_size
            .or(config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        Ok(Self {
            path,
            options: SinkOptions {
                delimiter,
                gzip,
                header: args.header,
            },
            batch_size,
            identity: args.identity.or(config.identity).unwrap_or(default_identity),
            credentials: args.credentials.or_else(|| config.credentials.clone()),
        })
    }

    /// Open the output and the identity backend; both are fatal when unusable
    fn open(&self) -> Result<(Box<dyn IdentityResolver>, BatchWriter<CsvSink>)> {
        let sink = CsvSink::new(&self.path, self.options);
        sink.check_writable()
            .with_context(|| format!("Cannot write output file {}", self.path.display()))?;

        let resolver = build_resolver(self.identity, self.credentials.as_deref())?;
        Ok((resolver, BatchWriter::new(sink, self.batch_size)))
    }
}

fn parse_delimiter(value: &str) -> Result<u8> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() && *byte != b'\n' && *byte != b'"' => Ok(*byte),
        _ => bail!("Delimiter must be a single ASCII character other than newline or quote, got {value:?}"),
    }
}

fn build_resolver(
    backend: IdentityBackend,
    credentials: Option<&Path>,
) -> Result<Box<dyn IdentityResolver>> {
    if backend == IdentityBackend::None {
        return Ok(Box::new(NoIdentity));
    }

    let path = match credentials {
        Some(path) => expand_home(path),
        None => Credentials::default_path()?,
    };
    let credentials = Credentials::load(&path)?;

    Ok(match backend {
        IdentityBackend::Postgres => {
            let database = credentials.require_database()?;
            Box::new(PostgresResolver::connect(database).with_context(|| {
                format!(
                    "Failed to connect to the XNAT database at {}:{}",
                    database.host, database.port
                )
            })?)
        }
        IdentityBackend::Xnat => Box::new(XnatResolver::new(credentials.require_xnat()?)?),
        IdentityBackend::None => Box::new(NoIdentity),
    })
}

fn init_logging(verbosity: Verbosity) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .target(env_logger::Target::Stderr)
        .init();
}

fn progress_bar(len: usize, verbosity: Verbosity) -> ProgressBar {
    if verbosity.should_show_output() {
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("template is compile-time constant")
                .progress_chars("█▓▒░  "),
        );
        pb
    } else {
        ProgressBar::hidden()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    init_logging(verbosity);

    let (user_config, project_config) = Config::discover_configs();
    let config = Config::merge(user_config, project_config);

    match args.command {
        Commands::Scan {
            root,
            exclude,
            modified_within_days,
            extensions,
            output,
        } => {
            let crawl = config.crawl_or_default();
            let extensions = extensions.or_else(|| crawl.extensions.clone());
            let settings = OutputSettings::resolve(output, &crawl, IdentityBackend::Postgres)?;
            debug!("Effective settings: {settings:?}");
            scan_command(&root, exclude, modified_within_days, extensions, &settings, verbosity)
        }
        Commands::Archives {
            dir,
            max_age_months,
            tmp_dir,
            output,
        } => {
            let crawl = config.crawl_or_default();
            let settings = OutputSettings::resolve(output, &crawl, IdentityBackend::None)?;
            debug!("Effective settings: {settings:?}");
            archives_command(&dir, max_age_months, tmp_dir, &settings, verbosity)
        }
        Commands::Config { action } => config_command(action, &config, verbosity),
    }
}

fn scan_command(
    root: &Path,
    exclude: Vec<PathBuf>,
    modified_within_days: Option<u64>,
    extensions: Option<Vec<String>>,
    settings: &OutputSettings,
    verbosity: Verbosity,
) -> Result<()> {
    let filter = extensions.map_or_else(ExtensionFilter::default, ExtensionFilter::new);
    let excluded = if exclude.is_empty() {
        vec![root.join(QA_SUBTREE)]
    } else {
        exclude
    };

    let mut scanner = TreeScanner::new(filter);
    for dir in excluded {
        scanner = scanner.exclude(dir);
    }
    if let Some(days) = modified_within_days {
        scanner = scanner.modified_within(TimeWindow::last_days(today(), days));
    }

    let (resolver, writer) = settings.open()?;

    if verbosity.should_show_output() {
        eprintln!("{} {}", "Scanning:".cyan().bold(), root.display());
    }
    let files = scanner
        .scan(root)
        .with_context(|| format!("Failed to scan archive root {}", root.display()))?;
    if verbosity.should_show_output() {
        eprintln!("{} {} files found", "Found:".cyan().bold(), files.len());
    }

    let mut crawler = Crawler::new(resolver, writer);
    let progress = progress_bar(files.len(), verbosity);
    for file in &files {
        crawler.process_file(file)?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    let summary = crawler.finish()?;
    print_summary(&summary, &settings.path, verbosity);
    Ok(())
}

fn archives_command(
    dir: &Path,
    max_age_months: u32,
    tmp_dir: Option<PathBuf>,
    settings: &OutputSettings,
    verbosity: Verbosity,
) -> Result<()> {
    let window = TimeWindow::last_months(today(), max_age_months);
    let selection = select_archives(dir, window)
        .with_context(|| format!("Failed to list archives in {}", dir.display()))?;

    // Removed when the run ends
    let _scratch;
    let extract_to = match tmp_dir {
        Some(dir) => dir,
        None => {
            let scratch = tempfile::tempdir().context("Failed to create temporary directory")?;
            let path = scratch.path().to_path_buf();
            _scratch = scratch;
            path
        }
    };

    let (resolver, writer) = settings.open()?;
    let mut crawler = Crawler::new(resolver, writer).with_tmp_dir(&extract_to)?;

    if verbosity.should_show_output() {
        eprintln!(
            "{} {} archives created since {} ({} older skipped)",
            "Found:".cyan().bold(),
            selection.selected.len(),
            window.start,
            selection.skipped.len()
        );
    }

    let filter = ExtensionFilter::archive_default();
    let progress = progress_bar(selection.selected.len(), verbosity);
    for archive in &selection.selected {
        if let Some(name) = archive.file_name() {
            progress.set_message(name.to_string_lossy().into_owned());
        }
        crawler.process_archive(archive, &filter)?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    let summary = crawler.finish()?;
    print_summary(&summary, &settings.path, verbosity);
    Ok(())
}

fn print_summary(summary: &CrawlSummary, output: &Path, verbosity: Verbosity) {
    if !verbosity.should_show_output() {
        return;
    }

    eprintln!(
        "{} {} rows from {} images written to {}",
        "Done:".green().bold(),
        summary.rows,
        summary.images,
        output.display()
    );
    if summary.decode_failures > 0 {
        eprintln!(
            "{} {} images could not be decoded",
            "Warning:".yellow().bold(),
            summary.decode_failures
        );
    }
    if summary.unresolved > 0 {
        eprintln!(
            "{} {} volumes without a coil-element value",
            "Warning:".yellow().bold(),
            summary.unresolved
        );
    }
    if summary.archive_failures + summary.entry_failures > 0 {
        eprintln!(
            "{} {} archives and {} entries could not be read",
            "Warning:".yellow().bold(),
            summary.archive_failures,
            summary.entry_failures
        );
    }
    if summary.identity_failures > 0 {
        eprintln!(
            "{} {} of {} subject lookups failed",
            "Warning:".yellow().bold(),
            summary.identity_failures,
            summary.identity_lookups
        );
    }
}

fn config_command(action: ConfigAction, config: &Config, verbosity: Verbosity) -> Result<()> {
    match action {
        ConfigAction::Init { global, force } => config_init(global, force, verbosity),
        ConfigAction::Show => config_show(config),
        ConfigAction::Path { all } => {
            config_path(all);
            Ok(())
        }
    }
}

/// Create a new configuration file with commented-out defaults
fn config_init(global: bool, force: bool, verbosity: Verbosity) -> Result<()> {
    let config_path = if global {
        Config::user_config_path().context("Could not determine home directory")?
    } else {
        Config::project_config_path()
    };

    if config_path.exists() && !force {
        eprintln!(
            "{} Configuration file already exists: {}",
            "Error:".red().bold(),
            config_path.display()
        );
        eprintln!("{} Use --force to overwrite", "Hint:".cyan().bold());
        std::process::exit(1);
    }

    fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    if verbosity.should_show_output() {
        println!(
            "{} Created configuration file: {}",
            "Success:".green().bold(),
            config_path.display()
        );
    }

    Ok(())
}

/// Display the current effective configuration
fn config_show(config: &Config) -> Result<()> {
    let toml = toml::to_string_pretty(config)?;
    println!("{toml}");
    Ok(())
}

fn config_path(all: bool) {
    let home_config = Config::user_config_path();
    let project_config = Config::project_config_path();

    if all {
        println!("{}", "Configuration file paths:".bold());
        println!();

        for (label, path) in [("User:", home_config), ("Project:", Some(project_config))] {
            let Some(path) = path else { continue };
            let status = if path.exists() {
                "exists".green()
            } else {
                "not found".yellow()
            };
            println!("  {} {} ({})", label.bright_black(), path.display(), status);
        }
    } else if project_config.exists() {
        println!("{}", project_config.display());
    } else if let Some(home) = home_config.filter(|h| h.exists()) {
        println!("{}", home.display());
    } else {
        // where `config init` would create it
        println!("{CONFIG_FILE}");
    }
}
