use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use nsotree_core::output::{open_output, to_pretty_json, tree_to_json, write_contents, write_paths};
use nsotree_core::{
	reconstruct_with_progress, AdjacencyCollector, AdjacencyMap, CollectProgress, CollectStage, CollectStats,
	CollectorConfig, MaterializeStats, MaterializedTree, Reconstruction, S3Source, Settings, TreeMaterializer,
};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "nsotree", version, about = "nsotree - Rebuild NAS directory trees from bridge buckets")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Scan a bucket and write the reconstructed directory tree
	Build {
		#[command(flatten)]
		common: CommonArgs,
		#[command(flatten)]
		connection: ConnectionArgs,
		/// Output format
		#[arg(long, value_enum, default_value_t = OutputFormat::Json)]
		format: OutputFormat,
	},
	/// Scan a bucket and write the raw inode adjacency map
	Collect {
		#[command(flatten)]
		common: CommonArgs,
		#[command(flatten)]
		connection: ConnectionArgs,
	},
	/// Rebuild the directory tree from a saved adjacency map (no network access)
	Materialize {
		/// Adjacency map written by `collect`
		adjacency: PathBuf,
		#[command(flatten)]
		common: CommonArgs,
		/// Output format
		#[arg(long, value_enum, default_value_t = OutputFormat::Json)]
		format: OutputFormat,
	},
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
	/// Nested JSON object keyed by entry name
	Json,
	/// One `path<TAB>inode` line per leaf
	Paths,
}

/// Settings shared by every command
#[derive(Args, Debug, Default)]
struct CommonArgs {
	/// Config file (JSON). Defaults to ./nsotree.json when present
	#[arg(short = 'c', long = "config")]
	config: Option<PathBuf>,
	/// Set logging level to DEBUG
	#[arg(short = 'd', long = "debug")]
	debug: bool,
	/// Log file
	#[arg(long = "log")]
	log: Option<PathBuf>,
	/// Destination file for output, or `-` for stdout. Default is nso.json
	#[arg(short = 'O', long = "output")]
	output: Option<PathBuf>,
}

/// S3 endpoint and bucket settings
#[derive(Args, Debug, Default)]
struct ConnectionArgs {
	/// S3 Access Key ID
	#[arg(short = 'k', long = "access-id")]
	access_id: Option<String>,
	/// S3 Access Key Secret
	#[arg(short = 's', long = "access-secret")]
	access_secret: Option<String>,
	/// S3 endpoint. This value can be an FQDN or IP address
	#[arg(short = 'f', long = "host")]
	host: Option<String>,
	/// S3 endpoint port. The default for StorageGRID is 8082
	#[arg(short = 'p', long = "port")]
	port: Option<u16>,
	/// Whether the endpoint is TLS encrypted (true/false). Default is true
	#[arg(short = 'l', long = "secure", action = ArgAction::Set)]
	is_secure: Option<bool>,
	/// S3 region
	#[arg(long = "region")]
	region: Option<String>,
	/// Bucket containing NAS Bridge data
	#[arg(short = 'b', long = "bucket")]
	bucket: Option<String>,
	/// Fetch object metadata in parallel
	#[arg(long = "parallel")]
	parallel: bool,
}

impl CommonArgs {
	fn apply(&self, settings: &mut Settings) {
		if self.debug {
			settings.debug = true;
		}
		if let Some(log) = &self.log {
			settings.log = log.clone();
		}
		if let Some(output) = &self.output {
			settings.output_json = output.clone();
		}
	}
}

impl ConnectionArgs {
	fn apply(&self, settings: &mut Settings) {
		if let Some(access_id) = &self.access_id {
			settings.access_id = access_id.clone();
		}
		if let Some(access_secret) = &self.access_secret {
			settings.access_secret = access_secret.clone();
		}
		if let Some(host) = &self.host {
			settings.host = host.clone();
		}
		if let Some(port) = self.port {
			settings.port = port;
		}
		if let Some(is_secure) = self.is_secure {
			settings.is_secure = is_secure;
		}
		if let Some(region) = &self.region {
			settings.region = region.clone();
		}
		if let Some(bucket) = &self.bucket {
			settings.bucket = bucket.clone();
		}
		if self.parallel {
			settings.parallel = true;
		}
	}
}

/// Defaults, then the config file, then command-line overrides
fn resolve_settings(common: &CommonArgs, connection: Option<&ConnectionArgs>) -> Result<Settings> {
	let mut settings = Settings::discover(common.config.as_deref())?;
	if let Some(connection) = connection {
		connection.apply(&mut settings);
	}
	common.apply(&mut settings);
	Ok(settings)
}

fn init_logging(settings: &Settings) -> Result<()> {
	let level = if settings.debug { LevelFilter::DEBUG } else { LevelFilter::INFO };

	let log_file = OpenOptions::new()
		.create(true)
		.append(true)
		.open(&settings.log)
		.with_context(|| format!("Failed to open log file {}", settings.log.display()))?;

	tracing_subscriber::registry()
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.with(
			tracing_subscriber::fmt::layer()
				.with_ansi(false)
				.with_writer(Mutex::new(log_file)),
		)
		.with(level)
		.init();

	Ok(())
}

/// Progress bar on stderr, only when a terminal is attached
fn progress_bar() -> Option<ProgressBar> {
	if !atty::is(atty::Stream::Stderr) {
		return None;
	}

	let bar = ProgressBar::new(0);
	bar.set_style(
		ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} objects {msg}")
			.unwrap_or_else(|_| ProgressStyle::default_bar()),
	);
	Some(bar)
}

fn report_progress(bar: &Option<ProgressBar>, progress: CollectProgress) {
	let Some(bar) = bar else {
		return;
	};

	match progress.stage {
		CollectStage::Listing => bar.set_message("listing bucket"),
		CollectStage::Inspecting => {
			bar.set_message("");
			bar.set_length(progress.total as u64);
			bar.set_position(progress.inspected as u64);
		}
		CollectStage::Complete => bar.finish_and_clear(),
	}
}

fn render_tree(tree: &MaterializedTree, format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => tree_to_json(tree),
		OutputFormat::Paths => {
			let mut buf = Vec::new();
			write_paths(tree, &mut buf)?;
			Ok(String::from_utf8(buf)?)
		}
	}
}

fn build_summary(result: &Reconstruction) -> Vec<String> {
	let mut lines = vec![
		"✅ Reconstruction complete".to_string(),
		format!("📦 Objects scanned: {}", result.collect_stats.objects_listed),
		format!("🔗 Entries recorded: {}", result.collect_stats.entries_recorded),
	];
	if result.collect_stats.entries_replaced > 0 {
		lines.push(format!("♻️  Entries replaced: {}", result.collect_stats.entries_replaced));
	}
	lines.extend(tree_summary(&result.materialize_stats));
	lines
}

fn collect_summary(stats: &CollectStats) -> Vec<String> {
	vec![
		"✅ Collection complete".to_string(),
		format!("📦 Objects scanned: {}", stats.objects_listed),
		format!("🔗 Entries recorded: {}", stats.entries_recorded),
		format!("🧱 Inode/superblock objects skipped: {}", stats.skipped_structural),
		format!("❔ Unmapped objects skipped: {}", stats.skipped_unmapped),
	]
}

fn tree_summary(stats: &MaterializeStats) -> Vec<String> {
	let mut lines = vec![
		format!("📁 Directories expanded: {}", stats.expanded),
		format!("🔁 Repeated references: {}", stats.repeated),
		format!("❔ Unresolved references: {}", stats.dangling),
	];
	if !stats.unreachable.is_empty() {
		lines.push(format!("⚠️  Unreachable inodes dropped: {}", stats.unreachable.len()));
	}
	lines
}

/// Status lines go to `status`, the result alone goes to `output`
fn emit<O: Write, E: Write>(summary: &[String], contents: &str, output: O, mut status: E) -> Result<()> {
	for line in summary {
		writeln!(status, "{}", line)?;
	}
	write_contents(output, contents)
}

fn connect(settings: &Settings) -> Result<S3Source> {
	settings.validate()?;
	tracing::debug!(
		"Endpoint {} (bucket {}, region {})",
		settings.s3_config().endpoint(),
		settings.bucket,
		settings.region
	);
	Ok(S3Source::connect(&settings.s3_config())?)
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let settings = match &cli.command {
		Commands::Build { common, connection, .. } | Commands::Collect { common, connection } => {
			resolve_settings(common, Some(connection))?
		}
		Commands::Materialize { common, .. } => resolve_settings(common, None)?,
	};

	init_logging(&settings)?;
	tracing::info!("Starting.");

	let collector_config = CollectorConfig { parallel: settings.parallel };

	match cli.command {
		Commands::Build { format, .. } => {
			let source = connect(&settings)?;
			let bar = progress_bar();
			let result = reconstruct_with_progress(&source, collector_config, |p| report_progress(&bar, p))?;

			let contents = render_tree(&result.tree, format)?;
			tracing::info!("Writing JSON object: {}", settings.output_json.display());
			emit(&build_summary(&result), &contents, open_output(&settings.output_json)?, std::io::stderr())?;
		}
		Commands::Collect { .. } => {
			let source = connect(&settings)?;
			let bar = progress_bar();
			let mut collector = AdjacencyCollector::with_config(&source, collector_config);
			collector.set_progress_callback(|p| report_progress(&bar, p));
			let collection = collector.collect()?;

			let contents = to_pretty_json(&collection.adjacency)?;
			tracing::info!("Writing adjacency map: {}", settings.output_json.display());
			emit(&collect_summary(&collection.stats), &contents, open_output(&settings.output_json)?, std::io::stderr())?;
		}
		Commands::Materialize { adjacency, format, .. } => {
			let raw = std::fs::read_to_string(&adjacency)
				.with_context(|| format!("Failed to read adjacency map {}", adjacency.display()))?;
			let map: AdjacencyMap = serde_json::from_str(&raw)
				.with_context(|| format!("Failed to parse adjacency map {}", adjacency.display()))?;

			let materialized = TreeMaterializer::new(&map).materialize();
			let contents = render_tree(&materialized.tree, format)?;
			tracing::info!("Writing JSON object: {}", settings.output_json.display());
			emit(&tree_summary(&materialized.stats), &contents, open_output(&settings.output_json)?, std::io::stderr())?;
		}
	}

	tracing::info!("Operation complete.");
	Ok(())
}
