use std::path::PathBuf;
use std::process::ExitCode;

use asset_bundler::{BundleOutcome, BundleProcessor, BundleSelection, ProcessRequest};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Merge, minify and version the JavaScript and CSS bundles of a web source tree.
#[derive(Debug, Parser)]
#[command(name = "asset-bundler", version, about)]
struct Args {
  /// Root of the web sources.
  #[arg(long = "src", value_name = "DIR", default_value = ".")]
  source_dir: PathBuf,

  /// Scratch directory. Defaults to the configured one.
  #[arg(long = "temp", value_name = "DIR")]
  temp_dir: Option<PathBuf>,

  /// Output directory. Defaults to the configured one.
  #[arg(long = "dest", value_name = "DIR")]
  dest_dir: Option<PathBuf>,

  /// Configuration file, instead of discovering asset-bundler.{json,yaml,yml} in the sources.
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Extra root searched for `jar:` resources. May be repeated.
  #[arg(long, value_name = "DIR")]
  classpath: Vec<PathBuf>,

  /// Write bundles under their logical names instead of hash prefixed paths.
  #[arg(long)]
  file_remapping: bool,

  /// Request gzip output. Compression is left to the server.
  #[arg(long)]
  gzip: bool,

  /// Keep each type's servlet mapping as the leading directory of its outputs.
  #[arg(long)]
  servlet_mapped: bool,

  /// Servlet API version of the target container.
  #[arg(long, value_name = "VERSION")]
  servlet_api_version: Option<String>,

  /// Only render bundles matching this name or id scope. May be repeated.
  #[arg(long = "bundle", value_name = "NAME")]
  include: Vec<String>,

  /// Skip bundles matching this name or id scope. May be repeated.
  #[arg(long, value_name = "NAME")]
  exclude: Vec<String>,

  /// Render every bundle, even when its sources did not change.
  #[arg(long)]
  force: bool,

  /// Log debug output unless RUST_LOG says otherwise.
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
  let args = Args::parse();
  let default_level = if args.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let request = ProcessRequest {
    source_dir: args.source_dir,
    temp_dir: args.temp_dir,
    dest_dir: args.dest_dir,
    config_path: args.config,
    classpath: args.classpath,
    use_file_remapping: args.file_remapping,
    gzip: args.gzip,
    servlet_mapped: args.servlet_mapped,
    servlet_api_version: args.servlet_api_version,
    selection: BundleSelection::new(args.include, args.exclude),
    force: args.force,
  };

  let report = BundleProcessor::new().process(&request)?;
  for bundle in &report.bundles {
    match bundle.outcome {
      BundleOutcome::Written => println!("written    {} -> {}", bundle.id, bundle.outputs.join(", ")),
      BundleOutcome::Unchanged => println!("unchanged  {}", bundle.id),
      BundleOutcome::Excluded => println!("excluded   {}", bundle.id),
      BundleOutcome::Failed => eprintln!(
        "failed     {}: {}",
        bundle.id,
        bundle.error.as_deref().unwrap_or("unknown error")
      ),
    }
  }

  if report.has_failures() {
    tracing::error!("{} bundle(s) failed", report.count(BundleOutcome::Failed));
    return Ok(ExitCode::FAILURE);
  }
  Ok(ExitCode::SUCCESS)
}
