//! # eo3 CLI Entry Point
//!
//! Validates eo3 dataset documents and generates product definitions.

use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use eodatasets::eo3::allowance::ExtraMeasurements;
use eodatasets::eo3::generate::generate_product_from_dataset;
use eodatasets::eo3::raster::{RasterReader, TiffRasterReader};
use eodatasets::eo3::{DocumentReport, Issue, Level, RunReport, ValidateConfig, validate_paths};

/// Validate and generate Open Data Cube eo3 metadata documents.
#[derive(Parser, Debug)]
#[command(name = "eo3", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Validate datasets, products and metadata types.
    Validate(ValidateArgs),
    /// Write a product definition matching a dataset.
    ProductFromDataset(ProductArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Plain,
    Quiet,
    Github,
}

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
struct ValidateArgs {
    /// Documents, or directories to search for them. Definitions must come
    /// before the datasets that use them.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Also open the files each dataset references.
    #[arg(long)]
    thorough: bool,

    /// Fail on warnings too.
    #[arg(short = 'W', long)]
    warnings_as_errors: bool,

    /// Accept any measurement not listed in the product.
    #[arg(long)]
    expect_extra_measurements: bool,

    /// Accept this measurement when not listed in the product. Repeatable.
    #[arg(long = "allow-extra-measurement", value_name = "NAME")]
    allow_extra_measurements: Vec<String>,

    /// Seconds to wait for each raster read in thorough mode.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    read_timeout: u64,

    #[arg(short = 'f', long, value_enum)]
    output_format: Option<OutputFormat>,

    /// Only print problems.
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, env = "GITHUB_ACTIONS", hide = true)]
    github_actions: Option<String>,
}

impl ValidateArgs {
    fn format(&self) -> OutputFormat {
        if let Some(format) = self.output_format {
            return format;
        }
        if self.quiet {
            return OutputFormat::Quiet;
        }
        match self.github_actions.as_deref() {
            Some("true") => OutputFormat::Github,
            _ => OutputFormat::Plain,
        }
    }

    fn config(&self) -> anyhow::Result<ValidateConfig> {
        let extra_measurements = if self.expect_extra_measurements {
            ExtraMeasurements::All
        } else {
            ExtraMeasurements::named(self.allow_extra_measurements.iter().cloned())
        };
        let threshold = if self.warnings_as_errors {
            Level::Warning
        } else {
            Level::Error
        };
        Ok(ValidateConfig::builder()
            .thorough(self.thorough)
            .threshold(threshold)
            .extra_measurements(extra_measurements)
            .read_timeout(Duration::from_secs(self.read_timeout))
            .build()?)
    }
}

/// Arguments for the product-from-dataset subcommand.
#[derive(Args, Debug)]
struct ProductArgs {
    /// A dataset document.
    dataset: PathBuf,

    /// Metadata type for the product.
    #[arg(long, default_value = "eo3")]
    metadata_type: String,

    /// Read each measurement's file for its dtype and nodata.
    #[arg(long)]
    read_rasters: bool,

    /// Where to write the product. Printed when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn github_escape(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn issue_line(issue: &Issue) -> String {
    let mut line = format!("{} {} {}", issue.level.initial(), issue.code, issue.message);
    if let Some(hint) = &issue.hint {
        line.push_str(&format!(" (Hint: {hint})"));
    }
    line
}

fn render_document(document: &DocumentReport, threshold: Level, format: OutputFormat) {
    let passed = document.passes(threshold);
    match format {
        OutputFormat::Plain => {
            let mark = if passed { "pass" } else { "FAIL" };
            println!("{mark} {}", document.document);
            for issue in &document.issues {
                println!("    {}", issue_line(issue));
            }
        }
        OutputFormat::Quiet => {
            let problems: Vec<_> = document
                .issues
                .iter()
                .filter(|i| i.level >= Level::Warning)
                .collect();
            if problems.is_empty() {
                return;
            }
            println!("{}", document.document);
            for issue in problems {
                println!("    {}", issue_line(issue));
            }
        }
        OutputFormat::Github => {
            for issue in &document.issues {
                let command = match issue.level {
                    Level::Error => "error",
                    Level::Warning => "warning",
                    Level::Info => "notice",
                };
                let mut message = format!("{}: {}", issue.code, issue.message);
                if let Some(hint) = &issue.hint {
                    message.push_str(&format!("\nHint: {hint}"));
                }
                println!(
                    "::{command} file={},line=1::{}",
                    github_escape(&document.document),
                    github_escape(&message)
                );
            }
        }
    }
}

fn summarise(report: &RunReport) {
    eprintln!(
        "{} document(s), {} failed: {} error(s), {} warning(s), {} info",
        report.documents.len(),
        report.failed_count(),
        report.count(Level::Error),
        report.count(Level::Warning),
        report.count(Level::Info),
    );
}

fn validate(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let config = args.config()?;
    let threshold = config.threshold;
    let report = validate_paths(args.paths.as_slice(), config).context("could not read documents")?;

    let format = args.format();
    for document in &report.documents {
        render_document(document, threshold, format);
    }
    summarise(&report);

    let failed = u8::try_from(report.failed_count()).unwrap_or(u8::MAX);
    Ok(ExitCode::from(failed))
}

fn product_from_dataset(args: ProductArgs) -> anyhow::Result<ExitCode> {
    let reader = TiffRasterReader;
    let reader = args.read_rasters.then_some(&reader as &dyn RasterReader);
    let product = generate_product_from_dataset(
        &args.dataset,
        &args.metadata_type,
        reader,
        args.output.as_deref(),
    )
    .with_context(|| format!("could not generate a product from {}", args.dataset.display()))?;

    match &args.output {
        Some(output) => tracing::info!(product = product.name.as_str(), output = %output.display(), "wrote product"),
        None => print!("{}", serde_yaml::to_string(&product)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => validate(args),
        Commands::ProductFromDataset(args) => product_from_dataset(args),
    }
}
