use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use report_pipeline::{DocumentPipeline, PipelineConfig, RunOptions, RunReport};

#[derive(Parser)]
#[command(name = "report-pipeline")]
#[command(about = "Incremental analysis of project report documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory scanned for report documents
    #[arg(long)]
    docs_dir: Option<PathBuf>,

    /// Directory holding records, caches and the run index
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Analysis provider: ollama, openai or anthropic
    #[arg(long)]
    provider: Option<String>,

    /// Reprocess every document regardless of index state
    #[arg(long)]
    force: bool,

    /// Process a single document (path or bare file name)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Worker count (0 = auto)
    #[arg(long)]
    workers: Option<usize>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    if cli.json {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    if let Some(dir) = cli.docs_dir {
        config.docs_dir = dir;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate().context("Invalid configuration")?;

    let options = RunOptions {
        force: cli.force,
        only_file: cli.file,
    };

    let pipeline = DocumentPipeline::new(config).context("Could not build the pipeline")?;
    let report = pipeline.run(&options).await.context("Run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.summary).context("Encode summary")?
        );
    } else {
        print_summary(pipeline.config(), &report);
    }
    Ok(())
}

fn print_summary(config: &PipelineConfig, report: &RunReport) {
    let summary = &report.summary;
    eprintln!();
    eprintln!("Run complete in {} ms", summary.elapsed_ms);
    eprintln!("  documents:    {}", summary.total);
    eprintln!("  processed:    {}", summary.success);
    eprintln!("  skipped:      {}", summary.skipped);
    eprintln!("  failed:       {}", summary.failed);
    eprintln!("  needs review: {}", summary.needs_review);
    if summary.needs_review > 0 {
        eprintln!("  review queue:");
        for record in &report.records {
            if record.needs_review() {
                eprintln!("    - {}", record.document.path.display());
            }
        }
    }
    eprintln!("  records:      {}", config.records_dir().display());
    eprintln!("  run index:    {}", config.run_index_path().display());
}
