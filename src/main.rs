// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use zipstream::utils::logging::{format_error, format_info, format_step, format_success, format_warning};
use zipstream::utils::telemetry::{probe_archive_dir, probe_object_store};
use zipstream::{
    ArchiveStreamer, BatchPipeline, Config, FileCatalog, FileResult, HealthReport, JsonExporter,
    OperationTimer, ProgressTracker, SummaryExport, render_report, storage, write_report,
};

#[derive(Parser)]
#[command(name = "zipstream")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Stream XML members out of ZIP archives into object storage", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every archive in batches and write the summary report
    Run {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        #[arg(long, value_name = "NUM")]
        limit: Option<usize>,

        /// Object name prefix, overrides pipeline.object_prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Candidate CSV to process instead of scanning the archive directory
        #[arg(long, value_name = "CSV")]
        manifest: Option<PathBuf>,
    },

    /// Count payload members of one archive and show its metadata
    Inspect {
        archive: String,
    },

    /// Show statistics from the processing ledger
    Stats,

    /// Move the ledger aside under a timestamped name
    Backup {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Verify the archive directory and object store
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    colored::control::set_override(cli.color);

    let config = load_config(&cli)?;
    let _log_guard = zipstream::utils::logging::init_logger(&config.logging, cli.color, cli.verbose)
        .context("Failed to initialize logging")?;

    info!("zipstream {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            yes,
            limit,
            prefix,
            manifest,
        } => {
            cmd_run(&config, cli.color, yes, limit, prefix, manifest).await?;
        }
        Commands::Inspect { archive } => {
            cmd_inspect(&config, &archive)?;
        }
        Commands::Stats => {
            cmd_stats(&config)?;
        }
        Commands::Backup { dir } => {
            cmd_backup(&config, dir.as_deref())?;
        }
        Commands::Check => {
            cmd_check(&config).await?;
        }
    }

    Ok(())
}

/// `check` reports problems instead of refusing to start, so it skips
/// validation; every other command needs a valid configuration.
fn load_config(cli: &Cli) -> Result<Config> {
    let validate = !matches!(cli.command, Commands::Check);

    let config = if cli.config.exists() {
        Config::load_unchecked(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        eprintln!(
            "{}",
            format_warning(&format!(
                "Config file {} not found, using default configuration",
                cli.config.display()
            ))
        );
        let mut config = Config::default_config();
        config.expand_env();
        config
    };

    if validate {
        config.validate().context("Invalid configuration")?;
    }
    Ok(config)
}

fn catalog(config: &Config) -> FileCatalog {
    FileCatalog::new(&config.source.archive_dir, config.source.ledger_path())
        .with_recursive(config.source.recursive)
}

async fn cmd_run(
    config: &Config,
    colored: bool,
    yes: bool,
    limit: Option<usize>,
    prefix: Option<String>,
    manifest: Option<PathBuf>,
) -> Result<()> {
    let catalog = catalog(config);
    let prefix = prefix.unwrap_or_else(|| config.pipeline.object_prefix.clone());

    let mut archives = match manifest.as_deref().or(config.source.manifest.as_deref()) {
        Some(path) => catalog.load_candidates(Some(path)),
        None => catalog
            .list_archives()
            .context("Failed to list archives")?,
    };
    if let Some(limit) = limit {
        archives.truncate(limit);
    }

    let batch_size = config.pipeline.batch_size;
    let total_batches = archives.len().div_ceil(batch_size);
    println!(
        "{}",
        format_info(&format!(
            "{} archives from {} in {} batches of up to {} ({} workers)",
            archives.len(),
            config.source.archive_dir.display(),
            total_batches,
            batch_size,
            config.pipeline.max_workers
        ))
    );

    if !yes && !archives.is_empty() && !confirm("Start processing?")? {
        println!("{}", format_warning("Processing cancelled"));
        return Ok(());
    }

    let client = storage::connect(&config.storage)
        .await
        .context("Object store is not available")?;
    println!("{}", format_success(&format!("Connected to {}", client.destination())));

    let run_id = uuid::Uuid::new_v4().to_string();
    info!("Run {} started", run_id);

    let pipeline = BatchPipeline::new(
        ArchiveStreamer::new(&config.source.archive_dir, &config.pipeline.payload_extension),
        client,
        catalog,
        &config.pipeline,
    )
    .with_run_id(&run_id);

    let timer = OperationTimer::new("batch run");
    let tracker = ProgressTracker::with_color(archives.len(), colored);
    let advance = |_done: usize, _total: usize| tracker.advance();

    let mut results: Vec<FileResult> = Vec::with_capacity(archives.len());
    let mut ledger_failures = 0;

    for (index, chunk) in archives.chunks(batch_size).enumerate() {
        tracker.set_message(format!("batch {}/{}", index + 1, total_batches));
        let output = pipeline.process_batch(chunk, &prefix, Some(&advance)).await;
        tracker.record(&output.results);

        if let Some(e) = output.ledger_error {
            ledger_failures += 1;
            error!("Batch {} results were not recorded: {}", index + 1, e);
            eprintln!("{}", format_error(&e.to_string()));
        }
        results.extend(output.results);
    }

    tracker.finish();
    timer.finish_with_count(results.len());

    let summary = BatchPipeline::summarize(&results);
    let report_path = write_report(&summary, &config.report.path)
        .with_context(|| format!("Failed to write report {}", config.report.path.display()))?;
    info!("Final report saved to {}", report_path.display());
    println!("\n{}", render_report(&summary));

    if let Some(json_path) = &config.report.json_path {
        JsonExporter::new(json_path)
            .export(&SummaryExport::new(&run_id, summary.clone(), &results))
            .context("Failed to export JSON summary")?;
    }

    if summary.failed > 0 {
        println!(
            "{}",
            format_warning(&format!("{} archives failed, see the ledger for details", summary.failed))
        );
    }

    if ledger_failures > 0 {
        anyhow::bail!(
            "{} of {} batches could not be written to {}",
            ledger_failures,
            total_batches,
            config.source.ledger_path().display()
        );
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn cmd_inspect(config: &Config, archive: &str) -> Result<()> {
    let streamer = ArchiveStreamer::new(&config.source.archive_dir, &config.pipeline.payload_extension);

    let inspection = streamer.inspect(archive);
    if !inspection.success {
        println!(
            "{}",
            format_error(inspection.message.as_deref().unwrap_or("inspection failed"))
        );
        return Ok(());
    }
    println!(
        "{}",
        format_success(&format!(
            "{}: {} {} members",
            archive, inspection.payload_members, config.pipeline.payload_extension
        ))
    );

    let metadata = streamer
        .metadata(archive)
        .with_context(|| format!("Failed to read metadata of {}", archive))?;
    println!("  archive size: {} bytes", metadata.file_size);
    println!("  uncompressed payload: {} bytes", metadata.total_uncompressed_size);
    for (idx, member) in metadata.members.iter().enumerate() {
        println!(
            "{}",
            format_step(
                idx + 1,
                metadata.members.len(),
                &format!(
                    "{} ({} -> {} bytes, {:.1}% saved)",
                    member.name,
                    member.uncompressed_size,
                    member.compressed_size,
                    member.compression_ratio
                )
            )
        );
    }

    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let stats = catalog(config)
        .processing_stats()
        .context("Failed to read the ledger")?;

    if stats.total == 0 {
        println!("{}", format_info("No archives recorded yet"));
        return Ok(());
    }

    println!("Archives recorded: {}", stats.total);
    println!("  successful: {}", stats.successful);
    println!("  partial:    {}", stats.partial);
    println!("  failed:     {}", stats.failed);
    println!("XML files uploaded: {}", stats.total_xml);
    if let Some(last) = &stats.last_processed {
        println!("Last processed: {}", last);
    }

    Ok(())
}

fn cmd_backup(config: &Config, dir: Option<&Path>) -> Result<()> {
    match catalog(config)
        .backup_ledger(dir)
        .context("Ledger backup failed")?
    {
        Some(path) => println!("{}", format_success(&format!("Ledger moved to {}", path.display()))),
        None => println!("{}", format_info("No ledger to back up")),
    }
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let checks = vec![
        probe_archive_dir(&config.source.archive_dir, config.source.recursive),
        probe_object_store(&config.storage).await,
    ];
    let report = HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string());
    println!("{}", report.format());

    if !report.is_usable() {
        warn!("Health check failed");
        anyhow::bail!("zipstream is not ready to run");
    }
    Ok(())
}
