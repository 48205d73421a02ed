// src/bin/cli.rs

//! coordex CLI
//!
//! Local entry point: download scholarly full text, extract coordinate
//! tables, and write the aggregated studyset to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use coordex::{
    error::{AppError, Result},
    extract,
    models::{ArticleContent, Config, ContentFormat, StudyMetadata},
    pipeline::{Pipeline, PipelineReport},
    services::{
        ApiFullTextSource, DownloadOptions, DownloadOrchestrator, FetchClient,
        download::{extract_doi, extract_pii},
    },
    storage::{CachePolicy, ContentCache, FileCache},
    utils::sanitize_slug,
};

/// coordex - coordinate table extraction from scholarly articles
#[derive(Parser, Debug)]
#[command(
    name = "coordex",
    version,
    about = "Download full-text articles and extract coordinate tables"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "coordex.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download articles and extract coordinates in one pass
    Run {
        /// JSON file with an array of study records
        input: PathBuf,

        /// Directory for studyset.json and failures.json
        #[arg(short, long, default_value = "out")]
        output: PathBuf,

        /// Disable the cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Refetch everything, writing fresh cache entries
        #[arg(long)]
        refresh: bool,

        /// Abort the batch on the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Fetch article payloads into the cache without extracting
    Download {
        /// JSON file with an array of study records
        input: PathBuf,

        /// Also write each payload to this directory as a markup file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Refetch everything, writing fresh cache entries
        #[arg(long)]
        refresh: bool,

        /// Abort the batch on the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Extract coordinate tables from markup files already on disk
    Extract {
        /// XML or HTML article files
        files: Vec<PathBuf>,

        /// Directory for analyses.json
        #[arg(short, long, default_value = "out")]
        output: PathBuf,

        /// Include the document title, abstract and body text per file
        #[arg(long)]
        with_text: bool,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Run {
            input,
            output,
            no_cache,
            refresh,
            fail_fast,
        } => {
            config.validate()?;
            config.validate_credentials()?;

            let studies = load_studies(&input)?;
            log::info!("Loaded {} study records from {}", studies.len(), input.display());

            let orchestrator = build_orchestrator(&config, no_cache, refresh, fail_fast)?;
            let pipeline = Pipeline::new(
                orchestrator,
                config.extraction.effective_workers(),
                fail_fast,
            );

            let report = pipeline.run(&studies).await?;
            write_report(&output, &report)?;

            log::info!(
                "Done: {} studies, {} analyses, {} points ({} failures)",
                report.stats.studies,
                report.stats.analyses,
                report.stats.points,
                report.failures.len()
            );
        }

        Command::Download {
            input,
            output,
            refresh,
            fail_fast,
        } => {
            config.validate()?;
            config.validate_credentials()?;

            let studies = load_studies(&input)?;
            let orchestrator = build_orchestrator(&config, false, refresh, fail_fast)?;
            let report = orchestrator.download_all(&studies).await?;

            if let Some(dir) = &output {
                fs::create_dir_all(dir)?;
                for article in &report.articles {
                    let name = format!(
                        "{}.{}",
                        sanitize_slug(article.identifier()),
                        article.format.extension()
                    );
                    log::debug!("{name}: {} bytes", article.size());
                    fs::write(dir.join(name), &article.payload)?;
                }
                log::info!("Wrote {} payload files to {}", report.articles.len(), dir.display());
            }

            for failure in &report.failures {
                log::warn!(
                    "{}: {} ({})",
                    failure.study.identifier().unwrap_or("<unknown>"),
                    failure.error,
                    failure.kind
                );
            }
            log::info!(
                "Downloaded {} of {} articles into {}",
                report.articles.len(),
                studies.len(),
                config.download.cache_dir
            );
        }

        Command::Extract {
            files,
            output,
            with_text,
        } => {
            if files.is_empty() {
                return Err(AppError::input("no input files given"));
            }

            let mut results = Vec::new();
            for path in &files {
                let article = article_from_file(path)?;
                let analyses = extract::extract(&article)?;
                log::info!(
                    "{}: {} analyses, {} points",
                    path.display(),
                    analyses.len(),
                    analyses.iter().map(|a| a.points.len()).sum::<usize>()
                );
                let mut record = serde_json::json!({
                    "file": path.display().to_string(),
                    "study": article.study,
                    "analyses": analyses,
                });
                if with_text {
                    let text = extract::extract_text(&article)?;
                    record["text"] = serde_json::to_value(&text)?;
                }
                results.push(record);
            }

            fs::create_dir_all(&output)?;
            let path = output.join("analyses.json");
            fs::write(&path, serde_json::to_string_pretty(&results)?)?;
            log::info!("Wrote {}", path.display());
        }

        Command::Validate => {
            config.validate()?;
            if let Err(e) = config.validate_credentials() {
                log::warn!("{e}");
            }
            log::info!("Configuration OK ({})", cli.config.display());
        }
    }

    Ok(())
}

fn load_studies(path: &Path) -> Result<Vec<StudyMetadata>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn build_orchestrator(
    config: &Config,
    no_cache: bool,
    refresh: bool,
    fail_fast: bool,
) -> Result<DownloadOrchestrator> {
    let client = FetchClient::new(config)?;
    let source = Arc::new(ApiFullTextSource::new(client));

    let mut options = DownloadOptions::from_config(config);
    options.fail_fast = fail_fast;
    if no_cache {
        options.cache = CachePolicy::Off;
    } else if refresh {
        options.cache = CachePolicy::Bypass;
    }

    let cache: Option<Arc<dyn ContentCache>> = match options.cache {
        CachePolicy::Off => None,
        _ => Some(Arc::new(FileCache::new(&config.download.cache_dir))),
    };

    Ok(DownloadOrchestrator::new(source, cache, options))
}

fn write_report(output: &Path, report: &PipelineReport) -> Result<()> {
    fs::create_dir_all(output)?;

    let studyset_path = output.join("studyset.json");
    fs::write(
        &studyset_path,
        serde_json::to_string_pretty(&report.studyset)?,
    )?;
    log::info!("Wrote {}", studyset_path.display());

    let failures_path = output.join("failures.json");
    let failures = serde_json::json!({
        "stats": report.stats,
        "failures": report.failures,
    });
    fs::write(&failures_path, serde_json::to_string_pretty(&failures)?)?;
    log::info!("Wrote {}", failures_path.display());

    Ok(())
}

/// Wrap a markup file on disk as a downloaded article, recovering the
/// study identifiers from the payload itself where possible.
fn article_from_file(path: &Path) -> Result<ArticleContent> {
    let payload = fs::read(path)?;
    let format = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("xml") => ContentFormat::Xml,
        Some("html") | Some("htm") => ContentFormat::Html,
        _ => ContentFormat::Plain,
    };

    let study = StudyMetadata {
        doi: extract_doi(&payload),
        pii: extract_pii(&payload),
        ..StudyMetadata::default()
    };

    Ok(ArticleContent {
        study,
        payload,
        content_type: format.accept_header().to_string(),
        format,
        retrieved_at: chrono::Utc::now(),
        from_cache: false,
        metadata: Default::default(),
    })
}
