//! pagesift CLI
//!
//! `init` writes a config skeleton, `validate` checks a document, `run`
//! executes every task in a document and writes one JSON result per task,
//! `quick` crawls a single URL with defaults, `validate-urls` performs
//! syntactic checks only.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagesift::{quick_crawl, ConfigDocument, Spider};

#[derive(Parser)]
#[command(name = "pagesift", version, about = "Configuration-driven web content extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config skeleton to stdout or a file
    Init {
        /// Template kind: basic, full or llm
        #[arg(default_value = "basic")]
        template: String,

        /// Destination file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a config document
    Validate {
        config: PathBuf,
    },
    /// Execute every task in a config document
    Run {
        config: PathBuf,

        /// Result document destination; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cap on simultaneously in-flight crawls
        #[arg(long, default_value_t = 3)]
        max_concurrent: usize,
    },
    /// Crawl one URL with default configuration
    Quick {
        url: String,
    },
    /// Syntactic URL checks only, no network I/O
    ValidateUrls {
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { template, output } => {
            let skeleton = ConfigDocument::template(&template)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, skeleton)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    info!("wrote {} template to {}", template, path.display());
                }
                None => print!("{skeleton}"),
            }
        }

        Commands::Validate { config } => {
            ConfigDocument::load(&config)?;
            println!("{}: ok", config.display());
        }

        Commands::Run {
            config,
            output,
            max_concurrent,
        } => {
            let doc = ConfigDocument::load(&config)?;
            if doc.tasks.is_empty() {
                anyhow::bail!("config has no tasks");
            }
            let spider = Spider::from_document(&doc);

            let mut report = Vec::with_capacity(doc.tasks.len());

            // Tasks with per-task extraction overrides run individually;
            // uniform tasks fan out as one batch.
            if doc.tasks.iter().any(|t| t.options.is_some()) {
                for task in &doc.tasks {
                    let result = match &task.options {
                        Some(options) => spider.crawl_with_config(&task.url, options).await,
                        None => spider.crawl(&task.url).await,
                    };
                    report.push(task_entry(task.name.as_deref(), result));
                }
            } else {
                let urls: Vec<String> = doc.tasks.iter().map(|t| t.url.clone()).collect();
                let mut results = spider.crawl_batch(&urls, max_concurrent).await;
                for task in &doc.tasks {
                    if let Some(result) = results.remove(&task.url) {
                        report.push(task_entry(task.name.as_deref(), result));
                    }
                }
            }

            spider.shutdown().await;
            eprintln!("{}", spider.stats());

            let document = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    info!("wrote results to {}", path.display());
                }
                None => println!("{document}"),
            }
        }

        Commands::Quick { url } => {
            let result = quick_crawl(&url).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::ValidateUrls { urls } => {
            if urls.is_empty() {
                anyhow::bail!("no URLs given");
            }
            let mut failed = false;
            for raw in &urls {
                match url::Url::parse(raw) {
                    Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
                        println!("{raw}: ok");
                    }
                    Ok(parsed) => {
                        println!("{raw}: unsupported scheme '{}'", parsed.scheme());
                        failed = true;
                    }
                    Err(e) => {
                        println!("{raw}: {e}");
                        failed = true;
                    }
                }
            }
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn task_entry(name: Option<&str>, result: pagesift::CrawlResult) -> serde_json::Value {
    let mut entry = serde_json::to_value(&result).unwrap_or_default();
    if let (Some(name), Some(object)) = (name, entry.as_object_mut()) {
        object.insert("name".into(), serde_json::Value::String(name.to_string()));
    }
    entry
}
