use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediagrab::cli::{bind_address, Cli, Commands};
use mediagrab::utils::{self, download_filename, move_artifact, remove_job_dir};
use mediagrab::{
    server, Config, JobRunner, MediaExtractor, MemoryTaskStore, TaskStatus, TaskStore,
    YtDlpExtractor,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { bind, port } => {
            let extractor = YtDlpExtractor::from_config(&config.download);

            // Check for required external tools (non-fatal)
            let missing_deps = utils::check_dependencies(&extractor).await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - downloads will fail until they are installed)");
            }

            tracing::info!("Using {} extractor", extractor.name());

            let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
            let runner = Arc::new(JobRunner::from_config(&config, store));

            if let Some(ttl) = config.tasks.ttl() {
                tracing::info!("Expiring finished tasks after {}s", ttl.as_secs());
                runner.spawn_sweeper(ttl, config.tasks.sweep_interval());
            }

            let address = bind_address(bind, port, config.server.bind_address);
            server::serve(runner, address).await?;
        }
        Commands::Fetch { url, mode, output } => {
            fetch(&config, &url, &mode, &output, cli.quiet).await?;
        }
        Commands::Check => {
            let extractor = YtDlpExtractor::from_config(&config.download);
            let missing = utils::check_dependencies(&extractor).await;
            if missing.is_empty() {
                println!("All dependencies available");
            } else {
                println!("Missing dependencies:");
                for dep in &missing {
                    println!("  • {}", dep);
                }
                anyhow::bail!("{} dependency check(s) failed", missing.len());
            }
        }
        Commands::Config { show } => {
            let path = Config::resolve_path(cli.config.as_deref())?;
            println!("Configuration file: {}", path.display());
            if show {
                config.display();
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "mediagrab=debug,tower_http=debug"
    } else {
        "mediagrab=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Run one job in-process and move its artifact into `output`
async fn fetch(config: &Config, url: &str, mode: &str, output: &Path, quiet: bool) -> Result<()> {
    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let runner = JobRunner::from_config(config, store.clone());
    let id = runner.submit(url, mode);

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?,
    );
    progress.set_message("Starting...");

    let task = loop {
        let task = store.get(&id).context("Task disappeared while running")?;
        progress.set_position(u64::from(task.percent));
        match task.status {
            TaskStatus::Starting => {}
            TaskStatus::Downloading => progress.set_message("Downloading"),
            TaskStatus::Processing => progress.set_message("Processing"),
            TaskStatus::Done | TaskStatus::Error => break task,
        }
        progress.tick();
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    store.delete(&id);

    if task.status == TaskStatus::Error {
        progress.abandon_with_message("Failed");
        anyhow::bail!("{}", task.error.unwrap_or_default());
    }

    let artifact = task
        .artifact_path
        .context("Finished task has no output file")?;
    let filename = download_filename(task.display_title.as_deref(), &artifact);
    let saved = move_artifact(&artifact, output, &filename)?;

    if let Some(job_dir) = &task.job_dir {
        remove_job_dir(job_dir).await;
    }

    progress.finish_with_message("Download complete");
    println!("Saved to: {}", saved.display());

    Ok(())
}
