use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use swapbench_core::input::{self, ImageInput};
use swapbench_core::{
    DetectionOrder, HttpClient, ModelType, Orchestrator, Provider, StaticCredentials,
};
use swapbench_report::{read_log, render_review};
use tracing_subscriber::EnvFilter;

mod config;
mod recorder;

use config::Config;
use recorder::Recorder;

#[derive(Parser)]
#[command(name = "swapbench", version, about = "Face-swap provider comparison harness")]
struct Cli {
    /// Configuration file (default: swapbench.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Swap one source face onto one target with each provider
    Single {
        /// Source image (the face to transfer)
        #[arg(long)]
        source: PathBuf,
        /// Target image (the image whose face is replaced)
        #[arg(long)]
        target: PathBuf,
        /// Card template id (required for thortful)
        #[arg(long)]
        template: Option<String>,
        /// Provider to test; repeat for several (default: from config)
        #[arg(long = "provider")]
        providers: Vec<Provider>,
        /// Face index to read from the source image
        #[arg(long)]
        source_face: Option<u32>,
        /// Face index to replace in the target image
        #[arg(long)]
        target_face: Option<u32>,
        /// Face restoration model (v2)
        #[arg(long)]
        restore: Option<String>,
        /// Face detection order (v4, v4.3)
        #[arg(long)]
        order: Option<DetectionOrder>,
        /// Speed/quality trade-off (v4, v4.3)
        #[arg(long)]
        model_type: Option<ModelType>,
    },
    /// Run every source x target combination from the configured directories
    Batch {
        /// Provider to test; repeat for several (default: from config)
        #[arg(long = "provider")]
        providers: Vec<Provider>,
    },
    /// Render an HTML review page from the test log
    Review {
        /// Output file (default: review.html in the results directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List providers and their endpoints
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Single {
            source,
            target,
            template,
            providers,
            source_face,
            target_face,
            restore,
            order,
            model_type,
        } => {
            if !providers.is_empty() {
                config.providers = providers;
            }
            let options = &mut config.options;
            if template.is_some() {
                options.template_id = template;
            }
            if let Some(index) = source_face {
                options.source_face_index = index;
            }
            if let Some(index) = target_face {
                options.target_face_index = index;
            }
            if restore.is_some() {
                options.restoration_model = restore;
            }
            if order.is_some() {
                options.detection_order = order;
            }
            if model_type.is_some() {
                options.model_type = model_type;
            }

            let source = ImageInput::load(&source)?;
            let target = ImageInput::load(&target)?;
            run(&config, &[source], &[target]).await?;
        }
        Commands::Batch { providers } => {
            if !providers.is_empty() {
                config.providers = providers;
            }
            let sources = input::load_dir(&config.source_dir)
                .with_context(|| format!("loading sources from {}", config.source_dir.display()))?;
            let targets = input::load_dir(&config.target_dir)
                .with_context(|| format!("loading targets from {}", config.target_dir.display()))?;
            if sources.is_empty() || targets.is_empty() {
                bail!(
                    "no images found ({} sources in {}, {} targets in {})",
                    sources.len(),
                    config.source_dir.display(),
                    targets.len(),
                    config.target_dir.display()
                );
            }
            run(&config, &sources, &targets).await?;
        }
        Commands::Review { output } => {
            let rows = read_log(&config.log_path)?;
            let output = output.unwrap_or_else(|| config.results_dir.join("review.html"));
            write_review(&output, &render_review(&rows))?;
            println!("Wrote review of {} rows to {}", rows.len(), output.display());
        }
        Commands::Providers => {
            let creds = config.credentials().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not load credentials");
                StaticCredentials::new()
            });
            for provider in Provider::ALL {
                println!(
                    "{:<10} {:<55} {}",
                    provider.as_str(),
                    config.endpoints.url_for(provider),
                    if creds.covers(provider) { "credentials: yes" } else { "credentials: no" }
                );
            }
        }
    }

    Ok(())
}

async fn run(config: &Config, sources: &[ImageInput], targets: &[ImageInput]) -> Result<()> {
    config.validate()?;

    let credentials = config.credentials()?;
    for provider in &config.providers {
        if !credentials.covers(*provider) {
            tracing::warn!(%provider, "no credentials configured; attempts will be logged as auth failures");
        }
    }

    let client = HttpClient::new(config.endpoints.clone(), config.retry_policy())?;
    let orchestrator =
        Orchestrator::new(client, Arc::new(credentials)).with_delay(config.request_delay);

    let run_id = uuid::Uuid::new_v4().to_string();
    let downloader = config.download_urls.then(|| orchestrator.swapper());
    let mut recorder = Recorder::open(&config.log_path, &config.results_dir, run_id, downloader)?;

    let total = sources.len() * targets.len() * config.providers.len();
    tracing::info!(
        run_id = recorder.run_id(),
        total,
        providers = ?config.providers,
        log = %config.log_path.display(),
        "starting run"
    );

    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_interrupt(Arc::clone(&stop)));

    let stream = orchestrator.run_batch(sources, targets, &config.providers, &config.options);
    // a lost log row ends the run
    let done = recorder.record_stream(stream, total, &stop).await?;
    if stop.load(Ordering::SeqCst) {
        tracing::warn!("interrupted; stopped after {done} of {total} combinations");
    }

    println!();
    print!("{}", recorder.summary());
    Ok(())
}

/// First Ctrl-C asks the run to stop once the in-flight request is
/// recorded; a second one exits immediately.
async fn watch_interrupt(stop: Arc<AtomicBool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("interrupt received; finishing the current request (Ctrl-C again to abort)");
    stop.store(true, Ordering::SeqCst);
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

fn write_review(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
