//! Command-line host for the Mekarindah service worker.
//!
//! Wires the worker to a real HTTP fetcher and an in-memory cache store so
//! a deployment can be smoke-tested without a browser. The store lives only
//! for one invocation; every command installs first unless told not to.
//!
//! ## Usage
//!
//! ```bash
//! # Pre-cache the static assets of a local deployment
//! sw-harness --origin http://localhost:8080/ install
//!
//! # Fetch a page through the worker
//! sw-harness fetch http://localhost:8080/index.html --navigate
//!
//! # Render a push payload into a notification
//! sw-harness push '{"title":"Kajian","body":"Ba'\''da Maghrib"}'
//! ```

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use mekarindah_common::{init_logging, LogConfig, LogFormat};
use mekarindah_sw::{
    ClientMessage, EventOutcome, FetcherConfig, HostServices, HttpFetcher, Request,
    Response, ServiceWorker, ServiceWorkerContainer, WorkerConfig, WorkerEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "sw-harness")]
#[command(about = "Command-line host for the Mekarindah service worker")]
struct Cli {
    /// JSON worker config; defaults are used for missing fields
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the site origin
    #[arg(long, global = true)]
    origin: Option<Url>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the worker, then list what was cached
    Install,

    /// Fetch a URL through the worker
    Fetch {
        /// URL to request
        url: Url,
        /// Request it as an image
        #[arg(long)]
        image: bool,
        /// Request it as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Do not pre-cache static assets first
        #[arg(long)]
        skip_install: bool,
    },

    /// Show the notification a push payload would produce
    Push {
        /// Raw payload (JSON or plain text); omit for an empty push
        payload: Option<String>,
    },

    /// Install, then clear the cache via a client message
    ClearCache,

    /// Print the effective configuration as JSON
    ShowConfig,
}

fn load_config(cli: &Cli) -> anyhow::Result<WorkerConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(origin) = &cli.origin {
        config = config.with_origin(origin.clone());
    }
    config.validate()?;
    Ok(config)
}

fn build_worker(config: WorkerConfig) -> anyhow::Result<Arc<ServiceWorker>> {
    let fetcher = HttpFetcher::new(FetcherConfig::default())?;
    let host = HostServices::in_memory(Arc::new(fetcher));
    Ok(Arc::new(ServiceWorker::new(config, host)))
}

async fn install(worker: &Arc<ServiceWorker>) -> anyhow::Result<ServiceWorkerContainer> {
    let scope = worker.config().origin.clone();
    let (container, _events) = ServiceWorkerContainer::new(scope);
    container
        .register(Arc::clone(worker))
        .await
        .context("install failed")?;
    info!(scope = %container.scope(), worker = %worker.id(), "Worker installed");
    Ok(container)
}

fn print_response(response: &Response) {
    let source = if response.from_cache { "cache" } else { "network" };
    println!("Status:  {}", response.status);
    println!("Source:  {source}");
    println!("Length:  {} bytes", response.body.len());
    if let Some(content_type) = response.headers.get("content-type") {
        println!("Type:    {}", content_type.to_str().unwrap_or("<binary>"));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Install => {
            let worker = build_worker(config)?;
            install(&worker).await?;
            let cache_name = &worker.config().cache_name;
            let mut keys = worker.host().caches.entry_keys(cache_name).await;
            keys.sort_by(|a, b| a.url.cmp(&b.url));
            println!("Cache {cache_name}: {} entries", keys.len());
            for key in keys {
                println!("  {} {}", key.method, key.url);
            }
        }

        Commands::Fetch {
            url,
            image,
            navigate,
            skip_install,
        } => {
            let worker = build_worker(config)?;
            let request = match (image, navigate) {
                (true, true) => bail!("--image and --navigate are mutually exclusive"),
                (true, false) => Request::image(url),
                (false, true) => Request::navigate(url),
                (false, false) => Request::get(url),
            };

            let outcome = if skip_install {
                worker.handle_event(WorkerEvent::Fetch(request)).await?
            } else {
                install(&worker).await?.fetch(request).await?
            };

            match outcome {
                EventOutcome::Respond(response) => print_response(&response),
                EventOutcome::Passthrough => println!("Not intercepted; goes straight to network"),
                other => bail!("unexpected outcome {other:?}"),
            }
            worker.wait_until_idle().await;
        }

        Commands::Push { payload } => {
            let worker = build_worker(config)?;
            let data = payload.map(Bytes::from);
            match worker.handle_event(WorkerEvent::Push(data)).await? {
                EventOutcome::NotificationShown(notification) => {
                    println!("{}", serde_json::to_string_pretty(&notification)?);
                }
                other => bail!("unexpected outcome {other:?}"),
            }
        }

        Commands::ClearCache => {
            let worker = build_worker(config)?;
            let container = install(&worker).await?;
            container
                .post_message(ClientMessage::ClearCache.to_json())
                .await?;
            let cache_name = &worker.config().cache_name;
            let present = worker.host().caches.has(cache_name).await;
            println!("Cache {cache_name} present after clear: {present}");
        }

        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    init_logging(LogConfig::from_level_str(&cli.log_level)?.with_format(format))?;
    info!(version = env!("CARGO_PKG_VERSION"), "sw-harness starting");

    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_fetch_command() {
        let cli = Cli::try_parse_from([
            "sw-harness",
            "fetch",
            "http://localhost:8080/icons/icon-192x192.png",
            "--image",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Fetch { image: true, navigate: false, .. }));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_origin_override() {
        let cli = Cli::try_parse_from([
            "sw-harness",
            "--origin",
            "https://mekarindah.example/",
            "show-config",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.origin.as_str(), "https://mekarindah.example/");
    }

    #[test]
    fn test_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache_name":"masjid-mekarindah-v9"}}"#).unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["sw-harness", "--config", path.as_str(), "install"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.cache_name, "masjid-mekarindah-v9");
        assert_eq!(config.api_hosts.len(), 2);
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache_name":""}}"#).unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["sw-harness", "-c", path.as_str(), "install"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
