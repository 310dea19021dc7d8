//! ID Scanner offline runner
//!
//! Drives the offline proxy the way a browser would: install, activate,
//! then one navigation per URL given on the command line. Each response
//! is reported with the place it was served from.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use idscan_common::{init_logging, LogConfig, LogFormat};
use idscan_net::{HttpFetcher, LoaderConfig, Request};
use idscan_sw::{
    spawn_dispatcher, FetchOutcome, LogNotifier, MemoryCacheStore, OfflineProxy, ProxyConfig,
    SeedOutcome,
};
use tracing::{error, info, warn};
use url::Url;

/// Parse command line arguments
struct Args {
    config: Option<PathBuf>,
    origin: Option<Url>,
    json_logs: bool,
    verbose: bool,
    urls: Vec<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut origin = None;
        let mut json_logs = false;
        let mut verbose = false;
        let mut urls = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a file path")?;
                    config = Some(PathBuf::from(path));
                }
                "--origin" => {
                    let value = args.next().context("--origin needs a URL")?;
                    origin = Some(Url::parse(&value).with_context(|| format!("bad origin {value}"))?);
                }
                "--json-logs" => json_logs = true,
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    println!(
                        "Usage: idscan-offline [--config FILE] [--origin URL] [--json-logs] [--verbose] [URL...]"
                    );
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                _ => urls.push(arg),
            }
        }

        Ok(Self {
            config,
            origin,
            json_logs,
            verbose,
            urls,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;

    let log_config = if args.json_logs {
        LogConfig::production()
    } else if args.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default().with_format(LogFormat::Compact)
    };
    init_logging(&log_config)?;

    let mut config = match args.config {
        Some(ref path) => ProxyConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProxyConfig::default(),
    };
    if let Some(origin) = args.origin {
        config = config.with_origin(origin);
    }

    let fetcher = HttpFetcher::new(LoaderConfig::default())?;
    let proxy = Arc::new(OfflineProxy::new(
        config,
        Arc::new(MemoryCacheStore::new()),
        Arc::new(fetcher),
        Arc::new(LogNotifier),
    )?);

    let origin = proxy.config().origin.clone();
    proxy.open_client(origin.clone()).await;

    let (handle, task) = spawn_dispatcher(Arc::clone(&proxy));

    match handle.install().await? {
        SeedOutcome::FullySeeded => info!(cache = %proxy.cache_name(), "Cache fully seeded"),
        SeedOutcome::PartiallySeeded { missing } => {
            for url in missing {
                warn!(%url, "Not available offline");
            }
        }
    }

    let report = handle.activate().await?;
    info!(
        deleted = report.deleted.len(),
        claimed = report.clients_claimed,
        "Proxy active"
    );

    for target in &args.urls {
        let url = match origin.join(target) {
            Ok(url) => url,
            Err(e) => {
                error!(target = %target, error = %e, "Skipping invalid URL");
                continue;
            }
        };

        match handle.fetch(Request::navigate(url.clone())).await {
            Ok(FetchOutcome::Respond(served)) => println!(
                "{} {} {:?} ({} bytes)",
                served.response.status.as_u16(),
                url,
                served.source,
                served.response.body.len()
            ),
            Ok(FetchOutcome::Passthrough) => println!("--- {} passthrough", url),
            Err(e) => println!("ERR {} {}", url, e),
        }
    }

    drop(handle);
    task.await?;
    Ok(())
}
