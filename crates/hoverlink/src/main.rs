use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hoverlink_common::protocol::LinkedRequests;
use hoverlink_engine::config::{ConfigLoader, HoverlinkConfig, SessionConfig, StoreKind};
use hoverlink_engine::session::{FileStore, MemoryStore, SessionStore, TabState};
use hoverlink_engine::{Dispatcher, ElementRequestIndex, TabSessions};
use hoverlink_r::RemoteServer;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoverlink", version, about = "Links network requests to the UI elements that triggered them")]
struct Args {
    /// Config file (defaults to ./hoverlink.yaml, then ~/.hoverlink/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the WebSocket service the browser extension connects to
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum)]
        store: Option<StoreArg>,
        /// Directory for the file store
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },
    /// Group the requests of a persisted tab record by the element that triggered them
    Correlate {
        snapshot: PathBuf,
        /// Override the record's link window (clamped to the configured range)
        #[arg(long)]
        window_ms: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Memory,
    File,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Memory => StoreKind::Memory,
            StoreArg::File => StoreKind::File,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };

    match args.command {
        Command::Serve {
            host,
            port,
            store,
            store_dir,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(store) = store {
                config.store.kind = store.into();
            }
            if let Some(dir) = store_dir {
                config.store.dir = dir;
            }
            serve(config).await
        }
        Command::Correlate {
            snapshot,
            window_ms,
        } => {
            let linked = correlate(&snapshot, window_ms, &config).await?;
            println!("{}", serde_json::to_string_pretty(&linked)?);
            Ok(())
        }
    }
}

async fn serve(config: HoverlinkConfig) -> anyhow::Result<()> {
    let store: Arc<dyn SessionStore> = match config.store.kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => {
            info!("Persisting sessions to {}", config.store.dir.display());
            Arc::new(FileStore::new(config.store.dir.clone()))
        }
    };
    let sessions = Arc::new(TabSessions::new(
        store,
        config.session.clone(),
        config.overlay.clone(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.host))?;
    let handle = RemoteServer::new(addr)
        .start(Dispatcher::new(sessions.clone()))
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.shutdown();
    sessions.flush().await;
    Ok(())
}

async fn correlate(
    snapshot: &Path,
    window_ms: Option<f64>,
    config: &HoverlinkConfig,
) -> anyhow::Result<LinkedRequests> {
    let content = tokio::fs::read_to_string(snapshot)
        .await
        .with_context(|| format!("Failed to read {}", snapshot.display()))?;
    let stored: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON record", snapshot.display()))?;
    Ok(group_record(&stored, window_ms, config))
}

fn group_record(
    stored: &serde_json::Value,
    window_ms: Option<f64>,
    config: &HoverlinkConfig,
) -> LinkedRequests {
    let session: &SessionConfig = &config.session;
    let state = TabState::restore(stored, session);
    let window = window_ms
        .filter(|ms| ms.is_finite())
        .map(|ms| session.clamp_link_window(ms))
        .unwrap_or(state.link_window_ms);

    let index = ElementRequestIndex::rebuild(
        &state.interactions,
        &state.requests,
        window,
        config.overlay.max_requests_per_element,
    );
    LinkedRequests {
        groups: index.groups(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> serde_json::Value {
        json!({
            "interactions": [
                {"id": "i1", "ts": 1000, "type": "click", "elementKey": "id:go",
                 "elementMeta": {"tagName": "button"}}
            ],
            "requests": [
                {"id": "r1", "tsStart": 1100, "tsEnd": 1200, "method": "GET", "url": "/a", "status": 200},
                {"id": "r2", "tsStart": 3000, "tsEnd": 3100, "method": "GET", "url": "/b", "status": 200}
            ],
            "linkWindowMs": 1500
        })
    }

    #[test]
    fn test_groups_with_record_window() {
        let linked = group_record(&record(), None, &HoverlinkConfig::default());
        assert_eq!(linked.groups.len(), 1);
        assert_eq!(linked.groups[0].requests.len(), 1);
    }

    #[test]
    fn test_window_override_is_clamped() {
        // 2500 reaches r2; 50 is raised to the 250 minimum, which still covers r1
        let linked = group_record(&record(), Some(2500.0), &HoverlinkConfig::default());
        assert_eq!(linked.groups[0].requests.len(), 2);

        let linked = group_record(&record(), Some(50.0), &HoverlinkConfig::default());
        assert_eq!(linked.groups[0].requests.len(), 1);
    }
}
