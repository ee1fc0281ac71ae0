//! Read-only cluster status dashboard
//!
//! Polls a configured list of nodes for their details on demand and serves
//! the aggregate as JSON. Purely observational: it never mutates cluster
//! state and unreachable nodes simply show up as such.

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use clap::Parser;
use prism_cluster::NodeDetails;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "prism-view", about = "Read-only cluster status dashboard", version)]
struct Cli {
    /// TOML file listing the node addresses to poll
    #[arg(short, long, default_value = "view.toml")]
    config: PathBuf,

    /// Address to serve the dashboard on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
}

/// Dashboard configuration
#[derive(Debug, Clone, Deserialize)]
struct ViewConfig {
    /// Node addresses to poll
    nodes: Vec<Ipv4Addr>,

    /// Service port the nodes listen on
    #[serde(default = "default_node_port")]
    node_port: u16,

    /// Per-node poll timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    poll_timeout_ms: u64,
}

fn default_node_port() -> u16 {
    5000
}

fn default_poll_timeout_ms() -> u64 {
    500
}

/// One row of the dashboard.
#[derive(Debug, Clone, Serialize)]
struct NodeStatus {
    address: Ipv4Addr,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<NodeDetails>,
}

struct App {
    config: ViewConfig,
    client: reqwest::Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,prism_view=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let content = std::fs::read_to_string(&cli.config)?;
    let config: ViewConfig = toml::from_str(&content)?;
    info!("Watching {} node(s)", config.nodes.len());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.poll_timeout_ms))
        .build()?;
    let app = Arc::new(App { config, client });

    let router = Router::new()
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(app);

    info!("Serving the dashboard on {}", cli.bind);
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn status(State(app): State<Arc<App>>) -> Json<Vec<NodeStatus>> {
    let mut rows = Vec::with_capacity(app.config.nodes.len());
    for &address in &app.config.nodes {
        rows.push(poll_node(&app, address).await);
    }
    Json(rows)
}

async fn poll_node(app: &App, address: Ipv4Addr) -> NodeStatus {
    let url = format!(
        "http://{}:{}/node-details",
        address, app.config.node_port
    );
    let details = match app.client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            response.json::<NodeDetails>().await.ok()
        }
        Ok(response) => {
            debug!("{} answered with {}", address, response.status());
            None
        }
        Err(err) => {
            debug!("{} is unreachable: {}", address, err);
            None
        }
    };

    NodeStatus {
        address,
        reachable: details.is_some(),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_apply() {
        let config: ViewConfig = toml::from_str(
            r#"
            nodes = ["10.0.0.2", "10.0.0.3"]
            "#,
        )
        .unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.node_port, 5000);
        assert_eq!(config.poll_timeout_ms, 500);
    }

    #[test]
    fn unreachable_nodes_serialize_without_details() {
        let row = NodeStatus {
            address: "10.0.0.2".parse().unwrap(),
            reachable: false,
            details: None,
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains("\"reachable\":false"));
    }
}
