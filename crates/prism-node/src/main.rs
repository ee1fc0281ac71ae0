//! Prism node daemon
//!
//! Binds the HTTP endpoints peers talk to, resolves the local network
//! interface, and hands the cluster core its configuration. The discovery
//! sweep runs concurrently with request handling so this node can answer
//! probes from peers performing their own discovery.

use axum::{
    extract::{ConnectInfo, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use prism_cluster::{
    Cluster, ClusterConfig, ClusterError, ColorAssignment, HttpTransport, NodeDetails,
    RegisterRequest, RegisterResponse,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod netinfo;

#[derive(Parser, Debug)]
#[command(name = "prism-node", about = "Bully-elected cluster node", version)]
struct Cli {
    /// Network interface to announce on
    #[arg(short, long)]
    interface: Option<String>,

    /// Service port shared by every node on the segment
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum number of addresses probed during discovery
    #[arg(long)]
    max_probe: Option<usize>,

    /// Optional TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,prism_cluster=debug,prism_node=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    config.validate()?;

    let bind_addr = SocketAddr::from((IpAddr::V4(config.self_addr), config.port));
    let transport = Arc::new(HttpTransport::new(&config)?);
    let cluster = Cluster::new(config, transport);

    let sweeper = cluster.clone();
    tokio::spawn(async move {
        if let Err(err) = sweeper.bootstrap().await {
            // Two masters on one segment cannot be reconciled automatically.
            error!("{}", err);
            std::process::exit(1);
        }
    });

    let app = router(cluster);
    info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<ClusterConfig> {
    let mut config = match &cli.config {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::default(),
    };

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(max_probe) = cli.max_probe {
        config.max_probe = max_probe;
    }

    let info = netinfo::resolve(cli.interface.as_deref())?;
    config.self_addr = info.addr();
    config.subnet = info.network;
    config.node_name = info.hostname;

    Ok(config)
}

fn router(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route("/node-details", get(node_details))
        .route("/greetings", post(greetings))
        .route("/health-check", get(health_check))
        .route("/election", post(election))
        .route("/master-announcement", post(master_announcement))
        .route("/color", post(color))
        .route("/worker_register", post(worker_register))
        .layer(TraceLayer::new_for_http())
        .with_state(cluster)
}

/// IPv4 address of the connected peer, if it is one.
fn peer_v4(remote: SocketAddr) -> Option<Ipv4Addr> {
    match remote.ip() {
        IpAddr::V4(addr) => Some(addr),
        IpAddr::V6(addr) => addr.to_ipv4_mapped(),
    }
}

async fn node_details(State(cluster): State<Arc<Cluster>>) -> Json<NodeDetails> {
    Json(cluster.node_details().await)
}

async fn greetings(
    State(cluster): State<Arc<Cluster>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Json<NodeDetails> {
    Json(cluster.handle_greeting(peer_v4(remote)).await)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn election(
    State(cluster): State<Arc<Cluster>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> StatusCode {
    cluster.handle_election(peer_v4(remote)).await;
    StatusCode::OK
}

async fn master_announcement(
    State(cluster): State<Arc<Cluster>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Result<StatusCode, ApiError> {
    let announcer = peer_v4(remote).ok_or_else(|| {
        ApiError(ClusterError::invalid_request(
            "master announcements require an IPv4 peer",
        ))
    })?;
    cluster.handle_announcement(announcer).await;
    Ok(StatusCode::OK)
}

async fn color(
    State(cluster): State<Arc<Cluster>>,
    Json(body): Json<ColorAssignment>,
) -> Result<StatusCode, ApiError> {
    cluster.handle_color(body.color).await?;
    Ok(StatusCode::OK)
}

async fn worker_register(
    State(cluster): State<Arc<Cluster>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    Ok(Json(cluster.handle_register(body).await?))
}

/// Maps cluster errors onto HTTP statuses: role violations and malformed
/// requests are the caller's fault, everything else is ours.
struct ApiError(ClusterError);

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClusterError::RoleMismatch(_) | ClusterError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addresses_unwrap_to_ipv4() {
        let v4: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        assert_eq!(peer_v4(v4), Some("10.0.0.7".parse().unwrap()));

        let mapped: SocketAddr = "[::ffff:10.0.0.7]:5000".parse().unwrap();
        assert_eq!(peer_v4(mapped), Some("10.0.0.7".parse().unwrap()));

        let v6: SocketAddr = "[::1]:5000".parse().unwrap();
        assert_eq!(peer_v4(v6), None);
    }

    #[test]
    fn role_violations_map_to_client_errors() {
        let response = ApiError(ClusterError::role_mismatch("not a master")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(ClusterError::network("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
