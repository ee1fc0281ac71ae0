//! Cluster error types

use std::net::Ipv4Addr;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Cluster-specific error types
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Two master nodes found on the network: {first} and {second}")]
    SplitBrain { first: Ipv4Addr, second: Ipv4Addr },

    #[error("Role mismatch: {0}")]
    RoleMismatch(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    pub fn network<T: Into<String>>(msg: T) -> Self {
        Self::Network(msg.into())
    }

    pub fn role_mismatch<T: Into<String>>(msg: T) -> Self {
        Self::RoleMismatch(msg.into())
    }

    pub fn invalid_request<T: Into<String>>(msg: T) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error must abort the process instead of being absorbed
    /// into a membership change. Only dual-master detection qualifies: safe
    /// resolution requires information this node does not have.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SplitBrain { .. })
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(format!("HTTP client error: {}", err))
    }
}
