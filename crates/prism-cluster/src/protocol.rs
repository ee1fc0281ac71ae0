//! Wire payloads exchanged between nodes
//!
//! Every endpoint carries a small key-value body; the dispatcher in the
//! node binary handles serialization at the HTTP boundary.

use crate::state::Color;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Response body for `/node-details` and `/greetings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub is_master: bool,
    pub color: Color,
    pub hostname: String,
}

/// Request body for `/color`, pushed by the master to each worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAssignment {
    pub color: Color,
}

/// Request body for `/worker_register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub address: Ipv4Addr,
    pub info: String,
}

/// Response body for `/worker_register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub color: Color,
}
