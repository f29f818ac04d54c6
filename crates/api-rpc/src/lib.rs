//! JSON-RPC API Layer
//!
//! Exposes the broadcast operator controls over JSON-RPC 2.0 so that any
//! session (CLI, another process) can start, steer and observe runs.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
