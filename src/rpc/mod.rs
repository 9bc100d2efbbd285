//! Bidirectional JSON-RPC 2.0 engine
//!
//! Method registries, the per-connection session with its pending outbound
//! requests, the main-thread bridge, and the listener that owns every live
//! connection.

pub mod connection;
pub mod discovery;
pub mod envelope;
pub mod executor;
pub mod identifier;
pub mod method;
pub mod pending;
pub mod registry;
pub mod schema;
pub mod server;
