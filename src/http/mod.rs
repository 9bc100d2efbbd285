//! HTTP transport for the management protocol
//!
//! Public metadata endpoints and the authenticated WebSocket upgrade at `/rpc`.

pub mod handlers;
