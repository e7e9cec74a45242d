//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and session listing
//! - `call` - Voice call WebSocket

pub mod api;
pub mod call;

pub use call::call_handler;
