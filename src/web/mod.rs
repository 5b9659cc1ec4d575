//! Web server module exposing usage data over HTTP
//!
//! Provides the `/api/usage` REST endpoint and the embedded dashboard assets.

mod api;
mod server;
mod static_files;

pub use api::ApiState;
pub use server::{build_router, WebServer};
