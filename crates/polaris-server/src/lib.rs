//! HTTP server for Polaris.
//!
//! Exposes object operations, transform log reads, batches, and content
//! locations as JSON over HTTP. The calling device is identified by the
//! [`DEVICE_HEADER`] header.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{Device, DeviceAuthenticator, HeaderDeviceAuth, DEVICE_HEADER};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::PolarisServer;
