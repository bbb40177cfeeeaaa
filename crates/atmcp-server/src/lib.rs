//! # atmcp-server
//!
//! MCP server exposing AT Protocol operations through three access tiers.
//!
//! - [`dispatch`] - the [`Dispatcher`]: schema validation, access policy,
//!   identity selection and one-shot session recovery per operation
//! - [`tools`] - the registered operations
//! - [`xrpc`] - [`XrpcClient`], the HTTP [`atmcp_core::ProtocolClient`]
//! - [`server`] - newline-delimited JSON-RPC over stdio
//! - [`config`] / [`logging`] - layered configuration and stderr tracing
//! - [`app`] - wiring of the above
//!
//! ## Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use atmcp_server::{App, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ServerConfig::load(None)?;
//! let app = App::build(&config)?;
//! app.initialize().await;
//! app.server()
//!     .serve(tokio::io::stdin(), tokio::io::stdout(), CancellationToken::new())
//!     .await?;
//! app.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod dispatch;
pub mod jsonrpc;
pub mod logging;
pub mod server;
pub mod tools;
pub mod xrpc;

pub use app::{App, AppError};
pub use config::{ConfigError, LoggingSettings, ServerConfig};
pub use dispatch::{
    AccessPolicy, Availability, CatalogueEntry, Dispatcher, Operation, OperationContext,
    OperationDescriptor, RegistrationError, Services,
};
pub use server::{McpServer, PROTOCOL_VERSION};
pub use xrpc::XrpcClient;
