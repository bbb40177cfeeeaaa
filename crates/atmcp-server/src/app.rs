//! Process wiring: protocol client, session manager, change feed, dispatcher

use std::sync::Arc;

use tracing::{error, info, warn};

use atmcp_auth::{InitOutcome, SessionManager};
use atmcp_core::ProtocolClient;
use atmcp_firehose::EventStreamClient;

use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::{Dispatcher, RegistrationError, Services};
use crate::server::McpServer;
use crate::tools;
use crate::xrpc::XrpcClient;

/// Startup failures; authentication and connectivity problems are not among them
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to register operations: {0}")]
    Registration(#[from] RegistrationError),
}

/// The assembled service graph
#[derive(Debug, Clone)]
pub struct App {
    services: Services,
    dispatcher: Dispatcher,
    autoconnect: bool,
}

impl App {
    /// Assemble everything from configuration without touching the network
    ///
    /// # Errors
    ///
    /// Malformed URLs, HTTP client construction and operation registration.
    /// A change-feed endpoint that is not a websocket URL only disables the feed.
    pub fn build(config: &ServerConfig) -> Result<Self, AppError> {
        let protocol: Arc<dyn ProtocolClient> = Arc::new(XrpcClient::new(
            config.service_url()?,
            config.public_url()?,
            config.stream_endpoint()?,
            config.request_timeout(),
        )?);
        let session = SessionManager::from_settings(protocol.clone(), &config.auth);

        let stream = if config.stream.enabled {
            match config.stream.to_config(protocol.event_stream_endpoint()) {
                Ok(stream_config) => Some(EventStreamClient::new(stream_config)),
                Err(e) => {
                    warn!(error = %e, "Change feed disabled");
                    None
                }
            }
        } else {
            info!("Change feed disabled by configuration");
            None
        };

        let services = Services::new(protocol, session, stream);
        Ok(Self::from_services(services, config.stream.autoconnect)?)
    }

    /// Assemble around existing services
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::register`].
    pub fn from_services(services: Services, autoconnect: bool) -> Result<Self, RegistrationError> {
        let mut dispatcher = Dispatcher::new(services.clone());
        tools::register_all(&mut dispatcher)?;
        info!(operations = dispatcher.len(), "Operations registered");
        Ok(Self {
            services,
            dispatcher,
            autoconnect,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn server(&self) -> McpServer {
        McpServer::new(self.dispatcher.clone())
    }

    /// Authenticate if credentials allow and start the change feed
    ///
    /// Never fails: without a session only public and enhanced operations
    /// are available.
    pub async fn initialize(&self) -> InitOutcome {
        let outcome = self.services.session.initialize().await;
        match &outcome {
            InitOutcome::Unauthenticated => {
                info!("No credentials configured; public operations only");
            }
            InitOutcome::Authenticated { did, handle } => {
                info!(%did, %handle, "Authenticated");
            }
            InitOutcome::AuthorizationRequired { url } => {
                warn!(%url, "Authorization required; open the URL or call start_authorization");
            }
            InitOutcome::Failed(e) => {
                error!(
                    kind = %e.kind,
                    error = %e.message,
                    "Authentication failed; continuing unauthenticated"
                );
            }
        }

        if let Some(stream) = &self.services.stream
            && self.autoconnect
        {
            stream.connect();
        }
        outcome
    }

    /// Close the change feed and stop background session tasks
    pub async fn shutdown(&self) {
        if let Some(stream) = &self.services.stream {
            stream.disconnect().await;
        }
        self.services.session.shutdown();
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atmcp_firehose::ConnectionState;

    #[tokio::test]
    async fn test_build_from_defaults() {
        let app = App::build(&ServerConfig::default()).unwrap();
        assert_eq!(app.dispatcher().len(), 12);
        let stream = app.services().stream.as_ref().expect("stream enabled by default");
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        assert!(!app.services().session.has_credentials());
    }

    #[tokio::test]
    async fn test_stream_disabled_or_misconfigured() {
        let mut config = ServerConfig::default();
        config.stream.enabled = false;
        assert!(App::build(&config).unwrap().services().stream.is_none());

        let mut config = ServerConfig::default();
        config.stream.endpoint = Some("https://jetstream.example/subscribe".into());
        assert!(App::build(&config).unwrap().services().stream.is_none());
    }

    #[test]
    fn test_bad_service_url_is_fatal() {
        let config = ServerConfig {
            service_url: "::".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(App::build(&config), Err(AppError::Config(_))));
    }
}
