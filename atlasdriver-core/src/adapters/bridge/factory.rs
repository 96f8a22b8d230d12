//! Factory for bridge-backed connections.

use super::artifact::ArtifactLocator;
use super::connection::BridgeConnection;
use super::protocol::{ConnectParams, DRIVER_CLASS, method};
use super::session::BridgeSession;
use crate::Result;
use crate::adapters::{BackendConnection, ConnectionFactory, prepare_connection};
use crate::config::{BackendKind, DriverConfig};
use crate::error::{AtlasDriverError, BackendMessage};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Program used to run the artifact when none is configured.
const DEFAULT_BRIDGE_COMMAND: &str = "java";

/// Launches one bridge sidecar per physical connection.
pub struct BridgeClientFactory {
    config: Arc<DriverConfig>,
    locator: ArtifactLocator,
    artifact: OnceCell<PathBuf>,
}

impl BridgeClientFactory {
    /// Creates a factory searching the default artifact locations.
    pub fn new(config: Arc<DriverConfig>) -> Self {
        let locator = ArtifactLocator::new(config.custom_class_path.clone());
        Self::with_locator(config, locator)
    }

    /// Creates a factory with an explicit artifact search.
    pub fn with_locator(config: Arc<DriverConfig>, locator: ArtifactLocator) -> Self {
        Self {
            config,
            locator,
            artifact: OnceCell::new(),
        }
    }

    /// Resolves the driver artifact on first use and remembers it.
    ///
    /// # Errors
    /// Returns a configuration error when no artifact can be found
    pub async fn artifact(&self) -> Result<&Path> {
        let path = self
            .artifact
            .get_or_try_init(|| async { self.locator.resolve() })
            .await?;
        Ok(path.as_path())
    }

    fn program(&self) -> PathBuf {
        self.config
            .bridge_command
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BRIDGE_COMMAND))
    }

    /// JDBC connection properties sent with `connect`.
    pub(super) fn connect_properties(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        if let Some(credentials) = &self.config.properties.credentials {
            properties.insert("user".to_string(), credentials.username().into());
            if let Some(password) = credentials.password() {
                properties.insert("password".to_string(), password.into());
            }
        }
        if let Some(port) = self.config.properties.port {
            properties.insert("port".to_string(), port.to_string().into());
        }
        if let Some(database) = &self.config.database {
            properties.insert("database".to_string(), database.as_str().into());
        }
        properties
    }

    /// Opens the JDBC connection inside a running session and prepares it.
    pub(super) async fn establish(
        &self,
        id: String,
        session: Arc<BridgeSession>,
    ) -> Result<BridgeConnection> {
        let params = ConnectParams {
            url: &self.config.url,
            driver: DRIVER_CLASS,
            properties: self.connect_properties(),
        };
        let connected: Result<Value> = session.call(method::CONNECT, &params).await;
        if let Err(e) = connected {
            warn!(connection_id = %id, "Bridge connect failed: {}", e.backend_message());
            session.shutdown().await;
            return Err(AtlasDriverError::connection_create(
                format!("Failed to connect to {}", self.config.redacted_url()),
                BackendMessage(e.backend_message()),
            ));
        }

        let connection = BridgeConnection::new(
            id,
            session,
            self.config.database.clone(),
            self.config.test_connection_timeout,
        );
        if let Err(e) = prepare_connection(
            &connection,
            &self.config.prepare_connection_queries,
            self.config.query_timeout,
        )
        .await
        {
            if let Err(close_error) = connection.close().await {
                warn!(
                    connection_id = %connection.id(),
                    "Failed to close connection after setup failure: {}",
                    close_error
                );
            }
            return Err(e);
        }
        Ok(connection)
    }
}

#[async_trait]
impl ConnectionFactory for BridgeClientFactory {
    async fn create(&self) -> Result<Box<dyn BackendConnection>> {
        let started = Instant::now();
        let id = format!("bridge-{}", uuid::Uuid::new_v4().simple());
        let artifact = self.artifact().await?;
        let program = self.program();
        debug!(connection_id = %id, artifact = %artifact.display(), "Launching bridge");

        let session = BridgeSession::spawn(&program, artifact).map_err(|e| {
            AtlasDriverError::connection_create(
                format!("Failed to launch bridge for {}", self.config.redacted_url()),
                e,
            )
        })?;
        let connection = self.establish(id.clone(), Arc::new(session)).await?;

        info!(
            connection_id = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connection created"
        );
        Ok(Box::new(connection))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Bridge
    }
}
