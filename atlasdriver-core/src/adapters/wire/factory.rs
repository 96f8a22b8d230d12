//! Factory for wire-protocol connections.

use super::connection::WireConnection;
use crate::Result;
use crate::adapters::{BackendConnection, ConnectionFactory, prepare_connection};
use crate::config::{BackendKind, DriverConfig};
use crate::error::AtlasDriverError;
use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Database the driver falls back to when neither the configuration
/// nor the URL names one.
const FALLBACK_DATABASE: &str = "test";

/// Builds [`WireConnection`]s from the driver configuration.
pub struct WireClientFactory {
    config: Arc<DriverConfig>,
}

impl WireClientFactory {
    /// Creates a factory sharing the driver's configuration.
    pub fn new(config: Arc<DriverConfig>) -> Self {
        Self { config }
    }

    /// Parses the URL and applies credential and port properties.
    pub(super) async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.config.url).await.map_err(|e| {
            AtlasDriverError::connection_create(
                format!(
                    "Failed to parse connection options for {}",
                    self.config.redacted_url()
                ),
                e,
            )
        })?;

        options.app_name = Some(format!("atlasdriver-{}", env!("CARGO_PKG_VERSION")));
        options.max_pool_size = Some(1);
        options.min_pool_size = Some(0);

        if options.credential.is_none()
            && let Some(credentials) = &self.config.properties.credentials
        {
            options.credential = Some(
                Credential::builder()
                    .username(credentials.username().to_string())
                    .password(credentials.password().map(str::to_string))
                    .build(),
            );
        }

        if let Some(port) = self.config.properties.port {
            for address in &mut options.hosts {
                if let ServerAddress::Tcp { port: host_port, .. } = address
                    && host_port.is_none()
                {
                    *host_port = Some(port);
                }
            }
        }

        Ok(options)
    }

    pub(super) fn database_for(&self, client: &Client) -> String {
        self.config
            .database
            .clone()
            .or_else(|| client.default_database().map(|db| db.name().to_string()))
            .unwrap_or_else(|| FALLBACK_DATABASE.to_string())
    }
}

#[async_trait]
impl ConnectionFactory for WireClientFactory {
    async fn create(&self) -> Result<Box<dyn BackendConnection>> {
        let started = Instant::now();
        let id = format!("wire-{}", uuid::Uuid::new_v4().simple());
        debug!(connection_id = %id, "Creating wire connection");

        let options = self.client_options().await?;
        let client = Client::with_options(options).map_err(|e| {
            AtlasDriverError::connection_create(
                format!(
                    "Failed to create MongoDB client for {}",
                    self.config.redacted_url()
                ),
                e,
            )
        })?;

        let database = self.database_for(&client);
        if let Err(e) = client.database(&database).run_command(doc! { "ping": 1 }).await {
            warn!(connection_id = %id, "Connection creation failed: {}", e);
            client.shutdown().await;
            return Err(AtlasDriverError::connection_create(
                format!("Failed to connect to {}", self.config.redacted_url()),
                e,
            ));
        }

        let connection = WireConnection::new(id.clone(), client, database);
        if let Err(e) = prepare_connection(
            &connection,
            &self.config.prepare_connection_queries,
            self.config.query_timeout,
        )
        .await
        {
            if let Err(close_error) = connection.close().await {
                warn!(
                    connection_id = %id,
                    "Failed to close connection after setup failure: {}",
                    close_error
                );
            }
            return Err(e);
        }

        info!(
            connection_id = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connection created"
        );
        Ok(Box::new(connection))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Wire
    }
}
