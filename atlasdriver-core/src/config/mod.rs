//! Driver configuration.
//!
//! A [`DriverConfig`] is built once, either through [`DriverConfig::builder`]
//! or [`DriverConfig::from_env`], and is never mutated afterwards. Explicit
//! builder values always win over environment variables.

mod env;
mod pool;

pub use env::{DEFAULT_DATA_SOURCE, assert_data_source, env_var_name, get_env};
pub use pool::PoolOptions;

use crate::Result;
use crate::error::{AtlasDriverError, redact_database_url};
use crate::security::Credentials;
use std::path::PathBuf;
use std::time::Duration;

/// Server-side execution budget applied to every statement.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Which client strategy talks to Atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Official MongoDB wire-protocol client with `$sql` aggregation
    #[default]
    Wire,
    /// JDBC bridge sidecar process
    Bridge,
}

impl BackendKind {
    /// Value of `CUBEJS_DB_TYPE` selecting this backend.
    pub fn db_type(&self) -> &'static str {
        match self {
            Self::Wire => "mongo-atlas",
            Self::Bridge => "mongo-atlas-jdbc",
        }
    }

    /// Short operator-facing name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wire => "wire",
            Self::Bridge => "bridge",
        }
    }

    /// Pool size used when neither an option nor the environment sets one.
    pub fn default_max_pool_size(&self) -> usize {
        match self {
            Self::Wire => 3,
            Self::Bridge => 8,
        }
    }

    /// Budget for the health probe run on borrow.
    pub fn default_test_connection_timeout(&self) -> Duration {
        match self {
            Self::Wire => Duration::from_secs(60),
            Self::Bridge => Duration::from_secs(10),
        }
    }

    /// Pool options with this backend's defaults applied.
    pub fn default_pool_options(&self) -> PoolOptions {
        PoolOptions::default().with_max_size(self.default_max_pool_size())
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = AtlasDriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wire" | "mongo-atlas" => Ok(Self::Wire),
            "bridge" | "jdbc" | "mongo-atlas-jdbc" => Ok(Self::Bridge),
            other => Err(AtlasDriverError::configuration(format!(
                "Unknown backend '{}': expected wire (mongo-atlas) or bridge (mongo-atlas-jdbc)",
                other
            ))),
        }
    }
}

/// Credential properties handed to the backend session.
#[derive(Debug, Clone, Default)]
pub struct ConnectionProperties {
    /// User and password, if not embedded in the URL
    pub credentials: Option<Credentials>,
    /// Port override
    pub port: Option<u16>,
}

/// Immutable driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Named data source the environment was resolved for
    pub data_source: String,
    /// Database used for unqualified tables, pings and introspection
    pub database: Option<String>,
    /// Connection URL; never empty
    pub url: String,
    /// Client strategy
    pub backend: BackendKind,
    /// Pool tuning
    pub pool: PoolOptions,
    /// Credential properties
    pub properties: ConnectionProperties,
    /// Explicit location of the bridge driver artifact
    pub custom_class_path: Option<PathBuf>,
    /// Statements run on every freshly created connection
    pub prepare_connection_queries: Vec<String>,
    /// Program used to launch the bridge artifact; `java` when unset
    pub bridge_command: Option<PathBuf>,
    /// Server-side statement timeout
    pub query_timeout: Duration,
    /// Budget for the borrow-time health probe
    pub test_connection_timeout: Duration,
}

impl DriverConfig {
    /// Starts a configuration builder.
    ///
    /// # Example
    /// ```rust
    /// use atlasdriver_core::config::{BackendKind, DriverConfig};
    ///
    /// let config = DriverConfig::builder()
    ///     .url("mongodb://cluster0.example.net/?ssl=true")
    ///     .database("sales")
    ///     .backend(BackendKind::Wire)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pool.max_size, 3);
    /// ```
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Resolves a configuration purely from the environment of a data source.
    ///
    /// # Errors
    /// Returns a configuration error when no URL is set or a value is invalid
    pub fn from_env(data_source: &str) -> Result<Self> {
        Self::builder().data_source(data_source).build()
    }

    /// Connection URL with the password masked.
    pub fn redacted_url(&self) -> String {
        redact_database_url(&self.url)
    }
}

impl std::fmt::Display for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} backend at {} (database: {}, pool max: {})",
            self.backend,
            self.redacted_url(),
            self.database.as_deref().unwrap_or("<none>"),
            self.pool.max_size
        )
    }
}

/// Builder for [`DriverConfig`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfigBuilder {
    data_source: Option<String>,
    database: Option<String>,
    url: Option<String>,
    backend: Option<BackendKind>,
    max_pool_size: Option<usize>,
    pool_options: Option<PoolOptions>,
    credentials: Option<Credentials>,
    port: Option<u16>,
    custom_class_path: Option<PathBuf>,
    prepare_connection_queries: Vec<String>,
    bridge_command: Option<PathBuf>,
    query_timeout: Option<Duration>,
    test_connection_timeout: Option<Duration>,
}

impl DriverConfigBuilder {
    /// Named data source whose environment variables are consulted
    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    /// Database name
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Connection URL; overrides `CUBEJS_JDBC_URL`
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Client strategy; overrides `CUBEJS_DB_TYPE`
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Maximum pool size; overrides `CUBEJS_DB_MAX_POOL`
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Complete pool tuning. Replaces the backend defaults; an explicit
    /// `max_pool_size` still applies on top.
    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = Some(options);
        self
    }

    /// User and password
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Port override
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Location of the bridge driver artifact
    pub fn custom_class_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_class_path = Some(path.into());
        self
    }

    /// Statement run on each new connection; may be called repeatedly
    pub fn prepare_connection_query(mut self, sql: impl Into<String>) -> Self {
        self.prepare_connection_queries.push(sql.into());
        self
    }

    /// Program used to launch the bridge artifact
    pub fn bridge_command(mut self, program: impl Into<PathBuf>) -> Self {
        self.bridge_command = Some(program.into());
        self
    }

    /// Server-side statement timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Budget for the borrow-time health probe
    pub fn test_connection_timeout(mut self, timeout: Duration) -> Self {
        self.test_connection_timeout = Some(timeout);
        self
    }

    /// Resolves environment fallbacks and validates the result.
    ///
    /// # Errors
    /// Returns a configuration error when the URL is missing, the data source
    /// is undeclared or a value does not parse
    pub fn build(self) -> Result<DriverConfig> {
        let data_source = self
            .data_source
            .unwrap_or_else(|| DEFAULT_DATA_SOURCE.to_string());
        assert_data_source(&data_source)?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => get_env("DB_TYPE", &data_source)
                .map(|raw| raw.parse::<BackendKind>())
                .transpose()?
                .unwrap_or_default(),
        };

        let url = self
            .url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| get_env("JDBC_URL", &data_source))
            .ok_or_else(|| AtlasDriverError::configuration("url is required property"))?;

        let database = self
            .database
            .filter(|db| !db.trim().is_empty())
            .or_else(|| get_env("DB_NAME", &data_source));

        let credentials = match self.credentials {
            Some(credentials) => Some(credentials),
            None => get_env("DB_USER", &data_source)
                .map(|user| Credentials::new(user, get_env("DB_PASS", &data_source))),
        };

        let port = match self.port {
            Some(port) => Some(port),
            None => env::get_env_parsed::<u16>("DB_PORT", &data_source)?,
        };

        let mut pool = self
            .pool_options
            .unwrap_or_else(|| backend.default_pool_options());
        let max_size = match self.max_pool_size {
            Some(size) => Some(size),
            None => env::get_env_parsed::<usize>("DB_MAX_POOL", &data_source)?,
        };
        if let Some(size) = max_size {
            pool.max_size = size;
        }
        pool.validate()?;

        Ok(DriverConfig {
            data_source,
            database,
            url,
            backend,
            pool,
            properties: ConnectionProperties { credentials, port },
            custom_class_path: self.custom_class_path,
            prepare_connection_queries: self.prepare_connection_queries,
            bridge_command: self.bridge_command,
            query_timeout: self.query_timeout.unwrap_or(DEFAULT_QUERY_TIMEOUT),
            test_connection_timeout: self
                .test_connection_timeout
                .unwrap_or_else(|| backend.default_test_connection_timeout()),
        })
    }
}
