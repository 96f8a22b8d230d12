//! JDBC bridge backend.
//!
//! The Atlas JDBC driver runs inside a sidecar process launched as
//! `<bridge_command> -jar MongoAtlasJDBC.jar`. The sidecar speaks
//! newline-delimited JSON on stdio (see [`protocol`]); every physical
//! connection is one sidecar holding one JDBC connection.

pub mod type_mapping;

#[cfg(feature = "bridge")]
pub mod artifact;
#[cfg(feature = "bridge")]
mod connection;
#[cfg(feature = "bridge")]
mod factory;
#[cfg(feature = "bridge")]
pub mod protocol;
#[cfg(feature = "bridge")]
mod session;

#[cfg(feature = "bridge")]
pub use artifact::ArtifactLocator;
#[cfg(feature = "bridge")]
pub use connection::{BridgeConnection, FETCH_SIZE};
#[cfg(feature = "bridge")]
pub use factory::BridgeClientFactory;
#[cfg(feature = "bridge")]
pub use session::BridgeSession;
