//! Wire-protocol backend.
//!
//! Speaks the MongoDB protocol directly through the official driver and
//! hands SQL to Atlas as a `$sql` aggregation stage. Each physical
//! connection owns its own `Client`, so the driver's internal pool is capped
//! at one socket and the outer pool stays the only source of concurrency.
//!
//! # Security Features
//! - Connection strings are redacted in every error and log line
//! - Credentials are applied from zeroizing storage only when the URL
//!   carries none

pub mod type_mapping;

#[cfg(feature = "wire")]
mod connection;
#[cfg(feature = "wire")]
mod cursor;
#[cfg(feature = "wire")]
mod factory;

#[cfg(feature = "wire")]
pub use connection::WireConnection;
#[cfg(feature = "wire")]
pub use factory::WireClientFactory;
