//! Credential handling.
//!
//! Passwords are kept in `Zeroizing` containers, never appear in `Debug`
//! output, and are only read when a backend session is opened.

mod credentials;

pub use credentials::Credentials;
