//! Credential container with automatic memory zeroing.

use zeroize::{Zeroize, Zeroizing};

/// Database credentials that are zeroed from memory on drop.
///
/// # Example
///
/// ```rust
/// use atlasdriver_core::security::Credentials;
///
/// let creds = Credentials::new("analyst".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "analyst");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl Credentials {
    /// Creates new credentials.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gets the password for handing to a backend session.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}
