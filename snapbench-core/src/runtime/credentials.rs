//! Registry credentials for private pulls.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PullError;

/// How a pull authenticates against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PullAuth {
    #[default]
    Anonymous,
    /// Secret read from this file on every pull, paired with `username`.
    SecretFile { path: PathBuf, username: String },
}

impl PullAuth {
    pub fn secret_file(path: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        Self::SecretFile {
            path: path.into(),
            username: username.into(),
        }
    }

    /// Resolve to concrete credentials, reading the secret file if any.
    pub fn resolve(&self) -> Result<Option<RegistryCredentials>, PullError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::SecretFile { path, username } => {
                RegistryCredentials::from_secret_file(username, path).map(Some)
            }
        }
    }
}

/// Username/secret pair handed to the runtime client.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    username: String,
    secret: String,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Read the secret from a plain-text file; trailing whitespace is dropped.
    pub fn from_secret_file(
        username: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, PullError> {
        let path = path.as_ref();
        let secret = std::fs::read_to_string(path).map_err(|e| PullError::Credentials {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(username, secret.trim_end()))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `user:secret`, the form the `--user` flag of the client tools expects.
    pub fn user_flag(&self) -> String {
        format!("{}:{}", self.username, self.secret)
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}
