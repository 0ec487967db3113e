// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers and small value types shared across the harness.
//!
//! Types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Validated target platform in `os/arch[/variant]` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform(String);

impl Platform {
    /// Create a new Platform with validation.
    pub fn new(platform: impl Into<String>) -> Result<Self, ConfigError> {
        let platform = platform.into();
        let parts: Vec<&str> = platform.split('/').collect();

        if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::InvalidFieldValue {
                field: "platform",
                value: platform,
                reason: "Platform must look like os/arch or os/arch/variant".to_string(),
            });
        }

        Ok(Self(platform))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self("linux/amd64".to_string())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Platform {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.0
    }
}

/// One row of the test matrix: the image a group of drivers benchmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Short name appended to driver names, e.g. `Alpine`.
    pub short_name: String,
    /// Fully qualified registry reference.
    pub image_ref: String,
    /// Index digest the lazy-pull backend resolves, when side-loaded.
    pub index_digest: Option<String>,
    /// Output line marking the containerised workload as ready to serve.
    #[serde(default)]
    pub ready_line: Option<String>,
}

impl ImageDescriptor {
    pub fn new(short_name: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            image_ref: image_ref.into(),
            index_digest: None,
            ready_line: None,
        }
    }

    pub fn with_index_digest(mut self, digest: impl Into<String>) -> Self {
        self.index_digest = Some(digest.into());
        self
    }

    pub fn with_ready_line(mut self, line: impl Into<String>) -> Self {
        self.ready_line = Some(line.into());
        self
    }
}

/// Image-pull backend a runtime client is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The runtime's built-in overlay filesystem snapshotter.
    OverlayFs,
    /// The lazy-pulling snapshotter daemon plugged into the runtime.
    Lazy,
}

impl Backend {
    /// Prefix used when naming drivers for this backend.
    pub const fn driver_prefix(&self) -> &'static str {
        match self {
            Self::OverlayFs => "OverlayFS",
            Self::Lazy => "Soci",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverlayFs => write!(f, "overlayfs"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}
