/*
 * zotero-deb - Debian package repository builder for Zotero and Juris-M.
 * Copyright (C) 2025  zotero-deb contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Error taxonomy for the resolve, build and publish phases.

use thiserror::Error;

use crate::builder::BuildStage;

/// Main error type for zotero-deb operations
#[derive(Debug, Error)]
pub enum ZoteroDebError {
    /// The vendor's release endpoint did not yield a usable version.
    /// Aborts every architecture for that client.
    #[error("Version discovery failed for '{client}': {reason}")]
    VersionDiscovery { client: String, reason: String },

    /// Release archive download failed for one (client, arch) pair
    #[error("Fetch failed for {client} ({arch}) from {url}: {reason}")]
    Fetch {
        client: String,
        arch: String,
        url: String,
        reason: String,
    },

    /// Staging, packaging or signing failed for one (client, arch) pair
    #[error("Packaging {client} {version} ({arch}) failed while {stage}: {reason}")]
    Packaging {
        client: String,
        version: String,
        arch: String,
        stage: BuildStage,
        reason: String,
        exit_code: Option<i32>,
    },

    /// Index, release or signature generation failed
    #[error("Publish failed during {step}: {reason}")]
    Publish { step: String, reason: String },

    /// One or more uploads were rejected by the hosting target
    #[error("Upload failed for {} file(s): {}", .failed.len(), .failed.join(", "))]
    Upload { failed: Vec<String> },

    /// The generated package index disagrees with the packages on disk
    #[error(
        "Package index is out of sync: missing [{}], stale [{}]",
        .missing.join(", "),
        .stale.join(", ")
    )]
    IndexMismatch {
        missing: Vec<String>,
        stale: Vec<String>,
    },

    /// A required external tool is not on PATH
    #[error("Required tool '{tool}' not found in PATH")]
    ToolMissing { tool: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File system errors
    #[error("File system error for '{path}': {message}")]
    FileSystem {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Network errors outside of archive downloads
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
}

/// How far a failure reaches through the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// One (client, architecture) build
    Build,
    /// Every architecture of one client
    Client,
    /// The whole run
    Run,
}

impl ZoteroDebError {
    /// Scope of the failure, used by the pipeline to decide what keeps going
    pub fn scope(&self) -> FailureScope {
        match self {
            ZoteroDebError::Fetch { .. } | ZoteroDebError::Packaging { .. } => FailureScope::Build,
            ZoteroDebError::VersionDiscovery { .. } => FailureScope::Client,
            _ => FailureScope::Run,
        }
    }

    /// Create a version discovery error
    pub fn discovery(client: impl Into<String>, reason: impl Into<String>) -> Self {
        ZoteroDebError::VersionDiscovery {
            client: client.into(),
            reason: reason.into(),
        }
    }

    /// Create a publish error
    pub fn publish(step: impl Into<String>, reason: impl Into<String>) -> Self {
        ZoteroDebError::Publish {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        ZoteroDebError::Network {
            url: url.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(
        path: impl AsRef<std::path::Path>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        ZoteroDebError::FileSystem {
            path: path.as_ref().display().to_string(),
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Result type alias for zotero-deb operations
pub type ZoteroDebResult<T> = std::result::Result<T, ZoteroDebError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packaging_display_names_stage() {
        let err = ZoteroDebError::Packaging {
            client: "zotero".to_string(),
            version: "6.0.27".to_string(),
            arch: "amd64".to_string(),
            stage: BuildStage::Packaging,
            reason: "dpkg-deb exited with code 2".to_string(),
            exit_code: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Packaging zotero 6.0.27 (amd64) failed while packaging: dpkg-deb exited with code 2"
        );
    }

    #[test]
    fn test_upload_display() {
        let err = ZoteroDebError::Upload {
            failed: vec!["Packages".to_string(), "Release".to_string()],
        };
        assert_eq!(err.to_string(), "Upload failed for 2 file(s): Packages, Release");
    }

    #[test]
    fn test_failure_scope() {
        let fetch = ZoteroDebError::Fetch {
            client: "jurism".to_string(),
            arch: "i386".to_string(),
            url: "https://example.invalid".to_string(),
            reason: "HTTP 404".to_string(),
        };
        assert_eq!(fetch.scope(), FailureScope::Build);

        let discovery = ZoteroDebError::discovery("zotero", "marker not found");
        assert_eq!(discovery.scope(), FailureScope::Client);

        let publish = ZoteroDebError::publish("release", "apt-ftparchive failed");
        assert_eq!(publish.scope(), FailureScope::Run);
    }
}
