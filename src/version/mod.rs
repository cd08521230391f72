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

//! Latest-release discovery.
//!
//! Each vendor publishes its current version differently, so discovery sits
//! behind [`VersionSource`]; the build pipeline only sees
//! [`ResolvedVersion`] values.

pub mod jurism;
pub mod zotero;

pub use jurism::JurismSource;
pub use zotero::ZoteroSource;

use async_trait::async_trait;

use crate::client::{Arch, ClientSpec, PackageIdentity};
use crate::config::HttpConfig;
use crate::error::{ZoteroDebError, ZoteroDebResult};
use crate::fetch::build_client;

/// A version ready to be fetched for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub client_id: String,
    pub version: String,
    pub arch: Arch,
    pub download_url: String,
}

impl ResolvedVersion {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.client_id.clone(), self.version.clone(), self.arch)
    }
}

/// Vendor-specific release discovery
#[async_trait]
pub trait VersionSource: Send + Sync {
    fn spec(&self) -> &ClientSpec;

    /// Current release as seen from a host with the given machine name
    async fn latest_version(&self, platform_machine: &str) -> ZoteroDebResult<String>;

    /// Release archive location for one architecture
    fn download_url(&self, version: &str, arch: Arch) -> String;
}

/// Discover the current version once and expand it to every architecture.
pub async fn resolve(
    source: &dyn VersionSource,
    platform_machine: &str,
    architectures: &[Arch],
) -> ZoteroDebResult<Vec<ResolvedVersion>> {
    let client_id = &source.spec().client_id;
    let version = source.latest_version(platform_machine).await?;
    check_version(client_id, &version)?;

    tracing::info!(client = %client_id, version = %version, "resolved latest release");

    Ok(architectures
        .iter()
        .map(|arch| ResolvedVersion {
            client_id: client_id.clone(),
            version: version.clone(),
            arch: *arch,
            download_url: source.download_url(&version, *arch),
        })
        .collect())
}

/// The version ends up in a file name and a control file
fn check_version(client_id: &str, version: &str) -> ZoteroDebResult<()> {
    if version.is_empty() {
        return Err(ZoteroDebError::discovery(client_id, "empty version"));
    }
    if version.contains(|c: char| c.is_whitespace() || c == '/' || c == '_') {
        return Err(ZoteroDebError::discovery(
            client_id,
            format!("version '{}' is not usable in a package name", version),
        ));
    }
    Ok(())
}

/// Discovery source for a known client id
pub fn source_for(spec: ClientSpec, http: &HttpConfig) -> ZoteroDebResult<Box<dyn VersionSource>> {
    let client_id = spec.client_id.clone();
    let client_err =
        |e: reqwest::Error| ZoteroDebError::discovery(&client_id, format!("HTTP client: {}", e));

    match client_id.as_str() {
        "zotero" => {
            let client = build_client(http, true).map_err(client_err)?;
            Ok(Box::new(ZoteroSource::new(spec, client)))
        }
        "jurism" => {
            let client = build_client(http, false).map_err(client_err)?;
            Ok(Box::new(JurismSource::new(spec, client)))
        }
        other => Err(ZoteroDebError::Config {
            message: format!("no version source for client '{}'", other),
        }),
    }
}
