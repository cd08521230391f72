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

//! Juris-M: the version is read from the release-check redirect.

use async_trait::async_trait;
use url::Url;

use super::VersionSource;
use crate::client::{Arch, ClientSpec};
use crate::error::{ZoteroDebError, ZoteroDebResult};

const RELEASE_CHECK: &str = "https://our.law.nagoya-u.ac.jp/jurism/dl";

/// Asks the Juris-M release endpoint where the current build lives
pub struct JurismSource {
    spec: ClientSpec,
    /// Must not follow redirects
    client: reqwest::Client,
    endpoint: String,
}

impl JurismSource {
    pub fn new(spec: ClientSpec, client: reqwest::Client) -> Self {
        Self::with_endpoint(spec, client, RELEASE_CHECK)
    }

    /// Ask a different release-check endpoint
    pub fn with_endpoint(
        spec: ClientSpec,
        client: reqwest::Client,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            spec,
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn redirect_location(&self, platform_machine: &str) -> ZoteroDebResult<String> {
        let platform = format!("linux-{}", platform_machine);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("channel", "release"), ("platform", platform.as_str())])
            .send()
            .await
            .map_err(|e| ZoteroDebError::network(&self.endpoint, e))?;

        let status = response.status();
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ZoteroDebError::discovery(
                    &self.spec.client_id,
                    format!("release check answered HTTP {} without a Location header", status),
                )
            })
    }
}

#[async_trait]
impl VersionSource for JurismSource {
    fn spec(&self) -> &ClientSpec {
        &self.spec
    }

    async fn latest_version(&self, platform_machine: &str) -> ZoteroDebResult<String> {
        let location = self.redirect_location(platform_machine).await?;
        tracing::debug!(
            client = %self.spec.client_id,
            location = %location,
            "release check redirect"
        );

        version_from_location(&self.endpoint, &location)
            .map_err(|reason| ZoteroDebError::discovery(&self.spec.client_id, reason))
    }

    fn download_url(&self, version: &str, arch: Arch) -> String {
        let tag = urlencoding::encode(&format!("client/release/{}", version)).into_owned();
        format!(
            "https://github.com/Juris-M/assets/releases/download/{}/Jurism-{}_linux-{}.tar.bz2",
            tag,
            version,
            self.spec.machine(arch)
        )
    }
}

/// The version is the second-to-last path segment of the redirect target.
///
/// Release tags are sometimes percent-encoded paths (`client%2Frelease%2F<v>`);
/// those are decoded and only their final component is kept.
pub fn version_from_location(endpoint: &str, location: &str) -> Result<String, String> {
    let base = Url::parse(endpoint).map_err(|e| format!("invalid endpoint {}: {}", endpoint, e))?;
    let target = base
        .join(location)
        .map_err(|e| format!("invalid Location '{}': {}", location, e))?;

    let segments: Vec<&str> = target
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return Err(format!("Location '{}' has no version segment", location));
    }

    let segment = segments[segments.len() - 2];
    let decoded = urlencoding::decode(segment)
        .map_err(|e| format!("undecodable segment '{}': {}", segment, e))?;
    let version = decoded.rsplit('/').next().unwrap_or_default().trim();

    if version.is_empty() {
        return Err(format!("Location '{}' has an empty version segment", location));
    }
    Ok(version.to_string())
}
