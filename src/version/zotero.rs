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

//! Zotero: the version is embedded in the download page.
//!
//! The page renders its download widget from an inline script whose argument
//! object carries `standaloneVersions`, a map from platform key
//! (`linux-x86_64`, `linux-i686`, `mac`, ...) to version.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

use super::VersionSource;
use crate::client::{Arch, ClientSpec};
use crate::error::{ZoteroDebError, ZoteroDebResult};

const DOWNLOAD_PAGE: &str = "https://www.zotero.org/download/";
const MARKER: &str = "\"standaloneVersions\"";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadPayload {
    standalone_versions: HashMap<String, String>,
}

/// Scrapes the Zotero download page
pub struct ZoteroSource {
    spec: ClientSpec,
    client: reqwest::Client,
    page_url: String,
}

impl ZoteroSource {
    pub fn new(spec: ClientSpec, client: reqwest::Client) -> Self {
        Self::with_page_url(spec, client, DOWNLOAD_PAGE)
    }

    /// Scrape a different download page, e.g. a mirror
    pub fn with_page_url(
        spec: ClientSpec,
        client: reqwest::Client,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            spec,
            client,
            page_url: page_url.into(),
        }
    }

    async fn fetch_page(&self) -> ZoteroDebResult<String> {
        let response = self
            .client
            .get(&self.page_url)
            .send()
            .await
            .map_err(|e| ZoteroDebError::network(&self.page_url, e))?;

        if !response.status().is_success() {
            return Err(ZoteroDebError::discovery(
                &self.spec.client_id,
                format!("{} returned HTTP {}", self.page_url, response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| ZoteroDebError::network(&self.page_url, e))
    }
}

#[async_trait]
impl VersionSource for ZoteroSource {
    fn spec(&self) -> &ClientSpec {
        &self.spec
    }

    async fn latest_version(&self, platform_machine: &str) -> ZoteroDebResult<String> {
        let page = self.fetch_page().await?;
        let platform_key = format!("linux-{}", platform_machine);
        parse_standalone_versions(&page, &platform_key)
            .map_err(|reason| ZoteroDebError::discovery(&self.spec.client_id, reason))
    }

    fn download_url(&self, version: &str, arch: Arch) -> String {
        format!(
            "https://www.zotero.org/download/client/dl?channel=release&platform=linux-{}&version={}",
            self.spec.machine(arch),
            version
        )
    }
}

/// Pull the version for `platform_key` out of the download page markup.
pub fn parse_standalone_versions(page: &str, platform_key: &str) -> Result<String, String> {
    let line = page
        .lines()
        .find(|line| line.contains(MARKER))
        .ok_or_else(|| format!("marker {} not found on download page", MARKER))?;

    let prefix = Regex::new(r".*Downloads,").map_err(|e| e.to_string())?;
    let payload = prefix.replace(line, "").replace("),", "");

    // The script call may continue after the object; only the first value counts.
    let decoded = serde_json::Deserializer::from_str(payload.trim())
        .into_iter::<DownloadPayload>()
        .next()
        .ok_or_else(|| "empty version payload".to_string())?
        .map_err(|e| format!("version payload is not valid JSON: {}", e))?;

    decoded
        .standalone_versions
        .get(platform_key)
        .cloned()
        .ok_or_else(|| format!("no standalone version listed for {}", platform_key))
}
