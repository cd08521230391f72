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

//! Release archive downloads.

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::HttpConfig;

/// Why an archive could not be fetched
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected content type '{0}'")]
    ContentType(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability to fetch a URL into a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Build an HTTP client from configuration
pub fn build_client(
    config: &HttpConfig,
    follow_redirects: bool,
) -> reqwest::Result<reqwest::Client> {
    let policy = if follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .user_agent(config.user_agent.clone())
        .redirect(policy)
        .build()
}

/// A release archive is never served as a web page or API document
pub fn is_archive_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let content_type = content_type.to_ascii_lowercase();
    !(content_type.starts_with("text/")
        || content_type.contains("html")
        || content_type.contains("json"))
}

/// reqwest-backed downloader with a byte progress bar
pub struct HttpDownloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpDownloader {
    pub fn new(config: &HttpConfig) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(config, true)?,
            show_progress: console::user_attended(),
        })
    }

    fn progress_bar(&self, total: u64) -> Option<ProgressBar> {
        if !self.show_progress || total == 0 {
            return None;
        }
        let pb = ProgressBar::new(total);
        let template =
            "   {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_archive_content_type(content_type.as_deref()) {
            return Err(DownloadError::ContentType(content_type.unwrap_or_default()));
        }

        let io_err = |source: std::io::Error| DownloadError::Io {
            path: dest.display().to_string(),
            source,
        };

        let pb = self.progress_bar(response.content_length().unwrap_or(0));
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
            if let Some(ref pb) = pb {
                pb.set_position(written);
            }
        }
        file.flush().await.map_err(io_err)?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        Ok(written)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::tempdir;

    #[test]
    fn test_archive_content_types() {
        assert!(is_archive_content_type(None));
        assert!(is_archive_content_type(Some("application/x-bzip2")));
        assert!(is_archive_content_type(Some("application/octet-stream")));
        assert!(!is_archive_content_type(Some("text/html; charset=utf-8")));
        assert!(!is_archive_content_type(Some("application/json")));
    }

    #[test]
    fn test_status_error_display() {
        let err = DownloadError::Status(reqwest::StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
    }

    #[tokio::test]
    async fn test_download_writes_archive() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/zotero.tar.bz2")
            .with_status(200)
            .with_header("content-type", "application/x-bzip2")
            .with_body("BZh91AY")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("client.tar.bz2");
        let downloader = HttpDownloader::new(&HttpConfig::default()).unwrap();

        let bytes = downloader
            .download(&format!("{}/zotero.tar.bz2", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"BZh91AY");
    }

    #[tokio::test]
    async fn test_download_rejects_error_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.tar.bz2")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("client.tar.bz2");
        let downloader = HttpDownloader::new(&HttpConfig::default()).unwrap();

        let err = downloader
            .download(&format!("{}/missing.tar.bz2", server.url()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Status(s) if s == reqwest::StatusCode::NOT_FOUND));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_rejects_html_page() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/zotero.tar.bz2")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html>Please log in</html>")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("client.tar.bz2");
        let downloader = HttpDownloader::new(&HttpConfig::default()).unwrap();

        let err = downloader
            .download(&format!("{}/zotero.tar.bz2", server.url()), &dest)
            .await
            .unwrap_err();

        match err {
            DownloadError::ContentType(content_type) => {
                assert!(content_type.starts_with("text/html"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dest.exists());
    }
}
