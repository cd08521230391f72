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

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::{Arch, ClientSpec};
use crate::error::{ZoteroDebError, ZoteroDebResult};

const CONFIG_FILE_NAME: &str = "zotero-deb.toml";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the packages and index files that get published
    pub repo_dir: PathBuf,

    /// Scratch directory, wiped before every build
    pub staging_dir: PathBuf,

    /// Debian architectures to build
    pub architectures: Vec<Arch>,

    /// Client ids to build
    pub clients: Vec<String>,

    /// Machine name reported to the vendors during version discovery
    pub platform_machine: String,

    pub signing: SigningConfig,
    pub package: PackageConfig,
    pub hosting: HostingConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("repo"),
            staging_dir: PathBuf::from("staging"),
            architectures: Arch::ALL.to_vec(),
            clients: vec!["zotero".to_string(), "jurism".to_string()],
            platform_machine: host_machine().to_string(),
            signing: SigningConfig::default(),
            package: PackageConfig::default(),
            hosting: HostingConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// GPG identity used for packages and the release file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Key name or id passed to gpg and dpkg-sig
    pub key: String,

    /// dpkg-sig signature role
    pub role: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key: "dpkg".to_string(),
            role: "builder".to_string(),
        }
    }
}

/// Values written into every control file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    pub maintainer: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            maintainer: "emiliano.heyns@iris-advies.com".to_string(),
        }
    }
}

/// Where the repository is published
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    /// GitHub account owning the release
    pub user: String,

    /// GitHub repository holding the release
    pub repo: String,

    /// Release tag the files are attached to
    pub tag: String,

    pub release_name: String,

    /// Release description; derived from `install_url` when unset
    pub description: Option<String>,

    /// Advertised location of install.sh
    pub install_url: String,

    /// Name of the apt source list file written by install.sh
    pub list_name: String,

    /// Upload after regenerating the repository
    pub upload: bool,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            user: "retorquere".to_string(),
            repo: "zotero_deb".to_string(),
            tag: "apt-get".to_string(),
            release_name: "Debian packages for Zotero/Juris-M".to_string(),
            description: None,
            install_url: "https://sourceforge.net/projects/zotero-deb/files/install.sh".to_string(),
            list_name: "zotero".to_string(),
            upload: true,
        }
    }
}

impl HostingConfig {
    /// URL the release assets are served from, with a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/releases/download/{}/",
            self.user, self.repo, self.tag
        )
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!(
                "One-time installation of the repo: 'curl --silent -L {} | sudo bash'. \
                 after this you can install and update in the usual way: \
                 'sudo apt-get update; sudo apt-get install zotero jurism'",
                self.install_url
            ),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 10,
            user_agent: concat!("zotero-deb/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (empty = no file logging)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Machine name of the running host in the vendors' vocabulary
fn host_machine() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        other => other,
    }
}

impl Config {
    /// Load configuration with precedence:
    /// 1. `explicit` path, which must exist
    /// 2. ./zotero-deb.toml
    /// 3. ~/.config/zotero-deb/config.toml
    /// 4. built-in defaults
    ///
    /// Environment variables (ZOTERO_DEB_*) are applied on top.
    pub fn load(explicit: Option<&Path>) -> ZoteroDebResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        Ok(config.apply_env_overrides(|key| std::env::var(key).ok()))
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join("zotero-deb").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> ZoteroDebResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ZoteroDebError::filesystem(path, "failed to read config", e))?;
        let config = toml::from_str::<Config>(&content).map_err(|e| ZoteroDebError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("ZOTERO_DEB_REPO_DIR") {
            self.repo_dir = PathBuf::from(val);
        }

        if let Some(val) = var("ZOTERO_DEB_GPG_KEY") {
            self.signing.key = val;
        }

        if let Some(val) = var("ZOTERO_DEB_NO_UPLOAD") {
            if val == "1" || val.eq_ignore_ascii_case("true") {
                self.hosting.upload = false;
            }
        }

        if let Some(val) = var("ZOTERO_DEB_LOG_LEVEL") {
            self.logging.level = val;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ZoteroDebResult<()> {
        let invalid = |message: &str| -> ZoteroDebResult<()> {
            Err(ZoteroDebError::Config {
                message: message.to_string(),
            })
        };

        if self.architectures.is_empty() {
            return invalid("at least one architecture must be configured");
        }
        if self.clients.is_empty() {
            return invalid("at least one client must be configured");
        }
        if let Some(unknown) = self.clients.iter().find(|c| known_client(c).is_none()) {
            return Err(ZoteroDebError::Config {
                message: format!("unknown client '{}' (expected zotero or jurism)", unknown),
            });
        }
        if self.signing.key.trim().is_empty() {
            return invalid("signing.key must not be empty");
        }
        if self.package.maintainer.trim().is_empty() {
            return invalid("package.maintainer must not be empty");
        }
        if self.http.timeout_secs == 0 {
            return invalid("http.timeout_secs must be at least 1");
        }

        // Every build wipes staging_dir, so neither directory may contain the other.
        let staging = resolve_path(&self.staging_dir);
        let repo = resolve_path(&self.repo_dir);
        if repo.starts_with(&staging) || staging.starts_with(&repo) {
            return Err(ZoteroDebError::Config {
                message: format!(
                    "staging_dir {} and repo_dir {} must not overlap",
                    staging.display(),
                    repo.display()
                ),
            });
        }
        Ok(())
    }

    /// Client specs for the configured client ids, in configuration order
    pub fn client_specs(&self) -> Vec<ClientSpec> {
        self.clients.iter().filter_map(|c| known_client(c)).collect()
    }
}

/// Absolute form of `path` with its longest existing ancestor canonicalized
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn known_client(id: &str) -> Option<ClientSpec> {
    match id {
        "zotero" => Some(ClientSpec::zotero()),
        "jurism" => Some(ClientSpec::jurism()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.repo_dir, PathBuf::from("repo"));
        assert_eq!(config.architectures, vec![Arch::I386, Arch::Amd64]);
        assert_eq!(config.signing.key, "dpkg");
        assert_eq!(config.signing.role, "builder");
        assert!(config.hosting.upload);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.architectures.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients = vec!["mendeley".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.signing.key = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.staging_dir = config.repo_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_staging_and_repo_rejected() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        fs::create_dir_all(work.join("repo")).unwrap();
        fs::create_dir_all(work.join("staging")).unwrap();

        let mut config = Config::default();
        config.staging_dir = work.clone();
        config.repo_dir = work.join("repo");
        assert!(matches!(config.validate(), Err(ZoteroDebError::Config { .. })));

        config.staging_dir = work.join("repo/tmp");
        config.repo_dir = work.clone();
        assert!(config.validate().is_err());

        config.staging_dir = work.join("staging/../repo/sub");
        config.repo_dir = work.join("repo");
        assert!(config.validate().is_err());

        config.staging_dir = dir.path().join("staging");
        config.repo_dir = work.join("repo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zotero-deb.toml");
        fs::write(
            &path,
            r#"
repo_dir = "/srv/apt"
architectures = ["amd64"]

[signing]
key = "0xDEADBEEF"

[hosting]
upload = false
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.repo_dir, PathBuf::from("/srv/apt"));
        assert_eq!(config.architectures, vec![Arch::Amd64]);
        assert_eq!(config.signing.key, "0xDEADBEEF");
        assert_eq!(config.signing.role, "builder");
        assert!(!config.hosting.upload);
        assert_eq!(config.hosting.tag, "apt-get");
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "architectures = [\"arm64\"]\n").unwrap();

        assert!(matches!(Config::from_file(&path), Err(ZoteroDebError::Config { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ZOTERO_DEB_GPG_KEY", "release-key"),
            ("ZOTERO_DEB_NO_UPLOAD", "true"),
            ("ZOTERO_DEB_REPO_DIR", "out"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.signing.key, "release-key");
        assert!(!config.hosting.upload);
        assert_eq!(config.repo_dir, PathBuf::from("out"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_no_upload_only_disables() {
        let no_upload = |value: &'static str| {
            move |k: &str| (k == "ZOTERO_DEB_NO_UPLOAD").then(|| value.to_string())
        };

        let mut config = Config::default();
        config.hosting.upload = false;
        assert!(!config.apply_env_overrides(no_upload("0")).hosting.upload);

        assert!(Config::default().apply_env_overrides(no_upload("0")).hosting.upload);
        assert!(!Config::default().apply_env_overrides(no_upload("TRUE")).hosting.upload);
    }

    #[test]
    fn test_hosting_urls() {
        let hosting = HostingConfig::default();
        assert_eq!(
            hosting.base_url(),
            "https://github.com/retorquere/zotero_deb/releases/download/apt-get/"
        );
        assert!(hosting
            .description()
            .contains("curl --silent -L https://sourceforge.net/projects/zotero-deb/files/install.sh | sudo bash"));
    }

    #[test]
    fn test_client_specs_follow_order() {
        let mut config = Config::default();
        config.clients = vec!["jurism".to_string(), "zotero".to_string()];
        let ids: Vec<String> = config.client_specs().into_iter().map(|c| c.client_id).collect();
        assert_eq!(ids, vec!["jurism", "zotero"]);
    }
}
