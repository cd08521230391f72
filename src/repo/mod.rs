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

//! Signed apt repository generation and publishing.
//!
//! The index files are always regenerated from scratch out of the `.deb`
//! files currently in the repository directory; old `Packages`/`Release`
//! files are removed first so nothing stale can be signed or uploaded.

pub mod hosting;
pub mod index;

pub use hosting::{GithubReleaseCli, ReleaseHost};

use console::style;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, HostingConfig};
use crate::error::{ZoteroDebError, ZoteroDebResult};
use crate::tools::{run_checked, ToolCommand, ToolRunner};

/// Tools the publish step shells out to
pub const PUBLISH_TOOLS: [&str; 3] = ["gpg", "apt-ftparchive", "bzip2"];

pub const PUBLIC_KEY_FILE: &str = "deb.gpg.key";
pub const INSTALL_SCRIPT: &str = "install.sh";

/// Derived files regenerated on every publish
const INDEX_FILES: [&str; 4] = ["Packages", "Packages.bz2", "Release", "Release.gpg"];

/// Settings for one publish run
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub repo_dir: PathBuf,
    pub signing_key: String,
    pub hosting: HostingConfig,
}

impl PublishSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repo_dir: config.repo_dir.clone(),
            signing_key: config.signing.key.clone(),
            hosting: config.hosting.clone(),
        }
    }
}

/// What a publish run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Package files listed in the index
    pub packages: Vec<String>,
    /// Files accepted by the hosting target
    pub uploaded: Vec<String>,
}

/// Two-line installer: trust the key, add the apt source
pub fn install_script(hosting: &HostingConfig) -> String {
    let base = hosting.base_url();
    let lines = [
        format!("curl --silent -L {}{} | sudo apt-key add -", base, PUBLIC_KEY_FILE),
        String::new(),
        format!("cat << EOF | sudo tee /etc/apt/sources.list.d/{}.list", hosting.list_name),
        format!("deb {} ./", base),
        "EOF".to_string(),
    ];

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Turns a directory of signed packages into a signed apt repository
pub struct RepositoryPublisher<'a> {
    settings: PublishSettings,
    runner: &'a dyn ToolRunner,
}

impl<'a> RepositoryPublisher<'a> {
    pub fn new(settings: PublishSettings, runner: &'a dyn ToolRunner) -> Self {
        Self { settings, runner }
    }

    fn repo_dir(&self) -> &Path {
        &self.settings.repo_dir
    }

    /// Regenerate and sign the repository metadata, then upload everything
    /// to `host` when one is given.
    pub fn publish(&self, host: Option<&dyn ReleaseHost>) -> ZoteroDebResult<PublishReport> {
        let repo_dir = self.repo_dir().to_path_buf();
        fs::create_dir_all(&repo_dir).map_err(|e| {
            ZoteroDebError::filesystem(&repo_dir, "cannot create repository directory", e)
        })?;
        self.remove_stale_indices()?;

        println!(
            "{} Publishing {}",
            style("::").cyan().bold(),
            style(repo_dir.display()).yellow().bold()
        );

        self.export_public_key()?;
        let packages = self.write_package_index()?;
        self.write_release()?;
        self.write_install_script()?;

        let mut report = PublishReport {
            packages,
            uploaded: Vec::new(),
        };

        if let Some(host) = host {
            report.uploaded = self.upload(host)?;
        }

        Ok(report)
    }

    fn remove_stale_indices(&self) -> ZoteroDebResult<()> {
        for name in INDEX_FILES {
            let path = self.repo_dir().join(name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    ZoteroDebError::filesystem(&path, "cannot remove stale index", e)
                })?;
            }
        }
        Ok(())
    }

    /// Run a tool inside the repository directory and capture its stdout
    fn capture(&self, step: &str, cmd: ToolCommand) -> ZoteroDebResult<Vec<u8>> {
        let cmd = cmd.current_dir(self.repo_dir());
        run_checked(self.runner, &cmd)
            .map(|output| output.stdout)
            .map_err(|f| ZoteroDebError::publish(step, f.reason))
    }

    fn write_file(&self, name: &str, content: &[u8]) -> ZoteroDebResult<()> {
        let path = self.repo_dir().join(name);
        println!("   {} writing {}", style("->").blue(), name);
        fs::write(&path, content)
            .map_err(|e| ZoteroDebError::filesystem(&path, "cannot write repository file", e))
    }

    fn export_public_key(&self) -> ZoteroDebResult<()> {
        let key = self.capture(
            "public key export",
            ToolCommand::new("gpg").args(["--armor", "--export"]).arg(&self.settings.signing_key),
        )?;

        if key.iter().all(u8::is_ascii_whitespace) {
            return Err(ZoteroDebError::publish(
                "public key export",
                format!("gpg has no public key for '{}'", self.settings.signing_key),
            ));
        }
        self.write_file(PUBLIC_KEY_FILE, &key)
    }

    fn write_package_index(&self) -> ZoteroDebResult<Vec<String>> {
        let nested = index::nested_packages(self.repo_dir())
            .map_err(|e| ZoteroDebError::filesystem(self.repo_dir(), "cannot scan repository", e))?;
        if !nested.is_empty() {
            return Err(ZoteroDebError::publish(
                "package index",
                format!("packages outside the repository root: {}", nested.join(", ")),
            ));
        }

        let on_disk = index::package_files(self.repo_dir())
            .map_err(|e| ZoteroDebError::filesystem(self.repo_dir(), "cannot list packages", e))?;

        let packages = self.capture(
            "package index",
            ToolCommand::new("apt-ftparchive").args(["packages", "."]),
        )?;
        let text = String::from_utf8_lossy(&packages);
        index::check_complete(&on_disk, &text)?;
        tracing::info!(packages = on_disk.len(), "package index covers repository");

        self.write_file("Packages", &packages)?;
        self.capture("index compression", ToolCommand::new("bzip2").args(["-kf", "Packages"]))?;

        Ok(on_disk)
    }

    fn write_release(&self) -> ZoteroDebResult<()> {
        let release = self.capture(
            "release manifest",
            ToolCommand::new("apt-ftparchive").args(["release", "."]),
        )?;
        self.write_file("Release", &release)?;

        println!(
            "   {} signing Release as {}",
            style("->").blue(),
            style(&self.settings.signing_key).cyan()
        );
        self.capture(
            "release signature",
            ToolCommand::new("gpg")
                .args(["--yes", "-abs", "-u"])
                .arg(&self.settings.signing_key)
                .args(["-o", "Release.gpg", "Release"]),
        )?;
        Ok(())
    }

    fn write_install_script(&self) -> ZoteroDebResult<()> {
        self.write_file(INSTALL_SCRIPT, install_script(&self.settings.hosting).as_bytes())
    }

    /// Upload every file; failures are collected rather than stopping the loop
    fn upload(&self, host: &dyn ReleaseHost) -> ZoteroDebResult<Vec<String>> {
        let hosting = &self.settings.hosting;
        host.ensure_release(&hosting.release_name, &hosting.description())?;

        let files = index::publishable_files(self.repo_dir())
            .map_err(|e| ZoteroDebError::filesystem(self.repo_dir(), "cannot list repository", e))?;

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();

        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match host.upload(&file) {
                Ok(()) => {
                    println!("   {} uploaded {}", style("->").green(), name);
                    uploaded.push(name);
                }
                Err(e) => {
                    println!("   {} upload of {} failed: {}", style("->").red(), name, e);
                    tracing::error!(file = %name, error = %e, "upload failed");
                    failed.push(name);
                }
            }
        }

        if failed.is_empty() {
            Ok(uploaded)
        } else {
            Err(ZoteroDebError::Upload { failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::RecordingRunner;
    use crate::tools::ToolOutput;
    use std::cell::RefCell;
    use tempfile::{tempdir, TempDir};

    /// Behaves like apt-ftparchive and gpg closely enough for the publisher
    fn archive_runner() -> RecordingRunner {
        RecordingRunner::new()
            .respond("apt-ftparchive", |cmd| {
                if cmd.args[0] == "release" {
                    return ToolOutput::ok(b"Date: Mon, 19 Oct 2026 10:00:00 UTC\n".to_vec());
                }
                let dir = cmd.cwd.clone().unwrap();
                let mut out = String::new();
                for name in index::package_files(&dir).unwrap() {
                    let package = name.split('_').next().unwrap().to_string();
                    out.push_str(&format!("Package: {}\nFilename: ./{}\n\n", package, name));
                }
                ToolOutput::ok(out.into_bytes())
            })
            .respond("gpg", |cmd| {
                if cmd.args.contains(&"--export".to_string()) {
                    ToolOutput::ok(b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n".to_vec())
                } else {
                    ToolOutput::ok(Vec::new())
                }
            })
    }

    fn settings(dir: &TempDir) -> PublishSettings {
        PublishSettings {
            repo_dir: dir.path().join("repo"),
            signing_key: "dpkg".to_string(),
            hosting: HostingConfig::default(),
        }
    }

    fn seed(repo: &Path, names: &[&str]) {
        fs::create_dir_all(repo).unwrap();
        for name in names {
            fs::write(repo.join(name), b"!<arch>\n").unwrap();
        }
    }

    #[derive(Default)]
    struct MemoryHost {
        releases: RefCell<Vec<String>>,
        uploads: RefCell<Vec<String>>,
        reject: Option<&'static str>,
    }

    impl ReleaseHost for MemoryHost {
        fn ensure_release(&self, name: &str, _description: &str) -> ZoteroDebResult<()> {
            self.releases.borrow_mut().push(name.to_string());
            Ok(())
        }

        fn upload(&self, file: &Path) -> ZoteroDebResult<()> {
            let name = file.file_name().unwrap().to_string_lossy().into_owned();
            if self.reject == Some(name.as_str()) {
                return Err(ZoteroDebError::publish("upload", "HTTP 502"));
            }
            self.uploads.borrow_mut().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_install_script() {
        let script = install_script(&HostingConfig::default());
        assert_eq!(
            script,
            "curl --silent -L https://github.com/retorquere/zotero_deb/releases/download/apt-get/deb.gpg.key | sudo apt-key add -\n\
             \n\
             cat << EOF | sudo tee /etc/apt/sources.list.d/zotero.list\n\
             deb https://github.com/retorquere/zotero_deb/releases/download/apt-get/ ./\n\
             EOF\n"
        );
    }

    #[test]
    fn test_publish_generates_signed_repository() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(
            &settings.repo_dir,
            &["zotero_6.0.27_i386.deb", "zotero_6.0.27_amd64.deb", "jurism_6.0.26m3_amd64.deb"],
        );
        let stale = "Filename: ./zotero_6.0.20_amd64.deb\n";
        fs::write(settings.repo_dir.join("Packages"), stale).unwrap();

        let runner = archive_runner();
        let report = RepositoryPublisher::new(settings.clone(), &runner).publish(None).unwrap();

        assert_eq!(
            report.packages,
            vec!["jurism_6.0.26m3_amd64.deb", "zotero_6.0.27_amd64.deb", "zotero_6.0.27_i386.deb"]
        );
        assert!(report.uploaded.is_empty());

        let packages = fs::read_to_string(settings.repo_dir.join("Packages")).unwrap();
        let mut listed = index::indexed_files(&packages);
        listed.sort();
        assert_eq!(listed, report.packages);

        assert!(settings.repo_dir.join(PUBLIC_KEY_FILE).is_file());
        assert!(settings.repo_dir.join("Release").is_file());
        assert!(settings.repo_dir.join(INSTALL_SCRIPT).is_file());

        let calls = runner.calls();
        let programs: Vec<&str> = calls.iter().map(|c| c.program.as_str()).collect();
        assert_eq!(programs, vec!["gpg", "apt-ftparchive", "bzip2", "apt-ftparchive", "gpg"]);
        assert_eq!(calls[2].args, vec!["-kf", "Packages"]);
        assert_eq!(
            calls[4].args,
            vec!["--yes", "-abs", "-u", "dpkg", "-o", "Release.gpg", "Release"]
        );
        assert!(calls.iter().all(|c| c.cwd.as_deref() == Some(settings.repo_dir.as_path())));
    }

    #[test]
    fn test_incomplete_index_is_not_signed() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(&settings.repo_dir, &["zotero_6.0.27_amd64.deb", "zotero_6.0.27_i386.deb"]);

        let runner = archive_runner().respond("apt-ftparchive", |_| {
            ToolOutput::ok(b"Package: zotero\nFilename: ./zotero_6.0.27_amd64.deb\n\n".to_vec())
        });
        let err = RepositoryPublisher::new(settings.clone(), &runner).publish(None).unwrap_err();

        match err {
            ZoteroDebError::IndexMismatch { missing, stale } => {
                assert_eq!(missing, vec!["zotero_6.0.27_i386.deb"]);
                assert!(stale.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!settings.repo_dir.join("Packages").exists());
        assert!(!runner.programs().contains(&"bzip2".to_string()));
    }

    #[test]
    fn test_packages_in_subdirectories_are_refused() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(&settings.repo_dir, &["zotero_6.0.27_amd64.deb"]);
        seed(&settings.repo_dir.join("old"), &["zotero_6.0.20_amd64.deb"]);

        let runner = archive_runner();
        let err = RepositoryPublisher::new(settings.clone(), &runner).publish(None).unwrap_err();

        match err {
            ZoteroDebError::Publish { step, reason } => {
                assert_eq!(step, "package index");
                assert!(reason.contains("old/zotero_6.0.20_amd64.deb"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!runner.programs().contains(&"apt-ftparchive".to_string()));
        assert!(!settings.repo_dir.join("Packages").exists());
    }

    #[test]
    fn test_missing_public_key_fails() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(&settings.repo_dir, &["zotero_6.0.27_amd64.deb"]);

        let runner = archive_runner().respond("gpg", |_| ToolOutput::ok(b"\n".to_vec()));
        let err = RepositoryPublisher::new(settings, &runner).publish(None).unwrap_err();

        assert!(matches!(
            err,
            ZoteroDebError::Publish { ref step, .. } if step == "public key export"
        ));
    }

    #[test]
    fn test_upload_everything() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(&settings.repo_dir, &["zotero_6.0.27_amd64.deb"]);

        let runner = archive_runner();
        let host = MemoryHost::default();
        let report = RepositoryPublisher::new(settings, &runner).publish(Some(&host)).unwrap();

        assert_eq!(*host.releases.borrow(), vec!["Debian packages for Zotero/Juris-M"]);
        assert_eq!(
            report.uploaded,
            vec!["Packages", "Release", "deb.gpg.key", "install.sh", "zotero_6.0.27_amd64.deb"]
        );
    }

    #[test]
    fn test_upload_failures_are_collected() {
        let dir = tempdir().unwrap();
        let settings = settings(&dir);
        seed(&settings.repo_dir, &["zotero_6.0.27_amd64.deb"]);

        let runner = archive_runner();
        let host = MemoryHost {
            reject: Some("Release"),
            ..MemoryHost::default()
        };
        let err = RepositoryPublisher::new(settings, &runner).publish(Some(&host)).unwrap_err();

        match err {
            ZoteroDebError::Upload { failed } => assert_eq!(failed, vec!["Release"]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(host.uploads.borrow().len(), 4);
    }
}
