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

//! Release hosting: named file uploads attached to a release tag.

use std::path::Path;

use crate::config::HostingConfig;
use crate::error::{ZoteroDebError, ZoteroDebResult};
use crate::tools::{run_checked, ToolCommand, ToolRunner};

/// Tools the upload step shells out to
pub const HOSTING_TOOLS: [&str; 1] = ["github-release"];

/// Somewhere the repository files can be published
pub trait ReleaseHost {
    /// Create the release if it does not exist yet
    fn ensure_release(&self, name: &str, description: &str) -> ZoteroDebResult<()>;

    /// Upload one file under its own name, replacing an earlier upload
    fn upload(&self, file: &Path) -> ZoteroDebResult<()>;
}

/// GitHub releases through the `github-release` command line tool
pub struct GithubReleaseCli<'a> {
    runner: &'a dyn ToolRunner,
    user: String,
    repo: String,
    tag: String,
}

impl<'a> GithubReleaseCli<'a> {
    pub fn new(runner: &'a dyn ToolRunner, hosting: &HostingConfig) -> Self {
        Self {
            runner,
            user: hosting.user.clone(),
            repo: hosting.repo.clone(),
            tag: hosting.tag.clone(),
        }
    }

    fn command(&self, action: &str) -> ToolCommand {
        ToolCommand::new("github-release")
            .arg(action)
            .args(["--user", self.user.as_str()])
            .args(["--repo", self.repo.as_str()])
            .args(["--tag", self.tag.as_str()])
    }
}

impl ReleaseHost for GithubReleaseCli<'_> {
    fn ensure_release(&self, name: &str, description: &str) -> ZoteroDebResult<()> {
        if run_checked(self.runner, &self.command("info")).is_ok() {
            tracing::debug!(tag = %self.tag, "release already exists");
            return Ok(());
        }

        let cmd = self
            .command("release")
            .args(["--name", name, "--description", description]);
        run_checked(self.runner, &cmd)
            .map_err(|f| ZoteroDebError::publish("release creation", f.reason))?;

        tracing::info!(tag = %self.tag, "created release");
        Ok(())
    }

    fn upload(&self, file: &Path) -> ZoteroDebResult<()> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ZoteroDebError::publish("upload", format!("{} has no file name", file.display()))
            })?;

        let mut cmd = self
            .command("upload")
            .args(["--name", name.as_str(), "--file", name.as_str(), "--replace"]);
        if let Some(dir) = file.parent() {
            cmd = cmd.current_dir(dir);
        }

        run_checked(self.runner, &cmd)
            .map_err(|f| ZoteroDebError::publish(format!("upload of {}", name), f.reason))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::RecordingRunner;
    use crate::tools::ToolOutput;

    #[test]
    fn test_existing_release_is_reused() {
        let runner = RecordingRunner::new();
        let host = GithubReleaseCli::new(&runner, &HostingConfig::default());

        host.ensure_release("Debian packages", "desc").unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec!["info", "--user", "retorquere", "--repo", "zotero_deb", "--tag", "apt-get"]
        );
    }

    #[test]
    fn test_missing_release_is_created() {
        let runner = RecordingRunner::new().respond("github-release", |cmd| {
            if cmd.args[0] == "info" {
                ToolOutput::failed(1, "release not found")
            } else {
                ToolOutput::ok(Vec::new())
            }
        });
        let host = GithubReleaseCli::new(&runner, &HostingConfig::default());

        host.ensure_release("Debian packages for Zotero/Juris-M", "one-time install").unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[0], "release");
        assert_eq!(
            &calls[1].args[7..],
            &["--name", "Debian packages for Zotero/Juris-M", "--description", "one-time install"]
        );
    }

    #[test]
    fn test_upload_replaces_by_name() {
        let runner = RecordingRunner::new();
        let host = GithubReleaseCli::new(&runner, &HostingConfig::default());

        host.upload(Path::new("/srv/repo/Packages.bz2")).unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.cwd.as_deref(), Some(Path::new("/srv/repo")));
        assert_eq!(
            &call.args[7..],
            &["--name", "Packages.bz2", "--file", "Packages.bz2", "--replace"]
        );
    }
}
