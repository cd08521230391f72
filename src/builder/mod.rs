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

//! Debian package assembly.
//!
//! A build moves through `Unbuilt -> Fetching -> Staged -> Packaged -> Signed`.
//! Packages are assembled and signed inside the staging area and only moved
//! into the repository once signed, so a failed or interrupted build never
//! leaves a file at the target path.

pub mod descriptor;
pub mod staging;

pub use staging::StagingArea;

use console::style;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Instrument;

use crate::cache::ArtifactCache;
use crate::client::{BuiltPackage, ClientSpec, PackageIdentity};
use crate::config::Config;
use crate::error::{ZoteroDebError, ZoteroDebResult};
use crate::fetch::Downloader;
use crate::tools::{run_checked, ToolCommand, ToolRunner};
use crate::version::ResolvedVersion;

/// Tools the build phase shells out to
pub const BUILD_TOOLS: [&str; 3] = ["tar", "dpkg-deb", "dpkg-sig"];

/// The step a build was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Fetching,
    Staging,
    Packaging,
    Signing,
    Storing,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Fetching => "fetching",
            BuildStage::Staging => "staging",
            BuildStage::Packaging => "packaging",
            BuildStage::Signing => "signing",
            BuildStage::Storing => "storing",
        };
        f.write_str(name)
    }
}

/// Progress of a single (client, architecture) build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    Fetching,
    Staged,
    Packaged,
    Signed,
    Failed(BuildStage),
}

impl BuildState {
    /// Terminal state for a build that stopped with `error`
    pub fn failed_with(error: &ZoteroDebError) -> Self {
        match error {
            ZoteroDebError::Fetch { .. } => BuildState::Failed(BuildStage::Fetching),
            ZoteroDebError::Packaging { stage, .. } => BuildState::Failed(*stage),
            _ => BuildState::Failed(BuildStage::Storing),
        }
    }
}

/// What a build call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A package with the same identity was already in the repository
    Skipped(BuiltPackage),
    /// A new signed package was added to the repository
    Built(BuiltPackage),
}

impl BuildOutcome {
    pub fn package(&self) -> &BuiltPackage {
        match self {
            BuildOutcome::Skipped(p) | BuildOutcome::Built(p) => p,
        }
    }
}

/// Settings shared by every build of a run
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub repo_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub maintainer: String,
    pub signing_key: String,
    pub signing_role: String,
}

impl BuildSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repo_dir: config.repo_dir.clone(),
            staging_dir: config.staging_dir.clone(),
            maintainer: config.package.maintainer.clone(),
            signing_key: config.signing.key.clone(),
            signing_role: config.signing.role.clone(),
        }
    }
}

/// Builds signed `.deb` files from vendor release archives
pub struct PackageBuilder<'a> {
    settings: BuildSettings,
    cache: ArtifactCache,
    staging: StagingArea,
    runner: &'a dyn ToolRunner,
    downloader: &'a dyn Downloader,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(
        settings: BuildSettings,
        runner: &'a dyn ToolRunner,
        downloader: &'a dyn Downloader,
    ) -> Self {
        Self {
            cache: ArtifactCache::new(settings.repo_dir.clone()),
            staging: StagingArea::new(settings.staging_dir.clone()),
            settings,
            runner,
            downloader,
        }
    }

    /// Build one (client, version, architecture), or skip it when already present.
    pub async fn build(
        &self,
        spec: &ClientSpec,
        resolved: &ResolvedVersion,
    ) -> ZoteroDebResult<BuildOutcome> {
        let identity = resolved.identity();

        if !self.cache.should_build(&identity) {
            let existing = self.cache.existing(&identity);
            println!("   {} not rebuilding {}", style("->").dim(), existing.file_path.display());
            tracing::debug!(package = %identity, "already in repository");
            return Ok(BuildOutcome::Skipped(existing));
        }

        println!(
            "{} Building {}",
            style("::").cyan().bold(),
            style(identity.file_name()).yellow().bold()
        );

        let mut state = BuildState::Unbuilt;
        let result = self
            .run_stages(spec, resolved, &identity, &mut state)
            .instrument(crate::span_build!(identity.file_name()))
            .await;

        match result {
            Ok(package) => {
                println!(
                    "   {} {} ready",
                    style("->").green(),
                    style(identity.file_name()).white().bold()
                );
                Ok(BuildOutcome::Built(package))
            }
            Err(e) => {
                tracing::warn!(
                    package = %identity,
                    reached = ?state,
                    state = ?BuildState::failed_with(&e),
                    error = %e,
                    "build failed"
                );
                let _ = fs::remove_file(self.staging.output_path(&identity));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        spec: &ClientSpec,
        resolved: &ResolvedVersion,
        identity: &PackageIdentity,
        state: &mut BuildState,
    ) -> ZoteroDebResult<BuiltPackage> {
        self.staging.reset().map_err(|e| {
            let reason = format!("cannot reset staging area: {}", e);
            self.packaging_error(identity, BuildStage::Staging, reason, None)
        })?;

        *state = BuildState::Fetching;
        self.fetch(resolved).await?;

        self.stage(spec, identity)?;
        *state = BuildState::Staged;

        let output = self.staging.output_path(identity);
        self.package(identity, &output)?;
        *state = BuildState::Packaged;

        self.sign(identity, &output)?;
        *state = BuildState::Signed;

        self.store(identity, &output)
    }

    async fn fetch(&self, resolved: &ResolvedVersion) -> ZoteroDebResult<()> {
        println!("   {} downloading {}", style("->").blue(), style(&resolved.download_url).dim());

        let bytes = self
            .downloader
            .download(&resolved.download_url, &self.staging.archive_path())
            .await
            .map_err(|e| ZoteroDebError::Fetch {
                client: resolved.client_id.clone(),
                arch: resolved.arch.to_string(),
                url: resolved.download_url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            client = %resolved.client_id,
            arch = %resolved.arch,
            bytes,
            "archive downloaded"
        );
        Ok(())
    }

    fn stage(&self, spec: &ClientSpec, identity: &PackageIdentity) -> ZoteroDebResult<()> {
        let io_err = |what: &str, e: std::io::Error| {
            self.packaging_error(identity, BuildStage::Staging, format!("{}: {}", what, e), None)
        };

        self.staging
            .prepare_tree(spec)
            .map_err(|e| io_err("cannot create package tree", e))?;

        println!("   {} extracting archive...", style("->").blue());
        run_checked(self.runner, &self.staging.extract_command(spec)).map_err(|f| {
            self.packaging_error(identity, BuildStage::Staging, f.reason, f.exit_code)
        })?;

        write_descriptor(&self.staging.desktop_path(spec), &descriptor::desktop_entry(spec))
            .map_err(|e| io_err("cannot write desktop entry", e))?;
        let control = descriptor::control_file(
            spec,
            &identity.version,
            identity.arch,
            &self.settings.maintainer,
        );
        write_descriptor(&self.staging.control_path(), &control)
            .map_err(|e| io_err("cannot write control file", e))?;

        Ok(())
    }

    fn package(&self, identity: &PackageIdentity, output: &Path) -> ZoteroDebResult<()> {
        println!("   {} running dpkg-deb...", style("->").blue());
        let cmd = ToolCommand::new("dpkg-deb")
            .args(["--build", "-Zgzip"])
            .path_arg(&self.staging.tree())
            .path_arg(output);

        run_checked(self.runner, &cmd).map_err(|f| {
            self.packaging_error(identity, BuildStage::Packaging, f.reason, f.exit_code)
        })?;

        if !output.is_file() {
            return Err(self.packaging_error(
                identity,
                BuildStage::Packaging,
                format!("dpkg-deb reported success but {} is missing", output.display()),
                None,
            ));
        }
        Ok(())
    }

    fn sign(&self, identity: &PackageIdentity, output: &Path) -> ZoteroDebResult<()> {
        println!(
            "   {} signing as {}...",
            style("->").blue(),
            style(&self.settings.signing_role).cyan()
        );
        let cmd = ToolCommand::new("dpkg-sig")
            .arg("-k")
            .arg(&self.settings.signing_key)
            .arg("--sign")
            .arg(&self.settings.signing_role)
            .path_arg(output);

        run_checked(self.runner, &cmd).map_err(|f| {
            self.packaging_error(identity, BuildStage::Signing, f.reason, f.exit_code)
        })?;
        Ok(())
    }

    /// Move the signed package into the repository
    fn store(&self, identity: &PackageIdentity, output: &Path) -> ZoteroDebResult<BuiltPackage> {
        let target = self.cache.target_path(identity);
        move_into_repo(output, &target).map_err(|e| {
            let reason = format!("cannot move package into repository: {}", e);
            self.packaging_error(identity, BuildStage::Storing, reason, None)
        })?;

        Ok(BuiltPackage {
            identity: identity.clone(),
            file_path: target,
        })
    }

    fn packaging_error(
        &self,
        identity: &PackageIdentity,
        stage: BuildStage,
        reason: String,
        exit_code: Option<i32>,
    ) -> ZoteroDebError {
        ZoteroDebError::Packaging {
            client: identity.client_id.clone(),
            version: identity.version.clone(),
            arch: identity.arch.to_string(),
            stage,
            reason,
            exit_code,
        }
    }
}

fn write_descriptor(path: &Path, content: &str) -> std::io::Result<()> {
    tracing::debug!(path = %path.display(), "writing descriptor");
    fs::write(path, content)
}

/// Rename when possible; across filesystems copy to a hidden temporary name
/// in the repository first so the final rename is still atomic.
fn move_into_repo(from: &Path, to: &Path) -> std::io::Result<()> {
    let repo_dir = to.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(repo_dir)?;

    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let file_name = to.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let partial = repo_dir.join(format!(".{}.part", file_name));
    fs::copy(from, &partial)?;
    if let Err(e) = fs::rename(&partial, to) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::remove_file(from)
}
