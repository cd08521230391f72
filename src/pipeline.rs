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

//! Run orchestration: resolve every client, build every (arch, client) pair
//! one at a time, then publish the repository once.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use tracing::Instrument;

use crate::builder::{
    BuildOutcome, BuildSettings, BuildStage, BuildState, PackageBuilder, BUILD_TOOLS,
};
use crate::client::{Arch, ClientSpec};
use crate::config::Config;
use crate::error::{ZoteroDebError, ZoteroDebResult};
use crate::fetch::Downloader;
use crate::repo::hosting::HOSTING_TOOLS;
use crate::repo::{
    GithubReleaseCli, PublishReport, PublishSettings, RepositoryPublisher, PUBLISH_TOOLS,
};
use crate::tools::{ensure_available, ToolRunner};
use crate::version::{self, ResolvedVersion, VersionSource};

/// Which phases to run after building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub publish: bool,
    pub upload: bool,
}

/// Result of one (client, arch) slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Built,
    Skipped,
    /// `stage` is `None` when the version could not be resolved
    Failed { stage: Option<BuildStage>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub client_id: String,
    pub arch: Arch,
    pub version: Option<String>,
    pub status: BuildStatus,
}

/// Everything a run did
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: Vec<BuildRecord>,
    pub published: Option<PublishReport>,
    pub publish_error: Option<ZoteroDebError>,
}

impl RunSummary {
    pub fn failed_builds(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, BuildStatus::Failed { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_builds() == 0 && self.publish_error.is_none()
    }

    /// Outcome table followed by the reason of every failure
    pub fn print_builds(&self) {
        if self.records.is_empty() {
            return;
        }
        println!("{}", self.table());
        for record in &self.records {
            if let BuildStatus::Failed { reason, .. } = &record.status {
                println!(
                    "   {} {} ({}): {}",
                    style("->").red(),
                    record.client_id,
                    record.arch,
                    reason
                );
            }
        }
    }

    /// Per-build outcome table
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Client").fg(Color::Cyan),
            Cell::new("Arch").fg(Color::Cyan),
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Result").fg(Color::Cyan),
        ]);

        for record in &self.records {
            let result = match &record.status {
                BuildStatus::Built => Cell::new("built").fg(Color::Green),
                BuildStatus::Skipped => Cell::new("skipped").fg(Color::White),
                BuildStatus::Failed { stage: Some(stage), .. } => {
                    Cell::new(format!("failed at {}", stage)).fg(Color::Red)
                }
                BuildStatus::Failed { stage: None, .. } => {
                    Cell::new("version unknown").fg(Color::Red)
                }
            };
            table.add_row(vec![
                Cell::new(&record.client_id),
                Cell::new(record.arch.as_str()),
                Cell::new(record.version.as_deref().unwrap_or("-")),
                result,
            ]);
        }

        table
    }
}

/// Drives a full run against injected tools and network
pub struct Pipeline<'a> {
    config: &'a Config,
    runner: &'a dyn ToolRunner,
    downloader: &'a dyn Downloader,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn ToolRunner,
        downloader: &'a dyn Downloader,
    ) -> Self {
        Self {
            config,
            runner,
            downloader,
        }
    }

    pub async fn run(
        &self,
        sources: &[Box<dyn VersionSource>],
        options: RunOptions,
    ) -> ZoteroDebResult<RunSummary> {
        ensure_available(self.runner, &BUILD_TOOLS)?;

        println!("{} Resolving latest releases", style("::").cyan().bold());
        let resolved = self.resolve_all(sources).await;

        let mut summary = RunSummary {
            records: self.build_all(&resolved).await,
            ..RunSummary::default()
        };
        summary.print_builds();

        if options.publish {
            match self.publish(options.upload) {
                Ok(report) => summary.published = Some(report),
                Err(e) => {
                    println!("{} {}", style("error:").red().bold(), e);
                    summary.publish_error = Some(e);
                }
            }
        }

        Ok(summary)
    }

    /// A discovery failure is kept per client; it rules out all of that client's builds
    pub async fn resolve_all(
        &self,
        sources: &[Box<dyn VersionSource>],
    ) -> Vec<(ClientSpec, ZoteroDebResult<Vec<ResolvedVersion>>)> {
        let mut resolved = Vec::new();

        for source in sources {
            let spec = source.spec().clone();
            let result = version::resolve(
                source.as_ref(),
                &self.config.platform_machine,
                &self.config.architectures,
            )
            .instrument(crate::span_client!(spec.client_id))
            .await;

            match &result {
                Ok(versions) => {
                    if let Some(first) = versions.first() {
                        println!(
                            "   {} {} {}",
                            style("->").green(),
                            style(&spec.display_name).white().bold(),
                            style(&first.version).green()
                        );
                    }
                }
                Err(e) => {
                    println!("   {} {}", style("->").red(), e);
                    tracing::error!(
                        client = %spec.client_id,
                        error = %e,
                        "version discovery failed"
                    );
                }
            }
            resolved.push((spec, result));
        }

        resolved
    }

    /// Builds run strictly one after another; they share the staging area.
    pub async fn build_all(
        &self,
        resolved: &[(ClientSpec, ZoteroDebResult<Vec<ResolvedVersion>>)],
    ) -> Vec<BuildRecord> {
        let settings = BuildSettings::from_config(self.config);
        let builder = PackageBuilder::new(settings, self.runner, self.downloader);
        let mut records = Vec::new();

        for arch in &self.config.architectures {
            for (spec, versions) in resolved {
                let versions = match versions {
                    Ok(versions) => versions,
                    Err(e) => {
                        records.push(BuildRecord {
                            client_id: spec.client_id.clone(),
                            arch: *arch,
                            version: None,
                            status: BuildStatus::Failed {
                                stage: None,
                                reason: e.to_string(),
                            },
                        });
                        continue;
                    }
                };

                let Some(target) = versions.iter().find(|v| v.arch == *arch) else {
                    continue;
                };

                let status = match builder.build(spec, target).await {
                    Ok(outcome) => {
                        tracing::debug!(
                            path = %outcome.package().file_path.display(),
                            "package in repository"
                        );
                        match outcome {
                            BuildOutcome::Built(_) => BuildStatus::Built,
                            BuildOutcome::Skipped(_) => BuildStatus::Skipped,
                        }
                    }
                    Err(e) => {
                        println!("{} {}", style("error:").red().bold(), e);
                        tracing::error!(
                            client = %spec.client_id,
                            arch = %arch,
                            scope = ?e.scope(),
                            error = %e,
                            "build failed"
                        );
                        BuildStatus::Failed {
                            stage: failed_stage(&e),
                            reason: e.to_string(),
                        }
                    }
                };

                records.push(BuildRecord {
                    client_id: spec.client_id.clone(),
                    arch: *arch,
                    version: Some(target.version.clone()),
                    status,
                });
            }
        }

        records
    }

    /// Regenerate, sign and optionally upload the repository
    pub fn publish(&self, upload: bool) -> ZoteroDebResult<PublishReport> {
        ensure_available(self.runner, &PUBLISH_TOOLS)?;

        let settings = PublishSettings::from_config(self.config);
        let publisher = RepositoryPublisher::new(settings, self.runner);

        if upload {
            ensure_available(self.runner, &HOSTING_TOOLS)?;
            let host = GithubReleaseCli::new(self.runner, &self.config.hosting);
            publisher.publish(Some(&host))
        } else {
            publisher.publish(None)
        }
    }
}

fn failed_stage(error: &ZoteroDebError) -> Option<BuildStage> {
    match BuildState::failed_with(error) {
        BuildState::Failed(stage) => Some(stage),
        _ => None,
    }
}
