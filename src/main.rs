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

use anyhow::{anyhow, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;

mod builder;
mod cache;
mod client;
mod config;
mod error;
mod fetch;
mod logging;
mod pipeline;
mod repo;
mod tools;
mod version;

use client::Arch;
use config::Config;
use fetch::HttpDownloader;
use pipeline::{Pipeline, RunOptions};
use tools::SystemToolRunner;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  zotero-deb contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser)]
#[command(name = "zotero-deb")]
#[command(version = VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(about = "Build and publish a signed apt repository for Zotero and Juris-M.")]
struct Cli {
    #[arg(short, long, value_name = "PATH", help = "Configuration file")]
    config: Option<PathBuf>,
    #[arg(short, long = "arch", value_name = "ARCH", help = "Architecture to build (repeatable)")]
    arch: Vec<Arch>,
    #[arg(long = "client", value_name = "ID", help = "Client to build (repeatable)")]
    client: Vec<String>,
    #[arg(long, value_name = "DIR", help = "Repository directory")]
    repo: Option<PathBuf>,
    #[arg(long, help = "Build packages but leave the repository indices alone")]
    no_publish: bool,
    #[arg(long, help = "Publish locally without uploading")]
    no_upload: bool,
    #[arg(short, long, help = "Debug logging")]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if !self.arch.is_empty() {
            config.architectures = self.arch.clone();
        }
        if !self.client.is_empty() {
            config.clients = self.client.clone();
        }
        if let Some(repo) = &self.repo {
            config.repo_dir = repo.clone();
        }
        if self.no_upload {
            config.hosting.upload = false;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    logging::init(&config.logging.level, config.logging.file.as_deref());
    tracing::debug!(?config, "configuration loaded");

    let sources = config
        .client_specs()
        .into_iter()
        .map(|spec| version::source_for(spec, &config.http))
        .collect::<Result<Vec<_>, _>>()?;

    let runner = SystemToolRunner;
    let downloader = HttpDownloader::new(&config.http)?;
    let pipeline = Pipeline::new(&config, &runner, &downloader);

    let options = RunOptions {
        publish: !cli.no_publish,
        upload: config.hosting.upload,
    };
    let summary = pipeline.run(&sources, options).await?;

    if let Some(report) = &summary.published {
        println!(
            "{} Repository at {} lists {} packages",
            style("::").cyan().bold(),
            style(config.repo_dir.display()).white().bold(),
            report.packages.len()
        );
        if options.upload {
            println!("   {} uploaded {} files", style("->").green(), report.uploaded.len());
        }
    }

    if summary.is_success() {
        return Ok(());
    }

    let mut problems = Vec::new();
    if summary.failed_builds() > 0 {
        problems.push(format!(
            "{} of {} builds failed",
            summary.failed_builds(),
            summary.records.len()
        ));
    }
    if let Some(e) = &summary.publish_error {
        problems.push(format!("publishing failed: {}", e));
    }
    Err(anyhow!(problems.join("; ")))
}
