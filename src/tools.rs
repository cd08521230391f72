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

//! External tool invocation.
//!
//! Packaging, signing, indexing and uploading are done by tools installed on
//! the host (`dpkg-deb`, `dpkg-sig`, `gpg`, `apt-ftparchive`, `bzip2`, `tar`,
//! `github-release`). Everything that shells out goes through [`ToolRunner`]
//! so the build and publish logic can run against a recording fake.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ZoteroDebError, ZoteroDebResult};

/// A program invocation: command, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn path_arg(mut self, path: &Path) -> Self {
        self.args.push(path.display().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cwd) = &self.cwd {
            write!(f, "(cd {}) ", cwd.display())?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Exit status plus captured output of a finished tool
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: Vec::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Why a tool invocation did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub exit_code: Option<i32>,
    pub reason: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Capability to run external programs
pub trait ToolRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr
    fn run(&self, command: &ToolCommand) -> std::io::Result<ToolOutput>;

    /// Whether the program can be found
    fn is_available(&self, program: &str) -> bool;
}

/// Runs tools as child processes of this one
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, command: &ToolCommand) -> std::io::Result<ToolOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let output = cmd.output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Run a command and turn a non-zero exit or spawn error into a [`ToolFailure`]
pub fn run_checked(
    runner: &dyn ToolRunner,
    command: &ToolCommand,
) -> Result<ToolOutput, ToolFailure> {
    tracing::debug!(command = %command, "running tool");

    match runner.run(command) {
        Ok(output) if output.success => Ok(output),
        Ok(output) => {
            let detail = if output.stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", output.stderr)
            };
            Err(ToolFailure {
                exit_code: output.exit_code,
                reason: format!(
                    "{} exited with code {}{}",
                    command.program,
                    output.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
                    detail
                ),
            })
        }
        Err(e) => Err(ToolFailure {
            exit_code: None,
            reason: format!("failed to run {}: {}", command.program, e),
        }),
    }
}

/// Fail with [`ZoteroDebError::ToolMissing`] for the first tool not on PATH
pub fn ensure_available(runner: &dyn ToolRunner, tools: &[&str]) -> ZoteroDebResult<()> {
    for tool in tools {
        if !runner.is_available(tool) {
            return Err(ZoteroDebError::ToolMissing { tool: tool.to_string() });
        }
    }
    Ok(())
}
