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

//! Client identities, target architectures and the package naming scheme.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Debian architectures the repository is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    I386,
    Amd64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::I386, Arch::Amd64];

    /// Debian architecture name as used in package file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::I386 => "i386",
            Arch::Amd64 => "amd64",
        }
    }

    /// Kernel machine name shared by both vendors' download endpoints
    pub fn default_machine(&self) -> &'static str {
        match self {
            Arch::I386 => "i686",
            Arch::Amd64 => "x86_64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i386" => Ok(Arch::I386),
            "amd64" => Ok(Arch::Amd64),
            other => Err(format!("unsupported architecture '{}' (expected i386 or amd64)", other)),
        }
    }
}

/// Identity of a distributable application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub client_id: String,
    pub display_name: String,
    pub machine_arch_map: BTreeMap<Arch, String>,
}

impl ClientSpec {
    pub fn new(client_id: &str, display_name: &str) -> Self {
        let machine_arch_map = Arch::ALL
            .iter()
            .map(|arch| (*arch, arch.default_machine().to_string()))
            .collect();

        Self {
            client_id: client_id.to_string(),
            display_name: display_name.to_string(),
            machine_arch_map,
        }
    }

    /// The reference manager
    pub fn zotero() -> Self {
        Self::new("zotero", "Zotero")
    }

    /// The legal-citation fork
    pub fn jurism() -> Self {
        Self::new("jurism", "Juris-M")
    }

    /// Vendor machine name for a Debian architecture
    pub fn machine(&self, arch: Arch) -> &str {
        self.machine_arch_map
            .get(&arch)
            .map(String::as_str)
            .unwrap_or_else(|| arch.default_machine())
    }

    /// Install prefix of the payload inside the package
    pub fn lib_dir(&self) -> String {
        format!("/usr/lib/{}", self.client_id)
    }
}

/// (client, version, architecture): the key of a built package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub client_id: String,
    pub version: String,
    pub arch: Arch,
}

impl PackageIdentity {
    pub fn new(client_id: impl Into<String>, version: impl Into<String>, arch: Arch) -> Self {
        Self {
            client_id: client_id.into(),
            version: version.into(),
            arch,
        }
    }

    /// `<clientId>_<version>_<arch>.deb`
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.deb", self.client_id, self.version, self.arch)
    }

    /// Location of the package inside a repository directory
    pub fn path_in(&self, repo_dir: &Path) -> PathBuf {
        repo_dir.join(self.file_name())
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.client_id, self.version, self.arch)
    }
}

/// A signed package sitting in the repository directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    pub identity: PackageIdentity,
    pub file_path: PathBuf,
}
