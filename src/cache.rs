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

//! Build-skip decisions keyed on the package file name.
//!
//! The repository directory is the only record of what has been built: a
//! package is considered present when a file with its canonical name exists.
//! The contents are not inspected, so an empty or truncated file left behind
//! by an external process still counts as built.

use std::path::PathBuf;

use crate::client::{BuiltPackage, PackageIdentity};

/// Existence-based view of a repository directory
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    repo_dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: repo_dir.into() }
    }

    /// Where a package with this identity lives
    pub fn target_path(&self, identity: &PackageIdentity) -> PathBuf {
        identity.path_in(&self.repo_dir)
    }

    /// False iff a file already exists at the identity's target path
    pub fn should_build(&self, identity: &PackageIdentity) -> bool {
        !self.target_path(identity).is_file()
    }

    /// The package already at the identity's target path.
    ///
    /// Only meaningful once [`ArtifactCache::should_build`] said no.
    pub fn existing(&self, identity: &PackageIdentity) -> BuiltPackage {
        BuiltPackage {
            identity: identity.clone(),
            file_path: self.target_path(identity),
        }
    }
}
