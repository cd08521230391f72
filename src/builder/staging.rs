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

//! Scratch workspace layout.
//!
//! ```text
//! <root>/client.tar.bz2         downloaded release archive
//! <root>/build/                 package tree handed to dpkg-deb
//!         usr/lib/<id>/         extracted payload
//!         usr/share/applications/<id>.desktop
//!         DEBIAN/control
//! <root>/out/<name>.deb         package until it is signed
//! ```
//!
//! One build at a time owns the root; [`StagingArea::reset`] wipes it.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::client::{ClientSpec, PackageIdentity};
use crate::tools::ToolCommand;

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Remove anything left by a previous build and recreate the skeleton
    pub fn reset(&self) -> io::Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(self.root.join("out"))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join("client.tar.bz2")
    }

    pub fn tree(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn payload_dir(&self, spec: &ClientSpec) -> PathBuf {
        self.tree().join("usr/lib").join(&spec.client_id)
    }

    pub fn desktop_path(&self, spec: &ClientSpec) -> PathBuf {
        self.tree()
            .join("usr/share/applications")
            .join(format!("{}.desktop", spec.client_id))
    }

    pub fn control_path(&self) -> PathBuf {
        self.tree().join("DEBIAN/control")
    }

    pub fn output_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join("out").join(identity.file_name())
    }

    /// Create the package tree directories
    pub fn prepare_tree(&self, spec: &ClientSpec) -> io::Result<()> {
        fs::create_dir_all(self.payload_dir(spec))?;
        fs::create_dir_all(self.tree().join("usr/share/applications"))?;
        fs::create_dir_all(self.tree().join("DEBIAN"))
    }

    /// Unpack the archive into the payload dir, dropping its top-level directory
    pub fn extract_command(&self, spec: &ClientSpec) -> ToolCommand {
        ToolCommand::new("tar")
            .arg("--strip-components=1")
            .arg("-xpf")
            .path_arg(&self.archive_path())
            .arg("-C")
            .path_arg(&self.payload_dir(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Arch;
    use tempfile::tempdir;

    #[test]
    fn test_reset_clears_previous_build() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("staging"));
        fs::create_dir_all(staging.tree().join("leftover")).unwrap();
        fs::write(staging.archive_path(), b"old").unwrap();

        staging.reset().unwrap();

        assert!(!staging.tree().exists());
        assert!(!staging.archive_path().exists());
        assert!(dir.path().join("staging/out").is_dir());
    }

    #[test]
    fn test_layout() {
        let staging = StagingArea::new("/tmp/s");
        let spec = ClientSpec::zotero();
        assert_eq!(staging.payload_dir(&spec), PathBuf::from("/tmp/s/build/usr/lib/zotero"));
        assert_eq!(
            staging.desktop_path(&spec),
            PathBuf::from("/tmp/s/build/usr/share/applications/zotero.desktop")
        );
        assert_eq!(staging.control_path(), PathBuf::from("/tmp/s/build/DEBIAN/control"));
        assert_eq!(
            staging.output_path(&PackageIdentity::new("zotero", "6.0.27", Arch::I386)),
            PathBuf::from("/tmp/s/out/zotero_6.0.27_i386.deb")
        );
    }

    #[test]
    fn test_extract_command_strips_top_level() {
        let staging = StagingArea::new("/tmp/s");
        let cmd = staging.extract_command(&ClientSpec::jurism());
        assert_eq!(cmd.program, "tar");
        assert_eq!(
            cmd.args,
            vec![
                "--strip-components=1",
                "-xpf",
                "/tmp/s/client.tar.bz2",
                "-C",
                "/tmp/s/build/usr/lib/jurism",
            ]
        );
    }
}
