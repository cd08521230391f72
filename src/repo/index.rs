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

//! Repository contents: package files on disk versus the generated index.
//!
//! The repository is flat. `apt-ftparchive packages .` descends into
//! subdirectories but only top-level files are uploaded, so packages below the
//! root are reported by [`nested_packages`] and refused by the publisher.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ZoteroDebError, ZoteroDebResult};

/// Names of the `.deb` files in the repository, sorted
pub fn package_files(repo_dir: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = publishable_files(repo_dir)?
        .into_iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| name.ends_with(".deb"))
        .collect();
    names.sort();
    Ok(names)
}

/// Regular, non-hidden files in the repository, sorted by name
pub fn publishable_files(repo_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(repo_dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// `.deb` files inside subdirectories, as paths relative to the repository
pub fn nested_packages(repo_dir: &Path) -> io::Result<Vec<String>> {
    let mut pending = Vec::new();
    for entry in fs::read_dir(repo_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            pending.push(entry.path());
        }
    }

    let mut found = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "deb") {
                if let Ok(relative) = path.strip_prefix(repo_dir) {
                    found.push(relative.display().to_string());
                }
            }
        }
    }

    found.sort();
    Ok(found)
}

/// `Filename:` entries of a Packages index, without the leading `./`
pub fn indexed_files(index: &str) -> Vec<String> {
    index
        .lines()
        .filter_map(|line| line.strip_prefix("Filename:"))
        .map(|value| {
            let value = value.trim();
            value.strip_prefix("./").unwrap_or(value).to_string()
        })
        .collect()
}

/// The index must list every package on disk exactly once and nothing else
pub fn check_complete(on_disk: &[String], index: &str) -> ZoteroDebResult<()> {
    let indexed = indexed_files(index);
    let disk: BTreeSet<&str> = on_disk.iter().map(String::as_str).collect();

    let mut seen = BTreeSet::new();
    let mut stale = Vec::new();
    for name in &indexed {
        if !disk.contains(name.as_str()) {
            stale.push(name.clone());
        } else if !seen.insert(name.as_str()) {
            stale.push(format!("{} (duplicate)", name));
        }
    }

    let missing: Vec<String> = disk
        .iter()
        .filter(|name| !seen.contains(*name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() && stale.is_empty() {
        Ok(())
    } else {
        Err(ZoteroDebError::IndexMismatch { missing, stale })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stanza(file: &str) -> String {
        let package = file.split('_').next().unwrap();
        format!("Package: {}\nFilename: ./{}\nSize: 10\n\n", package, file)
    }

    #[test]
    fn test_package_files_ignores_other_files() {
        let dir = tempdir().unwrap();
        for name in [
            "zotero_6.0.27_i386.deb",
            "Packages",
            "install.sh",
            ".jurism_1_amd64.deb.part",
            "jurism_6.0.26m3_amd64.deb",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.deb")).unwrap();

        assert_eq!(
            package_files(dir.path()).unwrap(),
            vec!["jurism_6.0.26m3_amd64.deb", "zotero_6.0.27_i386.deb"]
        );
        assert_eq!(publishable_files(dir.path()).unwrap().len(), 4);
    }

    #[test]
    fn test_nested_packages() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zotero_6.0.27_i386.deb"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("old/2023")).unwrap();
        fs::write(dir.path().join("old/2023/zotero_6.0.20_i386.deb"), b"x").unwrap();
        fs::write(dir.path().join("old/notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("empty.deb")).unwrap();

        assert_eq!(nested_packages(dir.path()).unwrap(), vec!["old/2023/zotero_6.0.20_i386.deb"]);
        assert_eq!(package_files(dir.path()).unwrap(), vec!["zotero_6.0.27_i386.deb"]);
    }

    #[test]
    fn test_complete_index() {
        let on_disk = vec![
            "jurism_6.0.26m3_amd64.deb".to_string(),
            "zotero_6.0.27_amd64.deb".to_string(),
        ];
        let index = stanza("zotero_6.0.27_amd64.deb") + &stanza("jurism_6.0.26m3_amd64.deb");
        assert!(check_complete(&on_disk, &index).is_ok());
    }

    #[test]
    fn test_missing_and_stale_entries() {
        let on_disk = vec![
            "zotero_6.0.27_amd64.deb".to_string(),
            "zotero_6.0.27_i386.deb".to_string(),
        ];
        let index = stanza("zotero_6.0.27_amd64.deb") + &stanza("zotero_6.0.26_amd64.deb");

        match check_complete(&on_disk, &index) {
            Err(ZoteroDebError::IndexMismatch { missing, stale }) => {
                assert_eq!(missing, vec!["zotero_6.0.27_i386.deb"]);
                assert_eq!(stale, vec!["zotero_6.0.26_amd64.deb"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let on_disk = vec!["zotero_6.0.27_amd64.deb".to_string()];
        let index = stanza("zotero_6.0.27_amd64.deb").repeat(2);
        assert!(matches!(
            check_complete(&on_disk, &index),
            Err(ZoteroDebError::IndexMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_repository() {
        assert!(check_complete(&[], "").is_ok());
    }
}
