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

//! Desktop entry and Debian control file rendering.
//!
//! Key order is fixed; dpkg-deb and desktop integrations read these files
//! line by line.

use crate::client::{Arch, ClientSpec};

/// Control file keys, in output order
pub const CONTROL_FIELDS: [&str; 7] = [
    "Package",
    "Architecture",
    "Maintainer",
    "Section",
    "Priority",
    "Version",
    "Description",
];

fn render(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// `usr/share/applications/<id>.desktop`
pub fn desktop_entry(spec: &ClientSpec) -> String {
    let lib_dir = spec.lib_dir();
    render(&[
        "[Desktop Entry]".to_string(),
        "Name=Zotero".to_string(),
        format!("Name={}", spec.display_name),
        "Comment=Open-source reference manager".to_string(),
        format!("Exec={}/{}", lib_dir, spec.client_id),
        format!("Icon={}/chrome/icons/default/default48.png", lib_dir),
        "Type=Application".to_string(),
        "StartupNotify=true".to_string(),
    ])
}

/// `DEBIAN/control`
pub fn control_file(spec: &ClientSpec, version: &str, arch: Arch, maintainer: &str) -> String {
    let values = [
        spec.client_id.clone(),
        arch.to_string(),
        maintainer.to_string(),
        "Science".to_string(),
        "optional".to_string(),
        version.to_string(),
        format!(
            "{} is a free, easy-to-use tool to help you collect, organize, cite, and share research",
            spec.display_name
        ),
    ];

    let lines: Vec<String> = CONTROL_FIELDS
        .iter()
        .zip(values.iter())
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect();
    render(&lines)
}
