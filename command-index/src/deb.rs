// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binaries provided by `.deb` files.

A `.deb` binary package is an `ar` archive with 3 entries:

1. `debian-binary` holding the version of the binary package format.
2. `control.tar[.<ext>]` holding package metadata.
3. `data.tar[.<ext>]` holding file content.

Only `data.tar` is consulted here. Files under the binary directory of the
install prefix are the commands a package provides, the same as for a
`Contents` index.
*/

use {
    crate::error::{CommandIndexError, Result},
    log::debug,
    std::{
        io::{Cursor, Read},
        path::Path,
    },
};

fn data_tar_reader(extension: &str, data: Cursor<Vec<u8>>) -> Result<Box<dyn Read>> {
    match extension {
        "" => Ok(Box::new(data)),
        ".gz" => Ok(Box::new(libflate::gzip::Decoder::new(data)?)),
        ".xz" => Ok(Box::new(xz2::read::XzDecoder::new(data))),
        ".zst" => Ok(Box::new(zstd::Decoder::new(data)?)),
        _ => Err(CommandIndexError::DebUnknownCompression(
            extension.to_string(),
        )),
    }
}

/// Derive a package name from a `.deb` filename.
///
/// Filenames have the form `<package>_<version>_<arch>.deb`. e.g.
/// `vim_9.0.0-1_aarch64.deb` is package `vim`.
pub fn package_name_from_path(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let package = name.split('_').next()?;

    if package.is_empty() {
        None
    } else {
        Some(package)
    }
}

/// Obtain the binaries installed by a `.deb` package.
///
/// `binary_path_prefix` is the binary directory as it appears in index paths.
/// e.g. `data/data/com.termux/files/usr/bin/`. Binaries are returned in
/// archive order.
pub fn binaries_from_deb(reader: impl Read, binary_path_prefix: &str) -> Result<Vec<String>> {
    let mut archive = ar::Archive::new(reader);

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry?;
        let identifier = String::from_utf8_lossy(entry.header().identifier()).to_string();

        let extension = match identifier.strip_prefix("data.tar") {
            Some(extension) => extension.to_string(),
            None => {
                debug!("skipping {} entry of .deb", identifier);
                continue;
            }
        };

        let mut data = vec![];
        entry.read_to_end(&mut data)?;

        return binaries_from_data_tar(
            data_tar_reader(&extension, Cursor::new(data))?,
            binary_path_prefix,
        );
    }

    Err(CommandIndexError::DebDataNotFound)
}

fn binaries_from_data_tar(reader: impl Read, binary_path_prefix: &str) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(reader);
    let mut binaries = vec![];

    for entry in archive.entries()? {
        let entry = entry?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        let path = path.trim_start_matches("./").trim_start_matches('/');

        if let Some(rest) = path.strip_prefix(binary_path_prefix) {
            let binary = crate::contents::basename(rest);

            if !binary.is_empty() {
                binaries.push(binary.to_string());
            }
        }
    }

    Ok(binaries)
}
