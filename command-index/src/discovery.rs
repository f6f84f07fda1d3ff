// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Discovery of alternatives files in package metadata trees. */

use {
    crate::{alternatives::AlternativesFile, error::Result},
    log::debug,
    std::path::{Path, PathBuf},
};

/// Filename extension of alternatives definition files.
pub const ALTERNATIVES_EXTENSION: &str = "alternatives";

/// An alternatives file found in a metadata tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredAlternatives {
    /// Package shipping the file, from the name of its directory.
    pub package: String,
    /// Filesystem path of the file.
    pub path: PathBuf,
    /// Parsed content.
    pub alternatives: AlternativesFile,
}

/// Find alternatives files beneath a metadata root.
///
/// The root is expected to contain one directory per package, each holding
/// zero or more `*.alternatives` files. e.g. `packages/vim/vim.alternatives`.
///
/// Results are sorted by path so resolution order is reproducible. A missing
/// root yields no results.
pub fn discover_alternatives(root: &Path) -> Result<Vec<DiscoveredAlternatives>> {
    if !root.is_dir() {
        debug!("{} is not a directory; no alternatives", root.display());
        return Ok(vec![]);
    }

    let mut res = vec![];

    for entry in walkdir::WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry?;

        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|x| x.to_str()) != Some(ALTERNATIVES_EXTENSION)
        {
            continue;
        }

        let package = match entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|p| p.to_str())
        {
            Some(package) => package.to_string(),
            None => continue,
        };

        let alternatives = AlternativesFile::from_path(entry.path())?;
        debug!(
            "{}: {} alternatives in {}",
            package,
            alternatives.len(),
            entry.path().display()
        );

        res.push(DiscoveredAlternatives {
            package,
            path: entry.path().to_path_buf(),
            alternatives,
        });
    }

    res.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(res)
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn discover() -> Result<()> {
        let td = tempfile::tempdir()?;
        let root = td.path();

        for dir in ["vim", "nano", "empty"] {
            std::fs::create_dir(root.join(dir))?;
        }

        std::fs::write(
            root.join("vim").join("vim.alternatives"),
            indoc! {"
                Name: vi
                Link: bin/vi
                Alternative: libexec/vim/vim
            "},
        )?;
        std::fs::write(
            root.join("nano").join("nano.alternatives"),
            "Name: editor\nLink: bin/editor\nAlternative: bin/nano\n",
        )?;
        std::fs::write(root.join("nano").join("build.sh"), "TERMUX_PKG_VERSION=1\n")?;
        std::fs::write(root.join("top.alternatives"), "Name: x\nLink: bin/x\n")?;

        let found = discover_alternatives(root)?;

        assert_eq!(
            found.iter().map(|x| x.package.as_str()).collect::<Vec<_>>(),
            vec!["nano", "vim"]
        );
        assert_eq!(found[1].alternatives.records()[0].link, "bin/vi");

        Ok(())
    }

    #[test]
    fn missing_root() -> Result<()> {
        let td = tempfile::tempdir()?;

        assert!(discover_alternatives(&td.path().join("missing"))?.is_empty());

        Ok(())
    }
}
