// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Command tables.

A command table is the generated artifact: a list of packages, each followed
by the binaries it provides. It is designed to be `#include`d as an
initializer list of string literals:

```text
"vim",
" vi",
" vim",
```

Package lines are quoted names followed by a comma. Binary lines are the
same except the name is prefixed by a single space. Packages are sorted, and
binaries are sorted within their package, both by byte value.
*/

use {
    crate::{
        contents::BinaryOwnership,
        error::{CommandIndexError, Result},
    },
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, io::Write},
};

/// How repeated binary names within a package are handled.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Emit every occurrence.
    #[default]
    Preserve,
    /// Emit each binary name once per package.
    Deduplicate,
}

/// A table of packages and the binaries they provide.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandTable {
    packages: BTreeMap<String, Vec<String>>,
    duplicates: DuplicatePolicy,
}

impl CommandTable {
    /// Construct an empty table with the given duplicate handling.
    pub fn new(duplicates: DuplicatePolicy) -> Self {
        Self {
            packages: BTreeMap::new(),
            duplicates,
        }
    }

    /// Construct an instance from accumulated binary ownership.
    pub fn from_ownership(ownership: &BinaryOwnership, duplicates: DuplicatePolicy) -> Self {
        let mut table = Self::new(duplicates);

        for (package, binaries) in ownership.iter() {
            table.set_package(package, binaries.iter().cloned());
        }

        table
    }

    /// Parse a previously rendered table.
    ///
    /// Binary lines appearing before any package line are an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::default();
        let mut current: Option<String> = None;

        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;

            if line.trim().is_empty() {
                continue;
            }

            let value = line
                .trim_end()
                .strip_suffix(',')
                .and_then(|s| s.strip_prefix('"'))
                .and_then(|s| s.strip_suffix('"'))
                .ok_or_else(|| {
                    CommandIndexError::TableMalformedLine(line_number, line.to_string())
                })?;

            if let Some(binary) = value.strip_prefix(' ') {
                let package = current
                    .as_ref()
                    .ok_or(CommandIndexError::TableBinaryWithoutPackage(line_number))?;

                table
                    .packages
                    .entry(package.clone())
                    .or_default()
                    .push(binary.to_string());
            } else {
                table.packages.entry(value.to_string()).or_default();
                current = Some(value.to_string());
            }
        }

        Ok(table)
    }

    /// Define the binaries of a package, replacing any existing definition.
    pub fn set_package(
        &mut self,
        package: impl ToString,
        binaries: impl IntoIterator<Item = impl ToString>,
    ) {
        self.packages.insert(
            package.to_string(),
            binaries.into_iter().map(|b| b.to_string()).collect(),
        );
    }

    /// Remove a package from the table.
    ///
    /// Returns whether the package was present.
    pub fn remove_package(&mut self, package: &str) -> bool {
        self.packages.remove(package).is_some()
    }

    /// Whether a package is in the table.
    pub fn package_exists(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// Obtain the binaries of a package as stored.
    pub fn binaries(&self, package: &str) -> Option<&[String]> {
        self.packages.get(package).map(|x| x.as_slice())
    }

    /// Iterate over package names in sorted order.
    pub fn packages(&self) -> impl Iterator<Item = &str> + '_ {
        self.packages.keys().map(|s| s.as_str())
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the table has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Obtain sorted binaries of a package with the duplicate policy applied.
    fn sorted_binaries<'a>(&self, binaries: &'a [String]) -> Vec<&'a str> {
        let mut binaries = binaries.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        binaries.sort_unstable();

        if self.duplicates == DuplicatePolicy::Deduplicate {
            binaries.dedup();
        }

        binaries
    }

    /// Iterate over packages and their sorted binaries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Vec<&str>)> + '_ {
        self.packages
            .iter()
            .map(|(package, binaries)| (package.as_str(), self.sorted_binaries(binaries)))
    }

    /// Emit lines constituting this table, each terminated by a newline.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries().flat_map(|(package, binaries)| {
            std::iter::once(format!("\"{}\",\n", package))
                .chain(binaries.into_iter().map(|b| format!("\" {}\",\n", b)))
        })
    }

    /// Render the table to a string.
    ///
    /// An empty table is an error: a repository with no binaries at all almost
    /// certainly indicates a problem obtaining its index.
    pub fn render(&self) -> Result<String> {
        let content = self.lines().collect::<String>();

        if content.is_empty() {
            Err(CommandIndexError::EmptyTable)
        } else {
            Ok(content)
        }
    }

    /// Write the content of this table to a writer.
    ///
    /// Returns the total number of bytes written.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<usize> {
        let content = self.render()?;
        writer.write_all(content.as_bytes())?;

        Ok(content.len())
    }
}
