// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Contents` index parsing.

A `Contents` index is a text document with one line per installed file. Each
line holds a path (relative to the filesystem root, without a leading `/`)
followed by a comma delimited list of the packages owning that path. e.g.

```text
data/data/com.termux/files/usr/bin/vim vim,vim-python
```

Parsing an index yields two structures. A [PathOwnerMap] answers *which
package owns path X* and is later consulted when resolving alternatives.
A [BinaryOwnership] answers *which binaries does package Y provide* and only
considers paths under the binary directory.
*/

use {
    crate::error::Result,
    futures::{AsyncBufRead, AsyncBufReadExt},
    std::{
        borrow::Cow,
        collections::{BTreeMap, HashMap},
    },
};

/// The install prefix packages are built against, as it appears in indices.
pub const STOCK_INSTALL_PREFIX: &str = "data/data/com.termux/files/usr";

/// A single line of a `Contents` index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentsEntry {
    /// Path of the installed file.
    pub path: String,
    /// Packages owning this path, in the order listed.
    pub owners: Vec<String>,
}

impl ContentsEntry {
    /// Parse a single index line.
    ///
    /// The path is everything before the first space. Everything after it is
    /// the owners field. A line without a space has zero owners.
    ///
    /// Returns `None` for blank lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

        if line.trim().is_empty() {
            return None;
        }

        let (path, owners) = line.split_once(' ').unwrap_or((line, ""));

        let owners = owners
            .trim()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect::<Vec<_>>();

        Some(Self {
            path: path.to_string(),
            owners,
        })
    }

    /// The file name component of the path.
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }
}

/// Obtain the text after the final `/` of a path.
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Mapping of filesystem paths to the single package owning them.
///
/// Keys are exact index text. No path normalization is performed.
///
/// The map only ever grows: alternatives resolution registers additional link
/// paths as it discovers them.
#[derive(Clone, Debug, Default)]
pub struct PathOwnerMap {
    paths: HashMap<String, String>,
}

impl PathOwnerMap {
    /// Register a path as owned by a package, replacing any prior owner.
    pub fn insert(&mut self, path: impl ToString, package: impl ToString) {
        self.paths.insert(path.to_string(), package.to_string());
    }

    /// Obtain the package owning a path.
    pub fn owner(&self, path: &str) -> Option<&str> {
        self.paths.get(path).map(|s| s.as_str())
    }

    /// Whether a path has a registered owner.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no paths are registered.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over `(path, package)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.paths.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Mapping of package names to the binaries they provide.
///
/// Binaries are stored in insertion order and duplicates are retained. Call
/// [Self::deduplicate()] to collapse them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinaryOwnership {
    packages: BTreeMap<String, Vec<String>>,
}

impl BinaryOwnership {
    /// Record that a package provides a binary.
    pub fn push(&mut self, package: impl ToString, binary: impl ToString) {
        self.packages
            .entry(package.to_string())
            .or_default()
            .push(binary.to_string());
    }

    /// Obtain the binaries recorded for a package.
    pub fn binaries(&self, package: &str) -> Option<&[String]> {
        self.packages.get(package).map(|x| x.as_slice())
    }

    /// Obtain an iterator of packages providing a binary with the given name.
    pub fn packages_providing<'a>(
        &'a self,
        binary: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.packages
            .iter()
            .filter(move |(_, binaries)| binaries.iter().any(|b| b == binary))
            .map(|(package, _)| package.as_str())
    }

    /// Remove repeated binary names within each package.
    ///
    /// The first occurrence of each name is kept.
    pub fn deduplicate(&mut self) {
        for binaries in self.packages.values_mut() {
            let mut seen = std::collections::HashSet::new();
            binaries.retain(|b| seen.insert(b.clone()));
        }
    }

    /// Number of packages having at least one recorded binary.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no binaries are recorded.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate over packages and their binaries, sorted by package name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.packages
            .iter()
            .map(|(package, binaries)| (package.as_str(), binaries.as_slice()))
    }
}

/// The result of parsing a `Contents` index.
#[derive(Clone, Debug, Default)]
pub struct ContentsIndex {
    /// Owner of every path in the index.
    pub paths: PathOwnerMap,
    /// Binaries provided by each package.
    pub binaries: BinaryOwnership,
}

/// Parses `Contents` index lines into a [ContentsIndex].
#[derive(Clone, Debug)]
pub struct ContentsIndexParser {
    binary_path_prefix: String,
    prefix_rewrite: Option<(String, String)>,
}

impl ContentsIndexParser {
    /// Construct an instance extracting binaries under the given path prefix.
    ///
    /// The prefix is matched literally. It should normally end with `/`. e.g.
    /// `data/data/com.termux/files/usr/bin/`.
    pub fn new(binary_path_prefix: impl ToString) -> Self {
        Self {
            binary_path_prefix: binary_path_prefix.to_string(),
            prefix_rewrite: None,
        }
    }

    /// Rewrite lines beginning with `from` to begin with `to` before parsing.
    ///
    /// Packages in an index are built for [STOCK_INSTALL_PREFIX]. This allows
    /// generating tables for a build using a different prefix.
    pub fn with_prefix_rewrite(mut self, from: impl ToString, to: impl ToString) -> Self {
        let from = from.to_string();
        let to = to.to_string();

        self.prefix_rewrite = if from == to { None } else { Some((from, to)) };
        self
    }

    /// The path prefix under which binaries are extracted.
    pub fn binary_path_prefix(&self) -> &str {
        &self.binary_path_prefix
    }

    fn rewrite<'a>(&self, line: &'a str) -> Cow<'a, str> {
        match &self.prefix_rewrite {
            Some((from, to)) => match line.strip_prefix(from.as_str()) {
                // Index paths have no leading `/`, even for an empty prefix.
                Some(rest) if to.is_empty() => {
                    Cow::Borrowed(rest.strip_prefix('/').unwrap_or(rest))
                }
                Some(rest) => Cow::Owned(format!("{}{}", to, rest)),
                None => Cow::Borrowed(line),
            },
            None => Cow::Borrowed(line),
        }
    }

    /// Parse a single line and add its content to an index.
    pub fn parse_and_add_line(&self, index: &mut ContentsIndex, line: &str) {
        let line = self.rewrite(line);

        let entry = match ContentsEntry::parse_line(&line) {
            Some(entry) => entry,
            None => return,
        };

        // Path ownership is singular even when the index lists co-owners.
        if let Some(owner) = entry.owners.first() {
            index.paths.insert(&entry.path, owner);
        }

        if entry.path.starts_with(&self.binary_path_prefix) {
            let binary = entry.basename();

            if binary.is_empty() {
                return;
            }

            for owner in &entry.owners {
                index.binaries.push(owner, binary);
            }
        }
    }

    /// Parse the full text of an index.
    pub fn parse_text(&self, text: &str) -> ContentsIndex {
        let mut index = ContentsIndex::default();

        for line in text.lines() {
            self.parse_and_add_line(&mut index, line);
        }

        index
    }
}

/// Asynchronous streaming reader of `Contents` indices.
///
/// Indices are large. Lines are parsed as they arrive so the decompressed
/// text is never held in memory in full.
pub struct ContentsIndexAsyncReader<R> {
    reader: R,
    parser: ContentsIndexParser,
    index: ContentsIndex,
    buffer: Vec<u8>,
}

impl<R> ContentsIndexAsyncReader<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Create a new instance bound to a reader.
    pub fn new(reader: R, parser: ContentsIndexParser) -> Self {
        Self {
            reader,
            parser,
            index: ContentsIndex::default(),
            buffer: vec![],
        }
    }

    /// Parse the entirety of the source reader.
    ///
    /// Returns the number of bytes read.
    pub async fn read_all(&mut self) -> Result<usize> {
        let mut bytes_read = 0;

        loop {
            let read_size = self.read_line().await?;
            if read_size == 0 {
                break;
            }

            bytes_read += read_size;
        }

        Ok(bytes_read)
    }

    /// Read and parse a single line from the reader.
    ///
    /// Invalid UTF-8 sequences in the line are replaced rather than rejected.
    pub async fn read_line(&mut self) -> Result<usize> {
        self.buffer.clear();
        let read_size = self.reader.read_until(b'\n', &mut self.buffer).await?;

        if read_size != 0 {
            let line = String::from_utf8_lossy(&self.buffer);
            self.parser.parse_and_add_line(&mut self.index, &line);
        }

        Ok(read_size)
    }

    /// Consume the instance and return the inner [ContentsIndex] and source reader.
    pub fn consume(self) -> (ContentsIndex, R) {
        (self.index, self.reader)
    }
}
