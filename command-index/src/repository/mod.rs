// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository access.

Repositories are laid out like Debian repositories: per-architecture
`Contents` indices live under `dists/<distribution>/`. e.g.
`dists/stable/Contents-aarch64.gz`.
*/

use {
    crate::{
        contents::{ContentsIndex, ContentsIndexAsyncReader, ContentsIndexParser},
        error::{CommandIndexError, Result},
        io::{Compression, DataResolver},
    },
    futures::{io::BufReader, AsyncRead},
    log::debug,
};

pub mod filesystem;
#[cfg(feature = "http")]
pub mod http;

/// Describes where a `Contents` index lives within a repository.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentsIndexLocation {
    /// Name of the distribution. e.g. `stable`.
    pub distribution: String,
    /// Name of the architecture. e.g. `aarch64`.
    pub architecture: String,
    /// Compression of the index file.
    pub compression: Compression,
}

impl ContentsIndexLocation {
    /// Construct an instance for a gzip compressed index.
    pub fn new(distribution: impl ToString, architecture: impl ToString) -> Self {
        Self {
            distribution: distribution.to_string(),
            architecture: architecture.to_string(),
            compression: Compression::Gzip,
        }
    }

    /// The repository root relative path of the index file.
    pub fn path(&self) -> String {
        format!(
            "dists/{}/Contents-{}{}",
            self.distribution.trim_matches('/'),
            self.architecture,
            self.compression.extension()
        )
    }
}

/// Parse a `Contents` index from a stream of decompressed index text.
pub async fn read_contents_index(
    reader: impl AsyncRead + Unpin,
    parser: ContentsIndexParser,
) -> Result<ContentsIndex> {
    let mut reader = ContentsIndexAsyncReader::new(BufReader::new(reader), parser);
    let bytes = reader.read_all().await?;
    debug!("parsed {} bytes of index text", bytes);

    Ok(reader.consume().0)
}

/// Fetch a `Contents` index and parse it as it is decompressed.
pub async fn fetch_contents_index(
    resolver: &(impl DataResolver + ?Sized),
    location: &ContentsIndexLocation,
    parser: ContentsIndexParser,
) -> Result<ContentsIndex> {
    let path = location.path();
    debug!("fetching {}", path);

    let reader = resolver
        .get_path_decoded(&path, location.compression)
        .await?;

    read_contents_index(reader, parser)
        .await
        .map_err(|e| match e {
            CommandIndexError::Io(e) => CommandIndexError::RepositoryIoPath(path, e),
            e => e,
        })
}

/// Obtain a [DataResolver] from a string.
///
/// Values containing `://` are parsed as URLs. `file://` URLs and values
/// without a scheme are filesystem paths.
pub fn reader_from_str(s: impl ToString) -> Result<Box<dyn DataResolver + Send>> {
    let s = s.to_string();

    if s.contains("://") {
        let url = url::Url::parse(&s)?;

        match url.scheme() {
            "file" => Ok(Box::new(filesystem::FilesystemRepositoryReader::new(
                url.to_file_path().map_err(|_| {
                    CommandIndexError::Other(format!("invalid file URL: {}", url))
                })?,
            ))),
            #[cfg(feature = "http")]
            "http" | "https" => Ok(Box::new(http::HttpRepositoryClient::new(url)?)),
            scheme => Err(CommandIndexError::Other(format!(
                "unsupported repository URL scheme: {}",
                scheme
            ))),
        }
    } else {
        Ok(Box::new(filesystem::FilesystemRepositoryReader::new(s)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn contents_path() {
        let location = ContentsIndexLocation::new("stable", "aarch64");
        assert_eq!(location.path(), "dists/stable/Contents-aarch64.gz");

        let location = ContentsIndexLocation {
            compression: Compression::None,
            ..ContentsIndexLocation::new("/root/", "arm")
        };
        assert_eq!(location.path(), "dists/root/Contents-arm");
    }

    #[tokio::test]
    async fn fetch_uncompressed_index() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dists = td.path().join("dists").join("stable");
        std::fs::create_dir_all(&dists)?;
        std::fs::write(
            dists.join("Contents-arm"),
            "usr/bin/vim vim\nusr/share/vim/vimrc vim\n",
        )?;

        let location = ContentsIndexLocation {
            compression: Compression::None,
            ..ContentsIndexLocation::new("stable", "arm")
        };

        let reader = reader_from_str(td.path().display())?;
        let index = fetch_contents_index(
            reader.as_ref(),
            &location,
            ContentsIndexParser::new("usr/bin/"),
        )
        .await?;

        assert_eq!(index.paths.len(), 2);
        assert_eq!(index.binaries.binaries("vim").unwrap(), &["vim".to_string()]);

        let missing = ContentsIndexLocation::new("stable", "i686");
        assert!(matches!(
            fetch_contents_index(reader.as_ref(), &missing, ContentsIndexParser::new("usr/bin/"))
                .await,
            Err(CommandIndexError::RepositoryIoPath(_, _))
        ));

        Ok(())
    }

    #[test]
    fn reader_from_unknown_scheme() {
        assert!(reader_from_str("ftp://example.com/apt").is_err());
        assert!(reader_from_str("/srv/mirror/termux-main").is_ok());
        assert!(reader_from_str("file:///srv/mirror/termux-main").is_ok());
    }
}
