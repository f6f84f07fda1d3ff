// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum CommandIndexError {
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0:?}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("task join error: {0:?}")]
    Join(#[from] tokio::task::JoinError),

    #[error("directory walk error: {0:?}")]
    WalkDir(#[from] walkdir::Error),

    #[error("{0} environment variable is not defined")]
    MissingEnvironmentVariable(&'static str),

    #[error("install prefix must be an absolute path: {0}")]
    InstallPrefixNotAbsolute(String),

    #[error("install prefix must not be the filesystem root")]
    InstallPrefixIsRoot,

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),

    #[error("repository configuration defines no repositories")]
    RepositoryConfigEmpty,

    #[error(
        "alternative {alternative} of package {package} points at {path}, which no package owns"
    )]
    UnresolvedAlternativeTarget {
        package: String,
        alternative: String,
        path: String,
    },

    #[error("generated command table is empty")]
    EmptyTable,

    #[error("command table line {0} precedes any package line")]
    TableBinaryWithoutPackage(usize),

    #[error("malformed command table line {0}: {1}")]
    TableMalformedLine(usize, String),

    #[error("unknown compression of .deb data archive: {0}")]
    DebUnknownCompression(String),

    #[error(".deb has no data.tar entry")]
    DebDataNotFound,

    #[error("content of {0} differs from what was written")]
    OutputVerification(String),

    #[error("{0}")]
    Other(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, CommandIndexError>;
