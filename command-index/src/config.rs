// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Generator configuration.

Configuration comes from two environment variables and a repository
definition file:

* `TERMUX_PREFIX` is the absolute install prefix. e.g.
  `/data/data/com.termux/files/usr`.
* `TERMUX_SCRIPTDIR` is the root of the packages source tree. It holds
  `repo.json` and one directory per repository containing package metadata.

`repo.json` maps repository directories to repository definitions:

```json
{
  "pkg_format": "debian",
  "packages": {
    "name": "termux-main",
    "distribution": "stable",
    "component": "main"
  }
}
```

Top-level keys that aren't repository definitions are ignored.
*/

use {
    crate::{
        error::{CommandIndexError, Result},
        table::DuplicatePolicy,
    },
    log::warn,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Environment variable holding the install prefix.
pub const PREFIX_ENV: &str = "TERMUX_PREFIX";

/// Environment variable holding the packages source tree.
pub const SCRIPTDIR_ENV: &str = "TERMUX_SCRIPTDIR";

/// Filename of the repository definitions in the packages source tree.
pub const REPOSITORY_CONFIG_FILENAME: &str = "repo.json";

/// Default base URL repositories are published under.
pub const DEFAULT_REPOSITORY_URL: &str = "https://packages-cf.termux.dev/apt";

/// Architectures tables are generated for by default.
pub const DEFAULT_ARCHITECTURES: &[&str] = &["aarch64", "arm", "i686", "x86_64"];

/// A repository to generate tables for.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepositoryDefinition {
    /// Name of the repository. e.g. `termux-main`.
    pub name: String,

    /// Distribution to read indices from. e.g. `stable`.
    pub distribution: String,

    /// Component of the repository.
    #[serde(default)]
    pub component: Option<String>,

    /// URL of the repository root.
    ///
    /// Defaults to the repository name under the base repository URL.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RepositoryConfigEntry {
    Repository(RepositoryDefinition),
    Other(serde::de::IgnoredAny),
}

/// Repository definitions keyed by their directory in the packages tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepositorySet {
    repositories: BTreeMap<String, RepositoryDefinition>,
}

impl RepositorySet {
    fn from_entries(entries: BTreeMap<String, RepositoryConfigEntry>) -> Result<Self> {
        let mut repositories = BTreeMap::new();

        for (key, entry) in entries {
            match entry {
                RepositoryConfigEntry::Repository(definition) => {
                    repositories.insert(key, definition);
                }
                RepositoryConfigEntry::Other(_) => {
                    warn!("ignoring repository config key {}: not a repository", key);
                }
            }
        }

        if repositories.is_empty() {
            Err(CommandIndexError::RepositoryConfigEmpty)
        } else {
            Ok(Self { repositories })
        }
    }

    /// Parse JSON repository definitions.
    pub fn from_json(data: &str) -> Result<Self> {
        Self::from_entries(serde_json::from_str(data)?)
    }

    /// Parse YAML repository definitions.
    pub fn from_yaml(data: &str) -> Result<Self> {
        Self::from_entries(serde_yaml::from_str(data)?)
    }

    /// Load repository definitions from a file.
    ///
    /// Files ending in `.yaml` or `.yml` are YAML. Everything else is JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e))?;

        match path.extension().and_then(|x| x.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&data),
            _ => Self::from_json(&data),
        }
    }

    /// Iterate over `(directory, definition)` pairs sorted by directory.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RepositoryDefinition)> + '_ {
        self.repositories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of repositories.
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Whether no repositories are defined.
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

/// Settings for a table generation run.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Absolute install prefix.
    pub install_prefix: String,
    /// Root of the packages source tree.
    pub script_dir: PathBuf,
    /// Repositories to generate tables for.
    pub repositories: RepositorySet,
    /// Architectures to generate tables for.
    pub architectures: Vec<String>,
    /// Base URL of repositories lacking an explicit URL.
    pub repository_url: String,
    /// Directory tables are written to.
    pub output_dir: PathBuf,
    /// How repeated binaries within a package are handled.
    pub duplicate_policy: DuplicatePolicy,
    /// Maximum number of repository/architecture pairs processed concurrently.
    pub max_parallel_io: usize,
}

impl GeneratorConfig {
    /// Construct an instance from the process environment.
    ///
    /// `repo.json` is loaded from the packages source tree.
    pub fn from_env() -> Result<Self> {
        Self::from_env_lookup(|key| std::env::var(key).ok())
    }

    /// Construct an instance using a function to resolve environment variables.
    pub fn from_env_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_env_lookup_with_repositories(lookup, None)
    }

    /// Construct an instance from the environment with explicit repository definitions.
    ///
    /// If `repository_config` is `None`, `repo.json` in the packages tree is used.
    pub fn from_env_lookup_with_repositories(
        lookup: impl Fn(&str) -> Option<String>,
        repository_config: Option<&Path>,
    ) -> Result<Self> {
        let install_prefix = lookup(PREFIX_ENV)
            .filter(|s| !s.is_empty())
            .ok_or(CommandIndexError::MissingEnvironmentVariable(PREFIX_ENV))?;
        let script_dir = lookup(SCRIPTDIR_ENV)
            .filter(|s| !s.is_empty())
            .ok_or(CommandIndexError::MissingEnvironmentVariable(SCRIPTDIR_ENV))?;

        let script_dir = PathBuf::from(script_dir);
        let repositories = match repository_config {
            Some(path) => RepositorySet::from_path(path)?,
            None => RepositorySet::from_path(&script_dir.join(REPOSITORY_CONFIG_FILENAME))?,
        };

        Self::new(install_prefix, script_dir, repositories)
    }

    /// Construct an instance with default settings.
    pub fn new(
        install_prefix: impl ToString,
        script_dir: impl AsRef<Path>,
        repositories: RepositorySet,
    ) -> Result<Self> {
        let install_prefix = install_prefix.to_string();

        if !install_prefix.starts_with('/') {
            return Err(CommandIndexError::InstallPrefixNotAbsolute(install_prefix));
        }

        let install_prefix = install_prefix.trim_end_matches('/');
        if install_prefix.is_empty() {
            return Err(CommandIndexError::InstallPrefixIsRoot);
        }

        Ok(Self {
            install_prefix: install_prefix.to_string(),
            script_dir: script_dir.as_ref().to_path_buf(),
            repositories,
            architectures: DEFAULT_ARCHITECTURES.iter().map(|s| s.to_string()).collect(),
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            output_dir: PathBuf::from("."),
            duplicate_policy: DuplicatePolicy::default(),
            max_parallel_io: 4,
        })
    }

    /// The install prefix as it appears in index paths, without a leading `/`.
    pub fn index_prefix(&self) -> &str {
        self.install_prefix.trim_start_matches('/')
    }

    /// URL or path of a repository's root.
    pub fn repository_root(&self, repository: &RepositoryDefinition) -> String {
        match &repository.url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}",
                self.repository_url.trim_end_matches('/'),
                repository.name
            ),
        }
    }

    /// Directory holding package metadata for a repository directory.
    pub fn metadata_root(&self, repository_dir: &str) -> PathBuf {
        self.script_dir.join(repository_dir)
    }

    /// Path of the table for a repository and architecture.
    pub fn output_path(&self, architecture: &str, repository: &RepositoryDefinition) -> PathBuf {
        self.output_dir
            .join(format!("commands-{}-{}.h", architecture, repository.name))
    }
}

/// Directory holding the apt source lists of a system installed at a prefix.
///
/// A repository is enabled if `<name>.list` exists in it.
pub fn sources_list_dir(install_prefix: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}/etc/apt/sources.list.d",
        install_prefix.trim_end_matches('/')
    ))
}
