// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Command table generation.

[build_table()] is the pure core: it turns the text of a `Contents` index
and a set of alternatives files into a [CommandTable] without performing
any I/O.

[Generator] drives generation for every configured repository and
architecture: it fetches indices, runs the core and writes the resulting
tables. Each (repository, architecture) pair is independent. A failure in
one pair doesn't prevent other pairs from completing.
*/

use {
    crate::{
        config::{GeneratorConfig, RepositoryDefinition},
        contents::{ContentsIndex, ContentsIndexParser, STOCK_INSTALL_PREFIX},
        discovery::{discover_alternatives, DiscoveredAlternatives},
        error::{CommandIndexError, Result},
        repository::{fetch_contents_index, reader_from_str, ContentsIndexLocation},
        resolver::{AlternativesResolver, DEFAULT_LINK_PREFIX},
        table::{CommandTable, DuplicatePolicy},
    },
    futures::StreamExt,
    log::{error, info, warn},
    std::{
        fmt::{Display, Formatter},
        io::Write,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Settings for building a single table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableOptions {
    /// Install prefix as it appears in index paths. e.g. `data/data/com.termux/files/usr`.
    pub index_prefix: String,
    /// Index path prefix of binaries.
    pub binary_path_prefix: String,
    /// Prefix of alternative links that are binaries.
    pub link_prefix: String,
    /// Whether index paths under [STOCK_INSTALL_PREFIX] are rewritten to the index prefix.
    pub rewrite_stock_prefix: bool,
    /// How repeated binaries within a package are handled.
    pub duplicate_policy: DuplicatePolicy,
}

impl TableOptions {
    /// Construct an instance for an index prefix, with binaries in its `bin/`.
    pub fn new(index_prefix: &str) -> Self {
        let index_prefix = index_prefix.trim_matches('/');

        let binary_path_prefix = if index_prefix.is_empty() {
            DEFAULT_LINK_PREFIX.to_string()
        } else {
            format!("{}/{}", index_prefix, DEFAULT_LINK_PREFIX)
        };

        Self {
            index_prefix: index_prefix.to_string(),
            binary_path_prefix,
            link_prefix: DEFAULT_LINK_PREFIX.to_string(),
            rewrite_stock_prefix: true,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    /// Construct an instance from generator settings.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            duplicate_policy: config.duplicate_policy,
            ..Self::new(config.index_prefix())
        }
    }

    /// Obtain a parser for `Contents` indices honoring these settings.
    pub fn contents_parser(&self) -> ContentsIndexParser {
        let parser = ContentsIndexParser::new(&self.binary_path_prefix);

        if self.rewrite_stock_prefix {
            parser.with_prefix_rewrite(STOCK_INSTALL_PREFIX, &self.index_prefix)
        } else {
            parser
        }
    }
}

/// Build a command table from index text and alternatives files.
///
/// Alternatives files are resolved in the order given.
pub fn build_table(
    contents: &str,
    alternatives: &[DiscoveredAlternatives],
    options: &TableOptions,
) -> Result<CommandTable> {
    build_table_from_index(
        options.contents_parser().parse_text(contents),
        alternatives,
        options,
    )
}

/// Build a command table from a parsed index and alternatives files.
///
/// The index must have been parsed with [TableOptions::contents_parser()].
pub fn build_table_from_index(
    mut index: ContentsIndex,
    alternatives: &[DiscoveredAlternatives],
    options: &TableOptions,
) -> Result<CommandTable> {
    AlternativesResolver::new(&mut index, &options.index_prefix)
        .with_link_prefix(&options.link_prefix)
        .resolve_all(alternatives)?;

    Ok(CommandTable::from_ownership(
        &index.binaries,
        options.duplicate_policy,
    ))
}

/// Build and render a command table.
///
/// An empty table is an error.
pub fn generate_table(
    contents: &str,
    alternatives: &[DiscoveredAlternatives],
    options: &TableOptions,
) -> Result<String> {
    build_table(contents, alternatives, options)?.render()
}

/// Write a table to a path, replacing any existing file.
///
/// Content is written to a temporary file in the destination directory and
/// renamed into place. The written file is read back and compared.
pub fn write_table(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", dir.display()), e))?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e.error)
    })?;

    let written = std::fs::read_to_string(path)
        .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e))?;
    if written != content {
        return Err(CommandIndexError::OutputVerification(format!(
            "{}",
            path.display()
        )));
    }

    Ok(())
}

/// A single (repository, architecture) unit of generation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TablePair {
    /// Directory of the repository in the packages tree.
    pub repository_dir: String,
    /// The repository.
    pub repository: RepositoryDefinition,
    /// The architecture.
    pub architecture: String,
}

impl Display for TablePair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repository.name, self.architecture)
    }
}

/// A failure of a unit of generation.
#[derive(Debug)]
pub struct GenerationFailure {
    /// What failed. A repository name or a `repository/architecture` pair.
    pub target: String,
    /// The error.
    pub error: CommandIndexError,
}

/// Outcome of a generation run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Paths of tables written, sorted.
    pub written: Vec<PathBuf>,
    /// Units that failed.
    pub failures: Vec<GenerationFailure>,
}

impl GenerationReport {
    /// Whether every unit succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Generates command tables for every configured repository and architecture.
#[derive(Clone, Debug)]
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    /// Construct an instance from settings.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// The settings of this instance.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Obtain all units of generation.
    pub fn pairs(&self) -> Vec<TablePair> {
        self.config
            .repositories
            .iter()
            .flat_map(|(dir, repository)| {
                self.config.architectures.iter().map(move |arch| TablePair {
                    repository_dir: dir.to_string(),
                    repository: repository.clone(),
                    architecture: arch.clone(),
                })
            })
            .collect()
    }

    /// Fetch, build and write the table for a single pair.
    pub async fn generate_pair(
        &self,
        pair: &TablePair,
        alternatives: Arc<Vec<DiscoveredAlternatives>>,
    ) -> Result<PathBuf> {
        let root = self.config.repository_root(&pair.repository);
        let reader = reader_from_str(&root)?;
        let location =
            ContentsIndexLocation::new(&pair.repository.distribution, &pair.architecture);

        let options = TableOptions::from_config(&self.config);
        let index =
            fetch_contents_index(reader.as_ref(), &location, options.contents_parser()).await?;

        let content = tokio::task::spawn_blocking(move || {
            build_table_from_index(index, alternatives.as_slice(), &options)?.render()
        })
        .await??;

        let path = self.config.output_path(&pair.architecture, &pair.repository);
        write_table(&path, &content)?;

        info!(
            "downloaded from {}/{} and then written to {}",
            root,
            location.path(),
            path.display()
        );

        Ok(path)
    }

    /// Generate tables for all pairs.
    ///
    /// Pairs are processed concurrently. Failures are collected in the returned
    /// report rather than aborting other pairs.
    pub async fn run(&self) -> GenerationReport {
        let mut report = GenerationReport::default();
        let mut fs = vec![];

        for (dir, repository) in self.config.repositories.iter() {
            let root = self.config.metadata_root(dir);

            let alternatives = match discover_alternatives(&root) {
                Ok(alternatives) => Arc::new(alternatives),
                Err(e) => {
                    error!("{}: error discovering alternatives: {}", repository.name, e);
                    report.failures.push(GenerationFailure {
                        target: repository.name.clone(),
                        error: e,
                    });
                    continue;
                }
            };

            if alternatives.is_empty() {
                warn!(
                    "{}: no alternatives files found under {}",
                    repository.name,
                    root.display()
                );
            }

            for arch in &self.config.architectures {
                let pair = TablePair {
                    repository_dir: dir.to_string(),
                    repository: repository.clone(),
                    architecture: arch.clone(),
                };
                let alternatives = alternatives.clone();

                fs.push(async move {
                    let res = self.generate_pair(&pair, alternatives).await;
                    (pair, res)
                });
            }
        }

        let mut buffered =
            futures::stream::iter(fs).buffer_unordered(self.config.max_parallel_io.max(1));

        while let Some((pair, res)) = buffered.next().await {
            match res {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    error!("{}: {}", pair, e);
                    report.failures.push(GenerationFailure {
                        target: pair.to_string(),
                        error: e,
                    });
                }
            }
        }

        report.written.sort();
        report.failures.sort_by(|a, b| a.target.cmp(&b.target));

        report
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{alternatives::AlternativesFile, config::RepositorySet},
        async_compression::futures::bufread::GzipEncoder,
        futures::{io::Cursor, AsyncReadExt},
        indoc::indoc,
    };

    fn discovered(package: &str, text: &str) -> DiscoveredAlternatives {
        DiscoveredAlternatives {
            package: package.into(),
            path: PathBuf::from(format!("packages/{}/{}.alternatives", package, package)),
            alternatives: AlternativesFile::parse(text),
        }
    }

    #[test]
    fn end_to_end() -> Result<()> {
        let alternatives = vec![discovered(
            "vim-pkg",
            "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/vim.basic\n",
        )];

        let content = generate_table(
            "usr/bin/vim vim-pkg\nusr/libexec/vim/vim.basic vim-pkg\n",
            &alternatives,
            &TableOptions::new("usr"),
        )?;

        assert!(content.contains("\"vim-pkg\",\n\" vi\",\n\" vim\","));
        assert_eq!(content, "\"vim-pkg\",\n\" vi\",\n\" vim\",\n");

        Ok(())
    }

    #[test]
    fn stock_prefix_rewritten() -> Result<()> {
        let table = build_table(
            indoc! {"
                data/data/com.termux/files/usr/bin/ls coreutils
                data/data/com.termux/files/usr/libexec/vim/vim vim
            "},
            &[discovered(
                "vim",
                "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/vim\n",
            )],
            &TableOptions::new("/opt/prefix"),
        )?;

        assert_eq!(table.binaries("coreutils").unwrap(), &["ls".to_string()]);
        assert_eq!(table.binaries("vim").unwrap(), &["vi".to_string()]);

        Ok(())
    }

    #[test]
    fn missing_alternative_target_still_builds() -> Result<()> {
        let content = generate_table(
            "usr/bin/vim vim\n",
            &[discovered("vim", "Name: vi\nLink: bin/vi\nPriority: 10\n")],
            &TableOptions::new("usr"),
        )?;

        assert_eq!(content, "\"vim\",\n\" vim\",\n");

        Ok(())
    }

    #[test]
    fn root_index_prefix() -> Result<()> {
        let options = TableOptions::new("/");
        assert_eq!(options.index_prefix, "");
        assert_eq!(options.binary_path_prefix, "bin/");

        let table = build_table(
            indoc! {"
                data/data/com.termux/files/usr/bin/vim vim
                data/data/com.termux/files/usr/libexec/vim/vim vim
            "},
            &[discovered(
                "vim",
                "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/vim\n",
            )],
            &options,
        )?;

        assert_eq!(
            table.binaries("vim").unwrap(),
            &["vim".to_string(), "vi".to_string()]
        );

        Ok(())
    }

    #[test]
    fn unresolved_alternative_fails_table() {
        let res = generate_table(
            "usr/bin/vim vim\n",
            &[discovered(
                "vim",
                "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/missing\n",
            )],
            &TableOptions::new("usr"),
        );

        assert!(matches!(
            res,
            Err(CommandIndexError::UnresolvedAlternativeTarget { .. })
        ));
    }

    #[test]
    fn no_binaries_is_error() {
        let res = generate_table(
            "usr/share/doc/readme docs\n",
            &[],
            &TableOptions::new("usr"),
        );

        assert!(matches!(res, Err(CommandIndexError::EmptyTable)));
    }

    #[test]
    fn duplicates() -> Result<()> {
        let contents = "usr/bin/x a\nusr/libexec/x a\n";
        let alternatives = [discovered(
            "a",
            "Name: x\nLink: bin/x\nAlternative: libexec/x\n",
        )];

        let preserved = generate_table(contents, &alternatives, &TableOptions::new("usr"))?;
        assert_eq!(preserved, "\"a\",\n\" x\",\n\" x\",\n");

        let options = TableOptions {
            duplicate_policy: DuplicatePolicy::Deduplicate,
            ..TableOptions::new("usr")
        };
        let deduplicated = generate_table(contents, &alternatives, &options)?;
        assert_eq!(deduplicated, "\"a\",\n\" x\",\n");

        Ok(())
    }

    #[test]
    fn write_table_replaces() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("commands-arm-termux-main.h");

        std::fs::write(&path, "old content that is longer\n")?;
        write_table(&path, "\"a\",\n\" x\",\n")?;

        assert_eq!(std::fs::read_to_string(&path)?, "\"a\",\n\" x\",\n");

        Ok(())
    }

    async fn gzip(data: &str) -> Vec<u8> {
        let mut compressed = vec![];
        GzipEncoder::new(Cursor::new(data.as_bytes().to_vec()))
            .read_to_end(&mut compressed)
            .await
            .unwrap();

        compressed
    }

    #[tokio::test]
    async fn generator_run() -> Result<()> {
        let td = tempfile::tempdir()?;
        let script_dir = td.path().join("scripts");
        let mirror = td.path().join("mirror");
        let output_dir = td.path().join("out");
        std::fs::create_dir_all(script_dir.join("packages").join("vim"))?;
        std::fs::create_dir_all(mirror.join("termux-main").join("dists").join("stable"))?;
        std::fs::create_dir_all(&output_dir)?;

        std::fs::write(
            script_dir
                .join("packages")
                .join("vim")
                .join("vim.alternatives"),
            "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/vim\n",
        )?;

        let dists = mirror.join("termux-main").join("dists").join("stable");
        std::fs::write(
            dists.join("Contents-aarch64.gz"),
            gzip(indoc! {"
                data/data/com.termux/files/usr/bin/vim vim
                data/data/com.termux/files/usr/libexec/vim/vim vim
            "})
            .await,
        )?;
        // The arm index is missing, so that pair fails.

        let repositories = RepositorySet::from_json(&format!(
            r#"{{"packages": {{"name": "termux-main", "distribution": "stable", "url": "{}"}}}}"#,
            mirror.join("termux-main").display()
        ))?;

        let mut config = GeneratorConfig::new(
            "/data/data/com.termux/files/usr",
            &script_dir,
            repositories,
        )?;
        config.architectures = vec!["aarch64".into(), "arm".into()];
        config.output_dir = output_dir.clone();

        let generator = Generator::new(config);
        assert_eq!(generator.pairs().len(), 2);

        let report = generator.run().await;

        assert!(!report.is_success());
        assert_eq!(
            report.written,
            vec![output_dir.join("commands-aarch64-termux-main.h")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, "termux-main/arm");
        assert!(!output_dir.join("commands-arm-termux-main.h").exists());

        assert_eq!(
            std::fs::read_to_string(output_dir.join("commands-aarch64-termux-main.h"))?,
            "\"vim\",\n\" vi\",\n\" vim\",\n"
        );

        Ok(())
    }
    #[tokio::test]
    async fn generator_run_unresolved_pair_keeps_previous_table() -> Result<()> {
        let td = tempfile::tempdir()?;
        let script_dir = td.path().join("scripts");
        let dists = td.path().join("mirror").join("dists").join("stable");
        let output_dir = td.path().join("out");
        std::fs::create_dir_all(script_dir.join("packages").join("vim"))?;
        std::fs::create_dir_all(&dists)?;
        std::fs::create_dir_all(&output_dir)?;

        std::fs::write(
            script_dir
                .join("packages")
                .join("vim")
                .join("vim.alternatives"),
            "Name: vi\nLink: bin/vi\nAlternative: libexec/vim/vim\n",
        )?;

        std::fs::write(
            dists.join("Contents-aarch64.gz"),
            gzip(indoc! {"
                data/data/com.termux/files/usr/bin/vim vim
                data/data/com.termux/files/usr/libexec/vim/vim vim
            "})
            .await,
        )?;
        // No package in this index owns the alternative's target.
        std::fs::write(
            dists.join("Contents-arm.gz"),
            gzip("data/data/com.termux/files/usr/bin/vim vim\n").await,
        )?;

        let previous = "\"vim\",\n\" vim\",\n";
        std::fs::write(output_dir.join("commands-arm-termux-main.h"), previous)?;

        let repositories = RepositorySet::from_json(&format!(
            r#"{{"packages": {{"name": "termux-main", "distribution": "stable", "url": "{}"}}}}"#,
            td.path().join("mirror").display()
        ))?;

        let mut config = GeneratorConfig::new(
            "/data/data/com.termux/files/usr",
            &script_dir,
            repositories,
        )?;
        config.architectures = vec!["aarch64".into(), "arm".into()];
        config.output_dir = output_dir.clone();
        config.max_parallel_io = 1;

        let report = Generator::new(config).run().await;

        assert_eq!(
            report.written,
            vec![output_dir.join("commands-aarch64-termux-main.h")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, "termux-main/arm");
        assert!(matches!(
            report.failures[0].error,
            CommandIndexError::UnresolvedAlternativeTarget { .. }
        ));

        assert_eq!(
            std::fs::read_to_string(output_dir.join("commands-arm-termux-main.h"))?,
            previous
        );
        assert_eq!(
            std::fs::read_to_string(output_dir.join("commands-aarch64-termux-main.h"))?,
            "\"vim\",\n\" vi\",\n\" vim\",\n"
        );

        // Only the final tables are left in the output directory.
        assert_eq!(std::fs::read_dir(&output_dir)?.count(), 2);

        Ok(())
    }
}
