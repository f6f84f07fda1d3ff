// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Alternatives resolution.

A `Contents` index only lists concrete files. Alternatives add a layer of
link indirection on top: `bin/vi` may resolve to `libexec/vim/vim.basic`,
which is owned by a package that never lists `bin/vi` itself.

[AlternativesResolver] folds alternatives into a [ContentsIndex]. Each
binary link is attributed to the package owning the link's target, and every
link path (binary or not) is registered as owned by the package shipping the
alternatives file, so that later alternatives can point at it.

A record without a target still registers its link path but attributes no
binary.

Resolution is order sensitive. A target that isn't known *yet* is an error,
even if a later alternatives file would have registered it. Callers should
process files in a stable order (see [crate::discovery]).
*/

use {
    crate::{
        alternatives::{AlternativeRecord, AlternativesFile},
        contents::{basename, ContentsIndex},
        discovery::DiscoveredAlternatives,
        error::{CommandIndexError, Result},
    },
    log::{debug, warn},
};

/// Default directory prefix of alternative links that are binaries.
pub const DEFAULT_LINK_PREFIX: &str = "bin/";

/// Resolves alternatives records against a [ContentsIndex].
#[derive(Debug)]
pub struct AlternativesResolver<'a> {
    index: &'a mut ContentsIndex,
    install_prefix: String,
    link_prefix: String,
}

impl<'a> AlternativesResolver<'a> {
    /// Construct an instance operating on an index.
    ///
    /// `install_prefix` is the prefix directory as it appears in index paths,
    /// without leading or trailing `/`. e.g. `data/data/com.termux/files/usr`.
    /// Alternatives paths are relative to it.
    pub fn new(index: &'a mut ContentsIndex, install_prefix: &str) -> Self {
        Self {
            index,
            install_prefix: install_prefix.trim_matches('/').to_string(),
            link_prefix: DEFAULT_LINK_PREFIX.to_string(),
        }
    }

    /// Set the prefix identifying links that are binaries.
    pub fn with_link_prefix(mut self, prefix: impl ToString) -> Self {
        self.link_prefix = prefix.to_string();
        self
    }

    /// Obtain the index path for a prefix relative path.
    pub fn index_path(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');

        if self.install_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.install_prefix, relative)
        }
    }

    fn is_binary_link(&self, link: &str) -> bool {
        link.trim_start_matches('/').starts_with(&self.link_prefix)
    }

    fn resolve_owner(
        &self,
        owning_package: &str,
        record: &AlternativeRecord,
        relative: &str,
    ) -> Result<String> {
        let path = self.index_path(relative);

        match self.index.paths.owner(&path) {
            Some(package) => Ok(package.to_string()),
            None => Err(CommandIndexError::UnresolvedAlternativeTarget {
                package: owning_package.to_string(),
                alternative: record.name.clone(),
                path,
            }),
        }
    }

    /// Resolve a single alternatives record shipped by `owning_package`.
    pub fn resolve_record(
        &mut self,
        owning_package: &str,
        record: &AlternativeRecord,
    ) -> Result<()> {
        if record.target.is_empty() {
            warn!(
                "{}: alternative {} has no target; {} not attributed to any package",
                owning_package, record.name, record.link
            );
        } else if self.is_binary_link(&record.link) {
            let package = self.resolve_owner(owning_package, record, &record.target)?;
            debug!(
                "{}: {} -> {} provided by {}",
                owning_package, record.link, record.target, package
            );
            self.index.binaries.push(package, basename(&record.link));
        }

        for dependent in &record.dependents {
            if dependent.target.is_empty() {
                warn!(
                    "{}: dependent {} of alternative {} has no target",
                    owning_package, dependent.link, record.name
                );
            } else if self.is_binary_link(&dependent.link) {
                let package = self.resolve_owner(owning_package, record, &dependent.target)?;
                self.index.binaries.push(package, basename(&dependent.link));
            }

            let path = self.index_path(&dependent.link);
            self.index.paths.insert(path, owning_package);
        }

        let path = self.index_path(&record.link);
        self.index.paths.insert(path, owning_package);

        Ok(())
    }

    /// Resolve every record of a file, in file order.
    pub fn resolve_file(&mut self, owning_package: &str, file: &AlternativesFile) -> Result<()> {
        for record in file.records() {
            self.resolve_record(owning_package, record)?;
        }

        Ok(())
    }

    /// Resolve discovered alternatives files in the order given.
    pub fn resolve_all<'d>(
        &mut self,
        files: impl IntoIterator<Item = &'d DiscoveredAlternatives>,
    ) -> Result<()> {
        for file in files {
            self.resolve_file(&file.package, &file.alternatives)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{alternatives::DependentRecord, contents::ContentsIndexParser},
        std::path::PathBuf,
    };

    fn foo_record() -> AlternativeRecord {
        AlternativeRecord {
            name: "foo".into(),
            link: "bin/foo".into(),
            target: "libexec/foo/foo-real".into(),
            priority: 50,
            dependents: vec![],
        }
    }

    #[test]
    fn resolve_binary_link() -> Result<()> {
        let mut index = ContentsIndex::default();
        index.paths.insert("usr/libexec/foo/foo-real", "foo-real-pkg");

        AlternativesResolver::new(&mut index, "usr")
            .resolve_record("foo-meta", &foo_record())?;

        assert_eq!(
            index.binaries.binaries("foo-real-pkg").unwrap(),
            &["foo".to_string()]
        );
        assert_eq!(index.paths.owner("usr/bin/foo"), Some("foo-meta"));
        assert!(index.binaries.binaries("foo-meta").is_none());

        Ok(())
    }

    #[test]
    fn missing_target_skips_binary() -> Result<()> {
        let mut index = ContentsIndex::default();
        index.paths.insert("usr/bin/vim", "vim");

        let record = AlternativeRecord {
            name: "vi".into(),
            link: "bin/vi".into(),
            priority: 10,
            ..Default::default()
        };

        AlternativesResolver::new(&mut index, "usr").resolve_record("vim", &record)?;

        assert!(index.binaries.is_empty());
        assert_eq!(index.paths.owner("usr/bin/vi"), Some("vim"));

        Ok(())
    }

    #[test]
    fn unresolved_target_is_error() {
        let mut index = ContentsIndex::default();

        let res = AlternativesResolver::new(&mut index, "usr")
            .resolve_record("foo-meta", &foo_record());

        match res {
            Err(CommandIndexError::UnresolvedAlternativeTarget {
                package,
                alternative,
                path,
            }) => {
                assert_eq!(package, "foo-meta");
                assert_eq!(alternative, "foo");
                assert_eq!(path, "usr/libexec/foo/foo-real");
            }
            res => panic!("unexpected result: {:?}", res),
        }

        assert!(index.binaries.is_empty());
        assert!(!index.paths.contains("usr/bin/foo"));
    }

    #[test]
    fn non_binary_link_only_registers_path() -> Result<()> {
        let mut index = ContentsIndex::default();

        let record = AlternativeRecord {
            name: "foo.1".into(),
            link: "share/man/man1/foo.1.gz".into(),
            target: "share/man/man1/missing.1.gz".into(),
            ..Default::default()
        };

        AlternativesResolver::new(&mut index, "usr").resolve_record("foo-meta", &record)?;

        assert!(index.binaries.is_empty());
        assert_eq!(
            index.paths.owner("usr/share/man/man1/foo.1.gz"),
            Some("foo-meta")
        );

        Ok(())
    }

    #[test]
    fn dependents() -> Result<()> {
        let mut index = ContentsIndex::default();
        index.paths.insert("usr/libexec/foo/foo-real", "foo-real-pkg");
        index.paths.insert("usr/libexec/foo/bar-real", "bar-real-pkg");

        let mut record = foo_record();
        record.dependents = vec![
            DependentRecord {
                link: "bin/bar".into(),
                name: "barlink".into(),
                target: "libexec/foo/bar-real".into(),
            },
            DependentRecord {
                link: "share/man/man1/foo.1.gz".into(),
                name: "foo.1".into(),
                target: "share/man/man1/not-indexed.1.gz".into(),
            },
        ];

        AlternativesResolver::new(&mut index, "usr").resolve_record("foo-meta", &record)?;

        assert_eq!(
            index.binaries.binaries("bar-real-pkg").unwrap(),
            &["bar".to_string()]
        );
        assert_eq!(index.paths.owner("usr/bin/bar"), Some("foo-meta"));
        assert_eq!(
            index.paths.owner("usr/share/man/man1/foo.1.gz"),
            Some("foo-meta")
        );

        Ok(())
    }

    #[test]
    fn unresolved_dependent_is_error() {
        let mut index = ContentsIndex::default();
        index.paths.insert("usr/libexec/foo/foo-real", "foo-real-pkg");

        let mut record = foo_record();
        record.dependents.push(DependentRecord {
            link: "bin/bar".into(),
            name: "barlink".into(),
            target: "libexec/foo/bar-real".into(),
        });

        assert!(matches!(
            AlternativesResolver::new(&mut index, "usr").resolve_record("foo-meta", &record),
            Err(CommandIndexError::UnresolvedAlternativeTarget { .. })
        ));
    }

    #[test]
    fn chained_links_resolve_in_order() -> Result<()> {
        let mut index = ContentsIndexParser::new("usr/bin/")
            .parse_text("usr/bin/vim vim\nusr/libexec/vim/vim.basic vim\n");

        // editor -> vi -> vim.basic. `bin/vi` only exists once the first record is
        // processed.
        let vi = AlternativeRecord {
            name: "vi".into(),
            link: "bin/vi".into(),
            target: "libexec/vim/vim.basic".into(),
            ..Default::default()
        };
        let editor = AlternativeRecord {
            name: "editor".into(),
            link: "bin/editor".into(),
            target: "bin/vi".into(),
            ..Default::default()
        };

        let files = vec![
            DiscoveredAlternatives {
                package: "vim".into(),
                path: PathBuf::from("packages/vim/vim.alternatives"),
                alternatives: vec![vi].into(),
            },
            DiscoveredAlternatives {
                package: "editor-meta".into(),
                path: PathBuf::from("packages/zz/editor.alternatives"),
                alternatives: vec![editor].into(),
            },
        ];

        AlternativesResolver::new(&mut index, "usr").resolve_all(&files)?;

        assert_eq!(
            index.binaries.binaries("vim").unwrap(),
            &["vim".to_string(), "vi".to_string(), "editor".to_string()]
        );
        assert_eq!(
            index.binaries.binaries("editor-meta"),
            None,
            "editor resolves through the owner of bin/vi"
        );
        assert_eq!(index.paths.owner("usr/bin/editor"), Some("editor-meta"));

        // Reversed order fails because bin/vi isn't registered yet.
        let mut index = ContentsIndexParser::new("usr/bin/")
            .parse_text("usr/bin/vim vim\nusr/libexec/vim/vim.basic vim\n");
        let res = AlternativesResolver::new(&mut index, "usr").resolve_all(files.iter().rev());
        assert!(matches!(
            res,
            Err(CommandIndexError::UnresolvedAlternativeTarget { .. })
        ));

        Ok(())
    }

    #[test]
    fn index_path_joining() {
        let mut index = ContentsIndex::default();

        let resolver = AlternativesResolver::new(&mut index, "/data/data/com.termux/files/usr/");
        assert_eq!(
            resolver.index_path("bin/vi"),
            "data/data/com.termux/files/usr/bin/vi"
        );

        let resolver = AlternativesResolver::new(&mut index, "");
        assert_eq!(resolver.index_path("/bin/vi"), "bin/vi");
    }

    #[test]
    fn custom_link_prefix() -> Result<()> {
        let mut index = ContentsIndex::default();
        index.paths.insert("usr/libexec/foo/foo-real", "foo-real-pkg");

        let mut record = foo_record();
        record.link = "sbin/foo".into();

        AlternativesResolver::new(&mut index, "usr")
            .with_link_prefix("sbin/")
            .resolve_record("foo-meta", &record)?;

        assert_eq!(
            index.binaries.binaries("foo-real-pkg").unwrap(),
            &["foo".to_string()]
        );

        Ok(())
    }
}
