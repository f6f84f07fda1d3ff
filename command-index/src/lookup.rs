// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Finding packages providing a command.

This is the consumer side of [crate::table::CommandTable]: given a command a
user tried to run, find packages that provide it or something with a similar
name.
*/

use {
    crate::table::CommandTable,
    std::collections::{btree_map::Entry, BTreeMap},
};

/// Suggestions further than this edit distance from the command are discarded.
pub const MAX_SUGGESTION_DISTANCE: usize = 3;

/// A package providing a binary matching a looked up command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Suggestion {
    /// Name of the package.
    pub package: String,
    /// Name of the binary in the package.
    pub binary: String,
    /// Label of the repository holding the package, if not the main repository.
    pub repository: Option<String>,
}

/// Result of looking up a command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LookupOutcome {
    /// No binary is within [MAX_SUGGESTION_DISTANCE] of the command.
    NotFound,
    /// Packages providing a binary with exactly the command's name.
    Installable(Vec<Suggestion>),
    /// Packages providing binaries with similar names.
    DidYouMean(Vec<Suggestion>),
}

/// Accumulates the best matches for a command across tables.
#[derive(Clone, Debug)]
pub struct CommandLookup<'a> {
    command: &'a str,
    best_distance: Option<usize>,
    matches: BTreeMap<String, Suggestion>,
}

impl<'a> CommandLookup<'a> {
    /// Begin a lookup of a command.
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            best_distance: None,
            matches: BTreeMap::new(),
        }
    }

    /// Search a table for matches.
    ///
    /// `repository` labels suggestions from this table. An empty label denotes
    /// the main repository.
    pub fn search(&mut self, table: &CommandTable, repository: &str) {
        for (package, binaries) in table.entries() {
            for binary in binaries {
                self.consider(package, binary, repository);
            }
        }
    }

    fn consider(&mut self, package: &str, binary: &str, repository: &str) {
        let distance = strsim::levenshtein(self.command, binary);

        match self.best_distance {
            Some(best) if distance > best => return,
            Some(best) if distance == best => {}
            _ => {
                self.matches.clear();
                self.best_distance = Some(distance);
            }
        }

        // The first binary seen for a package is kept.
        if let Entry::Vacant(entry) = self.matches.entry(package.to_string()) {
            entry.insert(Suggestion {
                package: package.to_string(),
                binary: binary.to_string(),
                repository: if repository.is_empty() {
                    None
                } else {
                    Some(repository.to_string())
                },
            });
        }
    }

    /// Finish the lookup.
    ///
    /// Suggestions are sorted by package name.
    pub fn finish(self) -> LookupOutcome {
        match self.best_distance {
            Some(0) => LookupOutcome::Installable(self.matches.into_values().collect()),
            Some(d) if d <= MAX_SUGGESTION_DISTANCE => {
                LookupOutcome::DidYouMean(self.matches.into_values().collect())
            }
            _ => LookupOutcome::NotFound,
        }
    }
}

/// Look up a command in a set of labelled tables.
pub fn find_command<'t>(
    command: &str,
    tables: impl IntoIterator<Item = (&'t str, &'t CommandTable)>,
) -> LookupOutcome {
    let mut lookup = CommandLookup::new(command);

    for (repository, table) in tables {
        lookup.search(table, repository);
    }

    lookup.finish()
}
