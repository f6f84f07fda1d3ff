// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Alternatives definition files.

An alternatives file declares one or more *alternatives*: a logical command
name that can be satisfied by several interchangeable providers. A file
consists of stanzas introduced by a `Name:` line:

```text
Name: editor
Link: bin/editor
Alternative: bin/vim
Dependents:
  share/man/man1/editor.1.gz editor.1 share/man/man1/vim.1.gz
Priority: 50
```

Paths are relative to the install prefix.

Parsing is permissive. Unrecognized lines are ignored and malformed stanzas
degrade to partial records instead of failing the parse.
*/

use {
    crate::error::{CommandIndexError, Result},
    log::{debug, warn},
    std::{io::BufRead, path::Path},
};

/// A secondary link installed alongside an alternative's primary link.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependentRecord {
    /// Path of the link.
    pub link: String,
    /// Name of the dependent alternative.
    pub name: String,
    /// Path the link points at.
    pub target: String,
}

/// A single alternative stanza.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AlternativeRecord {
    /// Logical command identifier.
    pub name: String,
    /// Path users invoke. Never empty on parsed records.
    pub link: String,
    /// Installed path the link resolves to.
    pub target: String,
    /// Ranking among providers of the same name.
    pub priority: i64,
    /// Secondary links, in file order.
    pub dependents: Vec<DependentRecord>,
}

/// Recognized line directives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Directive<'a> {
    Name(&'a str),
    Link(&'a str),
    Alternative(&'a str),
    Priority(&'a str),
    Dependents,
    Other,
}

impl<'a> Directive<'a> {
    fn parse(line: &'a str) -> Self {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => return Self::Other,
        };

        match key {
            "Name" => Self::Name(value),
            "Link" => Self::Link(value),
            "Alternative" => Self::Alternative(value),
            "Priority" => Self::Priority(value),
            "Dependents" => Self::Dependents,
            _ => Self::Other,
        }
    }
}

/// Line parser state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParserState {
    /// Lines are matched against directives.
    ScanningDirectives,
    /// Lines that aren't directives are dependent link definitions.
    CollectingDependents,
}

impl ParserState {
    /// The state following a line.
    ///
    /// Any directive other than `Dependents:` leaves dependents collection.
    /// Non-directive lines never change state.
    fn transition(self, directive: &Directive) -> Self {
        match directive {
            Directive::Dependents => Self::CollectingDependents,
            Directive::Other => self,
            _ => Self::ScanningDirectives,
        }
    }
}

/// Incremental parser of alternatives files.
#[derive(Debug)]
pub struct AlternativesParser {
    state: ParserState,
    current: Option<AlternativeRecord>,
    records: Vec<AlternativeRecord>,
}

impl Default for AlternativesParser {
    fn default() -> Self {
        Self {
            state: ParserState::ScanningDirectives,
            current: None,
            records: vec![],
        }
    }
}

impl AlternativesParser {
    /// The current parser state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    fn finalize_current(&mut self) {
        if let Some(record) = self.current.take() {
            if record.link.is_empty() {
                debug!("dropping alternative {:?} without a Link", record.name);
            } else {
                self.records.push(record);
            }
        }
    }

    /// Feed a single line to the parser.
    pub fn parse_line(&mut self, line: &str) {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        };

        let directive = Directive::parse(line);

        match (self.state, &directive) {
            (ParserState::CollectingDependents, Directive::Other) => {
                if let Some(dependent) = parse_dependent(line) {
                    if let Some(record) = self.current.as_mut() {
                        record.dependents.push(dependent);
                    }
                }
            }
            (_, Directive::Name(value)) => {
                self.finalize_current();
                self.current = Some(AlternativeRecord {
                    name: value.to_string(),
                    ..Default::default()
                });
            }
            (_, Directive::Other) => {}
            (_, directive) => match self.current.as_mut() {
                Some(record) => match directive {
                    Directive::Link(value) => record.link = value.to_string(),
                    Directive::Alternative(value) => record.target = value.to_string(),
                    Directive::Priority(value) => match value.parse::<i64>() {
                        Ok(priority) => record.priority = priority,
                        Err(e) => warn!(
                            "alternative {}: ignoring invalid priority {:?}: {}",
                            record.name, value, e
                        ),
                    },
                    _ => {}
                },
                None => {
                    debug!("ignoring directive before first Name: {}", line.trim());
                }
            },
        }

        self.state = self.state.transition(&directive);
    }

    /// Finish parsing and obtain records in file order.
    pub fn finish(mut self) -> Vec<AlternativeRecord> {
        self.finalize_current();
        self.records
    }
}

/// Parse a dependent link definition.
///
/// Exactly three whitespace delimited tokens are required: `link name target`.
/// A leading `->` marker is accepted and discarded.
fn parse_dependent(line: &str) -> Option<DependentRecord> {
    let mut tokens = line.split_whitespace().collect::<Vec<_>>();

    if tokens.first() == Some(&"->") {
        tokens.remove(0);
    }

    match tokens.as_slice() {
        [link, name, target] => Some(DependentRecord {
            link: link.to_string(),
            name: name.to_string(),
            target: target.to_string(),
        }),
        [] => None,
        _ => {
            debug!("ignoring malformed dependent line: {}", line.trim());
            None
        }
    }
}

/// A parsed alternatives file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AlternativesFile {
    records: Vec<AlternativeRecord>,
}

impl AlternativesFile {
    /// Parse the text of an alternatives file.
    pub fn parse(text: &str) -> Self {
        let mut parser = AlternativesParser::default();

        for line in text.lines() {
            parser.parse_line(line);
        }

        Self {
            records: parser.finish(),
        }
    }

    /// Parse an alternatives file from a reader.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut parser = AlternativesParser::default();

        for line in reader.lines() {
            parser.parse_line(&line?);
        }

        Ok(Self {
            records: parser.finish(),
        })
    }

    /// Parse an alternatives file at a filesystem path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let f = std::fs::File::open(path)
            .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e))?;

        Self::from_reader(std::io::BufReader::new(f))
    }

    /// Records in file order.
    pub fn records(&self) -> &[AlternativeRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the file defined no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<AlternativeRecord>> for AlternativesFile {
    fn from(records: Vec<AlternativeRecord>) -> Self {
        Self { records }
    }
}
