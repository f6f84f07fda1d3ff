// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package to command tables.

This crate builds tables answering *which package provides command X* for a
package repository, without querying the repository at runtime. Tables are
derived from a repository's `Contents` indices and from the *alternatives*
definitions shipped in package metadata.

# A Tour of Functionality

The [contents] module parses `Contents` indices.
[contents::ContentsIndexParser] turns index text into a
[contents::ContentsIndex], which holds a [contents::PathOwnerMap] (path to
owning package) and a [contents::BinaryOwnership] (package to binaries).

The [alternatives] module parses alternatives definition files into
[alternatives::AlternativeRecord]s. The [resolver] module folds them into a
[contents::ContentsIndex] with [resolver::AlternativesResolver], attributing
each alternative link to the package owning its target.

The [table] module renders the result. [table::CommandTable] produces the
sorted textual table and can also parse and edit existing tables. The
[lookup] module consumes tables to find packages providing a command or a
similarly named one. The [deb] module extracts the binaries of `.deb`
files, for updating a table with freshly built packages.

The [generate] module ties it together. [generate::build_table()] is the
I/O free core. [generate::Generator] fetches indices via the [repository]
module for every configured repository and architecture and writes the
resulting tables. Configuration is handled by the [config] module and
alternatives files are found by the [discovery] module.

# Determinism

Given the same index text and alternatives files, generated tables are
byte-for-byte identical. Alternatives files are resolved in sorted path
order because resolution is order sensitive: an alternative pointing at a
link that another alternative registers only resolves if that other
alternative was processed first.

# Crate Features

The optional and enabled-by-default `http` feature enables fetching indices
from HTTP repositories.
*/

pub mod alternatives;
pub mod config;
pub mod contents;
pub mod deb;
pub mod discovery;
pub mod error;
pub mod generate;
pub mod io;
pub mod lookup;
pub mod repository;
pub mod resolver;
pub mod table;
