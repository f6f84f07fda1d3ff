// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    command_index::{
        alternatives::AlternativesFile,
        config::{sources_list_dir, GeneratorConfig, PREFIX_ENV},
        contents::STOCK_INSTALL_PREFIX,
        deb::{binaries_from_deb, package_name_from_path},
        discovery::discover_alternatives,
        error::CommandIndexError,
        generate::{build_table_from_index, write_table, Generator, TableOptions},
        io::{Compression, DataResolver},
        lookup::{CommandLookup, LookupOutcome, Suggestion},
        repository::{filesystem::FilesystemRepositoryReader, read_contents_index},
        table::{CommandTable, DuplicatePolicy},
    },
    log::{info, LevelFilter},
    std::{
        io::BufRead,
        path::{Path, PathBuf},
    },
    thiserror::Error,
};

const ABOUT: &str = "\
# About

`cit` generates tables mapping packages to the commands they provide.

Tables are derived from a repository's `Contents` indices, which list the
files installed by every package, and from alternatives definitions in the
packages source tree, which describe commands provided through links.

Generated tables are meant to be compiled into a command-not-found handler.
";

const GENERATE_ABOUT: &str = "\
Generate command tables for all configured repositories and architectures.

Configuration is read from the environment:

TERMUX_PREFIX (required)
   The absolute install prefix. e.g. `/data/data/com.termux/files/usr`.
   Binaries are extracted from `<prefix>/bin/`.

TERMUX_SCRIPTDIR (required)
   The packages source tree. Repository definitions are read from its
   `repo.json` and alternatives files from `<repository dir>/<package>/`.

For each repository and architecture, the `Contents-<arch>.gz` index is
fetched from `<url>/dists/<distribution>/` and a table is written to
`commands-<arch>-<repository name>.h` in the output directory.

A failure of one repository/architecture pair doesn't stop the others. The
command exits with an error if any pair failed.
";

const LOOKUP_ABOUT: &str = "\
Find packages providing a command.

Tables are given with `--table`. A value of the form `LABEL=PATH` labels the
table with the repository it came from. Tables without a label are
considered part of the main repository.

If no binary has the exact name, packages with similarly named binaries are
suggested. The command exits with status 127, like a shell does for an
unknown command.
";

const EDIT_TABLE_ABOUT: &str = "\
Add, replace or remove packages in an existing command table.

Edits are applied in order: removals, then `--set` definitions, then `.deb`
files. The package of a `.deb` is named by its filename, up to the first
`_`. Its binaries are the files under `<prefix>/bin/` in the package's data
archive. A `.deb` providing no binaries leaves the table unchanged.

With `--stdin`, paths to `.deb` files are read from stdin, one per line. This
avoids command line length limits when updating many packages.
";

#[derive(Debug, Error)]
pub enum CitError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    CommandIndex(#[from] CommandIndexError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument value: {0}")]
    BadArgument(String),

    #[error("{0} of {1} tables failed to generate")]
    GenerationFailed(usize, usize),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CitError>;

pub async fn run_cli() -> Result<()> {
    let default_threads = format!("{}", num_cpus::get());

    let app = Command::new("Command Index Tool")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate and query package command tables")
        .long_about(ABOUT)
        .arg_required_else_help(true);

    let app = app.arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .multiple_occurrences(true)
            .help("Increase logging verbosity. Can be specified multiple times."),
    );

    let app = app.subcommand(
        Command::new("generate")
            .about("Generate command tables from remote repositories")
            .long_about(GENERATE_ABOUT)
            .arg(
                Arg::new("architectures")
                    .long("architectures")
                    .takes_value(true)
                    .help("Comma delimited list of architectures to generate tables for"),
            )
            .arg(
                Arg::new("repository-url")
                    .long("repository-url")
                    .takes_value(true)
                    .help("Base URL of repositories lacking an explicit URL"),
            )
            .arg(
                Arg::new("repo-config")
                    .long("repo-config")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Path to repository definitions to use instead of repo.json"),
            )
            .arg(
                Arg::new("output-dir")
                    .long("output-dir")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .default_value(".")
                    .help("Directory to write tables to"),
            )
            .arg(
                Arg::new("dedup")
                    .long("dedup")
                    .help("Emit each binary name once per package"),
            )
            .arg(
                Arg::new("max-parallel-io")
                    .long("max-parallel-io")
                    .takes_value(true)
                    .default_value(&default_threads)
                    .help("Maximum number of tables to generate in parallel"),
            ),
    );

    let app = app.subcommand(
        Command::new("build-table")
            .about("Build a command table from a local Contents index")
            .arg(
                Arg::new("contents")
                    .long("contents")
                    .takes_value(true)
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to Contents index. Compression is inferred from the extension"),
            )
            .arg(
                Arg::new("alternatives-root")
                    .long("alternatives-root")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Directory containing <package>/*.alternatives files"),
            )
            .arg(
                Arg::new("prefix")
                    .long("prefix")
                    .takes_value(true)
                    .help("Install prefix (defaults to the stock prefix)"),
            )
            .arg(
                Arg::new("dedup")
                    .long("dedup")
                    .help("Emit each binary name once per package"),
            )
            .arg(
                Arg::new("output")
                    .long("output")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Path to write table to. Printed to stdout if not given"),
            ),
    );

    let app = app.subcommand(
        Command::new("parse-alternatives")
            .about("Print the records of an alternatives file")
            .arg(
                Arg::new("path")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to alternatives file"),
            ),
    );

    let app = app.subcommand(
        Command::new("lookup")
            .about("Find packages providing a command")
            .long_about(LOOKUP_ABOUT)
            .arg(
                Arg::new("table")
                    .long("table")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .required(true)
                    .help("Command table to search, optionally prefixed with LABEL="),
            )
            .arg(
                Arg::new("sources-list-dir")
                    .long("sources-list-dir")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Directory holding apt sources lists of enabled repositories"),
            )
            .arg(
                Arg::new("command")
                    .required(true)
                    .help("Name of command to look up"),
            ),
    );

    let app = app.subcommand(
        Command::new("edit-table")
            .about("Add, replace or remove packages in an existing command table")
            .long_about(EDIT_TABLE_ABOUT)
            .arg(
                Arg::new("remove")
                    .long("remove")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .help("Name of package to remove"),
            )
            .arg(
                Arg::new("set")
                    .long("set")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .help("Package definition of the form PACKAGE=binary1,binary2"),
            )
            .arg(
                Arg::new("deb")
                    .long("deb")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .allow_invalid_utf8(true)
                    .help("Path to .deb whose binaries replace its package's definition"),
            )
            .arg(
                Arg::new("stdin")
                    .long("stdin")
                    .help("Read paths to .deb files from stdin, one per line"),
            )
            .arg(
                Arg::new("prefix")
                    .long("prefix")
                    .takes_value(true)
                    .help("Install prefix of .deb files (defaults to the stock prefix)"),
            )
            .arg(
                Arg::new("path")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to command table to edit in place"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    // This spews unwanted output at default level. Nerf it by default.
    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();

    match matches.subcommand() {
        Some(("generate", args)) => command_generate(args).await,
        Some(("build-table", args)) => command_build_table(args).await,
        Some(("parse-alternatives", args)) => command_parse_alternatives(args),
        Some(("lookup", args)) => command_lookup(args),
        Some(("edit-table", args)) => command_edit_table(args),
        Some((command, _)) => Err(CitError::InvalidSubCommand(command.to_string())),
        None => Ok(()),
    }
}

fn duplicate_policy(args: &ArgMatches) -> DuplicatePolicy {
    if args.is_present("dedup") {
        DuplicatePolicy::Deduplicate
    } else {
        DuplicatePolicy::Preserve
    }
}

fn path_arg(args: &ArgMatches, name: &str) -> Option<PathBuf> {
    args.value_of_os(name).map(PathBuf::from)
}

async fn command_generate(args: &ArgMatches) -> Result<()> {
    let repo_config = path_arg(args, "repo-config");

    let mut config = GeneratorConfig::from_env_lookup_with_repositories(
        |key| std::env::var(key).ok(),
        repo_config.as_deref(),
    )?;

    if let Some(value) = args.value_of("architectures") {
        config.architectures = value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
    }
    if let Some(value) = args.value_of("repository-url") {
        config.repository_url = value.to_string();
    }
    if let Some(value) = path_arg(args, "output-dir") {
        config.output_dir = value;
    }
    config.duplicate_policy = duplicate_policy(args);
    config.max_parallel_io = args.value_of_t::<usize>("max-parallel-io")?;

    let generator = Generator::new(config);
    let total = generator.pairs().len();

    let report = generator.run().await;

    for path in &report.written {
        println!("{}", path.display());
    }

    if report.is_success() {
        Ok(())
    } else {
        for failure in &report.failures {
            eprintln!("{}: {}", failure.target, failure.error);
        }

        Err(CitError::GenerationFailed(report.failures.len(), total))
    }
}

async fn command_build_table(args: &ArgMatches) -> Result<()> {
    let contents_path = path_arg(args, "contents")
        .ok_or_else(|| CitError::BadArgument("--contents is required".into()))?;

    let file_name = contents_path
        .file_name()
        .and_then(|x| x.to_str())
        .ok_or_else(|| CitError::BadArgument(format!("{}", contents_path.display())))?;
    let dir = contents_path.parent().unwrap_or_else(|| Path::new("."));

    let alternatives = match path_arg(args, "alternatives-root") {
        Some(root) => discover_alternatives(&root)?,
        None => vec![],
    };

    let prefix = args
        .value_of("prefix")
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("/{}", STOCK_INSTALL_PREFIX));

    let options = TableOptions {
        duplicate_policy: duplicate_policy(args),
        ..TableOptions::new(&prefix)
    };

    let reader = FilesystemRepositoryReader::new(dir)
        .get_path_decoded(file_name, Compression::from_path(file_name))
        .await?;
    let index = read_contents_index(reader, options.contents_parser()).await?;

    let content = build_table_from_index(index, &alternatives, &options)?.render()?;

    match path_arg(args, "output") {
        Some(path) => {
            write_table(&path, &content)?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

fn command_parse_alternatives(args: &ArgMatches) -> Result<()> {
    let path = path_arg(args, "path")
        .ok_or_else(|| CitError::BadArgument("path is required".into()))?;

    let file = AlternativesFile::from_path(&path)?;

    for record in file.records() {
        println!("Name: {}", record.name);
        println!("Link: {}", record.link);
        println!("Alternative: {}", record.target);
        println!("Priority: {}", record.priority);

        if !record.dependents.is_empty() {
            println!("Dependents:");
            for dependent in &record.dependents {
                println!(
                    "  {} {} {}",
                    dependent.link, dependent.name, dependent.target
                );
            }
        }

        println!();
    }

    Ok(())
}

/// Parse a `[LABEL=]PATH` table argument.
fn parse_table_arg(value: &str) -> (&str, &str) {
    match value.split_once('=') {
        Some((label, path)) => (label, path),
        None => ("", value),
    }
}

fn repository_hint(suggestion: &Suggestion, sources_list_dir: Option<&Path>) -> Option<String> {
    let repository = suggestion.repository.as_ref()?;

    let enabled = sources_list_dir
        .map(|dir| dir.join(format!("{}.list", repository)).exists())
        .unwrap_or(false);

    if enabled {
        None
    } else {
        Some(repository.clone())
    }
}

/// Format the messages describing a lookup outcome.
fn lookup_messages(
    command: &str,
    outcome: &LookupOutcome,
    sources_list_dir: Option<&Path>,
) -> Vec<String> {
    let mut messages = vec![];

    match outcome {
        LookupOutcome::NotFound => {
            messages.push(format!("{}: command not found", command));
        }
        LookupOutcome::Installable(suggestions) => {
            messages.push(format!(
                "The program {} is not installed. Install it by executing:",
                command
            ));
            for (i, suggestion) in suggestions.iter().enumerate() {
                messages.push(match repository_hint(suggestion, sources_list_dir) {
                    Some(repository) => format!(
                        " pkg install {}, after running pkg install {}-repo",
                        suggestion.package, repository
                    ),
                    None => format!(" pkg install {}", suggestion.package),
                });
                if i + 1 < suggestions.len() {
                    messages.push("or".to_string());
                }
            }
        }
        LookupOutcome::DidYouMean(suggestions) => {
            messages.push(format!("No command {} found, did you mean:", command));
            for suggestion in suggestions {
                messages.push(match repository_hint(suggestion, sources_list_dir) {
                    Some(repository) => format!(
                        " Command {} in package {} from the {}-repo repository",
                        suggestion.binary, suggestion.package, repository
                    ),
                    None => format!(
                        " Command {} in package {}",
                        suggestion.binary, suggestion.package
                    ),
                });
            }
        }
    }

    messages
}

fn read_table(path: &Path) -> Result<CommandTable> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e))?;

    Ok(CommandTable::parse(&data)?)
}

fn command_lookup(args: &ArgMatches) -> Result<()> {
    let command = args
        .value_of("command")
        .ok_or_else(|| CitError::BadArgument("command is required".into()))?;

    let sources_list_dir = path_arg(args, "sources-list-dir").or_else(|| {
        std::env::var(PREFIX_ENV)
            .ok()
            .map(|prefix| sources_list_dir(&prefix))
    });

    let mut lookup = CommandLookup::new(command);

    for value in args.values_of("table").into_iter().flatten() {
        let (label, path) = parse_table_arg(value);
        lookup.search(&read_table(Path::new(path))?, label);
    }

    for message in lookup_messages(command, &lookup.finish(), sources_list_dir.as_deref()) {
        eprintln!("{}", message);
    }

    Err(CitError::CommandNotFound(command.to_string()))
}

/// Parse a `PACKAGE=binary1,binary2` package definition.
fn parse_package_definition(value: &str) -> Result<(&str, Vec<&str>)> {
    let (package, binaries) = value
        .split_once('=')
        .ok_or_else(|| CitError::BadArgument(format!("expected PACKAGE=BINARIES: {}", value)))?;

    if package.is_empty() {
        return Err(CitError::BadArgument(format!("empty package name: {}", value)));
    }

    Ok((
        package,
        binaries.split(',').filter(|s| !s.is_empty()).collect(),
    ))
}

/// Edits to apply to a command table.
#[derive(Clone, Debug, Default)]
struct TableEdits {
    /// Packages to remove.
    remove: Vec<String>,
    /// Package definitions replacing existing ones.
    set: Vec<(String, Vec<String>)>,
    /// `.deb` files whose binaries replace their package's definition.
    debs: Vec<PathBuf>,
    /// Index path prefix of binaries in `.deb` files.
    binary_path_prefix: String,
}

/// Normalize a package argument, which may be a packages tree path. e.g. `packages/vim/`.
fn normalize_package_name(value: &str) -> &str {
    let value = value.trim_matches('/');
    value.strip_prefix("packages/").unwrap_or(value)
}

fn apply_edits(table: &mut CommandTable, edits: &TableEdits) -> Result<()> {
    for package in &edits.remove {
        let package = normalize_package_name(package);

        if table.remove_package(package) {
            info!("removed {}", package);
        } else {
            info!("{} not in table; ignoring", package);
        }
    }

    for (package, binaries) in &edits.set {
        if binaries.is_empty() {
            table.remove_package(package);
            info!("{} provides no binaries; removed", package);
        } else {
            info!("setting {} binaries of {}", binaries.len(), package);
            table.set_package(package, binaries);
        }
    }

    for path in &edits.debs {
        let package = package_name_from_path(path).ok_or_else(|| {
            CitError::BadArgument(format!("cannot derive package name: {}", path.display()))
        })?;

        let fh = std::fs::File::open(path)
            .map_err(|e| CommandIndexError::RepositoryIoPath(format!("{}", path.display()), e))?;
        let binaries = binaries_from_deb(std::io::BufReader::new(fh), &edits.binary_path_prefix)?;

        if binaries.is_empty() {
            info!("{} provides no binaries; leaving table unchanged", package);
        } else {
            info!("parsed {} binaries of {}", binaries.len(), package);
            table.set_package(package, binaries);
        }
    }

    Ok(())
}

fn edit_table_file(path: &Path, edits: &TableEdits) -> Result<()> {
    let mut table = read_table(path)?;
    apply_edits(&mut table, edits)?;
    write_table(path, &table.render()?)?;

    Ok(())
}

fn command_edit_table(args: &ArgMatches) -> Result<()> {
    let path = path_arg(args, "path")
        .ok_or_else(|| CitError::BadArgument("path is required".into()))?;

    let prefix = args
        .value_of("prefix")
        .unwrap_or(STOCK_INSTALL_PREFIX)
        .trim_matches('/');

    let mut edits = TableEdits {
        remove: args
            .values_of("remove")
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect(),
        debs: args
            .values_of_os("deb")
            .into_iter()
            .flatten()
            .map(PathBuf::from)
            .collect(),
        binary_path_prefix: TableOptions::new(prefix).binary_path_prefix,
        ..Default::default()
    };

    for value in args.values_of("set").into_iter().flatten() {
        let (package, binaries) = parse_package_definition(value)?;
        edits.set.push((
            package.to_string(),
            binaries.into_iter().map(|s| s.to_string()).collect(),
        ));
    }

    if args.is_present("stdin") {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();

            if !line.is_empty() {
                edits.debs.push(PathBuf::from(line));
            }
        }
    }

    edit_table_file(&path, &edits)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_arg() {
        assert_eq!(
            parse_table_arg("x11=commands-arm-x11.h"),
            ("x11", "commands-arm-x11.h")
        );
        assert_eq!(parse_table_arg("commands.h"), ("", "commands.h"));
    }

    #[test]
    fn package_definition() -> Result<()> {
        assert_eq!(
            parse_package_definition("vim=vim,vimdiff")?,
            ("vim", vec!["vim", "vimdiff"])
        );
        assert_eq!(parse_package_definition("empty=")?, ("empty", vec![]));
        assert!(parse_package_definition("novalue").is_err());
        assert!(parse_package_definition("=vim").is_err());

        Ok(())
    }

    #[test]
    fn hint_for_disabled_repository() {
        let td = std::env::temp_dir();
        let suggestion = Suggestion {
            package: "xeyes".into(),
            binary: "xeyes".into(),
            repository: Some("cit-test-nonexistent".into()),
        };

        assert_eq!(
            repository_hint(&suggestion, Some(td.as_path())),
            Some("cit-test-nonexistent".to_string())
        );
        assert_eq!(
            repository_hint(
                &Suggestion {
                    repository: None,
                    ..suggestion
                },
                Some(td.as_path())
            ),
            None
        );
    }

    const TABLE: &str = "\"nano\",\n\" nano\",\n\"vim\",\n\" vi\",\n\" vim\",\n";

    #[test]
    fn edit_table_in_place() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("commands-arm-termux-main.h");
        std::fs::write(&path, TABLE)?;

        let edits = TableEdits {
            remove: vec!["packages/nano/".into(), "absent".into()],
            set: vec![
                ("busybox".into(), vec!["sh".into(), "ash".into()]),
                ("vim".into(), vec![]),
            ],
            ..Default::default()
        };

        edit_table_file(&path, &edits)?;

        assert_eq!(
            std::fs::read_to_string(&path)?,
            "\"busybox\",\n\" ash\",\n\" sh\",\n"
        );

        Ok(())
    }

    #[test]
    fn edit_table_missing_deb_leaves_table() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("commands-arm-termux-main.h");
        std::fs::write(&path, TABLE)?;

        let edits = TableEdits {
            remove: vec!["nano".into()],
            debs: vec![td.path().join("vim_9.0_arm.deb")],
            binary_path_prefix: "data/data/com.termux/files/usr/bin/".into(),
            ..Default::default()
        };

        assert!(matches!(
            edit_table_file(&path, &edits),
            Err(CitError::CommandIndex(CommandIndexError::RepositoryIoPath(_, _)))
        ));
        assert_eq!(std::fs::read_to_string(&path)?, TABLE);

        Ok(())
    }

    #[test]
    fn lookup_output() -> Result<()> {
        let td = tempfile::tempdir()?;
        std::fs::write(td.path().join("x11.list"), "")?;

        let main = CommandTable::parse(TABLE)?;
        let x11 = CommandTable::parse("\"vim-gtk\",\n\" gvim\",\n")?;
        let science = CommandTable::parse("\"octave\",\n\" octave\",\n")?;

        let mut lookup = CommandLookup::new("vim");
        lookup.search(&main, "");
        lookup.search(&x11, "x11");
        assert_eq!(
            lookup_messages("vim", &lookup.finish(), Some(td.path())),
            vec![
                "The program vim is not installed. Install it by executing:".to_string(),
                " pkg install vim".to_string(),
            ]
        );

        let mut lookup = CommandLookup::new("gvi");
        lookup.search(&x11, "x11");
        lookup.search(&main, "");
        assert_eq!(
            lookup_messages("gvi", &lookup.finish(), Some(td.path())),
            vec![
                "No command gvi found, did you mean:".to_string(),
                " Command vi in package vim".to_string(),
                " Command gvim in package vim-gtk".to_string(),
            ]
        );

        let mut lookup = CommandLookup::new("octave");
        lookup.search(&science, "science");
        assert_eq!(
            lookup_messages("octave", &lookup.finish(), Some(td.path())),
            vec![
                "The program octave is not installed. Install it by executing:".to_string(),
                " pkg install octave, after running pkg install science-repo".to_string(),
            ]
        );

        let mut lookup = CommandLookup::new("qqqqqqqq");
        lookup.search(&main, "");
        assert_eq!(
            lookup_messages("qqqqqqqq", &lookup.finish(), None),
            vec!["qqqqqqqq: command not found".to_string()]
        );

        Ok(())
    }
}
