// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cli;

/// Exit code of a shell for a command that wasn't found.
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    std::process::exit(match cli::run_cli().await {
        Ok(_) => 0,
        Err(cli::CitError::CommandNotFound(_)) => EXIT_COMMAND_NOT_FOUND,
        Err(err) => {
            eprintln!("error: {}", err);
            1
        }
    });
}
