// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use mok_request::PasswordPrompt;
use std::io;
use std::io::Write;
use zeroize::Zeroizing;

/// Reads passwords from the controlling terminal with echo disabled.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&mut self, prompt: &str) -> io::Result<Option<Zeroizing<String>>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;
        drop(stdout);

        let line = term::read_hidden_line()?;
        // the newline typed by the operator was not echoed
        println!();
        Ok(line)
    }

    fn report(&mut self, message: &str) {
        eprintln!("{message}");
    }
}
