// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Functionality to assist with managing the terminal/console/tty.
//!
//! The main entrypoint is [`read_hidden_line`], which reads a single line of
//! sensitive input (e.g: a password) from stdin with echo disabled for the
//! duration of the read.

#![warn(missing_docs)]
// UNSAFETY: libc function calls to manipulate terminal state.
#![allow(unsafe_code)]

use std::io;
use std::io::BufRead;
use std::io::IsTerminal;
use zeroize::Zeroizing;

/// Opaque wrapper around `libc::termios`.
#[cfg(unix)]
#[derive(Copy, Clone)]
pub struct Termios(libc::termios);

/// Get the current termios settings for `fd`.
#[cfg(unix)]
pub fn get_termios(fd: std::os::fd::BorrowedFd<'_>) -> io::Result<Termios> {
    use std::os::fd::AsRawFd;

    let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `fd` is a valid open fd for the lifetime of the borrow, and
    // `termios` points to writable memory of the correct size.
    let ret = unsafe { libc::tcgetattr(fd.as_raw_fd(), termios.as_mut_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `tcgetattr` returned successfully, therefore `termios` has been
    // initialized
    Ok(Termios(unsafe { termios.assume_init() }))
}

/// Set the termios settings for `fd`, discarding any pending input.
#[cfg(unix)]
pub fn set_termios(fd: std::os::fd::BorrowedFd<'_>, termios: &Termios) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: `fd` is a valid open fd, and `termios` is a valid termios struct.
    let ret = unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSAFLUSH, &termios.0) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Scoped suppression of input echo on stdin.
///
/// Echo is disabled when the guard is created (if stdin is a terminal), and
/// the original terminal attributes are restored when the guard is dropped,
/// including when unwinding from a panic. When stdin is not a terminal (e.g:
/// piped input) the guard does nothing.
pub struct EchoGuard {
    #[cfg(unix)]
    saved: Option<Termios>,
}

impl EchoGuard {
    /// Disable echo on stdin until the returned guard is dropped.
    pub fn new() -> io::Result<EchoGuard> {
        #[cfg(unix)]
        {
            use std::os::fd::AsFd;

            let stdin = io::stdin();
            if !stdin.is_terminal() {
                return Ok(EchoGuard { saved: None });
            }

            let saved = get_termios(stdin.as_fd())?;
            let mut quiet = saved;
            quiet.0.c_lflag &= !libc::ECHO;
            set_termios(stdin.as_fd(), &quiet)?;
            Ok(EchoGuard { saved: Some(saved) })
        }

        #[cfg(not(unix))]
        {
            Ok(EchoGuard {})
        }
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(saved) = self.saved.take() {
            use std::os::fd::AsFd;

            if let Err(err) = set_termios(io::stdin().as_fd(), &saved) {
                eprintln!("error: could not restore terminal attributes: {err}");
            }
        }
    }
}

/// Read a single line from stdin with echo suppressed, stripping the line
/// terminator.
///
/// Returns `Ok(None)` if stdin reached end-of-file before any input was read.
/// The returned buffer is zeroed when dropped.
pub fn read_hidden_line() -> io::Result<Option<Zeroizing<String>>> {
    let _guard = EchoGuard::new()?;
    read_line_from(&mut io::stdin().lock())
}

/// Read a single line from `reader`, stripping the line terminator.
///
/// This is the non-terminal half of [`read_hidden_line`], split out so that
/// callers with a non-stdin source can share the same line handling.
pub fn read_line_from(reader: &mut impl BufRead) -> io::Result<Option<Zeroizing<String>>> {
    // pre-size the buffer so typical passwords never trigger a reallocation
    // that would leave an unzeroed copy behind
    let mut line = Zeroizing::new(String::with_capacity(128));
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed_len);
    Ok(Some(line))
}
