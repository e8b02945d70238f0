// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Crate for defining tests that have tracing output.
//!
//! Use `#[test_with_tracing::test]` (or `use test_with_tracing::test;` and a
//! plain `#[test]`) to have `tracing` events emitted by the code under test
//! captured by the test harness, grouped under a span named after the test.

#[cfg(test)]
extern crate self as test_with_tracing;

pub use test_with_tracing_macro::test;
#[doc(hidden)]
pub use tracing;
use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Environment variable used to override the default test log filter.
pub const LOG_ENV_VAR: &str = "MOKUTIL_TEST_LOG";

#[doc(hidden)]
/// Initializes `tracing` for tests.
pub fn init() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let targets = match std::env::var(LOG_ENV_VAR) {
            Ok(var) => var.parse().unwrap_or_else(|err| {
                eprintln!("ignoring invalid {LOG_ENV_VAR} value {var:?}: {err}");
                default_targets()
            }),
            Err(_) => default_targets(),
        };
        tracing_subscriber::fmt()
            .compact()
            .with_ansi(false) // avoid polluting logs with escape sequences
            .with_test_writer()
            .with_max_level(LevelFilter::TRACE)
            .finish()
            .with(targets)
            .init();
    });
}

fn default_targets() -> Targets {
    Targets::new().with_default(LevelFilter::DEBUG)
}
