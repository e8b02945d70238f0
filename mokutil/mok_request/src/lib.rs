// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Machine Owner Key (MOK) request staging.
//!
//! Requests to enroll or delete keys are not applied directly: they are
//! written to shim's `MokNew` / `MokDel` variables alongside a password
//! derived authentication tag, and `MokManager` asks the operator to confirm
//! them (with the same password) on the next boot.

#![expect(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod builder;
pub mod checker;
pub mod policy;
pub mod query;

#[cfg(test)]
mod test_helpers;

pub use auth::PasswordPrompt;
pub use builder::Candidate;
pub use builder::RequestBuilder;
pub use checker::RequestKind;

use mok_signature_list::signature_list::EncodeError;
use mok_specs::NvramVar;
use mok_var_store::VarStoreError;
use thiserror::Error;

/// Errors returned by MOK request operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("variable {0} not found")]
    NotFound(NvramVar),
    #[error("failed to read {0}")]
    Read(NvramVar, #[source] VarStoreError),
    #[error("failed to write {0}")]
    Write(NvramVar, #[source] VarStoreError),
    #[error("failed to delete {0}")]
    Delete(NvramVar, #[source] VarStoreError),
    #[error("failed to authenticate the pending request in {0}")]
    AuthenticationFailed(NvramVar),
    #[error("aborted")]
    UserAborted,
    #[error("failed to read password")]
    Prompt(#[source] std::io::Error),
    #[error("failed to encode signature list")]
    Encode(#[source] EncodeError),
}
