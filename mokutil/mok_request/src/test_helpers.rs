// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared fixtures for unit tests.

use crate::auth::PasswordPrompt;
use guid::Guid;
use mok_signature_list::encode;
use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_specs::NvramVar;
use mok_var_store::in_memory::InMemoryVarStore;
use mok_var_store::VarStoreError;
use mok_var_store::VariableStore;
use std::collections::VecDeque;
use std::io;
use zeroize::Zeroizing;

/// Self-signed P-256 certificate, `CN=mok test key`.
pub const SELF_SIGNED_DER: &[u8] = include_bytes!("../test_data/test_key.der");

/// Arbitrary owner for lists that were not authored by shim.
pub const FIRMWARE_OWNER: Guid = Guid::from_static_str("77fa9abd-0359-4d32-bd60-28f4e78f784b");

/// Store `keys` in `var` as a series of X509 signature lists.
pub fn put_list(store: &mut InMemoryVarStore, var: NvramVar, keys: &[&[u8]]) {
    let list = encode(keys.iter().copied(), FIRMWARE_OWNER).unwrap();
    store
        .write(var, EfiVariableAttributes::DEFAULT_ATTRIBUTES, &list)
        .unwrap();
}

/// A [`PasswordPrompt`] replaying canned answers, recording everything
/// displayed. Reports end of input once the answers run out.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    pub prompts: Vec<String>,
    pub reports: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<'a>(answers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            answers: answers.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn read_password(&mut self, prompt: &str) -> io::Result<Option<Zeroizing<String>>> {
        self.prompts.push(prompt.to_owned());
        Ok(self.answers.pop_front().map(Zeroizing::new))
    }

    fn report(&mut self, message: &str) {
        self.reports.push(message.to_owned());
    }
}

/// Wraps an [`InMemoryVarStore`], failing every write to `fail_writes_to`.
pub struct FailingStore {
    pub inner: InMemoryVarStore,
    pub fail_writes_to: NvramVar,
}

impl VariableStore for FailingStore {
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError> {
        self.inner.read(var)
    }

    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError> {
        if var == self.fail_writes_to {
            return Err(VarStoreError::Commit(
                io::Error::from(io::ErrorKind::OutOfMemory).into(),
            ));
        }
        self.inner.write(var, attr, data)
    }

    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        self.inner.delete(var)
    }
}
