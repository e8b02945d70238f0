// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Membership queries against key lists held in the variable store.

use crate::Error;
use mok_signature_list::decode;
use mok_specs::NvramVar;
use mok_var_store::VariableStore;

/// Read the key list held in `var`.
///
/// Absent lists are empty. Other read failures are logged and also treated as
/// empty, so that a single unreadable firmware database doesn't prevent
/// staging requests.
pub fn read_list(store: &mut dyn VariableStore, var: NvramVar) -> Vec<u8> {
    match store.read(var) {
        Ok(Some((_, data))) => data,
        Ok(None) => Vec::new(),
        Err(err) => {
            tracing::warn!(
                %var,
                error = &err as &dyn std::error::Error,
                "failed to read key list, treating as empty"
            );
            Vec::new()
        }
    }
}

/// Read the key list held in `var`, failing if it doesn't exist.
pub fn read_existing_list(store: &mut dyn VariableStore, var: NvramVar) -> Result<Vec<u8>, Error> {
    match store.read(var) {
        Ok(Some((_, data))) => Ok(data),
        Ok(None) => Err(Error::NotFound(var)),
        Err(err) => Err(Error::Read(var, err)),
    }
}

/// Returns true if some entry in `list` has a payload byte-identical to
/// `candidate`.
pub fn contains(list: &[u8], candidate: &[u8]) -> bool {
    let decoded = decode(list);
    if let Some(err) = &decoded.malformed {
        tracing::debug!(
            error = err as &dyn std::error::Error,
            "key list is malformed, ignoring trailing data"
        );
    }
    decoded.contains(candidate)
}

/// Returns true if the key list held in `var` contains `candidate`.
pub fn list_contains(store: &mut dyn VariableStore, var: NvramVar, candidate: &[u8]) -> bool {
    let found = contains(&read_list(store, var), candidate);
    tracing::trace!(%var, found, "key list lookup");
    found
}
