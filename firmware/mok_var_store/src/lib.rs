// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Abstractions to support pluggable UEFI variable store backends (e.g: in
//! memory, the Linux efivarfs mount, etc...)

#![expect(missing_docs)]

pub mod in_memory;

#[cfg(target_os = "linux")]
pub mod efivarfs;

use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_specs::NvramVar;
use thiserror::Error;

/// Default mountpoint of the Linux efivarfs filesystem.
pub const DEFAULT_EFIVARS_PATH: &str = "/sys/firmware/efi/efivars";

#[derive(Debug, Error)]
pub enum VarStoreError {
    #[error("variable payload of {0} bytes is too short to contain attributes")]
    Deserialize(usize),
    #[error("error loading variable from storage")]
    Load(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("error committing variable to storage")]
    Commit(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("error removing variable from storage")]
    Remove(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Abstraction over a UEFI variable store.
///
/// Implementors of this interface are **not required** to perform attribute
/// validation, and should simply store/retrieve data.
pub trait VariableStore {
    /// Return the `attr` + `data` of the variable identified by `var`, or
    /// `None` if it does not exist.
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError>;

    /// Create or replace the variable identified by `var`.
    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError>;

    /// Remove the variable identified by `var`.
    ///
    /// Returns `true` if the variable was removed, or `false` if it could not
    /// be found.
    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError>;

    /// Return `true` if the variable identified by `var` exists.
    fn exists(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        Ok(self.read(var)?.is_some())
    }
}

impl<T: VariableStore + ?Sized> VariableStore for &mut T {
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError> {
        (**self).read(var)
    }

    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError> {
        (**self).write(var, attr, data)
    }

    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        (**self).delete(var)
    }
}

impl VariableStore for Box<dyn VariableStore> {
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError> {
        (**self).read(var)
    }

    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError> {
        (**self).write(var, attr, data)
    }

    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        (**self).delete(var)
    }
}
