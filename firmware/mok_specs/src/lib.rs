// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Types and constants related to UEFI Secure Boot key management.
//!
//! This crate is divided into 2 submodules:
//!
//! - `uefi`: types directly lifted from the official UEFI spec
//! - `shim`: types and variables defined by the shim boot loader for Machine
//!   Owner Key (MOK) management

#![expect(missing_docs)]
#![no_std]

use guid::Guid;

/// Identifies a single UEFI variable by name + vendor namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NvramVar {
    /// Variable name, as exposed by the firmware (always ASCII).
    pub name: &'static str,
    /// Vendor namespace the variable lives in.
    pub vendor: Guid,
}

impl core::fmt::Display for NvramVar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! defn_nvram_var {
    ($(#[$attr:meta])* $varname:ident = ($guid:expr, $name:literal)) => {
        $(#[$attr])*
        pub const $varname: $crate::NvramVar = $crate::NvramVar {
            name: $name,
            vendor: $guid,
        };
    };
}

pub mod shim;
pub mod uefi;
