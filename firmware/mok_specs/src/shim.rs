// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Nvram types and variables defined by the shim boot loader for Machine
//! Owner Key (MOK) management.
//!
//! None of these are part of the UEFI spec. They are the contract between
//! userspace tooling (which stages requests) and `MokManager` (which asks the
//! operator to confirm them on the next boot).

use guid::Guid;
use zerocopy::little_endian::U16;
use zerocopy::little_endian::U32;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

/// Vendor GUID of every shim-owned variable, and the signature owner of
/// every certificate staged by this tool.
pub const SHIM_LOCK_GUID: Guid = Guid::from_static_str("605dab50-e046-4300-abb6-3dd810dd8b23");

/// Minimum accepted password length, in characters.
pub const PASSWORD_MIN: usize = 8;

/// Maximum accepted password length, in characters. `MokManager` stores
/// passwords in a fixed buffer of this many UCS-2 code units.
pub const PASSWORD_MAX: usize = 16;

/// Size of the SHA-256 digest stored in `MokAuth`, `MokDelAuth` and `MokPW`.
pub const AUTH_TAG_SIZE: usize = 32;

pub mod vars {
    use super::SHIM_LOCK_GUID;

    defn_nvram_var!(
        /// Runtime mirror of the enrolled MOK list (`MokList` is boot-services
        /// only).
        MOK_LIST_RT = (SHIM_LOCK_GUID, "MokListRT")
    );
    defn_nvram_var!(
        /// Pending enrollment request.
        MOK_NEW = (SHIM_LOCK_GUID, "MokNew")
    );
    defn_nvram_var!(
        /// Pending deletion request.
        MOK_DEL = (SHIM_LOCK_GUID, "MokDel")
    );
    defn_nvram_var!(
        /// Authentication tag of `MokNew`.
        MOK_AUTH = (SHIM_LOCK_GUID, "MokAuth")
    );
    defn_nvram_var!(
        /// Authentication tag of `MokDel`.
        MOK_DEL_AUTH = (SHIM_LOCK_GUID, "MokDelAuth")
    );
    defn_nvram_var!(
        /// Pending MokManager password change.
        MOK_PW = (SHIM_LOCK_GUID, "MokPW")
    );
    defn_nvram_var!(
        /// Pending change of shim's signature validation state.
        MOK_SB = (SHIM_LOCK_GUID, "MokSB")
    );
}

/// Requested shim signature validation state, as stored in `MokSB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MokSbState {
    DisableValidation,
    EnableValidation,
}

impl From<MokSbState> for u32 {
    fn from(state: MokSbState) -> u32 {
        match state {
            MokSbState::DisableValidation => 0,
            MokSbState::EnableValidation => 1,
        }
    }
}

/// Payload of the `MokSB` variable.
///
/// Unlike `MokAuth`, the password is stored in the clear (as UCS-2), since
/// `MokManager` asks the operator for individual characters of it.
#[allow(non_camel_case_types)]
#[derive(Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct MOK_SB_VAR {
    pub mok_sb_state: U32,
    pub password_length: U32,
    pub password: [U16; PASSWORD_MAX],
}

impl MOK_SB_VAR {
    /// Build a `MokSB` payload. `password` is truncated to [`PASSWORD_MAX`]
    /// code units, and unused slots are zeroed.
    pub fn new(state: MokSbState, password: &[u16]) -> MOK_SB_VAR {
        let mut var = MOK_SB_VAR::new_zeroed();
        var.mok_sb_state = u32::from(state).into();
        let len = password.len().min(PASSWORD_MAX);
        var.password_length = (len as u32).into();
        for (slot, c) in var.password.iter_mut().zip(&password[..len]) {
            *slot = (*c).into();
        }
        var
    }
}
