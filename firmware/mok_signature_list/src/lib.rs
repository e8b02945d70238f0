// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Codec for the `EFI_SIGNATURE_LIST` buffers stored in UEFI key databases
//! (`PK`, `KEK`, `db`) and shim's MOK variables.

#![expect(missing_docs)]

pub mod signature_list;

pub use signature_list::decode;
pub use signature_list::encode;
pub use signature_list::DecodedKeys;
pub use signature_list::KeyEntry;
pub use signature_list::KeyKind;
