// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! UEFI Nvram Variable Services

use bitfield_struct::bitfield;

/// UEFI spec 8.2 - Variable Services
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct EfiVariableAttributes {
    pub non_volatile: bool,
    pub bootservice_access: bool,
    pub runtime_access: bool,
    pub hardware_error_record: bool,
    pub authenticated_write_access: bool,
    pub time_based_authenticated_write_access: bool,
    pub append_write: bool,
    pub enhanced_authenticated_access: bool,

    #[bits(24)]
    _reserved: u32,
}

impl EfiVariableAttributes {
    /// Attributes used for every variable written by MOK management: persist
    /// across reboot, accessible both before and after `ExitBootServices`.
    pub const DEFAULT_ATTRIBUTES: EfiVariableAttributes = EfiVariableAttributes::new()
        .with_non_volatile(true)
        .with_bootservice_access(true)
        .with_runtime_access(true);
}

/// UEFI spec 32.4.1
#[allow(non_camel_case_types)]
pub mod signature_list {
    use guid::Guid;
    use zerocopy::little_endian::U32;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;
    use zerocopy::Unaligned;

    /// UEFI spec 32.4.1 - `EFI_SIGNATURE_LIST`
    ///
    /// Firmware always stores this header little-endian, and makes no
    /// alignment guarantees when several lists are concatenated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
    #[repr(C)]
    pub struct EFI_SIGNATURE_LIST {
        /// Type of the signature. GUID signature types are defined in "Related
        /// Definitions" below.
        pub signature_type: [u8; 16],
        /// Total size of the signature list, including this header.
        pub signature_list_size: U32,
        /// Size of the signature header which precedes the array of signatures.
        pub signature_header_size: U32,
        /// Size of each signature. Must be at least the size of EFI_SIGNATURE_DATA.
        pub signature_size: U32,
        // UINT8 SignatureHeader[SignatureHeaderSize];
        //
        // EFI_SIGNATURE_DATA Signatures[…][SignatureSize];
    }

    impl EFI_SIGNATURE_LIST {
        /// The signature type, decoded as a [`Guid`].
        pub fn signature_type(&self) -> Guid {
            zerocopy::transmute!(self.signature_type)
        }
    }

    /// UEFI spec 32.4.1 - `EFI_SIGNATURE_DATA`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
    #[repr(C)]
    pub struct EFI_SIGNATURE_DATA {
        /// An identifier which identifies the agent which added the signature to
        /// the list.
        pub signature_owner: [u8; 16],
        // UINT8 SignatureData[…];
    }

    impl EFI_SIGNATURE_DATA {
        /// The signature owner, decoded as a [`Guid`].
        pub fn signature_owner(&self) -> Guid {
            zerocopy::transmute!(self.signature_owner)
        }
    }

    pub const EFI_CERT_SHA256_GUID: Guid =
        Guid::from_static_str("c1c41626-504c-4092-aca9-41f936934328");

    pub const EFI_CERT_X509_GUID: Guid =
        Guid::from_static_str("a5c059a1-94e4-4aa7-87b5-ab155c2bf072");

    /// Size of a SHA-256 digest stored in an `EFI_CERT_SHA256_GUID` list.
    pub const SHA256_DIGEST_SIZE: usize = 32;
}

/// UEFI spec 3.3 - Table 3-1
pub mod vars {
    use guid::Guid;

    /// UEFI spec 3.3 - Globally Defined Variables
    pub const EFI_GLOBAL_VARIABLE: Guid =
        Guid::from_static_str("8BE4DF61-93CA-11D2-AA0D-00E098032B8C");

    /// UEFI spec 32.6.1 - UEFI Image Variable GUID & Variable Name
    pub const IMAGE_SECURITY_DATABASE_GUID: Guid =
        Guid::from_static_str("d719b2cb-3d3a-4596-a3bc-dad00e67656f");

    defn_nvram_var!(SECURE_BOOT = (EFI_GLOBAL_VARIABLE, "SecureBoot"));

    defn_nvram_var!(PK = (EFI_GLOBAL_VARIABLE, "PK"));
    defn_nvram_var!(KEK = (EFI_GLOBAL_VARIABLE, "KEK"));

    defn_nvram_var!(DB = (IMAGE_SECURITY_DATABASE_GUID, "db"));
}
