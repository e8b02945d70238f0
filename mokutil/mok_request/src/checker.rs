// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Eligibility checks for candidate keys.

use crate::query::list_contains;
use mok_specs::shim::vars::MOK_AUTH;
use mok_specs::shim::vars::MOK_DEL;
use mok_specs::shim::vars::MOK_DEL_AUTH;
use mok_specs::shim::vars::MOK_LIST_RT;
use mok_specs::shim::vars::MOK_NEW;
use mok_specs::uefi::nvram::vars::DB;
use mok_specs::uefi::nvram::vars::KEK;
use mok_specs::uefi::nvram::vars::PK;
use mok_specs::NvramVar;
use mok_var_store::VariableStore;
use openssl::x509::X509;

/// Every list a key may already be trusted (or about to be trusted) through.
const TRUSTED_LISTS: [NvramVar; 5] = [PK, KEK, DB, MOK_LIST_RT, MOK_NEW];

/// The kind of pending request being staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Enroll,
    Delete,
}

impl RequestKind {
    /// Variable holding the pending list.
    pub fn pending_var(self) -> NvramVar {
        match self {
            RequestKind::Enroll => MOK_NEW,
            RequestKind::Delete => MOK_DEL,
        }
    }

    /// Variable holding the pending list's authentication tag.
    pub fn auth_var(self) -> NvramVar {
        match self {
            RequestKind::Enroll => MOK_AUTH,
            RequestKind::Delete => MOK_DEL_AUTH,
        }
    }
}

/// Answers eligibility questions by re-reading the relevant key lists on
/// every call.
pub struct DuplicateChecker<'a> {
    store: &'a mut dyn VariableStore,
}

impl<'a> DuplicateChecker<'a> {
    pub fn new(store: &'a mut dyn VariableStore) -> Self {
        Self { store }
    }

    /// Returns true if `candidate` is already trusted, or pending enrollment.
    pub fn is_enrolled(&mut self, candidate: &[u8]) -> bool {
        TRUSTED_LISTS
            .iter()
            .any(|var| list_contains(self.store, *var, candidate))
    }

    pub fn is_eligible_for_enrollment(&mut self, candidate: &[u8]) -> bool {
        // A key pending deletion is not consulted here, so it can be
        // re-enrolled.
        !self.is_enrolled(candidate)
    }

    pub fn is_eligible_for_deletion(&mut self, candidate: &[u8]) -> bool {
        list_contains(self.store, MOK_LIST_RT, candidate)
            && !list_contains(self.store, MOK_DEL, candidate)
    }

    pub fn is_eligible(&mut self, kind: RequestKind, candidate: &[u8]) -> bool {
        match kind {
            RequestKind::Enroll => self.is_eligible_for_enrollment(candidate),
            RequestKind::Delete => self.is_eligible_for_deletion(candidate),
        }
    }
}

/// Returns true if `blob` parses as a DER encoded X.509 certificate.
///
/// This is only used to warn the operator. Keys which fail to parse are still
/// staged.
pub fn is_probably_valid_certificate(blob: &[u8]) -> bool {
    X509::from_der(blob).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::put_list;
    use crate::test_helpers::FIRMWARE_OWNER;
    use crate::test_helpers::SELF_SIGNED_DER;
    use mok_var_store::in_memory::InMemoryVarStore;
    use test_with_tracing::test;

    #[test]
    fn enrollment_checks_every_trusted_list() {
        for var in TRUSTED_LISTS {
            let mut store = InMemoryVarStore::new();
            put_list(&mut store, var, &[b"trusted key"]);

            let mut checker = DuplicateChecker::new(&mut store);
            assert!(checker.is_enrolled(b"trusted key"), "{var}");
            assert!(!checker.is_eligible_for_enrollment(b"trusted key"), "{var}");
            assert!(checker.is_eligible_for_enrollment(b"another key"), "{var}");
        }
    }

    #[test]
    fn db_is_read_from_image_security_namespace() {
        let mut store = InMemoryVarStore::new();
        let global_db = NvramVar {
            name: "db",
            vendor: mok_specs::uefi::nvram::vars::EFI_GLOBAL_VARIABLE,
        };
        put_list(&mut store, global_db, &[b"misplaced key"]);

        let mut checker = DuplicateChecker::new(&mut store);
        assert!(!checker.is_enrolled(b"misplaced key"));
    }

    #[test]
    fn trusted_key_in_list_with_trailing_slack() {
        use mok_specs::uefi::nvram::signature_list::EFI_CERT_X509_GUID;
        use mok_specs::uefi::nvram::EfiVariableAttributes;
        use zerocopy::IntoBytes;

        let cert = [0x42u8; 16];
        let mut list = Vec::new();
        list.extend_from_slice(EFI_CERT_X509_GUID.as_bytes());
        list.extend_from_slice(&(28u32 + 32 + 4).to_le_bytes());
        list.extend_from_slice(&0u32.to_le_bytes());
        list.extend_from_slice(&32u32.to_le_bytes());
        list.extend_from_slice(FIRMWARE_OWNER.as_bytes());
        list.extend_from_slice(&cert);
        list.extend_from_slice(&[0; 4]);

        let mut store = InMemoryVarStore::new();
        store
            .write(DB, EfiVariableAttributes::DEFAULT_ATTRIBUTES, &list)
            .unwrap();

        let mut checker = DuplicateChecker::new(&mut store);
        assert!(checker.is_enrolled(&cert));
        assert!(!checker.is_eligible(RequestKind::Enroll, &cert));
    }

    #[test]
    fn pending_deletion_does_not_block_enrollment() {
        let mut store = InMemoryVarStore::new();
        put_list(&mut store, MOK_DEL, &[b"key"]);
        let mut checker = DuplicateChecker::new(&mut store);
        assert!(checker.is_eligible(RequestKind::Enroll, b"key"));
    }

    #[test]
    fn deletion_eligibility() {
        let mut store = InMemoryVarStore::new();
        put_list(&mut store, MOK_LIST_RT, &[b"enrolled", b"doomed"]);
        put_list(&mut store, MOK_DEL, &[b"doomed"]);

        let mut checker = DuplicateChecker::new(&mut store);
        assert!(checker.is_eligible(RequestKind::Delete, b"enrolled"));
        assert!(!checker.is_eligible(RequestKind::Delete, b"doomed"));
        assert!(!checker.is_eligible(RequestKind::Delete, b"never enrolled"));
    }

    #[test]
    fn certificate_validity() {
        assert!(is_probably_valid_certificate(SELF_SIGNED_DER));
        assert!(!is_probably_valid_certificate(b"not a certificate"));
        assert!(!is_probably_valid_certificate(&SELF_SIGNED_DER[..100]));
    }

    #[test]
    fn request_variables() {
        assert_eq!(RequestKind::Enroll.pending_var(), MOK_NEW);
        assert_eq!(RequestKind::Enroll.auth_var(), MOK_AUTH);
        assert_eq!(RequestKind::Delete.pending_var(), MOK_DEL);
        assert_eq!(RequestKind::Delete.auth_var(), MOK_DEL_AUTH);
    }
}
