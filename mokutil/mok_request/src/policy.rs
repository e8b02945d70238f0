// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Requests that change shim's own policy rather than the key lists.

use crate::auth;
use crate::auth::AuthTag;
use crate::auth::PasswordPrompt;
use crate::Error;
use mok_specs::shim::vars::MOK_PW;
use mok_specs::shim::vars::MOK_SB;
use mok_specs::shim::MokSbState;
use mok_specs::shim::MOK_SB_VAR;
use mok_specs::uefi::nvram::vars::SECURE_BOOT;
use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_var_store::VariableStore;
use zerocopy::IntoBytes;
use zeroize::Zeroize;

/// Current firmware Secure Boot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureBootState {
    Enabled,
    Disabled,
    Unknown,
}

/// Ask `MokManager` to set its password on next boot.
pub fn set_password(store: &mut dyn VariableStore, prompt: &mut dyn PasswordPrompt) -> Result<(), Error> {
    let password = auth::prompt_new_password(prompt)?;
    let tag = AuthTag::derive(None, &password);

    store
        .write(MOK_PW, EfiVariableAttributes::DEFAULT_ATTRIBUTES, tag.as_bytes())
        .map_err(|err| Error::Write(MOK_PW, err))?;
    tracing::info!("password change staged");
    Ok(())
}

/// Ask `MokManager` to enable or disable shim's signature validation on next
/// boot.
///
/// The operator confirms the change by entering characters of the password,
/// so it is stored in the clear.
pub fn set_validation(
    store: &mut dyn VariableStore,
    prompt: &mut dyn PasswordPrompt,
    state: MokSbState,
) -> Result<(), Error> {
    let password = auth::prompt_new_password(prompt)?;
    let mut var = MOK_SB_VAR::new(state, password.as_utf16());
    drop(password);

    let res = store.write(MOK_SB, EfiVariableAttributes::DEFAULT_ATTRIBUTES, var.as_bytes());
    var.as_mut_bytes().zeroize();
    res.map_err(|err| Error::Write(MOK_SB, err))?;

    tracing::info!(?state, "validation change staged");
    Ok(())
}

/// Read the firmware's `SecureBoot` variable.
pub fn secure_boot_state(store: &mut dyn VariableStore) -> Result<SecureBootState, Error> {
    let (_, data) = store
        .read(SECURE_BOOT)
        .map_err(|err| Error::Read(SECURE_BOOT, err))?
        .ok_or(Error::NotFound(SECURE_BOOT))?;

    Ok(match data.first() {
        Some(1) => SecureBootState::Enabled,
        Some(0) => SecureBootState::Disabled,
        _ => SecureBootState::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Password;
    use crate::test_helpers::FailingStore;
    use crate::test_helpers::ScriptedPrompt;
    use mok_var_store::in_memory::InMemoryVarStore;
    use test_with_tracing::test;

    #[test]
    fn password_request_is_tag_over_empty_list() {
        let mut store = InMemoryVarStore::new();
        let mut prompt = ScriptedPrompt::new(["mok password", "mok password"]);
        set_password(&mut store, &mut prompt).unwrap();

        let expected = AuthTag::derive(None, &Password::new("mok password").unwrap());
        assert_eq!(store.get(MOK_PW), Some(&expected.as_bytes()[..]));
    }

    #[test]
    fn validation_request_layout() {
        let mut store = InMemoryVarStore::new();
        let mut prompt = ScriptedPrompt::new(["abcdefgh", "abcdefgh"]);
        set_validation(&mut store, &mut prompt, MokSbState::DisableValidation).unwrap();

        let data = store.get(MOK_SB).unwrap();
        assert_eq!(data.len(), 40);
        assert_eq!(&data[0..4], &0u32.to_le_bytes());
        assert_eq!(&data[4..8], &8u32.to_le_bytes());
        let password: Vec<u8> = "abcdefgh"
            .encode_utf16()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        assert_eq!(&data[8..24], &password[..]);
        assert!(data[24..].iter().all(|b| *b == 0));

        let mut prompt = ScriptedPrompt::new(["abcdefgh", "abcdefgh"]);
        set_validation(&mut store, &mut prompt, MokSbState::EnableValidation).unwrap();
        assert_eq!(&store.get(MOK_SB).unwrap()[0..4], &1u32.to_le_bytes());
    }

    #[test]
    fn aborted_policy_requests_write_nothing() {
        let mut store = InMemoryVarStore::new();
        let mut prompt = ScriptedPrompt::new(["password", "different"]);
        assert!(matches!(
            set_password(&mut store, &mut prompt),
            Err(Error::UserAborted)
        ));
        let mut prompt = ScriptedPrompt::default();
        assert!(matches!(
            set_validation(&mut store, &mut prompt, MokSbState::EnableValidation),
            Err(Error::UserAborted)
        ));
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn validation_write_failure_is_reported() {
        let mut store = FailingStore {
            inner: InMemoryVarStore::new(),
            fail_writes_to: MOK_SB,
        };
        let mut prompt = ScriptedPrompt::new(["abcdefgh", "abcdefgh"]);
        assert!(matches!(
            set_validation(&mut store, &mut prompt, MokSbState::EnableValidation),
            Err(Error::Write(var, _)) if var == MOK_SB
        ));
    }

    #[test]
    fn secure_boot_states() {
        let mut store = InMemoryVarStore::new();
        assert!(matches!(
            secure_boot_state(&mut store),
            Err(Error::NotFound(_))
        ));

        for (data, expected) in [
            (&[1u8][..], SecureBootState::Enabled),
            (&[0u8][..], SecureBootState::Disabled),
            (&[2u8][..], SecureBootState::Unknown),
            (&[][..], SecureBootState::Unknown),
        ] {
            store
                .write(SECURE_BOOT, EfiVariableAttributes::DEFAULT_ATTRIBUTES, data)
                .unwrap();
            assert_eq!(secure_boot_state(&mut store).unwrap(), expected);
        }
    }
}
