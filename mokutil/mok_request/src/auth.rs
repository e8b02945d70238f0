// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Password derived authentication tags.
//!
//! A tag is `SHA-256(list || password)`, with the password encoded as
//! UTF-16LE (no terminator). `MokManager` recomputes it at boot from the
//! password typed on the console, so the password itself is never stored.

use crate::Error;
use mok_specs::shim::AUTH_TAG_SIZE;
use mok_specs::shim::PASSWORD_MAX;
use mok_specs::shim::PASSWORD_MIN;
use openssl::sha::Sha256;
use std::fmt;
use std::io;
use zeroize::Zeroizing;

/// Number of attempts allowed for every password prompt.
pub const MAX_ATTEMPTS: usize = 3;

/// Source of interactively entered passwords.
pub trait PasswordPrompt {
    /// Display `prompt` and read a single line without echoing it.
    ///
    /// Returns `None` on end of input.
    fn read_password(&mut self, prompt: &str) -> io::Result<Option<Zeroizing<String>>>;

    /// Show a diagnostic message to the operator.
    fn report(&mut self, message: &str);
}

/// A password of acceptable length, held as UTF-16 code units.
///
/// The buffer is zeroed on drop.
pub struct Password(Zeroizing<Vec<u16>>);

impl Password {
    /// Returns `None` if `s` is not [`PASSWORD_MIN`] to [`PASSWORD_MAX`]
    /// characters long.
    pub fn new(s: &str) -> Option<Password> {
        let len = s.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            return None;
        }
        // characters outside the BMP take two code units, and firmware only
        // has room for PASSWORD_MAX of them
        Some(Password(Zeroizing::new(
            s.encode_utf16().take(PASSWORD_MAX).collect(),
        )))
    }

    pub fn as_utf16(&self) -> &[u16] {
        &self.0
    }

    fn to_le_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.iter().flat_map(|c| c.to_le_bytes()).collect())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Authentication tag binding a password to the exact bytes of a list.
#[derive(Clone, Copy)]
pub struct AuthTag([u8; AUTH_TAG_SIZE]);

impl AuthTag {
    /// Derive the tag for `list` (absent lists hash as empty) and `password`.
    pub fn derive(list: Option<&[u8]>, password: &Password) -> AuthTag {
        let mut hasher = Sha256::new();
        if let Some(list) = list {
            hasher.update(list);
        }
        hasher.update(&password.to_le_bytes());
        AuthTag(hasher.finish())
    }

    /// Interpret a stored tag. Returns `None` unless `data` is exactly
    /// [`AUTH_TAG_SIZE`] bytes.
    pub fn from_bytes(data: &[u8]) -> Option<AuthTag> {
        data.try_into().ok().map(AuthTag)
    }

    pub fn as_bytes(&self) -> &[u8; AUTH_TAG_SIZE] {
        &self.0
    }

    /// Constant-time comparison.
    pub fn matches(&self, other: &AuthTag) -> bool {
        openssl::memcmp::eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AuthTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthTag(")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

fn read_line(prompt: &mut dyn PasswordPrompt, text: &str) -> Result<Zeroizing<String>, Error> {
    match prompt.read_password(text).map_err(Error::Prompt)? {
        Some(line) => Ok(line),
        None => Err(Error::UserAborted),
    }
}

/// Ask for a new password, then ask for it again to confirm.
///
/// Up to [`MAX_ATTEMPTS`] entries of an invalid length are tolerated, then up
/// to [`MAX_ATTEMPTS`] mismatching confirmations. Only the confirmation is
/// re-read after a mismatch.
pub fn prompt_new_password(prompt: &mut dyn PasswordPrompt) -> Result<Password, Error> {
    let length_prompt = format!("input password ({PASSWORD_MIN}~{PASSWORD_MAX} characters): ");

    let mut first = None;
    for _ in 0..MAX_ATTEMPTS {
        let line = read_line(prompt, &length_prompt)?;
        match Password::new(&line) {
            Some(password) => {
                first = Some((line, password));
                break;
            }
            None => prompt.report(&format!(
                "password should be {PASSWORD_MIN}~{PASSWORD_MAX} characters"
            )),
        }
    }
    let Some((first, password)) = first else {
        tracing::debug!("too many invalid passwords");
        return Err(Error::UserAborted);
    };

    for _ in 0..MAX_ATTEMPTS {
        let again = read_line(prompt, "input password again: ")?;
        if *again == *first {
            return Ok(password);
        }
        prompt.report("password doesn't match");
    }

    tracing::debug!("too many mismatched password confirmations");
    Err(Error::UserAborted)
}

/// Challenge the operator for the password `stored` was derived with.
///
/// Returns `Ok(false)` once [`MAX_ATTEMPTS`] entries have failed to reproduce
/// the tag. Entries of an invalid length count as failed attempts.
pub fn verify_tag(
    prompt: &mut dyn PasswordPrompt,
    stored: &AuthTag,
    list: Option<&[u8]>,
) -> Result<bool, Error> {
    for attempt in 1..=MAX_ATTEMPTS {
        let line = read_line(prompt, "input old password: ")?;
        let Some(password) = Password::new(&line) else {
            prompt.report("invalid password");
            continue;
        };

        if AuthTag::derive(list, &password).matches(stored) {
            return Ok(true);
        }
        tracing::debug!(attempt, "incorrect password");
    }
    Ok(false)
}
