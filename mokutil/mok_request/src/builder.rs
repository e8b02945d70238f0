// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Staging of enrollment and deletion requests.

use crate::auth;
use crate::auth::AuthTag;
use crate::auth::PasswordPrompt;
use crate::checker::is_probably_valid_certificate;
use crate::checker::DuplicateChecker;
use crate::checker::RequestKind;
use crate::Error;
use mok_signature_list::encode;
use mok_specs::shim::SHIM_LOCK_GUID;
use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_var_store::VariableStore;

/// A key file to be staged.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Used to identify the candidate in diagnostics.
    pub name: &'a str,
    pub data: &'a [u8],
}

/// Progress of a request through [`RequestBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Start,
    CandidatesValidated,
    PriorRequestAuthenticated,
    PriorRequestAbsent,
    Merged,
    Signed,
    Committed,
    Aborted,
}

/// Outcome of a successful [`RequestBuilder::issue`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RequestReport {
    /// Names of the candidates added to the pending list.
    pub accepted: Vec<String>,
    /// Names of the candidates that were already trusted, already pending, or
    /// repeated within the batch.
    pub skipped: Vec<String>,
    /// Size of the pending list that was written, or `None` if there was
    /// nothing to do.
    pub committed_len: Option<usize>,
}

/// Builds a single pending request, merging it with any request staged by a
/// previous invocation.
pub struct RequestBuilder<'a> {
    store: &'a mut dyn VariableStore,
    prompt: &'a mut dyn PasswordPrompt,
    kind: RequestKind,
    state: RequestState,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        store: &'a mut dyn VariableStore,
        prompt: &'a mut dyn PasswordPrompt,
        kind: RequestKind,
    ) -> Self {
        Self {
            store,
            prompt,
            kind,
            state: RequestState::Start,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    fn transition(&mut self, next: RequestState) {
        tracing::debug!(kind = ?self.kind, from = ?self.state, to = ?next, "request state");
        self.state = next;
    }

    /// Stage `candidates`.
    ///
    /// Ineligible candidates are skipped. If a request is already pending, the
    /// operator must first re-enter its password, and the new keys are
    /// prepended to it. Either every eligible candidate is committed, or
    /// nothing is.
    pub fn issue(&mut self, candidates: &[Candidate<'_>]) -> Result<RequestReport, Error> {
        let res = self.issue_inner(candidates);
        if res.is_err() {
            self.transition(RequestState::Aborted);
        }
        res
    }

    fn issue_inner(&mut self, candidates: &[Candidate<'_>]) -> Result<RequestReport, Error> {
        let mut report = RequestReport::default();
        let mut accepted: Vec<&Candidate<'_>> = Vec::new();

        let mut checker = DuplicateChecker::new(self.store);
        for candidate in candidates {
            if !is_probably_valid_certificate(candidate.data) {
                tracing::warn!(
                    file = candidate.name,
                    "not a valid x509 certificate in DER format"
                );
            }

            let repeated = accepted.iter().any(|c| c.data == candidate.data);
            if repeated || !checker.is_eligible(self.kind, candidate.data) {
                tracing::debug!(file = candidate.name, repeated, "skipping key");
                report.skipped.push(candidate.name.to_owned());
                continue;
            }
            accepted.push(candidate);
        }
        self.transition(RequestState::CandidatesValidated);

        if accepted.is_empty() {
            tracing::info!("no eligible keys, nothing to do");
            return Ok(report);
        }

        let prior = self.authenticate_prior()?;

        let mut list = encode(accepted.iter().map(|c| c.data), SHIM_LOCK_GUID).map_err(Error::Encode)?;
        if let Some(prior) = prior {
            list.extend_from_slice(&prior);
        }
        self.transition(RequestState::Merged);

        self.sign_and_commit(Some(list.as_slice()))?;

        report.accepted = accepted.iter().map(|c| c.name.to_owned()).collect();
        report.committed_len = Some(list.len());
        Ok(report)
    }

    /// Replace any pending request with an empty one.
    ///
    /// For enrollment, this asks `MokManager` to clear the enrolled MOK list.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.transition(RequestState::Merged);
        let res = self.sign_and_commit(None);
        if res.is_err() {
            self.transition(RequestState::Aborted);
        }
        res
    }

    /// Read the pending list staged by a previous invocation, and require the
    /// operator to prove they know its password.
    fn authenticate_prior(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let pending_var = self.kind.pending_var();
        let auth_var = self.kind.auth_var();

        let Some((_, prior)) = self
            .store
            .read(pending_var)
            .map_err(|err| Error::Read(pending_var, err))?
        else {
            self.transition(RequestState::PriorRequestAbsent);
            return Ok(None);
        };

        let stored = self
            .store
            .read(auth_var)
            .map_err(|err| Error::Read(auth_var, err))?;
        let Some(stored) = stored.and_then(|(_, data)| AuthTag::from_bytes(&data)) else {
            tracing::warn!(var = %auth_var, "pending request has a missing or malformed tag");
            return Err(Error::AuthenticationFailed(pending_var));
        };

        if !auth::verify_tag(self.prompt, &stored, Some(prior.as_slice()))? {
            return Err(Error::AuthenticationFailed(pending_var));
        }

        self.transition(RequestState::PriorRequestAuthenticated);
        Ok(Some(prior))
    }

    fn sign_and_commit(&mut self, list: Option<&[u8]>) -> Result<(), Error> {
        let pending_var = self.kind.pending_var();
        let auth_var = self.kind.auth_var();

        let password = auth::prompt_new_password(self.prompt)?;
        let tag = AuthTag::derive(list, &password);
        drop(password);
        self.transition(RequestState::Signed);

        let attr = EfiVariableAttributes::DEFAULT_ATTRIBUTES;
        match list {
            Some(list) => self
                .store
                .write(pending_var, attr, list)
                .map_err(|err| Error::Write(pending_var, err))?,
            None => {
                self.store
                    .delete(pending_var)
                    .map_err(|err| Error::Delete(pending_var, err))?;
            }
        }

        if let Err(err) = self.store.write(auth_var, attr, tag.as_bytes()) {
            // never leave a list behind without a matching tag
            if let Err(rollback_err) = self.store.delete(pending_var) {
                tracing::error!(
                    var = %pending_var,
                    error = &rollback_err as &dyn std::error::Error,
                    "failed to roll back pending list"
                );
            }
            return Err(Error::Write(auth_var, err));
        }

        self.transition(RequestState::Committed);
        tracing::info!(var = %pending_var, len = list.map_or(0, |l| l.len()), "request staged");
        Ok(())
    }
}

/// Delete the pending request of `kind` and its tag.
///
/// Returns `false` if there was nothing to revoke.
pub fn revoke(store: &mut dyn VariableStore, kind: RequestKind) -> Result<bool, Error> {
    let mut found = false;
    for var in [kind.pending_var(), kind.auth_var()] {
        found |= store.delete(var).map_err(|err| Error::Delete(var, err))?;
    }
    Ok(found)
}
