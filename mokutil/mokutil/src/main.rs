// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command line tool to stage Machine Owner Key requests for shim.

mod keys;
mod prompt;

use clap::Parser;
use clap::Subcommand;
use mok_request::builder;
use mok_request::checker::DuplicateChecker;
use mok_request::policy;
use mok_request::policy::SecureBootState;
use mok_request::query;
use mok_request::Candidate;
use mok_request::PasswordPrompt;
use mok_request::RequestBuilder;
use mok_request::RequestKind;
use mok_specs::shim::vars::MOK_DEL;
use mok_specs::shim::vars::MOK_LIST_RT;
use mok_specs::shim::vars::MOK_NEW;
use mok_specs::shim::MokSbState;
use mok_specs::NvramVar;
use mok_var_store::VariableStore;
use mok_var_store::DEFAULT_EFIVARS_PATH;
use prompt::TerminalPrompt;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
enum Error {
    #[error("EFI variables are not supported on this system ({0} is not a directory)")]
    EfiVariablesUnsupported(PathBuf),
    #[error("Key file IO")]
    KeyFile(#[source] io::Error),
    #[error("Writing to STDOUT")]
    Output(#[source] io::Error),
    #[error("Exporting keys")]
    Export(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("{0} is already enrolled")]
    AlreadyEnrolled(String),
    #[error("MOK request")]
    Request(#[from] mok_request::Error),
    #[error("Failed to issue a reset request")]
    Reset(#[source] mok_request::Error),
}

/// Scripts rely on certain exit codes being guaranteed; main matches the
/// Error enum to an ExitCode.
///
/// test-key must return ErrorEnrolled if the key is already enrolled
/// ExitCode::Error returned for all other errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum ExitCode {
    Error = 1,
    ErrorAuthentication = 2,
    ErrorAborted = 3,
    ErrorEnrolled = 4,
    ErrorNotFound = 5,
}

impl From<&Error> for ExitCode {
    fn from(e: &Error) -> ExitCode {
        match e {
            Error::AlreadyEnrolled(_) => ExitCode::ErrorEnrolled,
            Error::Request(e) | Error::Reset(e) => match e {
                mok_request::Error::AuthenticationFailed(_) => ExitCode::ErrorAuthentication,
                mok_request::Error::UserAborted => ExitCode::ErrorAborted,
                mok_request::Error::NotFound(_) => ExitCode::ErrorNotFound,
                _ => ExitCode::Error,
            },
            _ => ExitCode::Error,
        }
    }
}

#[derive(Parser)]
#[clap(
    name = "mokutil",
    about = "Tool to manage the Machine Owner Keys (MOKs) trusted by shim.",
    long_about = "Tool to manage the Machine Owner Keys (MOKs) trusted by shim.\n\n\
        Requests are staged in EFI variables and must be confirmed in MokManager \
        on the next boot."
)]
struct Options {
    /// efivarfs mountpoint
    #[clap(
        long,
        global = true,
        env = "MOKUTIL_EFIVARS_PATH",
        default_value = DEFAULT_EFIVARS_PATH
    )]
    efivars_path: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the keys enrolled in MokListRT
    ListEnrolled,
    /// List the keys pending enrollment
    ListNew,
    /// List the keys pending deletion
    ListDelete,
    /// Request enrollment of one or more DER encoded certificates
    Import {
        /// Certificate file paths
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Request deletion of one or more enrolled DER encoded certificates
    Delete {
        /// Certificate file paths
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Revoke the pending enrollment request
    Revoke,
    /// Revoke the pending deletion request
    RevokeDelete,
    /// Export the enrolled keys to MOK-NNNN.der files
    Export {
        /// Directory to write the key files to
        #[clap(long, default_value = ".")]
        export_dir: PathBuf,
    },
    /// Request a new MokManager password
    Password,
    /// Request that shim stop validating signatures
    DisableValidation,
    /// Request that shim validate signatures
    EnableValidation,
    /// Print the firmware's SecureBoot state
    SbState,
    /// Test whether a DER encoded certificate is already enrolled
    ///
    /// Exits with code 4 if it is.
    TestKey {
        /// Certificate file path
        file: PathBuf,
    },
    /// Request that the enrolled MOK list be cleared
    Reset,
}

fn parse_legacy_args(mut args: Vec<String>) -> Vec<String> {
    if let Some(cmd) = args.get(1) {
        let new_cmd = match &cmd[..] {
            "--list-enrolled" => Some("list-enrolled"),
            "--list-new" => Some("list-new"),
            "--list-delete" => Some("list-delete"),
            "-i" | "--import" => Some("import"),
            "-d" | "--delete" => Some("delete"),
            "--revoke" | "--revoke-import" => Some("revoke"),
            "--revoke-delete" => Some("revoke-delete"),
            "-x" | "--export" => Some("export"),
            "-p" | "--password" => Some("password"),
            "--disable-validation" => Some("disable-validation"),
            "--enable-validation" => Some("enable-validation"),
            "--sb-state" => Some("sb-state"),
            "-t" | "--test-key" => Some("test-key"),
            "--reset" => Some("reset"),
            _ => None,
        };

        if let Some(new_cmd) = new_cmd {
            eprintln!("Warning: Using legacy arguments. Please migrate to the new syntax.");
            args[1] = new_cmd.to_string();
        }
    }
    args
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .without_time()
                .with_target(false),
        )
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .with_env_var("MOKUTIL_LOG")
                .from_env_lossy(),
        )
        .init();

    if let Err(e) = do_main() {
        let exit_code = ExitCode::from(&e);

        eprintln!("EXIT CODE: {} ({:?})", exit_code as i32, exit_code);
        eprintln!("ERROR: {}", e);
        let mut error_source = std::error::Error::source(&e);
        while let Some(e2) = error_source {
            eprintln!("- {}", e2);
            error_source = e2.source();
        }

        std::process::exit(exit_code as i32);
    }
}

fn do_main() -> Result<(), Error> {
    let opt = Options::parse_from(parse_legacy_args(std::env::args().collect()));
    let mut store = open_store(&opt.efivars_path)?;
    run(
        opt.command,
        store.as_mut(),
        &mut TerminalPrompt,
        &mut io::stdout(),
    )
}

fn open_store(efivars_path: &Path) -> Result<Box<dyn VariableStore>, Error> {
    if !efivars_path.is_dir() {
        return Err(Error::EfiVariablesUnsupported(efivars_path.to_owned()));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(mok_var_store::efivarfs::EfivarfsStore::new(
            efivars_path,
        )))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(Error::EfiVariablesUnsupported(efivars_path.to_owned()))
    }
}

fn run(
    command: Command,
    store: &mut dyn VariableStore,
    prompt: &mut dyn PasswordPrompt,
    out: &mut dyn Write,
) -> Result<(), Error> {
    match command {
        Command::ListEnrolled => list_keys(store, MOK_LIST_RT, out),
        Command::ListNew => list_keys(store, MOK_NEW, out),
        Command::ListDelete => list_keys(store, MOK_DEL, out),
        Command::Import { files } => issue_request(store, prompt, RequestKind::Enroll, &files, out),
        Command::Delete { files } => issue_request(store, prompt, RequestKind::Delete, &files, out),
        Command::Revoke => revoke_request(store, RequestKind::Enroll),
        Command::RevokeDelete => revoke_request(store, RequestKind::Delete),
        Command::Export { export_dir } => export_keys(store, &export_dir),
        Command::Password => Ok(policy::set_password(store, prompt)?),
        Command::DisableValidation => Ok(policy::set_validation(
            store,
            prompt,
            MokSbState::DisableValidation,
        )?),
        Command::EnableValidation => Ok(policy::set_validation(
            store,
            prompt,
            MokSbState::EnableValidation,
        )?),
        Command::SbState => {
            let state = match policy::secure_boot_state(store)? {
                SecureBootState::Enabled => "enabled",
                SecureBootState::Disabled => "disabled",
                SecureBootState::Unknown => "unknown",
            };
            writeln!(out, "SecureBoot {state}").map_err(Error::Output)
        }
        Command::TestKey { file } => test_key(store, &file, out),
        Command::Reset => RequestBuilder::new(store, prompt, RequestKind::Enroll)
            .reset()
            .map_err(Error::Reset),
    }
}

fn list_keys(store: &mut dyn VariableStore, var: NvramVar, out: &mut dyn Write) -> Result<(), Error> {
    let list = query::read_existing_list(store, var)?;
    let count = keys::list_keys(out, &list).map_err(Error::Output)?;
    tracing::debug!(%var, count, "listed keys");
    Ok(())
}

fn issue_request(
    store: &mut dyn VariableStore,
    prompt: &mut dyn PasswordPrompt,
    kind: RequestKind,
    files: &[PathBuf],
    out: &mut dyn Write,
) -> Result<(), Error> {
    let names = files
        .iter()
        .map(|file| file.display().to_string())
        .collect::<Vec<_>>();
    let contents = files
        .iter()
        .map(|file| fs_err::read(file).map_err(Error::KeyFile))
        .collect::<Result<Vec<_>, _>>()?;
    let candidates = names
        .iter()
        .zip(&contents)
        .map(|(name, data)| Candidate {
            name: name.as_str(),
            data: data.as_slice(),
        })
        .collect::<Vec<_>>();

    let report = RequestBuilder::new(store, prompt, kind).issue(&candidates)?;
    for name in &report.skipped {
        writeln!(out, "Skip {name}").map_err(Error::Output)?;
    }
    Ok(())
}

fn revoke_request(store: &mut dyn VariableStore, kind: RequestKind) -> Result<(), Error> {
    if !builder::revoke(store, kind)? {
        tracing::info!(var = %kind.pending_var(), "no pending request");
    }
    Ok(())
}

fn export_keys(store: &mut dyn VariableStore, export_dir: &Path) -> Result<(), Error> {
    let list = query::read_existing_list(store, MOK_LIST_RT)?;
    let written = keys::export_keys(&list, export_dir).map_err(|e| Error::Export(e.into()))?;
    tracing::info!(
        count = written.len(),
        dir = %export_dir.display(),
        "exported enrolled keys"
    );
    Ok(())
}

fn test_key(store: &mut dyn VariableStore, file: &Path, out: &mut dyn Write) -> Result<(), Error> {
    let data = fs_err::read(file).map_err(Error::KeyFile)?;
    let enrolled = DuplicateChecker::new(store).is_enrolled(&data);
    let status = if enrolled { "already enrolled" } else { "not enrolled" };
    writeln!(out, "{} is {status}", file.display()).map_err(Error::Output)?;
    if enrolled {
        return Err(Error::AlreadyEnrolled(file.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mok_request::auth::AuthTag;
    use mok_request::auth::Password;
    use mok_signature_list::encode;
    use mok_specs::shim::vars::MOK_AUTH;
    use mok_specs::shim::SHIM_LOCK_GUID;
    use mok_specs::uefi::nvram::vars::DB;
    use mok_specs::uefi::nvram::vars::SECURE_BOOT;
    use mok_specs::uefi::nvram::EfiVariableAttributes;
    use mok_var_store::in_memory::InMemoryVarStore;
    use std::collections::VecDeque;
    use test_with_tracing::test;
    use zeroize::Zeroizing;

    /// Self-signed P-256 certificate, `CN=mok test key`.
    pub const SELF_SIGNED_DER: &[u8] = include_bytes!("../../mok_request/test_data/test_key.der");

    struct Answers(VecDeque<&'static str>);

    impl Answers {
        fn new(answers: &[&'static str]) -> Self {
            Answers(answers.iter().copied().collect())
        }
    }

    impl PasswordPrompt for Answers {
        fn read_password(&mut self, _prompt: &str) -> io::Result<Option<Zeroizing<String>>> {
            Ok(self.0.pop_front().map(|s| Zeroizing::new(s.to_owned())))
        }

        fn report(&mut self, _message: &str) {}
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn run_with(
        store: &mut InMemoryVarStore,
        answers: &[&'static str],
        cmd: &[&str],
    ) -> (Result<(), Error>, String) {
        let mut argv = vec!["mokutil"];
        argv.extend_from_slice(cmd);
        let opt = Options::try_parse_from(parse_legacy_args(args(&argv))).unwrap();
        let mut out = Vec::new();
        let res = run(opt.command, store, &mut Answers::new(answers), &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    fn put(store: &mut InMemoryVarStore, var: NvramVar, data: &[u8]) {
        store
            .write(var, EfiVariableAttributes::DEFAULT_ATTRIBUTES, data)
            .unwrap();
    }

    #[test]
    fn verify_cli() {
        Options::command().debug_assert();
    }

    #[test]
    fn legacy_args_are_rewritten() {
        assert_eq!(
            parse_legacy_args(args(&["mokutil", "-i", "a.der", "b.der"])),
            args(&["mokutil", "import", "a.der", "b.der"])
        );
        assert_eq!(
            parse_legacy_args(args(&["mokutil", "--test-key", "a.der"])),
            args(&["mokutil", "test-key", "a.der"])
        );
        assert_eq!(
            parse_legacy_args(args(&["mokutil", "--sb-state"])),
            args(&["mokutil", "sb-state"])
        );
        // new syntax and unknown flags pass through
        assert_eq!(
            parse_legacy_args(args(&["mokutil", "list-enrolled"])),
            args(&["mokutil", "list-enrolled"])
        );
        assert_eq!(
            parse_legacy_args(args(&["mokutil", "--bogus"])),
            args(&["mokutil", "--bogus"])
        );
        assert_eq!(parse_legacy_args(args(&["mokutil"])), args(&["mokutil"]));
    }

    #[test]
    fn import_requires_files() {
        assert!(Options::try_parse_from(["mokutil", "import"]).is_err());
        assert!(Options::try_parse_from(parse_legacy_args(args(&["mokutil", "-d"]))).is_err());
        let opt = Options::try_parse_from(["mokutil", "--efivars-path", "/tmp/vars", "revoke"])
            .unwrap();
        assert_eq!(opt.efivars_path, Path::new("/tmp/vars"));
    }

    #[test]
    fn import_skips_trusted_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A.der");
        let b = dir.path().join("B.der");
        fs_err::write(&a, vec![0xaa; 1200]).unwrap();
        fs_err::write(&b, vec![0xbb; 900]).unwrap();

        let mut store = InMemoryVarStore::new();
        put(
            &mut store,
            DB,
            &encode([&[0xaa; 1200][..]], SHIM_LOCK_GUID).unwrap(),
        );

        let (res, out) = run_with(
            &mut store,
            &["new password", "new password"],
            &["import", a.to_str().unwrap(), b.to_str().unwrap()],
        );
        res.unwrap();
        assert_eq!(out, format!("Skip {}\n", a.display()));

        let expected = encode([&[0xbb; 900][..]], SHIM_LOCK_GUID).unwrap();
        assert_eq!(store.get(MOK_NEW), Some(expected.as_slice()));
        let tag = AuthTag::derive(
            Some(expected.as_slice()),
            &Password::new("new password").unwrap(),
        );
        assert_eq!(store.get(MOK_AUTH), Some(&tag.as_bytes()[..]));
    }

    #[test]
    fn missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.der");
        let mut store = InMemoryVarStore::new();
        let (res, _) = run_with(&mut store, &[], &["import", missing.to_str().unwrap()]);
        let err = res.unwrap_err();
        assert!(matches!(err, Error::KeyFile(_)));
        assert_eq!(ExitCode::from(&err), ExitCode::Error);
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn failed_merge_authentication_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.der");
        fs_err::write(&key, SELF_SIGNED_DER).unwrap();

        let mut store = InMemoryVarStore::new();
        let pending = encode([&b"pending key"[..]], SHIM_LOCK_GUID).unwrap();
        let tag = AuthTag::derive(Some(pending.as_slice()), &Password::new("old password").unwrap());
        put(&mut store, MOK_NEW, &pending);
        put(&mut store, MOK_AUTH, tag.as_bytes());

        let (res, _) = run_with(
            &mut store,
            &["wrong one", "wrong two", "wrong three"],
            &["--import", key.to_str().unwrap()],
        );
        let err = res.unwrap_err();
        assert_eq!(ExitCode::from(&err), ExitCode::ErrorAuthentication);
        assert_eq!(store.get(MOK_NEW), Some(pending.as_slice()));
        assert_eq!(store.get(MOK_AUTH), Some(&tag.as_bytes()[..]));
    }

    #[test]
    fn reset_with_nothing_pending() {
        let mut store = InMemoryVarStore::new();
        let (res, _) = run_with(&mut store, &["password", "password"], &["--reset"]);
        res.unwrap();

        assert_eq!(store.get(MOK_NEW), None);
        let tag = AuthTag::derive(None, &Password::new("password").unwrap());
        assert_eq!(store.get(MOK_AUTH), Some(&tag.as_bytes()[..]));

        let (res, _) = run_with(&mut store, &[], &["reset"]);
        let err = res.unwrap_err();
        assert!(matches!(err, Error::Reset(mok_request::Error::UserAborted)));
        assert_eq!(ExitCode::from(&err), ExitCode::ErrorAborted);
    }

    #[test]
    fn test_key_reports_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.der");
        fs_err::write(&key, SELF_SIGNED_DER).unwrap();
        let key = key.to_str().unwrap();

        let mut store = InMemoryVarStore::new();
        let (res, out) = run_with(&mut store, &[], &["test-key", key]);
        res.unwrap();
        assert_eq!(out, format!("{key} is not enrolled\n"));

        put(
            &mut store,
            MOK_LIST_RT,
            &encode([SELF_SIGNED_DER], SHIM_LOCK_GUID).unwrap(),
        );
        let (res, out) = run_with(&mut store, &[], &["-t", key]);
        let err = res.unwrap_err();
        assert_eq!(out, format!("{key} is already enrolled\n"));
        assert_eq!(err.to_string(), format!("{key} is already enrolled"));
        assert_eq!(ExitCode::from(&err), ExitCode::ErrorEnrolled);
    }

    #[test]
    fn sb_state() {
        let mut store = InMemoryVarStore::new();
        let (res, _) = run_with(&mut store, &[], &["sb-state"]);
        assert_eq!(ExitCode::from(&res.unwrap_err()), ExitCode::ErrorNotFound);

        put(&mut store, SECURE_BOOT, &[1]);
        let (res, out) = run_with(&mut store, &[], &["sb-state"]);
        res.unwrap();
        assert_eq!(out, "SecureBoot enabled\n");

        put(&mut store, SECURE_BOOT, &[0]);
        let (_, out) = run_with(&mut store, &[], &["--sb-state"]);
        assert_eq!(out, "SecureBoot disabled\n");
    }

    #[test]
    fn list_and_revoke() {
        let mut store = InMemoryVarStore::new();
        let (res, _) = run_with(&mut store, &[], &["list-new"]);
        assert_eq!(ExitCode::from(&res.unwrap_err()), ExitCode::ErrorNotFound);

        put(
            &mut store,
            MOK_NEW,
            &encode([SELF_SIGNED_DER], SHIM_LOCK_GUID).unwrap(),
        );
        put(&mut store, MOK_AUTH, &[0; 32]);
        let (res, out) = run_with(&mut store, &[], &["list-new"]);
        res.unwrap();
        assert!(out.starts_with("[key 1]\nSHA1 Fingerprint: "));

        let (res, _) = run_with(&mut store, &[], &["--revoke"]);
        res.unwrap();
        assert_eq!(store.iter().count(), 0);

        // nothing left to revoke
        let (res, _) = run_with(&mut store, &[], &["revoke"]);
        res.unwrap();
    }

    #[test]
    fn export_enrolled_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = InMemoryVarStore::new();
        put(
            &mut store,
            MOK_LIST_RT,
            &encode([SELF_SIGNED_DER, &b"second"[..]], SHIM_LOCK_GUID).unwrap(),
        );

        let (res, _) = run_with(
            &mut store,
            &[],
            &["export", "--export-dir", dir.path().to_str().unwrap()],
        );
        res.unwrap();
        assert_eq!(
            fs_err::read(dir.path().join("MOK-0001.der")).unwrap(),
            SELF_SIGNED_DER
        );
        assert_eq!(
            fs_err::read(dir.path().join("MOK-0002.der")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn validation_and_password_requests() {
        let mut store = InMemoryVarStore::new();
        let (res, _) = run_with(&mut store, &["abcdefgh", "abcdefgh"], &["password"]);
        res.unwrap();
        let (res, _) = run_with(
            &mut store,
            &["abcdefgh", "abcdefgh"],
            &["--disable-validation"],
        );
        res.unwrap();
        assert_eq!(store.iter().count(), 2);
    }

    #[test]
    fn missing_efivars_mount() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_store(&dir.path().join("efivars")),
            Err(Error::EfiVariablesUnsupported(_))
        ));
    }
}
