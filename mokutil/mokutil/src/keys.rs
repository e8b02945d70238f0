// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Human readable listing and export of key lists.

use anyhow::Context;
use mok_signature_list::decode;
use mok_signature_list::DecodedKeys;
use mok_signature_list::KeyEntry;
use mok_signature_list::KeyKind;
use openssl::x509::X509;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn decode_logged(list: &[u8]) -> DecodedKeys<'_> {
    let decoded = decode(list);
    for err in &decoded.skipped {
        tracing::debug!(
            error = err as &dyn std::error::Error,
            "skipped unsupported signature list"
        );
    }
    if let Some(err) = &decoded.malformed {
        tracing::warn!(
            error = err as &dyn std::error::Error,
            "key list is malformed, ignoring trailing data"
        );
    }
    decoded
}

fn print_entry(out: &mut dyn Write, entry: &KeyEntry<'_>) -> io::Result<()> {
    match entry.kind {
        KeyKind::X509 => {
            let fingerprint = openssl::sha::sha1(entry.payload);
            writeln!(out, "SHA1 Fingerprint: {}", colon_hex(&fingerprint))?;
            match X509::from_der(entry.payload).and_then(|cert| cert.to_text()) {
                Ok(text) => out.write_all(&text)?,
                Err(err) => tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    "invalid X509 certificate"
                ),
            }
        }
        KeyKind::Sha256 => {
            writeln!(out, "SHA256 Hash: {}", colon_hex(entry.payload))?;
        }
    }
    Ok(())
}

/// Print every key in `list`, numbered from 1. Returns the number of keys.
pub fn list_keys(out: &mut dyn Write, list: &[u8]) -> io::Result<usize> {
    let decoded = decode_logged(list);
    for (i, entry) in decoded.entries.iter().enumerate() {
        if i != 0 {
            writeln!(out)?;
        }
        writeln!(out, "[key {}]", i + 1)?;
        print_entry(out, entry)?;
    }
    Ok(decoded.entries.len())
}

fn write_key_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs_err::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use fs_err::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    Ok(())
}

/// Write every certificate in `list` to `dir` as `MOK-NNNN.der`.
///
/// Files are numbered by the key's position in the list, matching the
/// numbering of [`list_keys`]. Hash entries have no DER form and are not
/// exported.
pub fn export_keys(list: &[u8], dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let decoded = decode_logged(list);
    let mut written = Vec::new();
    for (i, entry) in decoded.entries.iter().enumerate() {
        let index = i + 1;
        if entry.kind != KeyKind::X509 {
            tracing::info!(index, "not exporting hash entry");
            continue;
        }

        let path = dir.join(format!("MOK-{index:04}.der"));
        write_key_file(&path, entry.payload)
            .with_context(|| format!("failed to export key {index}"))?;
        tracing::debug!(path = %path.display(), "exported key");
        written.push(path);
    }
    Ok(written)
}
