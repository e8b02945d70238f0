// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Code to parse and emit [`EFI_SIGNATURE_LIST`] structures.
//!
//! [`ParseSignatureLists`] is the strict entrypoint to zero-copy iterate over
//! a buffer of serialized `EFI_SIGNATURE_LIST` objects, reporting every
//! format violation. [`decode`] layers the lenient behavior needed for
//! firmware-supplied data on top of it.

use guid::Guid;
use mok_specs::uefi::nvram::signature_list::EFI_CERT_SHA256_GUID;
use mok_specs::uefi::nvram::signature_list::EFI_CERT_X509_GUID;
use mok_specs::uefi::nvram::signature_list::EFI_SIGNATURE_DATA;
use mok_specs::uefi::nvram::signature_list::EFI_SIGNATURE_LIST;
use mok_specs::uefi::nvram::signature_list::SHA256_DIGEST_SIZE;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

const LIST_HEADER_SIZE: usize = size_of::<EFI_SIGNATURE_LIST>();
const DATA_HEADER_SIZE: usize = size_of::<EFI_SIGNATURE_DATA>();
const SHA256_SIGNATURE_SIZE: usize = DATA_HEADER_SIZE + SHA256_DIGEST_SIZE;

/// Kind of key stored in a signature list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyKind {
    /// DER encoded X.509 certificate.
    X509,
    /// SHA-256 digest of a binary.
    Sha256,
}

impl KeyKind {
    fn from_signature_type(signature_type: Guid) -> Option<KeyKind> {
        match signature_type {
            EFI_CERT_X509_GUID => Some(KeyKind::X509),
            EFI_CERT_SHA256_GUID => Some(KeyKind::Sha256),
            _ => None,
        }
    }
}

/// A single decoded `EFI_SIGNATURE_DATA` entry, borrowing its payload from
/// the buffer it was parsed out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry<'a> {
    pub kind: KeyKind,
    pub owner: Guid,
    /// Raw DER bytes for certificates, or the 32 byte digest for hashes.
    pub payload: &'a [u8],
}

/// Errors which may occur during `EFI_SIGNATURE_LIST` parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("could not read signature list header ({0} bytes remaining)")]
    InvalidHeader(usize),
    #[error("signature list size {0} is smaller than the signature list header")]
    InvalidListSize(u32),
    #[error("signature list declares {declared} bytes, but only {remaining} bytes remain")]
    TruncatedData { declared: u32, remaining: usize },
    #[error("signature header size {header_size} exceeds signature list size {list_size}")]
    InvalidHeaderSize { header_size: u32, list_size: u32 },

    #[error("unsupported signature type: {0}")]
    UnsupportedSignatureType(Guid),
    #[error("invalid signature_size specified for sha256 (expected 32 + 16, got {0})")]
    Sha256InvalidSigSize(u32),
    #[error("invalid signature_size {0} (must be larger than the EFI_SIGNATURE_DATA header)")]
    InvalidSigSize(u32),
    #[error("signature array of {len} bytes is not a multiple of signature_size {signature_size}")]
    MisalignedSignatures { len: usize, signature_size: u32 },
}

impl ParseError {
    /// Whether the error prevents parsing any further signature lists from the
    /// same buffer (as opposed to only invalidating the current list).
    pub fn is_fatal(&self) -> bool {
        match self {
            ParseError::InvalidHeader(_)
            | ParseError::InvalidListSize(_)
            | ParseError::TruncatedData { .. }
            | ParseError::InvalidHeaderSize { .. } => true,
            ParseError::UnsupportedSignatureType(_)
            | ParseError::Sha256InvalidSigSize(_)
            | ParseError::InvalidSigSize(_)
            | ParseError::MisalignedSignatures { .. } => false,
        }
    }
}

/// Errors which may occur while emitting `EFI_SIGNATURE_LIST`s.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("signature data of {0} bytes does not fit in an EFI_SIGNATURE_LIST")]
    TooLarge(usize),
}

/// A single `EFI_SIGNATURE_LIST`, split into its components.
#[derive(Debug, Clone, Copy)]
pub struct RawSignatureList<'a> {
    pub header: EFI_SIGNATURE_LIST,
    /// Opaque, type specific header (always empty in practice).
    pub signature_header: &'a [u8],
    /// Array of `EFI_SIGNATURE_DATA`, each `signature_size` bytes long.
    pub signatures: &'a [u8],
}

impl<'a> RawSignatureList<'a> {
    fn validate(&self) -> Result<(KeyKind, usize), ParseError> {
        let signature_type = self.header.signature_type();
        let kind = KeyKind::from_signature_type(signature_type)
            .ok_or(ParseError::UnsupportedSignatureType(signature_type))?;

        let signature_size = self.header.signature_size.get();
        match kind {
            KeyKind::Sha256 if signature_size as usize != SHA256_SIGNATURE_SIZE => {
                Err(ParseError::Sha256InvalidSigSize(signature_size))
            }
            _ if (signature_size as usize) <= DATA_HEADER_SIZE => {
                Err(ParseError::InvalidSigSize(signature_size))
            }
            _ => Ok((kind, signature_size as usize)),
        }
    }

    /// Validate the list's type and signature size, returning an iterator over
    /// its entries.
    pub fn entries(&self) -> Result<SignatureEntries<'a>, ParseError> {
        let (entries, slack) = self.entries_with_slack()?;
        match slack {
            Some(err) => Err(err),
            None => Ok(entries),
        }
    }

    /// Like [`Self::entries`], but tolerates trailing bytes after the last
    /// whole entry. The slack is reported as the second element, and is never
    /// part of any entry.
    pub fn entries_with_slack(
        &self,
    ) -> Result<(SignatureEntries<'a>, Option<ParseError>), ParseError> {
        let (kind, signature_size) = self.validate()?;
        let chunks = self.signatures.chunks_exact(signature_size);
        let slack = (!chunks.remainder().is_empty()).then(|| ParseError::MisalignedSignatures {
            len: self.signatures.len(),
            signature_size: signature_size as u32,
        });
        Ok((SignatureEntries { kind, chunks }, slack))
    }
}

/// Iterator over the `EFI_SIGNATURE_DATA` entries of a single list.
pub struct SignatureEntries<'a> {
    kind: KeyKind,
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl<'a> Iterator for SignatureEntries<'a> {
    type Item = KeyEntry<'a>;

    fn next(&mut self) -> Option<KeyEntry<'a>> {
        let chunk = self.chunks.next()?;
        // chunk size was validated to exceed the header size in `entries`
        let (owner, payload) = chunk.split_first_chunk::<DATA_HEADER_SIZE>()?;
        let owner = EFI_SIGNATURE_DATA {
            signature_owner: *owner,
        };
        Some(KeyEntry {
            kind: self.kind,
            owner: owner.signature_owner(),
            payload,
        })
    }
}

/// Iterator over a series of `EFI_SIGNATURE_LIST` structs in a single buffer.
///
/// Yields at most one error: after a list header fails to parse, there is no
/// reliable way to locate the next list, so iteration stops.
pub struct ParseSignatureLists<'a> {
    buf: &'a [u8],
}

impl<'a> ParseSignatureLists<'a> {
    /// Instantiate a `ParseSignatureLists` with the given `buf`
    pub fn new(buf: &'a [u8]) -> ParseSignatureLists<'a> {
        ParseSignatureLists { buf }
    }

    fn next_inner(&mut self) -> Result<Option<RawSignatureList<'a>>, ParseError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let (header, _) = EFI_SIGNATURE_LIST::read_from_prefix(self.buf)
            .map_err(|_| ParseError::InvalidHeader(self.buf.len()))?;

        let list_size = header.signature_list_size.get();
        let header_size = header.signature_header_size.get();

        if (list_size as usize) < LIST_HEADER_SIZE {
            return Err(ParseError::InvalidListSize(list_size));
        }
        if self.buf.len() < list_size as usize {
            // Some firmware reports an oversized final list. Never read past
            // the end of the buffer.
            return Err(ParseError::TruncatedData {
                declared: list_size,
                remaining: self.buf.len(),
            });
        }

        let (list, rest) = self.buf.split_at(list_size as usize);
        let body = &list[LIST_HEADER_SIZE..];
        if body.len() < header_size as usize {
            return Err(ParseError::InvalidHeaderSize {
                header_size,
                list_size,
            });
        }
        let (signature_header, signatures) = body.split_at(header_size as usize);

        self.buf = rest;

        Ok(Some(RawSignatureList {
            header,
            signature_header,
            signatures,
        }))
    }
}

impl<'a> Iterator for ParseSignatureLists<'a> {
    type Item = Result<RawSignatureList<'a>, ParseError>;

    fn next(&mut self) -> Option<Result<RawSignatureList<'a>, ParseError>> {
        let res = self.next_inner().transpose();
        if matches!(res, Some(Err(_))) {
            self.buf = &[];
        }
        res
    }
}

/// Result of leniently decoding a buffer of signature lists.
#[derive(Debug, Default)]
pub struct DecodedKeys<'a> {
    /// Every certificate and SHA-256 entry found, in buffer order.
    pub entries: Vec<KeyEntry<'a>>,
    /// Lists (or trailing parts of lists) that were skipped because they were
    /// of an unknown type, or violated the format in a way that did not
    /// prevent parsing subsequent lists.
    pub skipped: Vec<ParseError>,
    /// Set if decoding stopped early because the buffer was malformed. Entries
    /// decoded up until that point are still reported.
    pub malformed: Option<ParseError>,
}

impl DecodedKeys<'_> {
    /// Returns true if any entry's payload is byte-identical to `candidate`.
    pub fn contains(&self, candidate: &[u8]) -> bool {
        self.entries.iter().any(|entry| entry.payload == candidate)
    }
}

/// Leniently decode a buffer of concatenated `EFI_SIGNATURE_LIST`s.
///
/// Lists of unknown type, SHA-256 lists with a non-standard entry size, and
/// lists with an invalid entry size are skipped. Trailing bytes after a
/// list's last whole entry are ignored, and reported in
/// [`DecodedKeys::skipped`]. A malformed or truncated
/// list header stops decoding. This never fails: firmware-supplied lists are
/// known to be sloppy, and a partially corrupt list must not prevent listing
/// keys or checking for duplicates.
pub fn decode(buf: &[u8]) -> DecodedKeys<'_> {
    let mut decoded = DecodedKeys::default();
    for list in ParseSignatureLists::new(buf) {
        let list = match list {
            Ok(list) => list,
            Err(err) => {
                decoded.malformed = Some(err);
                break;
            }
        };

        match list.entries_with_slack() {
            Ok((entries, slack)) => {
                decoded.entries.extend(entries);
                decoded.skipped.extend(slack);
            }
            Err(err) => decoded.skipped.push(err),
        }
    }
    decoded
}

/// Rust-y representation of a [`EFI_SIGNATURE_LIST`] struct, used to emit new
/// lists.
#[derive(Debug, PartialEq, Eq)]
pub enum SignatureList<'a> {
    Sha256(Vec<(Guid, &'a [u8; SHA256_DIGEST_SIZE])>),
    // Each X509 signature list only ever contains a single cert.
    //
    // While the spec _technically_ allows stuffing multiple certs into a single
    // signature list, the only way that could occur is if the certs have
    // exactly the same length, which never actually happens in practice.
    X509(Guid, &'a [u8]),
}

impl SignatureList<'_> {
    /// Serialize the signature list as a `EFI_SIGNATURE_LIST` onto the end of
    /// `res`.
    pub fn extend_as_spec_signature_list(&self, res: &mut Vec<u8>) -> Result<(), EncodeError> {
        let (signature_type, data_size, count) = match self {
            SignatureList::Sha256(sigs) => (EFI_CERT_SHA256_GUID, SHA256_DIGEST_SIZE, sigs.len()),
            SignatureList::X509(_, cert) => (EFI_CERT_X509_GUID, cert.len(), 1),
        };

        let signature_size = DATA_HEADER_SIZE + data_size;
        let list_size = signature_size
            .checked_mul(count)
            .and_then(|n| n.checked_add(LIST_HEADER_SIZE))
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(EncodeError::TooLarge(data_size))?;

        let header = EFI_SIGNATURE_LIST {
            signature_type: zerocopy::transmute!(signature_type),
            signature_list_size: list_size.into(),
            signature_header_size: 0.into(),
            signature_size: (signature_size as u32).into(),
        };

        res.reserve(list_size as usize);
        res.extend_from_slice(header.as_bytes());
        let mut push_entry = |owner: Guid, data: &[u8]| {
            res.extend_from_slice(owner.as_bytes());
            res.extend_from_slice(data);
        };
        match self {
            SignatureList::Sha256(sigs) => {
                for (owner, digest) in sigs {
                    push_entry(*owner, &digest[..]);
                }
            }
            SignatureList::X509(owner, cert) => push_entry(*owner, cert),
        }
        Ok(())
    }
}

/// Encode each blob as a separate single-certificate X509 signature list
/// owned by `owner`, preserving input order.
pub fn encode<'a>(
    blobs: impl IntoIterator<Item = &'a [u8]>,
    owner: Guid,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    for blob in blobs {
        SignatureList::X509(owner, blob).extend_as_spec_signature_list(&mut buf)?;
    }
    Ok(buf)
}
