// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`VariableStore`] backed by the Linux `efivarfs` filesystem.
//!
//! Each variable is a file named `<Name>-<vendor guid>`, whose contents are
//! the 4 byte little-endian attributes followed by the variable data. The
//! kernel marks most variables immutable, so that flag is cleared before
//! every modification.

// UNSAFETY: ioctl calls to read and clear the inode immutable flag.
#![allow(unsafe_code)]

use crate::VarStoreError;
use crate::VariableStore;
use fs_err::os::unix::fs::OpenOptionsExt;
use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_specs::NvramVar;
use std::io;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::path::PathBuf;

/// From `linux/fs.h`. Not exported by `libc`.
const FS_IMMUTABLE_FL: libc::c_int = 0x10;

const ATTR_SIZE: usize = size_of::<u32>();

/// A [`VariableStore`] backed by an efivarfs mount.
#[derive(Debug)]
pub struct EfivarfsStore {
    root: PathBuf,
}

impl EfivarfsStore {
    /// Access the variables under `root` (usually [`crate::DEFAULT_EFIVARS_PATH`]).
    pub fn new(root: impl Into<PathBuf>) -> EfivarfsStore {
        EfivarfsStore { root: root.into() }
    }

    fn var_path(&self, var: NvramVar) -> PathBuf {
        self.root.join(format!("{}-{}", var.name, var.vendor))
    }
}

fn get_flags(file: &fs_err::File) -> io::Result<libc::c_int> {
    let mut flags: libc::c_int = 0;
    // SAFETY: `file` is a valid open fd for the duration of the call, and
    // FS_IOC_GETFLAGS writes a single integer into `flags`.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_GETFLAGS, &mut flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_flags(file: &fs_err::File, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: `file` is a valid open fd for the duration of the call, and
    // FS_IOC_SETFLAGS only reads a single integer from `flags`.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_SETFLAGS, &flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Clear the immutable flag on `path`, if present.
///
/// Filesystems without inode flag support (tmpfs in tests, older kernels)
/// are treated as having nothing to clear.
fn clear_immutable(path: &Path) -> io::Result<()> {
    let file = match fs_err::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    let flags = match get_flags(&file) {
        Ok(flags) => flags,
        Err(err) if is_unsupported(&err) => return Ok(()),
        Err(err) => return Err(err),
    };
    if flags & FS_IMMUTABLE_FL == 0 {
        return Ok(());
    }

    tracing::debug!(path = %path.display(), "clearing immutable flag");
    set_flags(&file, flags & !FS_IMMUTABLE_FL)
}

fn is_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTTY | libc::EOPNOTSUPP | libc::EINVAL)
    )
}

impl VariableStore for EfivarfsStore {
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError> {
        let path = self.var_path(var);
        let mut file = match fs_err::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(VarStoreError::Load(err.into())),
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|err| VarStoreError::Load(err.into()))?;

        let Some((attr, data)) = buf.split_first_chunk::<ATTR_SIZE>() else {
            return Err(VarStoreError::Deserialize(buf.len()));
        };
        let attr = EfiVariableAttributes::from(u32::from_le_bytes(*attr));
        tracing::trace!(%var, len = data.len(), "read variable");
        Ok(Some((attr, data.to_vec())))
    }

    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError> {
        let path = self.var_path(var);
        clear_immutable(&path).map_err(|err| VarStoreError::Commit(err.into()))?;

        // efivarfs requires attributes and data in a single write call
        let mut buf = Vec::with_capacity(ATTR_SIZE + data.len());
        buf.extend_from_slice(&u32::from(attr).to_le_bytes());
        buf.extend_from_slice(data);

        let mut file = fs_err::OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o644)
            .open(&path)
            .map_err(|err| VarStoreError::Commit(err.into()))?;
        file.write_all(&buf)
            .map_err(|err| VarStoreError::Commit(err.into()))?;

        // efivarfs resizes the file itself. Regular filesystems (an exported
        // copy of the variables, tests) need stale trailing data dropped.
        let len = file
            .metadata()
            .map_err(|err| VarStoreError::Commit(err.into()))?
            .len();
        if len > buf.len() as u64 {
            file.set_len(buf.len() as u64)
                .map_err(|err| VarStoreError::Commit(err.into()))?;
        }

        tracing::debug!(%var, len = data.len(), "wrote variable");
        Ok(())
    }

    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        let path = self.var_path(var);
        clear_immutable(&path).map_err(|err| VarStoreError::Remove(err.into()))?;
        match fs_err::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(%var, "deleted variable");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(VarStoreError::Remove(err.into())),
        }
    }
}
