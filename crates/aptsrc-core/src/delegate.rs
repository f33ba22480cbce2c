//! Collaborators the core hands work to: privileged writes and signing keys.

use std::{
    fs,
    path::{Path, PathBuf},
};

use aptsrc_utils::fs::{ensure_dir_exists, safe_remove, write_atomic};
use tracing::{debug, info};

use crate::{
    error::{ErrorContext, Result, SourceError},
    source::Source,
};

/// Writes files the current process isn't allowed to write itself.
pub trait PrivilegedWriter {
    fn write(&self, path: &Path, content: &[u8]) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;
}

/// A writer with no way to escalate; every call is denied.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unprivileged;

impl PrivilegedWriter for Unprivileged {
    fn write(&self, path: &Path, _content: &[u8]) -> Result<()> {
        Err(SourceError::PermissionDenied {
            path: path.to_path_buf(),
        })
    }

    fn remove(&self, path: &Path) -> Result<()> {
        Err(SourceError::PermissionDenied {
            path: path.to_path_buf(),
        })
    }
}

/// Storage for repository signing keys.
pub trait KeyStore {
    /// Removes every key installed for `ident`. Missing keys are not an error.
    fn delete_key(&self, ident: &str) -> Result<()>;

    /// Key material for a source, if the store has any.
    fn fetch_key_material(&self, source: &Source) -> Result<Option<Vec<u8>>>;

    /// Installs key material for `ident`, returning the path APT should use.
    fn install_key(&self, ident: &str, material: &[u8]) -> Result<PathBuf>;

    /// Path of a keyring already in the store under `name`.
    fn find_key(&self, name: &str) -> Option<PathBuf>;

    /// Deletes one keyring file if it belongs to the store. Returns whether
    /// anything was removed.
    fn delete_key_file(&self, path: &Path) -> Result<bool>;
}

const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// Whether key material is ASCII-armored rather than a binary keyring.
pub fn is_armored(material: &[u8]) -> bool {
    let start = material
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(material.len());
    material[start..].starts_with(ARMOR_HEADER)
}

/// Keys kept as `{ident}.gpg` (or armored `{ident}.asc`) files in a keyring
/// directory.
#[derive(Clone, Debug)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, ident: &str) -> PathBuf {
        self.dir.join(format!("{ident}.gpg"))
    }

    pub fn armored_key_path(&self, ident: &str) -> PathBuf {
        self.dir.join(format!("{ident}.asc"))
    }

    fn owns(&self, ident: &str, file_name: &str) -> bool {
        let Some(stem) = file_name
            .strip_suffix(".gpg")
            .or_else(|| file_name.strip_suffix(".asc"))
        else {
            return false;
        };
        stem == ident
            || stem
                .strip_prefix(ident)
                .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl KeyStore for FileKeyStore {
    fn delete_key(&self, ident: &str) -> Result<()> {
        if ident.is_empty() || !self.dir.is_dir() {
            return Ok(());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("reading keys directory {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("reading entry in {}", self.dir.display()))?;
            let file_name = entry.file_name();
            if self.owns(ident, &file_name.to_string_lossy()) {
                debug!("removing key {}", entry.path().display());
                safe_remove(entry.path())?;
            }
        }

        Ok(())
    }

    fn fetch_key_material(&self, source: &Source) -> Result<Option<Vec<u8>>> {
        let candidate = match source.signed_by() {
            Some(signed_by) if !signed_by.contains('\n') => PathBuf::from(signed_by),
            Some(_) => return Ok(None),
            None => {
                let binary = self.key_path(source.ident());
                if binary.is_file() {
                    binary
                } else {
                    self.armored_key_path(source.ident())
                }
            }
        };

        if !candidate.starts_with(&self.dir) || !candidate.is_file() {
            return Ok(None);
        }

        let material = fs::read(&candidate)
            .with_context(|| format!("reading key {}", candidate.display()))?;
        Ok(Some(material))
    }

    fn install_key(&self, ident: &str, material: &[u8]) -> Result<PathBuf> {
        ensure_dir_exists(&self.dir)?;
        // APT picks the keyring parser from the extension.
        let (path, stale) = if is_armored(material) {
            (self.armored_key_path(ident), self.key_path(ident))
        } else {
            (self.key_path(ident), self.armored_key_path(ident))
        };
        write_atomic(&path, material)?;
        safe_remove(&stale)?;
        info!("Installed signing key {}", path.display());
        Ok(path)
    }

    fn find_key(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') {
            return None;
        }
        [self.key_path(name), self.armored_key_path(name)]
            .into_iter()
            .find(|path| path.is_file())
    }

    fn delete_key_file(&self, path: &Path) -> Result<bool> {
        if path.parent() != Some(self.dir.as_path()) || !path.is_file() {
            return Ok(false);
        }
        debug!("removing key {}", path.display());
        safe_remove(path)?;
        Ok(true)
    }
}
