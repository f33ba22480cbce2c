//! Error types for the core crate.

use std::path::PathBuf;

use aptsrc_config::error::ConfigError;
use aptsrc_utils::error::{FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of a [`SourceError`], stable for programmatic checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedLine,
    UnknownOption,
    FormatConflict,
    TooManyValues,
    FormatConversion,
    FileNotFound,
    PermissionDenied,
    Unrepresentable,
    NoFormat,
    SourceNotFound,
    SystemSource,
    InvalidShortcut,
    InvalidKey,
    Io,
    Config,
    Utils,
}

#[derive(Error, Diagnostic, Debug)]
pub enum SourceError {
    #[error("Malformed source line {line:?}: {reason}")]
    #[diagnostic(
        code(aptsrc_core::malformed_line),
        help("Legacy entries look like `deb [options] uri suite [component...]`")
    )]
    MalformedLine { line: String, reason: String },

    #[error("Unknown option `{0}`")]
    #[diagnostic(
        code(aptsrc_core::unknown_option),
        help("Supported options: arch, lang, target, pdiffs, by-hash, allow-insecure, allow-weak, allow-downgrade-to-insecure, trusted, signed-by, check-valid-until, valid-until-min, valid-until-max")
    )]
    UnknownOption(String),

    #[error("{path} mixes legacy and DEB822 entries (line {line_number})")]
    #[diagnostic(
        code(aptsrc_core::format_conflict),
        help("A `.list` file may only contain one-line entries and a `.sources` file only DEB822 stanzas")
    )]
    FormatConflict { path: PathBuf, line_number: usize },

    #[error("Source `{ident}` has more than one {field}; the legacy format allows only one")]
    #[diagnostic(
        code(aptsrc_core::too_many_values),
        help("Keep the source in a .sources file or split it into several entries")
    )]
    TooManyValues { ident: String, field: &'static str },

    #[error("Cannot convert `{ident}`: {reason}")]
    #[diagnostic(code(aptsrc_core::format_conversion))]
    FormatConversion { ident: String, reason: String },

    #[error("No source file found for `{0}`")]
    #[diagnostic(
        code(aptsrc_core::file_not_found),
        help("Run `aptsrc list --files` to see the available source files")
    )]
    FileNotFound(String),

    #[error("Permission denied writing {}", path.display())]
    #[diagnostic(
        code(aptsrc_core::permission_denied),
        help("Modifying system sources usually requires root privileges")
    )]
    PermissionDenied { path: PathBuf },

    #[error("Source `{ident}` cannot be written as a legacy line: {reason}")]
    #[diagnostic(code(aptsrc_core::unrepresentable))]
    Unrepresentable { ident: String, reason: String },

    #[error("Source file `{0}` has no format to save in")]
    #[diagnostic(
        code(aptsrc_core::no_format),
        help("Set a format on the file before saving it")
    )]
    NoFormat(String),

    #[error("No source with ident `{0}`")]
    #[diagnostic(
        code(aptsrc_core::source_not_found),
        help("Run `aptsrc list` to see the configured sources")
    )]
    SourceNotFound(String),

    #[error("System source error: {0}")]
    #[diagnostic(code(aptsrc_core::system_source))]
    SystemSource(String),

    #[error("Invalid repository shortcut `{0}`")]
    #[diagnostic(
        code(aptsrc_core::invalid_shortcut),
        help("Use a full `deb ...` line, a `ppa:owner/name` shortcut or an http(s) URI")
    )]
    InvalidShortcut(String),

    #[error("Invalid signing key: {0}")]
    #[diagnostic(
        code(aptsrc_core::invalid_key),
        help("Keys are binary keyrings or ASCII-armored public key blocks")
    )]
    InvalidKey(String),

    #[error("Error while {action}: {source}")]
    #[diagnostic(code(aptsrc_core::io))]
    Io {
        action: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(aptsrc_core::utils))]
    Utils(#[from] UtilsError),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::MalformedLine { .. } => ErrorKind::MalformedLine,
            SourceError::UnknownOption(_) => ErrorKind::UnknownOption,
            SourceError::FormatConflict { .. } => ErrorKind::FormatConflict,
            SourceError::TooManyValues { .. } => ErrorKind::TooManyValues,
            SourceError::FormatConversion { .. } => ErrorKind::FormatConversion,
            SourceError::FileNotFound(_) => ErrorKind::FileNotFound,
            SourceError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            SourceError::Unrepresentable { .. } => ErrorKind::Unrepresentable,
            SourceError::NoFormat(_) => ErrorKind::NoFormat,
            SourceError::SourceNotFound(_) => ErrorKind::SourceNotFound,
            SourceError::SystemSource(_) => ErrorKind::SystemSource,
            SourceError::InvalidShortcut(_) => ErrorKind::InvalidShortcut,
            SourceError::InvalidKey(_) => ErrorKind::InvalidKey,
            SourceError::Io { .. } => ErrorKind::Io,
            SourceError::Config(_) => ErrorKind::Config,
            SourceError::Utils(_) => ErrorKind::Utils,
        }
    }

    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        SourceError::MalformedLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<PathError> for SourceError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for SourceError {
    fn from(err: FileSystemError) -> Self {
        if err.is_permission_denied() {
            return Self::PermissionDenied {
                path: err.path().clone(),
            };
        }
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            SourceError::Io {
                action: context(),
                source: err,
            }
        })
    }
}
