use std::{error::Error, fmt, io, path::PathBuf};

#[derive(Debug)]
pub enum PathError {
    Empty,

    CurrentDir { source: io::Error },

    MissingEnvVar { var: String, input: String },

    UnclosedVariable { input: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "Path is empty"),
            PathError::CurrentDir { source } => {
                write!(f, "Failed to get current directory: {source}")
            }
            PathError::MissingEnvVar { var, input } => {
                write!(f, "Environment variable `{var}` not set in `{input}`")
            }
            PathError::UnclosedVariable { input } => {
                write!(f, "Unclosed variable expression in `{input}`")
            }
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PathError::CurrentDir { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum FileSystemError {
    File {
        path: PathBuf,
        action: &'static str,
        source: io::Error,
    },

    Directory {
        path: PathBuf,
        action: &'static str,
        source: io::Error,
    },

    NotADirectory {
        path: PathBuf,
    },
}

impl FileSystemError {
    /// The underlying I/O error kind, if the failure came from the OS.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            FileSystemError::File { source, .. } | FileSystemError::Directory { source, .. } => {
                Some(source.kind())
            }
            FileSystemError::NotADirectory { .. } => None,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::PermissionDenied)
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            FileSystemError::File { path, .. }
            | FileSystemError::Directory { path, .. }
            | FileSystemError::NotADirectory { path } => path,
        }
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::File {
                path,
                action,
                source,
            } => write!(f, "Failed to {action} file `{}`: {source}", path.display()),
            FileSystemError::Directory {
                path,
                action,
                source,
            } => write!(
                f,
                "Failed to {action} directory `{}`: {source}",
                path.display()
            ),
            FileSystemError::NotADirectory { path } => {
                write!(f, "`{}` is not a directory", path.display())
            }
        }
    }
}

impl Error for FileSystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileSystemError::File { source, .. } => Some(source),
            FileSystemError::Directory { source, .. } => Some(source),
            FileSystemError::NotADirectory { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum UtilsError {
    Path(PathError),
    FileSystem(FileSystemError),
}

impl fmt::Display for UtilsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtilsError::Path(err) => write!(f, "{err}"),
            UtilsError::FileSystem(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UtilsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UtilsError::Path(err) => Some(err),
            UtilsError::FileSystem(err) => Some(err),
        }
    }
}

impl From<PathError> for UtilsError {
    fn from(err: PathError) -> Self {
        UtilsError::Path(err)
    }
}

impl From<FileSystemError> for UtilsError {
    fn from(err: FileSystemError) -> Self {
        UtilsError::FileSystem(err)
    }
}

pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type PathResult<T> = std::result::Result<T, PathError>;
pub type UtilsResult<T> = std::result::Result<T, UtilsError>;
