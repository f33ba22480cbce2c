pub mod comment;
pub mod context;
pub mod delegate;
pub mod error;
pub mod file;
pub mod keys;
pub mod options;
pub mod registry;
pub mod source;
pub mod system;
pub mod tokenizer;

pub use context::SourcesContext;
pub use error::{ErrorKind, Result, SourceError};
pub use file::SourceFile;
pub use source::{Origin, Source, SourceFormat, SourceType};
